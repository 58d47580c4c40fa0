use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Issues and checks HS512 bearer tokens whose subject is the user's email.
///
/// Built once at startup and shared through [`AppState`]. Without a
/// configured secret the key is random, so tokens die with the process.
#[derive(Clone)]
pub struct TokenProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Option<TimeDuration>,
}

impl FromRef<AppState> for TokenProvider {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl TokenProvider {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let ttl = cfg
            .expiration_ms
            .filter(|ms| *ms > 0)
            .map(TimeDuration::milliseconds);
        match &cfg.secret {
            Some(secret) => Self::from_secret(secret.as_bytes(), ttl),
            None => {
                warn!("JWT_SECRET not set; using a per-process random signing key");
                let mut key = [0u8; 64];
                rand::thread_rng().fill_bytes(&mut key);
                Self::from_secret(&key, ttl)
            }
        }
    }

    pub fn from_secret(secret: &[u8], ttl: Option<TimeDuration>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, subject_email: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: subject_email.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: self.ttl.map(|ttl| (now + ttl).unix_timestamp() as usize),
        };
        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding)?;
        debug!(expires = claims.exp.is_some(), "jwt signed");
        Ok(token)
    }

    pub fn subject_of(&self, token: &str) -> Result<String, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::Empty);
        }
        let mut validation = Validation::new(Algorithm::HS512);
        validation.required_spec_claims.clear();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!("jwt verified");
        Ok(data.claims.sub)
    }

    pub fn verify(&self, token: &str) -> bool {
        self.subject_of(token).is_ok()
    }
}

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::TokenProvider;
use crate::error::AppError;

/// Extracts and validates the bearer token, yielding the subject email.
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenProvider: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenProvider::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Auth("missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Auth("invalid Authorization header".into()))?;

        match tokens.subject_of(token) {
            Ok(email) => Ok(AuthUser(email)),
            Err(e) => {
                warn!(error = %e, "rejected bearer token");
                Err(AppError::Auth("invalid or expired token".into()))
            }
        }
    }
}

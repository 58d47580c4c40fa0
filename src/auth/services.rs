use std::sync::Arc;

use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{
    jwt::TokenProvider,
    password::{hash_password, verify_password},
};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
    users::{
        repo::UserStore,
        repo_types::User,
    },
    validation::{
        is_blank, is_valid_email, is_valid_password, EMAIL_ERROR_MESSAGE, NAME_ERROR_MESSAGE,
        PASSWORD_ERROR_MESSAGE,
    },
};

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Login and self-registration. Both hand back a fresh bearer token.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: TokenProvider,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.tokens.clone())
    }
}

/// Returns the first failing rule, in field order.
fn first_error(errors: Vec<&'static str>) -> AppResult<()> {
    match errors.first() {
        Some(message) => Err(AppError::validation(*message)),
        None => Ok(()),
    }
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenProvider) -> Self {
        Self { store, tokens }
    }

    fn check_login(email: Option<&str>, password: Option<&str>) -> AppResult<()> {
        let mut errors = Vec::new();
        if is_blank(email) || !email.is_some_and(is_valid_email) {
            errors.push(EMAIL_ERROR_MESSAGE);
        }
        if is_blank(password) {
            errors.push(PASSWORD_ERROR_MESSAGE);
        }
        first_error(errors)
    }

    fn check_registration(
        name: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> AppResult<()> {
        let mut errors = Vec::new();
        if is_blank(email) || !email.is_some_and(is_valid_email) {
            errors.push(EMAIL_ERROR_MESSAGE);
        }
        if is_blank(password) || !password.is_some_and(is_valid_password) {
            errors.push(PASSWORD_ERROR_MESSAGE);
        }
        if is_blank(name) {
            errors.push(NAME_ERROR_MESSAGE);
        }
        first_error(errors)
    }

    /// Checks credentials, stores the new token and login time on the user.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: Option<&str>, password: Option<&str>) -> AppResult<String> {
        if let Err(e) = Self::check_login(email, password) {
            warn!("login rejected: invalid input");
            return Err(e);
        }
        let (email, password) = (email.unwrap_or_default(), password.unwrap_or_default());

        let Some(mut user) = self.store.find_by_email(email).await? else {
            warn!("login unknown email");
            return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
        };

        let matches = verify_password(password, &user.password_hash).unwrap_or_else(|e| {
            warn!(user_id = %user.id, error = %e, "stored password hash unreadable");
            false
        });
        if !matches {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
        }

        let token = self.tokens.issue(&user.email)?;
        let now = OffsetDateTime::now_utc();
        user.token = Some(token.clone());
        user.last_login_at = Some(now);
        user.modified_at = Some(now);
        let user = self.store.update(user).await?;

        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    /// Creates an active user and signs it in.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> AppResult<String> {
        if let Err(e) = Self::check_registration(name, email, password) {
            warn!("registration rejected: invalid input");
            return Err(e);
        }
        let email = email.unwrap_or_default();

        if self.store.find_by_email(email).await?.is_some() {
            warn!("email already registered");
            return Err(AppError::Conflict(format!(
                "email {email} is already registered"
            )));
        }

        let now = OffsetDateTime::now_utc();
        let mut user = User::new(now);
        user.name = name.map(str::to_string);
        user.email = email.to_string();
        user.password_hash = hash_password(password.unwrap_or_default())?;
        user.active = true;
        user.modified_at = Some(now);
        user.last_login_at = Some(now);

        let token = self.tokens.issue(&user.email)?;
        user.token = Some(token.clone());

        // A concurrent registration can still win the race; the store's
        // unique constraint turns that into a conflict here.
        let user = self.store.insert(user).await?;

        info!(user_id = %user.id, "user registered");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::memory::MemoryUserStore;

    fn service() -> (AuthService, Arc<dyn UserStore>) {
        let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        let tokens = TokenProvider::from_secret(b"test-secret", None);
        (AuthService::new(store.clone(), tokens), store)
    }

    #[tokio::test]
    async fn register_then_login_issues_tokens() {
        let (auth, store) = service();
        let t1 = auth
            .register(Some("Ana"), Some("ana@x.com"), Some("Abcdef1!"))
            .await
            .expect("register");
        let t2 = auth
            .login(Some("ana@x.com"), Some("Abcdef1!"))
            .await
            .expect("login");

        let tokens = TokenProvider::from_secret(b"test-secret", None);
        assert_eq!(tokens.subject_of(&t1).unwrap(), "ana@x.com");
        assert_eq!(tokens.subject_of(&t2).unwrap(), "ana@x.com");

        let user = store.find_by_email("ana@x.com").await.unwrap().unwrap();
        assert_eq!(user.token.as_deref(), Some(t2.as_str()));
        assert!(user.active);
        assert_ne!(user.password_hash, "Abcdef1!");
        assert!(user.last_login_at.unwrap() >= user.created_at);
    }

    #[tokio::test]
    async fn register_stamps_creation_and_login_time_together() {
        let (auth, store) = service();
        auth.register(Some("Ana"), Some("ana@x.com"), Some("Abcdef1!"))
            .await
            .unwrap();
        let user = store.find_by_email("ana@x.com").await.unwrap().unwrap();
        assert_eq!(user.last_login_at, Some(user.created_at));
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_auth_error() {
        let (auth, _) = service();
        auth.register(Some("Ana"), Some("ana@x.com"), Some("Abcdef1!"))
            .await
            .unwrap();
        let err = auth.login(Some("ana@x.com"), Some("wrong")).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(ref m) if m == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn login_unknown_email_is_auth_error() {
        let (auth, _) = service();
        let err = auth
            .login(Some("ghost@x.com"), Some("Abcdef1!"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn login_validates_input_first() {
        let (auth, _) = service();
        let err = auth.login(Some("bad-email"), Some("x")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == &[EMAIL_ERROR_MESSAGE]));

        let err = auth.login(Some("ana@x.com"), Some("  ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == &[PASSWORD_ERROR_MESSAGE]));

        let err = auth.login(None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == &[EMAIL_ERROR_MESSAGE]));
    }

    #[tokio::test]
    async fn register_reports_first_failing_field() {
        let (auth, _) = service();
        let err = auth
            .register(None, Some("ana@x.com"), Some("weak"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == &[PASSWORD_ERROR_MESSAGE]));

        let err = auth
            .register(Some(" "), Some("ana@x.com"), Some("Abcdef1!"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == &[NAME_ERROR_MESSAGE]));
    }

    #[tokio::test]
    async fn register_twice_is_conflict() {
        let (auth, _) = service();
        auth.register(Some("Ana"), Some("ana@x.com"), Some("Abcdef1!"))
            .await
            .unwrap();
        let err = auth
            .register(Some("Ana 2"), Some("ana@x.com"), Some("Abcdef1!"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}

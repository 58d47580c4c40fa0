use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::error;

use crate::users::repo::StoreError;

/// Failures surfaced by the services, mapped onto HTTP statuses at the edge.
#[derive(Debug, Error)]
pub enum AppError {
    /// One message per failing rule.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Auth(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail(email) => {
                AppError::Conflict(format!("email {email} is already registered"))
            }
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Database(e) => AppError::Internal(anyhow::Error::new(e).context("store")),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

/// `Json` body whose rejections go through [`AppError`] like any other bad input.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

#[derive(Serialize)]
struct ValidationErrorResponse {
    errors: Vec<String>,
}

#[derive(Serialize)]
struct ErrorMessage {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::Validation(errors) => {
                (status, Json(ValidationErrorResponse { errors })).into_response()
            }
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    status,
                    Json(ErrorMessage {
                        message: "internal server error".into(),
                    }),
                )
                    .into_response()
            }
            AppError::Conflict(message) | AppError::NotFound(message) | AppError::Auth(message) => {
                (status, Json(ErrorMessage { message })).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Auth("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn duplicate_email_becomes_conflict() {
        let err: AppError = StoreError::DuplicateEmail("a@b.c".into()).into();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("a@b.c")));
    }

    #[test]
    fn validation_display_joins_messages() {
        let err = AppError::Validation(vec!["one".into(), "two".into()]);
        assert_eq!(err.to_string(), "validation failed: one; two");
    }
}

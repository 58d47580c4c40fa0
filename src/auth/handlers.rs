use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest},
        services::AuthService,
    },
    error::{AppJson, AppResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/registro", post(register))
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let token = auth
        .login(payload.email.as_deref(), payload.password.as_deref())
        .await?;
    Ok(Json(AuthResponse::bearer(token)))
}

#[instrument(skip(auth, payload))]
pub async fn register(
    State(auth): State<AuthService>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let token = auth
        .register(
            payload.name.as_deref(),
            payload.email.as_deref(),
            payload.password.as_deref(),
        )
        .await?;
    Ok(Json(AuthResponse::bearer(token)))
}

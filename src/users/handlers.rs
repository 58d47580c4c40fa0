use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppJson, AppResult},
    state::AppState,
    users::{
        dto::{phone_to_dto, to_dto, PhoneDto, UserDto},
        services::UserService,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user)
                .put(update_user)
                .patch(patch_user)
                .delete(delete_user),
        )
        .route("/users/:id/phones", get(list_phones))
        .route("/users/:id/phones/:phone_id", delete(delete_phone))
}

fn user_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("user with id {id} not found"))
}

#[instrument(skip(users))]
pub async fn list_users(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
) -> AppResult<Json<Vec<UserDto>>> {
    let all = users.list().await?;
    if all.is_empty() {
        return Err(AppError::NotFound("no registered users found".into()));
    }
    Ok(Json(all.iter().map(to_dto).collect()))
}

#[instrument(skip(users))]
pub async fn get_user(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserDto>> {
    match users.get(id).await? {
        Some(user) => Ok(Json(to_dto(&user))),
        None => Err(user_not_found(id)),
    }
}

/// Open to anonymous callers unless public creation is switched off.
#[instrument(skip(state, users, caller, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    State(users): State<UserService>,
    caller: Option<AuthUser>,
    AppJson(payload): AppJson<UserDto>,
) -> AppResult<(StatusCode, Json<UserDto>)> {
    if caller.is_none() && !state.config.public_user_creation {
        warn!("anonymous user creation refused");
        return Err(AppError::Auth("authentication required".into()));
    }
    let created = users.create_with_validation(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(users, payload))]
pub async fn update_user(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UserDto>,
) -> AppResult<Json<UserDto>> {
    Ok(Json(users.update_with_validation(id, payload).await?))
}

#[instrument(skip(users, payload))]
pub async fn patch_user(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UserDto>,
) -> AppResult<Json<UserDto>> {
    Ok(Json(users.partial_update_with_validation(id, payload).await?))
}

#[instrument(skip(users))]
pub async fn delete_user(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !users.exists(id).await? {
        return Err(user_not_found(id));
    }
    users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(users))]
pub async fn list_phones(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<PhoneDto>>> {
    let phones = users.phones_of(id).await?;
    Ok(Json(phones.iter().map(phone_to_dto).collect()))
}

#[instrument(skip(users))]
pub async fn delete_phone(
    State(users): State<UserService>,
    AuthUser(caller): AuthUser,
    Path((id, phone_id)): Path<(Uuid, i64)>,
) -> AppResult<StatusCode> {
    users.delete_phone(id, phone_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

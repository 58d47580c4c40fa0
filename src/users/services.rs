use std::{collections::HashSet, sync::Arc};

use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{jwt::TokenProvider, password::hash_password},
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::{from_dto, phone_from_dto, to_dto, PhoneDto, UserDto},
        repo::UserStore,
        repo_types::{Phone, User},
    },
    validation::{
        is_blank, is_valid_email, is_valid_password, EMAIL_ERROR_MESSAGE, PASSWORD_ERROR_MESSAGE,
    },
};

/// How a requested phone list combines with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhoneMerge {
    /// The request is the whole set; unlisted phones are dropped.
    Replace,
    /// Listed phones are patched or added; unlisted phones stay.
    Patch,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    tokens: TokenProvider,
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.tokens.clone())
    }
}

fn push_once(errors: &mut Vec<String>, message: &str) {
    if !errors.iter().any(|e| e == message) {
        errors.push(message.to_string());
    }
}

/// Format checks for the fields that are present. Collects every failure.
fn check_present(email: Option<&str>, password: Option<&str>) -> Vec<String> {
    let mut errors = Vec::new();
    if email.is_some_and(|e| !is_valid_email(e)) {
        push_once(&mut errors, EMAIL_ERROR_MESSAGE);
    }
    if password.is_some_and(|p| !is_valid_password(p)) {
        push_once(&mut errors, PASSWORD_ERROR_MESSAGE);
    }
    errors
}

/// An empty password in an update means "leave it as is".
fn changed_password(dto: &UserDto) -> Option<&str> {
    dto.password.as_deref().filter(|p| !p.is_empty())
}

fn patch_phone(phone: &mut Phone, dto: &PhoneDto) {
    if let Some(number) = &dto.number {
        phone.number = number.clone();
    }
    if let Some(city_code) = &dto.city_code {
        phone.city_code = city_code.clone();
    }
    if let Some(country_code) = &dto.country_code {
        phone.country_code = country_code.clone();
    }
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenProvider) -> Self {
        Self { store, tokens }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.store.find_by_email(email).await?)
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        Ok(self.store.list().await?)
    }

    pub async fn exists(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.store.exists(id).await?)
    }

    /// True when nobody holds `email`, or only the user `exclude_id` does.
    pub async fn is_email_available(&self, email: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        Ok(match self.store.find_by_email(email).await? {
            None => true,
            Some(holder) => Some(holder.id) == exclude_id,
        })
    }

    async fn require(&self, id: Uuid) -> AppResult<User> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user with id {id} not found")))
    }

    /// Resolves the requested phones against the user's stored ones.
    async fn merge_phones(
        &self,
        user: &User,
        requested: &[PhoneDto],
        mode: PhoneMerge,
    ) -> AppResult<Vec<Phone>> {
        let mut seen = HashSet::new();
        for id in requested.iter().filter_map(|p| p.id) {
            if !seen.insert(id) {
                return Err(AppError::validation(format!(
                    "phone {id} is listed more than once"
                )));
            }
            if user.phones.iter().any(|p| p.id == Some(id)) {
                continue;
            }
            return Err(match self.store.find_phone(id).await? {
                Some(_) => AppError::Conflict(format!(
                    "phone {id} does not belong to user {}",
                    user.id
                )),
                None => AppError::NotFound(format!("phone with id {id} not found")),
            });
        }

        let phones = match mode {
            PhoneMerge::Replace => requested
                .iter()
                .map(|p| phone_from_dto(p, user.id))
                .collect(),
            PhoneMerge::Patch => {
                let mut phones = user.phones.clone();
                for p in requested {
                    match p.id {
                        Some(id) => {
                            if let Some(stored) = phones.iter_mut().find(|s| s.id == Some(id)) {
                                patch_phone(stored, p);
                            }
                        }
                        None => phones.push(phone_from_dto(p, user.id)),
                    }
                }
                phones
            }
        };
        Ok(phones)
    }

    #[instrument(skip(self, dto), fields(email = ?dto.email))]
    pub async fn create_with_validation(&self, dto: UserDto) -> AppResult<UserDto> {
        let mut errors = check_present(dto.email.as_deref(), dto.password.as_deref());
        if is_blank(dto.email.as_deref()) {
            push_once(&mut errors, EMAIL_ERROR_MESSAGE);
        }
        if is_blank(dto.password.as_deref()) {
            push_once(&mut errors, PASSWORD_ERROR_MESSAGE);
        }
        if !errors.is_empty() {
            warn!(count = errors.len(), "create rejected: invalid input");
            return Err(AppError::Validation(errors));
        }

        let email = dto.email.clone().unwrap_or_default();
        if !self.is_email_available(&email, None).await? {
            warn!("create rejected: email taken");
            return Err(AppError::Conflict(format!(
                "email {email} is already registered"
            )));
        }

        let now = OffsetDateTime::now_utc();
        let mut user = from_dto(&dto);
        user.id = Uuid::new_v4();
        for phone in &mut user.phones {
            phone.id = None;
            phone.user_id = user.id;
        }
        user.password_hash = hash_password(dto.password.as_deref().unwrap_or_default())?;
        user.active = true;
        user.created_at = now;
        user.modified_at = Some(now);
        user.last_login_at = Some(now);
        user.token = Some(self.tokens.issue(&email)?);

        let user = self.store.insert(user).await?;
        info!(user_id = %user.id, phones = user.phones.len(), "user created");
        Ok(to_dto(&user))
    }

    /// Replaces every client-settable field. `id` and `created_at` are kept,
    /// and so are the server-managed token and last login time.
    #[instrument(skip(self, dto))]
    pub async fn update_with_validation(&self, id: Uuid, dto: UserDto) -> AppResult<UserDto> {
        let existing = self.require(id).await?;

        let password = changed_password(&dto);
        let mut errors = check_present(dto.email.as_deref(), password);
        if is_blank(dto.email.as_deref()) {
            push_once(&mut errors, EMAIL_ERROR_MESSAGE);
        }
        if !errors.is_empty() {
            warn!(count = errors.len(), "update rejected: invalid input");
            return Err(AppError::Validation(errors));
        }

        let email = dto.email.clone().unwrap_or_default();
        if !self.is_email_available(&email, Some(id)).await? {
            warn!("update rejected: email taken");
            return Err(AppError::Conflict(format!(
                "email {email} is already registered for another user"
            )));
        }

        let phones = self
            .merge_phones(&existing, dto.phones.as_deref().unwrap_or_default(), PhoneMerge::Replace)
            .await?;
        let password_hash = match password {
            Some(p) => hash_password(p)?,
            None => existing.password_hash.clone(),
        };

        let user = User {
            id: existing.id,
            name: dto.name.clone(),
            email,
            password_hash,
            active: dto.active.unwrap_or(false),
            created_at: existing.created_at,
            modified_at: Some(OffsetDateTime::now_utc()),
            last_login_at: existing.last_login_at,
            token: existing.token.clone(),
            phones,
        };

        let user = self.store.update(user).await?;
        info!(user_id = %user.id, "user replaced");
        Ok(to_dto(&user))
    }

    /// Applies only the fields present in `dto`.
    #[instrument(skip(self, dto))]
    pub async fn partial_update_with_validation(
        &self,
        id: Uuid,
        dto: UserDto,
    ) -> AppResult<UserDto> {
        let mut user = self.require(id).await?;

        let password = changed_password(&dto);
        let errors = check_present(dto.email.as_deref(), password);
        if !errors.is_empty() {
            warn!(count = errors.len(), "patch rejected: invalid input");
            return Err(AppError::Validation(errors));
        }

        if let Some(email) = &dto.email {
            if !self.is_email_available(email, Some(id)).await? {
                warn!("patch rejected: email taken");
                return Err(AppError::Conflict(format!(
                    "email {email} is already registered for another user"
                )));
            }
        }

        if let Some(requested) = &dto.phones {
            user.phones = self.merge_phones(&user, requested, PhoneMerge::Patch).await?;
        }
        if let Some(name) = &dto.name {
            user.name = Some(name.clone());
        }
        if let Some(email) = &dto.email {
            user.email = email.clone();
        }
        if let Some(active) = dto.active {
            user.active = active;
        }
        if let Some(p) = password {
            user.password_hash = hash_password(p)?;
        }
        user.modified_at = Some(OffsetDateTime::now_utc());

        let user = self.store.update(user).await?;
        info!(user_id = %user.id, "user patched");
        Ok(to_dto(&user))
    }

    /// Removes the user and its phones. Unknown ids are not an error here.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.store.delete(id).await?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn phones_of(&self, user_id: Uuid) -> AppResult<Vec<Phone>> {
        if !self.exists(user_id).await? {
            return Err(AppError::NotFound(format!("user with id {user_id} not found")));
        }
        Ok(self.store.phones_of(user_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_phone(&self, user_id: Uuid, phone_id: i64) -> AppResult<()> {
        if !self.exists(user_id).await? {
            return Err(AppError::NotFound(format!("user with id {user_id} not found")));
        }
        match self.store.find_phone(phone_id).await? {
            None => Err(AppError::NotFound(format!("phone with id {phone_id} not found"))),
            Some(phone) if phone.user_id != user_id => Err(AppError::Conflict(format!(
                "phone {phone_id} does not belong to user {user_id}"
            ))),
            Some(_) => {
                self.store.delete_phone(phone_id).await?;
                info!(%user_id, phone_id, "phone deleted");
                Ok(())
            }
        }
    }
}

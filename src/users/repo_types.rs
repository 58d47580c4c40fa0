use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the store.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,                              // random v4, never changes
    pub name: Option<String>,
    pub email: String,                         // unique across users
    pub password_hash: String,                 // Argon2 hash, never leaves the service layer
    pub active: bool,
    pub created_at: OffsetDateTime,            // set once at creation
    pub modified_at: Option<OffsetDateTime>,
    pub last_login_at: Option<OffsetDateTime>,
    pub token: Option<String>,                 // last issued bearer token
    #[sqlx(skip)]
    pub phones: Vec<Phone>,
}

impl User {
    /// Blank record stamped with `now`, before any field is filled in.
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            email: String::new(),
            password_hash: String::new(),
            active: false,
            created_at: now,
            modified_at: None,
            last_login_at: None,
            token: None,
            phones: Vec::new(),
        }
    }
}

/// Phone owned by a user. `id` is assigned by the store on first write.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Phone {
    pub id: Option<i64>,
    pub user_id: Uuid,
    pub number: String,
    pub city_code: String,
    pub country_code: String,
}

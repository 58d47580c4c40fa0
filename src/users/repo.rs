use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::users::repo_types::{Phone, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint on `users.email` rejected the write.
    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    /// A row the write depends on disappeared.
    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for users and the phones they own.
///
/// `insert` and `update` write the user together with its phone list in one
/// unit: on `update` the list is authoritative, so phones without an id are
/// created, phones with an id are rewritten, and stored phones missing from
/// the list are removed.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list(&self) -> StoreResult<Vec<User>>;
    async fn exists(&self, id: Uuid) -> StoreResult<bool>;
    async fn insert(&self, user: User) -> StoreResult<User>;
    async fn update(&self, user: User) -> StoreResult<User>;
    /// Removes the user and every phone it owns. Unknown ids are a no-op.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn find_phone(&self, id: i64) -> StoreResult<Option<Phone>>;
    async fn phones_of(&self, user_id: Uuid) -> StoreResult<Vec<Phone>>;
    async fn delete_phone(&self, id: i64) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn duplicate_or(e: sqlx::Error, email: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateEmail(email.to_string())
        }
        _ => StoreError::Database(e),
    }
}

async fn insert_phone_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    phone: &Phone,
) -> StoreResult<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO phones (user_id, number, city_code, country_code)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&phone.number)
    .bind(&phone.city_code)
    .bind(&phone.country_code)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, active, created_at,
                   modified_at, last_login_at, token
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match user {
            Some(mut user) => {
                user.phones = self.phones_of(user.id).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, active, created_at,
                   modified_at, last_login_at, token
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        match user {
            Some(mut user) => {
                user.phones = self.phones_of(user.id).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let mut users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, active, created_at,
                   modified_at, last_login_at, token
            FROM users
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let phones = sqlx::query_as::<_, Phone>(
            r#"
            SELECT id, user_id, number, city_code, country_code
            FROM phones
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut by_user: HashMap<Uuid, Vec<Phone>> = HashMap::new();
        for phone in phones {
            by_user.entry(phone.user_id).or_default().push(phone);
        }
        for user in &mut users {
            user.phones = by_user.remove(&user.id).unwrap_or_default();
        }
        Ok(users)
    }

    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let found = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)"#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        Ok(found)
    }

    async fn insert(&self, mut user: User) -> StoreResult<User> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, active, created_at,
                               modified_at, last_login_at, token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(user.created_at)
        .bind(user.modified_at)
        .bind(user.last_login_at)
        .bind(&user.token)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_or(e, &user.email))?;

        for phone in &mut user.phones {
            phone.user_id = user.id;
            phone.id = Some(insert_phone_tx(&mut tx, user.id, phone).await?);
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn update(&self, mut user: User) -> StoreResult<User> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE users
               SET name = $2, email = $3, password_hash = $4, active = $5,
                   modified_at = $6, last_login_at = $7, token = $8
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(user.modified_at)
        .bind(user.last_login_at)
        .bind(&user.token)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_or(e, &user.email))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {} not found", user.id)));
        }

        let kept: Vec<i64> = user.phones.iter().filter_map(|p| p.id).collect();
        sqlx::query(r#"DELETE FROM phones WHERE user_id = $1 AND NOT (id = ANY($2))"#)
            .bind(user.id)
            .bind(&kept)
            .execute(&mut *tx)
            .await?;

        for phone in &mut user.phones {
            phone.user_id = user.id;
            match phone.id {
                Some(id) => {
                    let res = sqlx::query(
                        r#"
                        UPDATE phones
                           SET number = $3, city_code = $4, country_code = $5
                         WHERE id = $1 AND user_id = $2
                        "#,
                    )
                    .bind(id)
                    .bind(user.id)
                    .bind(&phone.number)
                    .bind(&phone.city_code)
                    .bind(&phone.country_code)
                    .execute(&mut *tx)
                    .await?;
                    if res.rows_affected() == 0 {
                        return Err(StoreError::NotFound(format!("phone {id} not found")));
                    }
                }
                None => {
                    phone.id = Some(insert_phone_tx(&mut tx, user.id, phone).await?);
                }
            }
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query(r#"DELETE FROM phones WHERE user_id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_phone(&self, id: i64) -> StoreResult<Option<Phone>> {
        let phone = sqlx::query_as::<_, Phone>(
            r#"
            SELECT id, user_id, number, city_code, country_code
            FROM phones
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(phone)
    }

    async fn phones_of(&self, user_id: Uuid) -> StoreResult<Vec<Phone>> {
        let phones = sqlx::query_as::<_, Phone>(
            r#"
            SELECT id, user_id, number, city_code, country_code
            FROM phones
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(phones)
    }

    async fn delete_phone(&self, id: i64) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM phones WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Connects the pool and applies the bundled migrations.
pub async fn connect(database_url: &str) -> anyhow::Result<PgUserStore> {
    let db = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;
    Ok(PgUserStore::new(db))
}

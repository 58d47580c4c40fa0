use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    auth::password::hash_password,
    users::{
        repo::UserStore,
        repo_types::{Phone, User},
    },
};

struct DemoUser {
    name: &'static str,
    email: &'static str,
    password: &'static str,
    active: bool,
    phones: &'static [(&'static str, &'static str, &'static str)],
}

// Demo credentials predate the password policy and are stored as-is.
const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        name: "Juan Pérez",
        email: "juan@email.com",
        password: "123456",
        active: true,
        phones: &[("123456789", "1", "57"), ("987654321", "2", "57")],
    },
    DemoUser {
        name: "María García",
        email: "maria@email.com",
        password: "654321",
        active: true,
        phones: &[("555555555", "1", "57")],
    },
    DemoUser {
        name: "Carlos López",
        email: "carlos@email.com",
        password: "qwerty",
        active: true,
        phones: &[],
    },
    DemoUser {
        name: "Ana Martínez",
        email: "ana@email.com",
        password: "asdfgh",
        active: false,
        phones: &[
            ("111111111", "1", "57"),
            ("222222222", "2", "57"),
            ("333333333", "3", "57"),
        ],
    },
    DemoUser {
        name: "Pedro Sánchez",
        email: "pedro@email.com",
        password: "zxcvbn",
        active: true,
        phones: &[("444444444", "1", "57")],
    },
];

/// Inserts the demo users whose email is not taken yet. Returns how many were added.
pub async fn seed_demo_users(store: &dyn UserStore) -> anyhow::Result<usize> {
    let mut added = 0;
    for demo in DEMO_USERS {
        if store.find_by_email(demo.email).await?.is_some() {
            debug!(email = demo.email, "demo user already present");
            continue;
        }

        let now = OffsetDateTime::now_utc();
        let mut user = User::new(now);
        user.name = Some(demo.name.to_string());
        user.email = demo.email.to_string();
        user.password_hash = hash_password(demo.password)?;
        user.active = demo.active;
        user.modified_at = Some(now);
        user.phones = demo
            .phones
            .iter()
            .map(|(number, city_code, country_code)| Phone {
                id: None,
                user_id: user.id,
                number: number.to_string(),
                city_code: city_code.to_string(),
                country_code: country_code.to_string(),
            })
            .collect();

        store.insert(user).await?;
        added += 1;
    }
    info!(added, "demo users seeded");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::password::verify_password, users::memory::MemoryUserStore};

    #[tokio::test]
    async fn seeds_five_users_once() {
        let store = MemoryUserStore::new();
        assert_eq!(seed_demo_users(&store).await.unwrap(), 5);
        assert_eq!(seed_demo_users(&store).await.unwrap(), 0);

        let users = store.list().await.unwrap();
        assert_eq!(users.len(), 5);
        let phones: usize = users.iter().map(|u| u.phones.len()).sum();
        assert_eq!(phones, 7);
    }

    #[tokio::test]
    async fn seeded_passwords_are_hashed() {
        let store = MemoryUserStore::new();
        seed_demo_users(&store).await.unwrap();
        let juan = store.find_by_email("juan@email.com").await.unwrap().unwrap();
        assert_ne!(juan.password_hash, "123456");
        assert!(verify_password("123456", &juan.password_hash).unwrap());

        let ana = store.find_by_email("ana@email.com").await.unwrap().unwrap();
        assert!(!ana.active);
        assert_eq!(ana.phones.len(), 3);
    }
}

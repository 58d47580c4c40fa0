use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::repo::{StoreError, StoreResult, UserStore};
use crate::users::repo_types::{Phone, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>, // phones stripped; they live in `phones`
    phones: BTreeMap<i64, Phone>,
    next_phone_id: i64,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn assemble(&self, user: &User) -> User {
        let mut user = user.clone();
        user.phones = self
            .phones
            .values()
            .filter(|p| p.user_id == user.id)
            .cloned()
            .collect();
        user
    }

    fn next_id(&mut self) -> i64 {
        self.next_phone_id += 1;
        self.next_phone_id
    }
}

/// Process-local store with the same constraints as the Postgres schema.
#[derive(Default)]
pub struct MemoryUserStore {
    tables: RwLock<Tables>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.get(&id).map(|u| t.assemble(u)))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).map(|u| t.assemble(u)))
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let t = self.tables.read().await;
        let mut users: Vec<User> = t.users.values().map(|u| t.assemble(u)).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.read().await.users.contains_key(&id))
    }

    async fn insert(&self, mut user: User) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if t.email_taken(&user.email, None) {
            return Err(StoreError::DuplicateEmail(user.email));
        }

        for phone in &mut user.phones {
            let id = t.next_id();
            phone.id = Some(id);
            phone.user_id = user.id;
            t.phones.insert(id, phone.clone());
        }

        let mut row = user.clone();
        row.phones.clear();
        t.users.insert(row.id, row);
        Ok(user)
    }

    async fn update(&self, mut user: User) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        let Some(existing) = t.users.get(&user.id) else {
            return Err(StoreError::NotFound(format!("user {} not found", user.id)));
        };
        let created_at = existing.created_at;
        if t.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail(user.email));
        }
        // Check every referenced phone before touching anything.
        for id in user.phones.iter().filter_map(|p| p.id) {
            match t.phones.get(&id) {
                Some(p) if p.user_id == user.id => {}
                _ => return Err(StoreError::NotFound(format!("phone {id} not found"))),
            }
        }

        let kept: Vec<i64> = user.phones.iter().filter_map(|p| p.id).collect();
        let owner = user.id;
        t.phones
            .retain(|id, p| p.user_id != owner || kept.contains(id));

        for phone in &mut user.phones {
            phone.user_id = owner;
            let id = match phone.id {
                Some(id) => id,
                None => t.next_id(),
            };
            phone.id = Some(id);
            t.phones.insert(id, phone.clone());
        }

        user.created_at = created_at;
        let mut row = user.clone();
        row.phones.clear();
        t.users.insert(row.id, row);
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.phones.retain(|_, p| p.user_id != id);
        t.users.remove(&id);
        Ok(())
    }

    async fn find_phone(&self, id: i64) -> StoreResult<Option<Phone>> {
        Ok(self.tables.read().await.phones.get(&id).cloned())
    }

    async fn phones_of(&self, user_id: Uuid) -> StoreResult<Vec<Phone>> {
        let t = self.tables.read().await;
        Ok(t.phones
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_phone(&self, id: i64) -> StoreResult<()> {
        self.tables.write().await.phones.remove(&id);
        Ok(())
    }
}

//! In-memory store implementations.
//!
//! Used by the test suite and for local development without Postgres.
//! Expiry runs against the tokio clock so tests can drive it with a
//! paused runtime.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use super::{CredentialStore, SessionStore, StoreError, UserFilter, UserRecord};

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: RwLock<Vec<UserRecord>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a user record, simulating out-of-band deletion.
    pub async fn remove(&self, id: Uuid) {
        self.users.write().await.retain(|user| user.id != id);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_one(&self, filter: &UserFilter<'_>) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().await;
        let found = users.iter().find(|user| match filter {
            UserFilter::Email(email) => user.email == *email,
            UserFilter::Credentials {
                email,
                password_hash,
            } => user.email == *email && user.password_hash == *password_hash,
            UserFilter::Id(id) => user.id == *id,
        });
        Ok(found.cloned())
    }

    async fn insert_one(&self, email: &str, password_hash: &str) -> Result<Uuid, StoreError> {
        let mut users = self.users.write().await;
        if users.iter().any(|user| user.email == email) {
            return Err(StoreError::Conflict);
        }
        let id = Uuid::new_v4();
        users.push(UserRecord {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(id)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.users.read().await.len() as u64)
    }

    async fn is_alive(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct SessionEntry {
    user_id: Uuid,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, SessionEntry>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<Uuid>, StoreError> {
        // Lazy expiry: a dead entry is dropped on first read past its TTL.
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.user_id)),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Err(StoreError::Conflict);
            }
        }
        entries.insert(
            key.to_string(),
            SessionEntry {
                user_id,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        true
    }
}

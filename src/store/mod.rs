//! Store seams for the session core.
//!
//! The two backing services are injected into the core as trait objects:
//! a [`CredentialStore`] holding user records and a [`SessionStore`]
//! holding expiring token mappings. [`postgres`] provides the server
//! implementations; [`memory`] provides process-local ones used by the
//! test suite and local development.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCredentialStore, MemorySessionStore};
pub use postgres::{PgCredentialStore, PgSessionStore};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same unique key already exists.
    #[error("record already exists")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// A stored user record. `password_hash` never leaves the store layer in
/// serialized form and is redacted from debug output.
#[derive(Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"***")
            .finish()
    }
}

/// Exact-match filters accepted by [`CredentialStore::find_one`].
#[derive(Clone, Copy, Debug)]
pub enum UserFilter<'a> {
    Email(&'a str),
    Credentials {
        email: &'a str,
        password_hash: &'a str,
    },
    Id(Uuid),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Exact-match lookup of a single user record.
    async fn find_one(&self, filter: &UserFilter<'_>) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a new user record and return its assigned id.
    ///
    /// Returns [`StoreError::Conflict`] when the email is already taken.
    async fn insert_one(&self, email: &str, password_hash: &str) -> Result<Uuid, StoreError>;

    /// Number of stored user records.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Liveness probe; never errors.
    async fn is_alive(&self) -> bool;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Value stored under `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Uuid>, StoreError>;

    /// Store `key -> user_id`, expiring after `ttl`.
    ///
    /// Returns [`StoreError::Conflict`] when the key is already present.
    async fn set_with_expiry(
        &self,
        key: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Liveness probe; never errors.
    async fn is_alive(&self) -> bool;
}

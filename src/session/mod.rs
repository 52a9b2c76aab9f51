//! Session and account core.
//!
//! [`SessionManager`] issues, resolves and revokes opaque session tokens
//! and owns the registration and profile flows. It talks only to the
//! injected store handles; the HTTP handlers translate requests into
//! these calls and serialize the results.
//!
//! Per-token lifecycle: nonexistent, then active after [`SessionManager::authenticate`],
//! then nonexistent again after [`SessionManager::revoke_session`] or TTL
//! expiry. A token is never reactivated, and one user may hold any number
//! of concurrently active tokens.
//!
//! Store outages here intentionally read as failed lookups (unauthorized)
//! rather than distinct errors; `GET /status` is the surface that reports
//! store health.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::jobs::{JobQueue, UserJob};
use crate::store::{CredentialStore, SessionStore, StoreError, UserFilter};

pub mod error;
pub mod hash;

pub use error::AuthError;

/// Namespace prefix joined with the raw token to form the store key.
pub const SESSION_KEY_PREFIX: &str = "auth_";

const DEFAULT_SESSION_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Token key collisions are a birthday-bound improbability; the write is
/// retried a few times rather than surfaced to the caller.
const TOKEN_INSERT_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    session_ttl: Duration,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
}

#[derive(Clone, Copy, Debug)]
pub struct StoreStatus {
    pub db: bool,
    pub sessions: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Stats {
    pub users: u64,
}

pub struct SessionManager {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    jobs: Arc<dyn JobQueue>,
    config: SessionConfig,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        jobs: Arc<dyn JobQueue>,
        config: SessionConfig,
    ) -> Self {
        Self {
            credentials,
            sessions,
            jobs,
            config,
        }
    }

    /// Exchange credentials for a fresh session token.
    ///
    /// On a match the token is written to the session store under its
    /// derived key with the configured TTL; nothing is written on failure.
    #[instrument(skip_all)]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<String, AuthError> {
        if email.is_empty() || password.expose_secret().is_empty() {
            return Err(AuthError::Unauthorized);
        }

        let password_hash = hash::hash_password(password.expose_secret());
        let user = match self
            .credentials
            .find_one(&UserFilter::Credentials {
                email,
                password_hash: &password_hash,
            })
            .await
        {
            Ok(user) => user,
            Err(err) => {
                error!("credential lookup failed: {err}");
                return Err(AuthError::Unauthorized);
            }
        };

        let Some(user) = user else {
            return Err(AuthError::Unauthorized);
        };

        for _ in 0..TOKEN_INSERT_ATTEMPTS {
            let token = Uuid::new_v4().to_string();
            let key = self.store_key(&token);
            match self
                .sessions
                .set_with_expiry(&key, user.id, self.config.session_ttl())
                .await
            {
                Ok(()) => {
                    debug!(user_id = %user.id, "session token issued");
                    return Ok(token);
                }
                Err(StoreError::Conflict) => {}
                Err(err) => {
                    error!("session token write failed: {err}");
                    return Err(AuthError::Unauthorized);
                }
            }
        }

        error!("failed to issue a unique session token");
        Err(AuthError::Unauthorized)
    }

    /// Resolve a token to its owning user id.
    ///
    /// Returns `None` for an empty, unknown or expired token. This path
    /// trusts the session store and does not re-check that the user record
    /// still exists; [`SessionManager::get_profile`] does.
    pub async fn resolve_session(&self, token: &str) -> Option<Uuid> {
        if token.is_empty() {
            return None;
        }
        match self.sessions.get(&self.store_key(token)).await {
            Ok(user_id) => user_id,
            Err(err) => {
                error!("session lookup failed: {err}");
                None
            }
        }
    }

    /// Revoke a token. The second revocation of the same token fails with
    /// `Unauthorized` because the key is already gone.
    pub async fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        if self.resolve_session(token).await.is_none() {
            return Err(AuthError::Unauthorized);
        }
        match self.sessions.delete(&self.store_key(token)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!("session token delete failed: {err}");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Create a user record and submit the post-registration job.
    ///
    /// The existence check and the insert are two separate store calls; a
    /// concurrent registration racing between them is caught by the
    /// store's unique-key conflict and reported as [`AuthError::AlreadyExists`].
    #[instrument(skip_all)]
    pub async fn register(
        &self,
        email: Option<&str>,
        password: Option<&SecretString>,
    ) -> Result<RegisteredUser, AuthError> {
        let email = email
            .filter(|email| !email.is_empty())
            .ok_or(AuthError::MissingEmail)?;
        let password = password
            .filter(|password| !password.expose_secret().is_empty())
            .ok_or(AuthError::MissingPassword)?;

        if self
            .credentials
            .find_one(&UserFilter::Email(email))
            .await?
            .is_some()
        {
            return Err(AuthError::AlreadyExists);
        }

        let password_hash = hash::hash_password(password.expose_secret());
        let id = match self.credentials.insert_one(email, &password_hash).await {
            Ok(id) => id,
            Err(StoreError::Conflict) => return Err(AuthError::AlreadyExists),
            Err(err) => return Err(AuthError::Store(err)),
        };

        // Fire and forget: job submission never fails the registration.
        if let Err(err) = self.jobs.submit(UserJob { user_id: id }).await {
            error!(user_id = %id, "failed to submit post-registration job: {err}");
        }

        debug!(user_id = %id, "user registered");

        Ok(RegisteredUser {
            id,
            email: email.to_string(),
        })
    }

    /// Profile of the token's owner.
    ///
    /// Re-fetches the user record, so a token whose user was deleted
    /// out-of-band is rejected here even though it still resolves.
    pub async fn get_profile(&self, token: &str) -> Result<Profile, AuthError> {
        let Some(user_id) = self.resolve_session(token).await else {
            return Err(AuthError::Unauthorized);
        };

        let user = match self.credentials.find_one(&UserFilter::Id(user_id)).await {
            Ok(user) => user,
            Err(err) => {
                error!("user lookup failed: {err}");
                return Err(AuthError::Unauthorized);
            }
        };

        let Some(user) = user else {
            return Err(AuthError::Unauthorized);
        };

        Ok(Profile {
            id: user.id,
            email: user.email,
        })
    }

    /// Liveness of both backing stores.
    pub async fn status(&self) -> StoreStatus {
        StoreStatus {
            db: self.credentials.is_alive().await,
            sessions: self.sessions.is_alive().await,
        }
    }

    /// Record counts for the stats surface.
    pub async fn stats(&self) -> Result<Stats, AuthError> {
        let users = self.credentials.count().await?;
        Ok(Stats { users })
    }

    fn store_key(&self, token: &str) -> String {
        format!("{SESSION_KEY_PREFIX}{token}")
    }
}

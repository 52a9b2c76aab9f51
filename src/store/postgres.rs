//! Postgres-backed store implementations.
//!
//! The session-token table emulates per-key expiry: reads filter on
//! `expires_at > NOW()` and a background sweeper deletes dead rows, so a
//! key is observably gone the moment its TTL elapses even if the row still
//! exists.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use super::{CredentialStore, SessionStore, StoreError, UserFilter, UserRecord};

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_one(&self, filter: &UserFilter<'_>) -> Result<Option<UserRecord>, StoreError> {
        let row = match *filter {
            UserFilter::Email(email) => {
                let query = "SELECT id, email, password_hash FROM users WHERE email = $1 LIMIT 1";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "SELECT",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(email)
                    .fetch_optional(&self.pool)
                    .instrument(span)
                    .await
            }
            UserFilter::Credentials {
                email,
                password_hash,
            } => {
                let query = r"
                    SELECT id, email, password_hash
                    FROM users
                    WHERE email = $1 AND password_hash = $2
                    LIMIT 1
                ";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "SELECT",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(email)
                    .bind(password_hash)
                    .fetch_optional(&self.pool)
                    .instrument(span)
                    .await
            }
            UserFilter::Id(id) => {
                let query = "SELECT id, email, password_hash FROM users WHERE id = $1 LIMIT 1";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "SELECT",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .instrument(span)
                    .await
            }
        };

        let row = row.context("failed to lookup user record")?;

        Ok(row.map(|row| UserRecord {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
        }))
    }

    async fn insert_one(&self, email: &str, password_hash: &str) -> Result<Uuid, StoreError> {
        let query = "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING id";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(row.get("id")),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert user record")
                .into()),
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let query = "SELECT COUNT(*) AS count FROM users";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count user records")?;

        let count: i64 = row.get("count");
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn is_alive(&self) -> bool {
        ping(&self.pool).await
    }
}

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Spawn a background task deleting expired token rows.
    ///
    /// Reads already filter on `expires_at`, so the sweep only reclaims
    /// storage; its cadence does not affect correctness.
    pub fn spawn_expiry_sweeper(pool: PgPool, interval: Duration) {
        tokio::spawn(async move {
            loop {
                sleep(interval).await;

                let query = "DELETE FROM session_tokens WHERE expires_at <= NOW()";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "DELETE",
                    db.statement = query
                );
                if let Err(err) = sqlx::query(query).execute(&pool).instrument(span).await {
                    error!("failed to sweep expired session tokens: {err}");
                }
            }
        });
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, key: &str) -> Result<Option<Uuid>, StoreError> {
        let query = r"
            SELECT user_id
            FROM session_tokens
            WHERE store_key = $1 AND expires_at > NOW()
            LIMIT 1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session token")?;

        Ok(row.map(|row| row.get("user_id")))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl_seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let query = r"
            INSERT INTO session_tokens (store_key, user_id, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(key)
            .bind(user_id)
            .bind(ttl_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to store session token")
                .into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let query = "DELETE FROM session_tokens WHERE store_key = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session token")?;
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        ping(&self.pool).await
    }
}

async fn ping(pool: &PgPool) -> bool {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    match pool.acquire().instrument(acquire_span).await {
        Ok(mut conn) => {
            let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
            match conn.ping().instrument(ping_span).await {
                Ok(()) => true,
                Err(err) => {
                    error!("Failed to ping database: {err}");
                    false
                }
            }
        }
        Err(err) => {
            error!("Failed to acquire database connection: {err}");
            false
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}

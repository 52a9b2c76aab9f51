//! Post-registration job queue.
//!
//! Registration enqueues a row in `user_jobs` with status `pending`. A
//! background task periodically polls that table, locks a batch via
//! `FOR UPDATE SKIP LOCKED`, and hands each row to a [`JobRunner`]. The
//! worker then marks the row `done`, or reschedules it with exponential
//! backoff and jitter until the attempt budget is spent and it is marked
//! `failed`.
//!
//! Delivery is at-least-once and carries no ordering guarantee relative
//! to the registration response: the HTTP 201 can arrive before, after,
//! or without the job ever running.
//!
//! The default runner for local dev is [`LogJobRunner`], which logs and
//! returns `Ok(())`. Poll interval and retry settings are configurable
//! via [`JobQueueConfig`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// A unit of post-registration work.
#[derive(Clone, Copy, Debug)]
pub struct UserJob {
    pub user_id: Uuid,
}

/// Job execution abstraction used by the outbox worker.
pub trait JobRunner: Send + Sync {
    /// Run a job or return an error to have it retried.
    fn run(&self, job: &UserJob) -> Result<()>;
}

/// Local dev runner that logs the job instead of doing real work.
#[derive(Clone, Debug)]
pub struct LogJobRunner;

impl JobRunner for LogJobRunner {
    fn run(&self, job: &UserJob) -> Result<()> {
        info!(user_id = %job.user_id, "post-registration job stub");
        Ok(())
    }
}

/// Submission side of the queue, injected into the session core.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn submit(&self, job: UserJob) -> Result<()>;
}

#[derive(Clone, Copy, Debug)]
pub struct JobQueueConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl JobQueueConfig {
    /// Default worker config: 5s poll interval, 10 jobs per batch, 5 max
    /// attempts, and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp zero/inverted settings to workable values.
    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = if self.batch_size == 0 {
            1
        } else {
            self.batch_size
        };
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            poll_interval,
            batch_size,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Postgres-backed submission into the `user_jobs` outbox.
#[derive(Clone, Debug)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn submit(&self, job: UserJob) -> Result<()> {
        let query = "INSERT INTO user_jobs (user_id) VALUES ($1)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(job.user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to enqueue user job")?;
        Ok(())
    }
}

/// In-process queue recording submissions; used by the test suite.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    submitted: RwLock<Vec<UserJob>>,
}

impl MemoryJobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn submitted(&self) -> Vec<UserJob> {
        self.submitted.read().await.clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn submit(&self, job: UserJob) -> Result<()> {
        self.submitted.write().await.push(job);
        Ok(())
    }
}

/// Spawn the polling worker draining the `user_jobs` outbox.
pub fn spawn_worker(pool: PgPool, runner: Arc<dyn JobRunner>, config: JobQueueConfig) {
    let config = config.normalize();
    tokio::spawn(async move {
        loop {
            if let Err(err) = process_batch(&pool, runner.as_ref(), &config).await {
                error!("user job worker batch failed: {err}");
            }
            sleep(config.poll_interval).await;
        }
    });
}

async fn process_batch(
    pool: &PgPool,
    runner: &dyn JobRunner,
    config: &JobQueueConfig,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin job batch")?;

    let query = r"
        SELECT id, user_id, attempts
        FROM user_jobs
        WHERE status = 'pending' AND next_attempt_at <= NOW()
        ORDER BY created_at
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let batch_size = i64::try_from(config.batch_size).unwrap_or(i64::MAX);
    let rows = sqlx::query(query)
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lock pending job batch")?;

    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let job = UserJob {
            user_id: row.get("user_id"),
        };

        match runner.run(&job) {
            Ok(()) => {
                let query = "UPDATE user_jobs SET status = 'done' WHERE id = $1";
                sqlx::query(query)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("failed to mark job done")?;
            }
            Err(err) => {
                let attempts = u32::try_from(attempts).unwrap_or(0).saturating_add(1);
                if attempts >= config.max_attempts {
                    error!(job_id = %id, "user job failed permanently: {err}");
                    let query = "UPDATE user_jobs SET status = 'failed', attempts = $2 WHERE id = $1";
                    sqlx::query(query)
                        .bind(id)
                        .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
                        .execute(&mut *tx)
                        .await
                        .context("failed to mark job failed")?;
                } else {
                    error!(job_id = %id, "user job failed, rescheduling: {err}");
                    let delay = backoff_delay(config, attempts);
                    let query = r"
                        UPDATE user_jobs
                        SET attempts = $2, next_attempt_at = NOW() + ($3 * INTERVAL '1 second')
                        WHERE id = $1
                    ";
                    sqlx::query(query)
                        .bind(id)
                        .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
                        .bind(i64::try_from(delay.as_secs()).unwrap_or(i64::MAX))
                        .execute(&mut *tx)
                        .await
                        .context("failed to reschedule job")?;
                }
            }
        }
    }

    tx.commit().await.context("commit job batch")?;
    Ok(())
}

/// Exponential backoff capped at `backoff_max`, plus up to one second of
/// jitter to spread concurrent workers.
fn backoff_delay(config: &JobQueueConfig, attempts: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempts.saturating_sub(1).min(16));
    let delay = config.backoff_base.saturating_mul(factor);
    let capped = delay.min(config.backoff_max);
    let jitter = rand::thread_rng().gen_range(0..=1000);
    capped + Duration::from_millis(jitter)
}

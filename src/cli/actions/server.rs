use crate::{api, jobs::JobQueueConfig, session::SessionConfig};
use anyhow::{Context, Result};
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub session_ttl_seconds: u64,
    pub job_poll_seconds: u64,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the DSN is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // Fail fast on an unparseable DSN before opening the pool.
    let dsn = Url::parse(&args.dsn).context("invalid database DSN")?;
    debug!(host = ?dsn.host_str(), database = dsn.path(), "starting server");

    let session_config = SessionConfig::new().with_session_ttl_seconds(args.session_ttl_seconds);
    let job_config = JobQueueConfig::new().with_poll_interval_seconds(args.job_poll_seconds);

    api::new(args.port, args.dsn, session_config, job_config).await
}

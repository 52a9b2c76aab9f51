//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action executed by the binary.

use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(5000);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let session_ttl_seconds = matches
        .get_one::<u64>("session-ttl-seconds")
        .copied()
        .unwrap_or(86400);
    let job_poll_seconds = matches
        .get_one::<u64>("job-poll-seconds")
        .copied()
        .unwrap_or(5);

    Ok(Action::Server(Args {
        port,
        dsn,
        session_ttl_seconds,
        job_poll_seconds,
    }))
}

//! # Files Manager
//!
//! Minimal HTTP API backend for user accounts and session tokens.
//!
//! ## Surface
//!
//! - `POST /users` - register an account (`{email, password}`).
//! - `GET /connect` - exchange Basic-Auth credentials for an opaque token.
//! - `GET /disconnect` - revoke the token carried in `X-Token`.
//! - `GET /users/me` - profile of the token's owner.
//! - `GET /status`, `GET /stats` - store liveness and record counts.
//!
//! ## Stores
//!
//! The core [`session::SessionManager`] is constructed with injected store
//! handles rather than process-wide clients: a [`store::CredentialStore`]
//! holding user records and a [`store::SessionStore`] holding expiring
//! `auth_<token> -> user id` mappings. Postgres implementations back the
//! server; in-memory implementations back the test suite.
//!
//! Tokens are UUIDv4 strings with a fixed 24-hour lifetime by default.
//! There is no single-session-per-user rule: every successful `connect`
//! issues an independent token.

pub mod api;
pub mod cli;
pub mod jobs;
pub mod session;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

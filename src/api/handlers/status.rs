use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use crate::{session::SessionManager, GIT_COMMIT_HASH};

#[derive(Debug, Serialize, ToSchema)]
pub struct Status {
    db: bool,
    sessions: bool,
}

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Liveness of the credential and session stores", body = Status)
    ),
    tag = "app"
)]
// axum handler for status
pub async fn status(manager: Extension<Arc<SessionManager>>) -> impl IntoResponse {
    let status = manager.status().await;

    if status.db {
        debug!("Credential store is healthy");
    } else {
        debug!("Credential store is unhealthy");
    }
    if status.sessions {
        debug!("Session store is healthy");
    } else {
        debug!("Session store is unhealthy");
    }

    let short_hash = if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) = format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )
    .parse()
    {
        headers.insert("X-App", value);
    }

    (
        headers,
        Json(Status {
            db: status.db,
            sessions: status.sessions,
        }),
    )
}

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::ErrorBody;
use crate::session::SessionManager;

#[derive(Debug, Serialize, ToSchema)]
pub struct Stats {
    users: u64,
}

#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Record counts", body = Stats),
        (status = 500, description = "Credential store failure", body = ErrorBody)
    ),
    tag = "app"
)]
pub async fn stats(manager: Extension<Arc<SessionManager>>) -> impl IntoResponse {
    match manager.stats().await {
        Ok(stats) => (StatusCode::OK, Json(Stats { users: stats.users })).into_response(),
        Err(err) => {
            error!("Failed to read stats: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("Internal error")),
            )
                .into_response()
        }
    }
}

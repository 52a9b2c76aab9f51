use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{extract_token, unauthorized, ErrorBody};
use crate::session::SessionManager;

#[utoipa::path(
    get,
    path = "/disconnect",
    responses(
        (status = 204, description = "Session token revoked"),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn disconnect(headers: HeaderMap, manager: Extension<Arc<SessionManager>>) -> Response {
    let Some(token) = extract_token(&headers) else {
        return unauthorized();
    };

    match manager.revoke_session(&token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => unauthorized(),
    }
}

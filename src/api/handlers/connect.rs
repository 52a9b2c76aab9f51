use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{basic_credentials, unauthorized, ErrorBody};
use crate::session::SessionManager;

#[derive(Debug, Serialize, ToSchema)]
pub struct Token {
    token: String,
}

#[utoipa::path(
    get,
    path = "/connect",
    responses(
        (status = 200, description = "Credentials accepted, session token issued", body = Token),
        (status = 401, description = "Missing or invalid Basic-Auth credentials", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn connect(headers: HeaderMap, manager: Extension<Arc<SessionManager>>) -> Response {
    let Some((email, password)) = basic_credentials(&headers) else {
        return unauthorized();
    };

    match manager.authenticate(&email, &password).await {
        Ok(token) => (StatusCode::OK, Json(Token { token })).into_response(),
        Err(_) => unauthorized(),
    }
}

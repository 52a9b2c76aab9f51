use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::{extract_token, unauthorized, ErrorBody};
use crate::session::{AuthError, SessionManager};

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewUser {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct User {
    id: String,
    email: String,
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Missing field or duplicate email", body = ErrorBody),
        (status = 500, description = "Credential store failure", body = ErrorBody)
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn register(
    manager: Extension<Arc<SessionManager>>,
    payload: Option<Json<NewUser>>,
) -> Response {
    // A missing body reads as a missing email, like an empty payload.
    let Some(Json(payload)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Missing email")),
        )
            .into_response();
    };

    let password = payload.password.map(SecretString::from);

    match manager.register(payload.email.as_deref(), password.as_ref()).await {
        Ok(user) => (
            StatusCode::CREATED,
            Json(User {
                id: user.id.to_string(),
                email: user.email,
            }),
        )
            .into_response(),
        Err(
            err @ (AuthError::MissingEmail | AuthError::MissingPassword | AuthError::AlreadyExists),
        ) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new(&err.to_string())),
        )
            .into_response(),
        Err(AuthError::Unauthorized) => unauthorized(),
        Err(AuthError::Store(err)) => {
            error!("Failed to create user: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("Error creating user.")),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Profile of the token's owner", body = User),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn me(headers: HeaderMap, manager: Extension<Arc<SessionManager>>) -> Response {
    let Some(token) = extract_token(&headers) else {
        return unauthorized();
    };

    match manager.get_profile(&token).await {
        Ok(profile) => (
            StatusCode::OK,
            Json(User {
                id: profile.id.to_string(),
                email: profile.email,
            }),
        )
            .into_response(),
        Err(_) => unauthorized(),
    }
}

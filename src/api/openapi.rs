use utoipa::OpenApi;

use super::handlers;

/// OpenAPI document for the served routes.
///
/// Add new endpoints here so they show up in `/api-docs/openapi.json`;
/// the info block comes from Cargo.toml metadata.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::status::status,
        handlers::stats::stats,
        handlers::users::register,
        handlers::users::me,
        handlers::connect::connect,
        handlers::disconnect::disconnect,
    ),
    components(schemas(
        handlers::status::Status,
        handlers::stats::Stats,
        handlers::users::NewUser,
        handlers::users::User,
        handlers::connect::Token,
        handlers::ErrorBody,
    )),
    tags(
        (name = "app", description = "Service health and statistics"),
        (name = "users", description = "Account registration and profile"),
        (name = "auth", description = "Session token issue and revocation")
    )
)]
pub struct ApiDoc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;

use crate::{
    jobs::{self, JobQueueConfig, LogJobRunner, PgJobQueue},
    session::{SessionConfig, SessionManager},
    store::{PgCredentialStore, PgSessionStore},
};

pub(crate) mod handlers;
mod openapi;

pub use openapi::ApiDoc;

/// Cadence of the background sweep deleting expired session-token rows.
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the application router around an injected session core.
///
/// Kept separate from [`new`] so the test suite can drive the same routes
/// against in-memory stores.
#[must_use]
pub fn app(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/status", get(handlers::status::status))
        .route("/stats", get(handlers::stats::stats))
        .route("/users", post(handlers::users::register))
        .route("/users/me", get(handlers::users::me))
        .route("/connect", get(handlers::connect::connect))
        .route("/disconnect", get(handlers::disconnect::disconnect))
        .route(
            "/api-docs/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(manager)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    session_config: SessionConfig,
    job_config: JobQueueConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(Duration::from_secs(5))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
    let sessions = Arc::new(PgSessionStore::new(pool.clone()));
    let job_queue = Arc::new(PgJobQueue::new(pool.clone()));

    // Background workers: job outbox drain and expired-token sweep.
    jobs::spawn_worker(pool.clone(), Arc::new(LogJobRunner), job_config);
    PgSessionStore::spawn_expiry_sweeper(pool, EXPIRY_SWEEP_INTERVAL);

    let manager = Arc::new(SessionManager::new(
        credentials,
        sessions,
        job_queue,
        session_config,
    ));

    let app = app(manager);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

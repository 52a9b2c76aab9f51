//! End-to-end API tests.
//!
//! Drive the full router against the in-memory stores, covering the
//! documented request/response contract of every endpoint.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use files_manager::{
    api,
    jobs::MemoryJobQueue,
    session::{SessionConfig, SessionManager},
    store::{MemoryCredentialStore, MemorySessionStore},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// base64("bob@dylan.com:toto1234!")
const BOB_BASIC: &str = "Ym9iQGR5bGFuLmNvbTp0b3RvMTIzNCE=";
// base64("bob@dylan.com:wrongpass")
const BOB_BASIC_WRONG: &str = "Ym9iQGR5bGFuLmNvbTp3cm9uZ3Bhc3M=";
// base64("joan@baez.com:diamonds")
const JOAN_BASIC: &str = "am9hbkBiYWV6LmNvbTpkaWFtb25kcw==";

fn test_app() -> (Router, Arc<MemoryJobQueue>) {
    let credentials = Arc::new(MemoryCredentialStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let jobs = Arc::new(MemoryJobQueue::new());
    let manager = Arc::new(SessionManager::new(
        credentials,
        sessions,
        jobs.clone(),
        SessionConfig::new(),
    ));
    (api::app(manager), jobs)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn register_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn connect_request(credentials_b64: &str) -> Request<Body> {
    Request::builder()
        .uri("/connect")
        .header(header::AUTHORIZATION, format!("Basic {credentials_b64}"))
        .body(Body::empty())
        .unwrap()
}

fn token_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-Token", token)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn register_connect_me_disconnect_flow() {
    let (app, jobs) = test_app();

    // Register bob.
    let (status, body) = send(
        &app,
        register_request(&json!({"email": "bob@dylan.com", "password": "toto1234!"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "bob@dylan.com");
    let id = body["id"].as_str().unwrap();
    assert!(!id.is_empty());

    // Registration submitted exactly one post-registration job for bob.
    let submitted = jobs.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].user_id.to_string(), id);

    // Authenticate with the same credentials.
    let (status, body) = send(&app, connect_request(BOB_BASIC)).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    assert!(!token.is_empty());

    // Profile of the token's owner.
    let (status, body) = send(&app, token_request("/users/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["email"], "bob@dylan.com");

    // Revoke the token.
    let (status, body) = send(&app, token_request("/disconnect", &token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    // The revoked token no longer grants access.
    let (status, body) = send(&app, token_request("/users/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn profile_never_leaks_password_fields() {
    let (app, _jobs) = test_app();

    let (status, body) = send(
        &app,
        register_request(&json!({"email": "bob@dylan.com", "password": "toto1234!"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created = body.as_object().unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.contains_key("id"));
    assert!(created.contains_key("email"));

    let (_, body) = send(&app, connect_request(BOB_BASIC)).await;
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, token_request("/users/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let profile = body.as_object().unwrap();
    assert!(!profile.contains_key("password"));
    assert!(!profile.contains_key("password_hash"));
    assert_eq!(profile.len(), 2);
}

#[tokio::test]
async fn register_validates_required_fields() {
    let (app, _jobs) = test_app();

    let (status, body) = send(&app, register_request(&json!({"password": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing email");

    let (status, body) = send(&app, register_request(&json!({"email": "a@b.com"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing password");

    // Empty strings read as absent.
    let (status, body) = send(
        &app,
        register_request(&json!({"email": "", "password": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing email");

    // A missing body reads as a missing email.
    let request = Request::builder()
        .method("POST")
        .uri("/users")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing email");
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let (app, _jobs) = test_app();

    let payload = json!({"email": "bob@dylan.com", "password": "toto1234!"});
    let (status, _) = send(&app, register_request(&payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, register_request(&payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Already exist");
}

#[tokio::test]
async fn connect_rejects_bad_credentials() {
    let (app, _jobs) = test_app();

    let (status, _) = send(
        &app,
        register_request(&json!({"email": "bob@dylan.com", "password": "toto1234!"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Wrong password.
    let (status, body) = send(&app, connect_request(BOB_BASIC_WRONG)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    // Unknown user.
    let (status, body) = send(&app, connect_request(JOAN_BASIC)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    // Missing header.
    let (status, body) = send(&app, get("/connect")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    // Garbage credentials.
    let (status, body) = send(&app, connect_request("!!!not-base64!!!")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn concurrent_logins_are_independent() {
    let (app, _jobs) = test_app();

    let (status, _) = send(
        &app,
        register_request(&json!({"email": "bob@dylan.com", "password": "toto1234!"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, connect_request(BOB_BASIC)).await;
    let first = body["token"].as_str().unwrap().to_string();
    let (_, body) = send(&app, connect_request(BOB_BASIC)).await;
    let second = body["token"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    // Revoking the first token leaves the second active.
    let (status, _) = send(&app, token_request("/disconnect", &first)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, token_request("/users/me", &first)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, token_request("/users/me", &second)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn disconnect_twice_is_unauthorized() {
    let (app, _jobs) = test_app();

    let (status, _) = send(
        &app,
        register_request(&json!({"email": "bob@dylan.com", "password": "toto1234!"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = send(&app, connect_request(BOB_BASIC)).await;
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _) = send(&app, token_request("/disconnect", &token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, token_request("/disconnect", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    // Missing token header is also unauthorized.
    let (status, _) = send(&app, get("/disconnect")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_reports_store_liveness() {
    let (app, _jobs) = test_app();

    let response = app.clone().oneshot(get("/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let x_app = response.headers().get("X-App").cloned();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body, json!({"db": true, "sessions": true}));
    let x_app = x_app.unwrap();
    assert!(x_app.to_str().unwrap().starts_with("files-manager:"));
}

#[tokio::test]
async fn stats_track_successful_registrations() {
    let (app, _jobs) = test_app();

    let (status, body) = send(&app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"users": 0}));

    let (status, _) = send(
        &app,
        register_request(&json!({"email": "bob@dylan.com", "password": "toto1234!"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(
        &app,
        register_request(&json!({"email": "joan@baez.com", "password": "diamonds"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // A failed registration does not change the count.
    let (status, _) = send(
        &app,
        register_request(&json!({"email": "bob@dylan.com", "password": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/stats")).await;
    assert_eq!(body, json!({"users": 2}));
}

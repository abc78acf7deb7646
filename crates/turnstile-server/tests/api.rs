//! HTTP-level tests of the demo routes.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use turnstile_auth::{Gatekeeper, GatekeeperConfig, MemoryCache};
use turnstile_server::articles::ArticleStore;
use turnstile_server::config::UserConfig;
use turnstile_server::users::UserDirectory;
use turnstile_server::{AppState, build_app};

const SECRET: &str = "server-test-secret-0123456789abcdef";

fn user(id: u64, username: &str, role: &str) -> UserConfig {
    UserConfig {
        id,
        username: username.into(),
        password: format!("{username}-password"),
        email: String::new(),
        role: role.into(),
    }
}

fn app() -> Router {
    let articles = ArticleStore::new();
    let gatekeeper = Gatekeeper::builder(
        GatekeeperConfig::with_secret(SECRET),
        Arc::new(MemoryCache::new()),
    )
    .ownership("article", Arc::new(articles.clone()))
    .build()
    .unwrap();

    let users = UserDirectory::from_config(&[
        user(1, "root", "admin"),
        user(7, "alice", "user"),
        user(8, "bob", "user"),
    ])
    .unwrap();

    build_app(
        AppState {
            gatekeeper,
            users: Arc::new(users),
            articles,
        },
        1024 * 1024,
    )
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, username: &str) -> String {
    let response = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": username, "password": format!("{username}-password") })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["token_type"], "Bearer");
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_unguarded() {
    let app = app();
    let response = send(&app, "GET", "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("x-ratelimit-limit"));
}

#[tokio::test]
async fn login_me_logout() {
    let app = app();
    let token = login(&app, "alice").await;

    let response = send(&app, "GET", "/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], 7);
    assert_eq!(body["role"], "user");

    let response = send(&app, "POST", "/auth/logout", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, "GET", "/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["message"], "Token has been revoked");
}

#[tokio::test]
async fn login_rejects_bad_password() {
    let app = app();
    let response = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "nope" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    assert_eq!(json_body(response).await["error"], "invalid_credentials");
}

#[tokio::test]
async fn fresh_token_cannot_be_refreshed() {
    let app = app();
    let token = login(&app, "alice").await;

    let response = send(&app, "POST", "/auth/refresh", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_the_author_or_an_admin_deletes() {
    let app = app();
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;
    let root = login(&app, "root").await;

    let mut ids = Vec::new();
    for title in ["first", "second"] {
        let response = send(&app, "POST", "/articles", Some(&alice), Some(json!({ "title": title }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        ids.push(json_body(response).await["id"].as_u64().unwrap());
    }

    let response = send(&app, "GET", "/articles", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["articles"].as_array().unwrap().len(), 2);
    assert_eq!(body["viewer"], Value::Null);

    let first = format!("/articles/{}", ids[0]);
    let second = format!("/articles/{}", ids[1]);

    let response = send(&app, "DELETE", &first, Some(&bob), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, "DELETE", &first, Some(&alice), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, "DELETE", &second, Some(&root), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, "GET", &second, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_cannot_create_articles() {
    let app = app();
    let response = send(&app, "POST", "/articles", None, Some(json!({ "title": "x" }))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_then_login() {
    let app = app();
    let response = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "username": "carol", "password": "carol-password" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["role"], "user");
    assert_eq!(body["id"], 9);

    let token = login(&app, "carol").await;
    let response = send(&app, "GET", "/auth/me", Some(&token), None).await;
    assert_eq!(json_body(response).await["username"], "carol");

    let response = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "username": "carol", "password": "carol-password" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_needs_permission() {
    let app = app();
    let token = login(&app, "alice").await;

    let response = send(&app, "POST", "/files", Some(&token), Some(json!({ "blob": "abc" }))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["owner"], 7);
}

#[tokio::test]
async fn admin_inspects_and_clears_rate_limits() {
    let app = app();
    let alice = login(&app, "alice").await;
    let root = login(&app, "root").await;

    // Without ConnectInfo or trusted headers the IP key is "ip:unknown".
    let status_uri = "/admin/rate-limits/login/ip:unknown";

    let response = send(&app, "GET", status_uri, Some(&alice), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, "GET", status_uri, Some(&root), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["used"], 2);
    assert_eq!(body["limit"], 5);

    let response = send(&app, "DELETE", status_uri, Some(&root), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["cleared"], true);

    let response = send(&app, "GET", status_uri, Some(&root), None).await;
    assert_eq!(json_body(response).await["used"], 0);

    let response = send(&app, "DELETE", "/admin/permissions/7", Some(&root), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, "GET", "/admin/rate-limits/bogus/ip:unknown", Some(&root), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

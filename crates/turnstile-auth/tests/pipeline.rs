//! End-to-end tests of the middleware stacks assembled by the gatekeeper.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceExt;

use turnstile_auth::config::PolicyConfig;
use turnstile_auth::permission::resolver::owner_key;
use turnstile_auth::{
    Cache, CurrentIdentity, Gatekeeper, GatekeeperConfig, MaybeIdentity, MemoryCache, Principal,
    RouteClass,
};

const SECRET: &str = "integration-secret-0123456789abcdef";

struct Harness {
    gatekeeper: Arc<Gatekeeper>,
    cache: MemoryCache,
    app: Router,
}

fn harness(configure: impl FnOnce(&mut GatekeeperConfig)) -> Harness {
    let mut config = GatekeeperConfig::with_secret(SECRET);
    config.rate_limit.trust_forwarded_headers = true;
    configure(&mut config);

    let cache = MemoryCache::new();
    // Mid-window so a test never straddles a boundary.
    let now = Arc::new(AtomicI64::new(1_700_000_010));
    let clock_now = now.clone();
    let gatekeeper = Gatekeeper::builder(config, Arc::new(cache.clone()))
        .clock(Arc::new(move || clock_now.load(Ordering::SeqCst)))
        .build()
        .unwrap();

    let public = Router::new().route(
        "/feed",
        get(|MaybeIdentity(identity): MaybeIdentity| async move {
            Json(json!({ "user": identity.map(|i| i.principal.username) }))
        }),
    );

    let protected = Router::new().route(
        "/me",
        get(|CurrentIdentity(identity): CurrentIdentity| async move {
            Json(json!({ "id": identity.id(), "role": identity.role() }))
        }),
    );

    let articles = Router::new().route("/articles/{id}", delete(|| async { StatusCode::NO_CONTENT }));
    let articles = gatekeeper.require_permission(
        articles,
        "article:delete:own".parse().unwrap(),
        Some("id"),
    );

    let admin = Router::new().route("/admin/stats", get(|| async { "stats" }));
    let login = Router::new().route("/login", post(|| async { "token" }));
    let upload = Router::new().route("/upload", post(|| async { StatusCode::CREATED }));

    let app = Router::new()
        .merge(gatekeeper.apply(public, RouteClass::Public))
        .merge(gatekeeper.apply(protected, RouteClass::Protected))
        .merge(gatekeeper.apply(articles, RouteClass::Protected))
        .merge(gatekeeper.apply(admin, RouteClass::Admin))
        .merge(gatekeeper.apply(login, RouteClass::Login))
        .merge(gatekeeper.apply(upload, RouteClass::Upload));

    Harness {
        gatekeeper,
        cache,
        app,
    }
}

fn token_for(gatekeeper: &Gatekeeper, id: u64, role: &str) -> String {
    let principal = Principal::new(id, format!("user{id}"), format!("user{id}@example.com"), role);
    gatekeeper.issue_token(&principal).unwrap().token
}

fn request(method: &str, uri: &str, token: Option<&str>) -> Request {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "198.51.100.20");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn protected_route_allows_five_then_limits() {
    let h = harness(|config| {
        config.rate_limit.user = PolicyConfig::new(5, Duration::from_secs(60));
    });
    let token = token_for(&h.gatekeeper, 7, "user");

    for remaining in (0..5).rev() {
        let response = send(&h.app, request("GET", "/me", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            remaining.to_string().as_str()
        );
    }

    let response = send(&h.app, request("GET", "/me", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let body = json_body(response).await;
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert!(body["retry_after"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn protected_route_requires_token() {
    let h = harness(|_| {});

    let response = send(&h.app, request("GET", "/me", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");

    let response = send(&h.app, request("GET", "/me", Some("not.a.token"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "invalid_token");
}

#[tokio::test]
async fn revoked_token_is_rejected() {
    let h = harness(|_| {});
    let token = token_for(&h.gatekeeper, 7, "user");

    let response = send(&h.app, request("GET", "/me", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], 7);

    h.gatekeeper.revoke_token(&token).await.unwrap();

    let response = send(&h.app, request("GET", "/me", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Token has been revoked");
}

#[tokio::test]
async fn ownership_decides_article_delete() {
    let h = harness(|_| {});
    h.cache
        .set(&owner_key("article", "42"), "7", None)
        .await
        .unwrap();

    let owner = token_for(&h.gatekeeper, 7, "user");
    let stranger = token_for(&h.gatekeeper, 8, "user");
    let admin = token_for(&h.gatekeeper, 1, "admin");

    let response = send(&h.app, request("DELETE", "/articles/42", Some(&owner))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&h.app, request("DELETE", "/articles/42", Some(&stranger))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "forbidden");

    let response = send(&h.app, request("DELETE", "/articles/42", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // unknown article, nothing cached and no lookup registered
    let response = send(&h.app, request("DELETE", "/articles/43", Some(&owner))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn public_route_attaches_identity_when_present() {
    let h = harness(|_| {});
    let token = token_for(&h.gatekeeper, 7, "user");

    let response = send(&h.app, request("GET", "/feed", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user"], Value::Null);

    let response = send(&h.app, request("GET", "/feed", Some(&token))).await;
    assert_eq!(json_body(response).await["user"], "user7");

    let response = send(&h.app, request("GET", "/feed", Some("garbage"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user"], Value::Null);
}

#[tokio::test]
async fn token_in_query_and_cookie() {
    let h = harness(|_| {});
    let token = token_for(&h.gatekeeper, 7, "user");

    let response = send(&h.app, request("GET", &format!("/me?token={token}"), None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let req = Request::builder()
        .uri("/me")
        .header(header::COOKIE, format!("theme=dark; access_token={token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&h.app, req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let h = harness(|config| {
        config.rate_limit.admin = PolicyConfig::new(1, Duration::from_secs(60));
    });

    let user = token_for(&h.gatekeeper, 7, "user");
    let response = send(&h.app, request("GET", "/admin/stats", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = token_for(&h.gatekeeper, 1, "admin");
    assert_eq!(
        send(&h.app, request("GET", "/admin/stats", Some(&admin))).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        send(&h.app, request("GET", "/admin/stats", Some(&admin))).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    // exempt from the admin policy
    let root = token_for(&h.gatekeeper, 2, "super_admin");
    for _ in 0..3 {
        let response = send(&h.app, request("GET", "/admin/stats", Some(&root))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn login_is_strictly_limited_and_uncacheable() {
    let h = harness(|config| {
        config.rate_limit.login = PolicyConfig::new(2, Duration::from_secs(900));
    });

    for _ in 0..2 {
        let response = send(&h.app, request("POST", "/login", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");
        assert_eq!(response.headers()[header::EXPIRES], "0");
    }

    let response = send(&h.app, request("POST", "/login", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let status = h
        .gatekeeper
        .rate_limit_status(turnstile_auth::PolicyKind::Login, "ip:198.51.100.20")
        .await
        .unwrap();
    assert_eq!(status.used, 2);

    h.gatekeeper
        .clear_rate_limit(turnstile_auth::PolicyKind::Login, "ip:198.51.100.20")
        .await
        .unwrap();
    let response = send(&h.app, request("POST", "/login", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_requires_auth() {
    let h = harness(|_| {});

    let response = send(&h.app, request("POST", "/upload", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = token_for(&h.gatekeeper, 7, "user");
    let response = send(&h.app, request("POST", "/upload", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "no-store, no-cache, must-revalidate"
    );
}

#[tokio::test]
async fn ip_filter_precedes_every_class() {
    let h = harness(|config| {
        config.ip_filter.deny = vec!["198.51.100.0/24".to_string()];
    });

    let response = send(&h.app, request("GET", "/feed", None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let token = token_for(&h.gatekeeper, 7, "user");
    let response = send(&h.app, request("GET", "/me", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn refresh_rotates_tokens_near_expiry() {
    let h = harness(|_| {});
    let principal = Principal::new(7, "user7", "user7@example.com", "user");

    let long_lived = h.gatekeeper.issue_token(&principal).unwrap();
    assert!(h.gatekeeper.refresh_token(&long_lived.token).await.is_err());

    let short_lived = h
        .gatekeeper
        .codec()
        .issue(&principal, Duration::from_secs(600))
        .unwrap();
    let fresh = h.gatekeeper.refresh_token(&short_lived.token).await.unwrap();

    let response = send(&h.app, request("GET", "/me", Some(&short_lived.token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&h.app, request("GET", "/me", Some(&fresh.token))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

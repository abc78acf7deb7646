//! Rate limit stage.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};

use super::headers::insert_rate_limit_headers;
use crate::error::AuthError;
use crate::rate_limit::{KeyFn, RateLimitPolicy, RateLimiter, SkipFn};

/// One policy bound to a key function.
///
/// Built by the gatekeeper for the named policies; build one directly to
/// layer a custom policy with an arbitrary key function.
///
/// ```ignore
/// let guard = RateLimitGuard::new(
///     gatekeeper.limiter().clone(),
///     RateLimitPolicy::new("search", 20, Duration::from_secs(10)),
///     |req: &Request| format!("tenant:{}", tenant_of(req)),
/// );
/// let router = guard.apply(router);
/// ```
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: RateLimiter,
    policy: Arc<RateLimitPolicy>,
    key: Arc<dyn KeyFn>,
    skip: Option<SkipFn>,
}

impl RateLimitGuard {
    /// Binds `policy` to `key`.
    pub fn new(limiter: RateLimiter, policy: RateLimitPolicy, key: impl KeyFn + 'static) -> Self {
        Self {
            limiter,
            policy: Arc::new(policy),
            key: Arc::new(key),
            skip: None,
        }
    }

    /// Requests for which `skip` returns `true` bypass the policy.
    #[must_use]
    pub fn skip_if(mut self, skip: SkipFn) -> Self {
        self.skip = Some(skip);
        self
    }

    /// The bound policy.
    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Layers this guard onto `router`.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(from_fn_with_state(self, rate_limit))
    }
}

/// Spends one request of the caller's budget; 429 once it is exhausted.
///
/// Allowed responses carry `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
/// `X-RateLimit-Reset`. Cache failures let the request through.
pub async fn rate_limit(State(guard): State<RateLimitGuard>, req: Request, next: Next) -> Response {
    if guard.skip.as_ref().is_some_and(|skip| skip(&req)) {
        return next.run(req).await;
    }

    let key = guard.key.key(&req);
    let decision = guard.limiter.allow(&guard.policy, &key).await;

    if !decision.allowed {
        tracing::info!(
            policy = %guard.policy.name,
            key = %key,
            retry_after = decision.retry_after,
            "Rate limit exceeded"
        );
        return AuthError::RateLimitExceeded {
            retry_after: decision.retry_after,
            limit: decision.limit,
            reset_at: decision.reset_at,
        }
        .into_response();
    }

    let mut response = next.run(req).await;
    insert_rate_limit_headers(
        response.headers_mut(),
        decision.limit,
        decision.remaining,
        decision.reset_at,
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::rate_limit::{IpKey, skip_roles};
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(guard: RateLimitGuard) -> Router {
        guard.apply(Router::new().route("/", get(|| async { "ok" })))
    }

    fn get_root() -> Request {
        Request::builder()
            .uri("/")
            .header("x-forwarded-for", "198.51.100.4")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_headers_and_denial() {
        let limiter = RateLimiter::new(Arc::new(MemoryCache::new()));
        let guard = RateLimitGuard::new(
            limiter,
            RateLimitPolicy::new("ip", 2, Duration::from_secs(60)),
            IpKey {
                trust_forwarded: true,
            },
        );
        let app = app(guard);

        let first = app.clone().oneshot(get_root()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-limit"], "2");
        assert_eq!(first.headers()["x-ratelimit-remaining"], "1");
        assert!(first.headers().contains_key("x-ratelimit-reset"));

        let second = app.clone().oneshot(get_root()).await.unwrap();
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

        let third = app.oneshot(get_root()).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(third.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_closure_key_and_skip() {
        let limiter = RateLimiter::new(Arc::new(MemoryCache::new()));
        let guard = RateLimitGuard::new(
            limiter,
            RateLimitPolicy::new("custom", 1, Duration::from_secs(60)),
            |_: &Request| "everyone".to_string(),
        )
        .skip_if(skip_roles(vec!["super_admin".to_string()]));
        let app = app(guard);

        assert_eq!(
            app.clone().oneshot(get_root()).await.unwrap().status(),
            StatusCode::OK
        );
        assert_eq!(
            app.oneshot(get_root()).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}

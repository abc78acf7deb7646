//! Client IP allow/deny stage.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AuthError;
use crate::rate_limit::{IpFilter, IpVerdict, client_ip};

/// State of the IP filter stage.
#[derive(Debug, Clone)]
pub struct IpFilterGuard {
    /// Parsed lists.
    pub filter: Arc<IpFilter>,
    /// Honour `X-Forwarded-For` / `X-Real-IP`.
    pub trust_forwarded: bool,
}

/// Rejects denied or unlisted client addresses with 403.
pub async fn ip_filter(
    State(guard): State<IpFilterGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ip = client_ip(req.headers(), req.extensions(), guard.trust_forwarded);

    match guard.filter.check(ip) {
        IpVerdict::Allowed => Ok(next.run(req).await),
        verdict => {
            tracing::info!(ip = ?ip, verdict = ?verdict, "Client address rejected");
            Err(AuthError::forbidden("Client address not permitted"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IpFilterConfig;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use tower::ServiceExt;

    fn from(ip: &str) -> Request {
        Request::builder()
            .uri("/")
            .header("x-real-ip", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_denied_address_gets_403() {
        let filter = IpFilter::from_config(&IpFilterConfig {
            allow: vec![],
            deny: vec!["203.0.113.0/24".to_string()],
        })
        .unwrap();
        let guard = IpFilterGuard {
            filter: Arc::new(filter),
            trust_forwarded: true,
        };
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(guard, ip_filter));

        let denied = app.clone().oneshot(from("203.0.113.9")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = app.oneshot(from("198.51.100.1")).await.unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}

//! Error response handling for the pipeline stages.
//!
//! Every failure renders as a JSON envelope:
//!
//! ```json
//! { "error": "rate_limit_exceeded", "message": "Rate limit exceeded, retry in 12s", "retry_after": 12 }
//! ```
//!
//! `retry_after` is only present on 429 responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::headers::insert_rate_limit_headers;
use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if self.is_server_error() {
            tracing::error!(error = %self, "Request failed with server error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = match &self {
            Self::RateLimitExceeded { retry_after, .. } => json!({
                "error": self.code(),
                "message": message,
                "retry_after": retry_after,
            }),
            _ => json!({
                "error": self.code(),
                "message": message,
            }),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        match &self {
            Self::RateLimitExceeded {
                retry_after,
                limit,
                reset_at,
            } => {
                insert_rate_limit_headers(headers, *limit, 0, *reset_at);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            }
            _ if status == StatusCode::UNAUTHORIZED => {
                let challenge = format!("Bearer error=\"{}\"", self.code());
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    headers.insert(header::WWW_AUTHENTICATE, value);
                }
            }
            _ => {}
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_revoked_envelope() {
        let response = AuthError::TokenRevoked.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Bearer error=\"token_revoked\""
        );

        let body = body_json(response).await;
        assert_eq!(body["error"], "token_revoked");
        assert_eq!(body["message"], "Token has been revoked");
        assert!(body.get("retry_after").is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_envelope() {
        let response = AuthError::RateLimitExceeded {
            retry_after: 12,
            limit: 5,
            reset_at: 1_700_000_060,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");

        let body = body_json(response).await;
        assert_eq!(body["error"], "rate_limit_exceeded");
        assert_eq!(body["retry_after"], 12);
    }

    #[tokio::test]
    async fn test_server_error_hides_details() {
        let response = AuthError::cache("redis://secret-host refused").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_forbidden_envelope() {
        let body = body_json(AuthError::forbidden("Missing permission user:ban").into_response()).await;
        assert_eq!(body["error"], "forbidden");
        assert_eq!(body["message"], "Forbidden: Missing permission user:ban");
    }
}

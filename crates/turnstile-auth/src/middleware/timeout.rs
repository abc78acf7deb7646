//! Request deadline stage.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AuthError;

/// Answers 408 if the rest of the pipeline does not finish within `deadline`.
///
/// The downstream work runs on its own task. When the deadline fires first
/// that task is detached rather than aborted and keeps running to
/// completion, so slow handlers still hold their resources until they
/// finish.
pub async fn request_timeout(
    State(deadline): State<Duration>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let path = req.uri().path().to_string();
    let handle = tokio::spawn(next.run(req));

    tokio::select! {
        joined = handle => joined.map_err(|e| {
            tracing::error!(path = %path, error = %e, "Request task failed");
            AuthError::internal("request task failed")
        }),
        () = tokio::time::sleep(deadline) => {
            tracing::warn!(
                path = %path,
                timeout_ms = deadline.as_millis() as u64,
                "Request timed out"
            );
            Err(AuthError::RequestTimeout)
        }
    }
}

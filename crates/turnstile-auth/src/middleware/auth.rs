//! Authentication and role stages.
//!
//! Both authentication stages insert the verified [`Identity`] into request
//! extensions; downstream stages and handlers read it from there.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AuthError;
use crate::gatekeeper::Gatekeeper;
use crate::token::extract_token;
use crate::types::Identity;

/// Attaches the identity when a valid, unrevoked token is present.
///
/// Never rejects; a bad token is treated as no token.
pub async fn optional_auth(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(req.headers(), req.uri()) {
        match gatekeeper.authenticate_token(&token).await {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid token on public route");
            }
        }
    }
    next.run(req).await
}

/// Rejects the request with 401 unless it carries a valid, unrevoked token.
pub async fn require_auth(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_token(req.headers(), req.uri()).ok_or(AuthError::MissingToken)?;

    let identity = gatekeeper.authenticate_token(&token).await.inspect_err(|e| {
        tracing::debug!(
            error = %e,
            path = %req.uri().path(),
            "Authentication failed"
        );
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Rejects with 403 unless the authenticated principal holds `role`.
///
/// Admins pass every role check. Must run after an authentication stage.
pub async fn require_role(
    State(role): State<Arc<str>>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or(AuthError::MissingToken)?;

    if !identity.is_admin() && !identity.principal.has_role(&role) {
        tracing::debug!(
            user_id = identity.id(),
            role = %identity.role(),
            required = %role,
            "Role check failed"
        );
        return Err(AuthError::forbidden(format!("Role '{role}' required")));
    }

    Ok(next.run(req).await)
}

//! Permission stage.
//!
//! Must be layered with `route_layer` so that path parameters are available
//! when it runs, and after an authentication stage.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AuthError;
use crate::gatekeeper::Gatekeeper;
use crate::permission::Permission;
use crate::types::Identity;

/// State of the permission stage.
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    /// Shared pipeline.
    pub gatekeeper: Arc<Gatekeeper>,
    /// Permission the route requires.
    pub permission: Arc<Permission>,
    /// Path parameter holding the resource id, for `own`-scoped checks.
    pub id_param: Option<Arc<str>>,
}

/// Rejects with 403 unless the caller holds the required permission
/// (and owns the addressed resource when the permission is `own`-scoped).
pub async fn require_permission(
    State(guard): State<PermissionGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = req.into_parts();

    let identity = parts
        .extensions
        .get::<Identity>()
        .cloned()
        .ok_or(AuthError::MissingToken)?;

    let resource_id = match guard.id_param.as_deref() {
        Some(name) => Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .ok()
            .and_then(|Path(mut params)| params.remove(name)),
        None => None,
    };

    guard
        .gatekeeper
        .check_permission(&identity, &guard.permission, resource_id.as_deref())
        .await?;

    Ok(next.run(Request::from_parts(parts, body)).await)
}

//! Axum middleware stages and extractors.
//!
//! Stages are plain `from_fn` middleware functions. [`Gatekeeper`] composes
//! them per route class, but each can be layered on its own:
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn_with_state, routing::get};
//! use turnstile_auth::middleware::{CurrentIdentity, require_auth};
//!
//! async fn me(CurrentIdentity(identity): CurrentIdentity) -> String {
//!     identity.principal.username
//! }
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .layer(from_fn_with_state(gatekeeper.clone(), require_auth));
//! ```
//!
//! [`Gatekeeper`]: crate::Gatekeeper

pub mod auth;
pub mod error;
pub mod headers;
pub mod identity;
pub mod ip_filter;
pub mod permission;
pub mod rate_limit;
pub mod timeout;

pub use auth::{optional_auth, require_auth, require_role};
pub use headers::no_cache;
pub use identity::{CurrentIdentity, MaybeIdentity};
pub use ip_filter::{IpFilterGuard, ip_filter};
pub use permission::{PermissionGuard, require_permission};
pub use rate_limit::{RateLimitGuard, rate_limit};
pub use timeout::request_timeout;

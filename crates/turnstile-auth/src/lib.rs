//! # turnstile-auth
//!
//! Request authorization and throttling pipeline for axum services.
//!
//! This crate provides:
//! - Signed bearer token issuance and verification
//! - A cache-backed revocation blacklist with refresh support
//! - Role, wildcard and ownership-scoped permission resolution
//! - Fixed-window rate limiting over a shared TTL cache
//! - A [`Gatekeeper`] that assembles ordered middleware stacks per route class
//!
//! ## Overview
//!
//! Every cache-backed component talks to the [`Cache`] trait. The crate ships
//! an in-process [`MemoryCache`]; the `turnstile-auth-redis` crate provides a
//! shared Redis backend for horizontally scaled deployments.
//!
//! ## Modules
//!
//! - [`config`] - Pipeline configuration
//! - [`cache`] - Cache contract and in-memory backend
//! - [`token`] - Token codec and request extraction
//! - [`revocation`] - Revocation blacklist and refresh
//! - [`permission`] - Permission model and resolver
//! - [`rate_limit`] - Fixed-window limiter, key functions and policies
//! - [`middleware`] - Axum middleware stages and extractors
//! - [`gatekeeper`] - Stack orchestration and facade

pub mod cache;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod middleware;
pub mod permission;
pub mod rate_limit;
pub mod revocation;
pub mod token;
pub mod types;

pub use cache::{Cache, CacheError, CacheResult, MemoryCache};
pub use config::{ConfigError, GatekeeperConfig};
pub use error::AuthError;
pub use gatekeeper::{Gatekeeper, GatekeeperBuilder, RouteClass, Stage};
pub use middleware::{CurrentIdentity, MaybeIdentity};
pub use permission::{
    OwnershipLookup, Permission, PermissionResolver, PermissionSource, Scope, StaticOwnership,
};
pub use rate_limit::{PolicyKind, RateDecision, RateLimitPolicy, RateLimiter, RateStatus};
pub use revocation::RevocationStore;
pub use token::{IssuedToken, TokenClaims, TokenCodec, TokenError};
pub use types::{Identity, Principal};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

//! # turnstile-auth-redis
//!
//! Redis backend for the `turnstile-auth` [`Cache`](turnstile_auth::Cache)
//! contract.
//!
//! Use it when several instances must share revocations, permission caches
//! and rate limit counters. Every operation maps to a single native Redis
//! command, so `incr` is atomic across instances.
//!
//! ## Usage
//!
//! ```ignore
//! use turnstile_auth_redis::{RedisConfig, connect};
//!
//! let cache = connect(&RedisConfig {
//!     enabled: true,
//!     url: "redis://localhost:6379".into(),
//!     ..Default::default()
//! })
//! .await?;
//! ```

mod cache;
mod config;

pub use cache::{RedisCache, connect};
pub use config::RedisConfig;

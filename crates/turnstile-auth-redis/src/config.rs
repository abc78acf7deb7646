use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where and how to reach Redis.
///
/// Every field has a default, so `[redis]` with only `enabled = true`
/// connects to a local server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Back the gatekeeper with Redis instead of the in-process cache.
    pub enabled: bool,
    pub url: String,
    /// Upper bound on pooled connections.
    pub pool_size: usize,
    /// Applied to waiting for, creating and recycling a pooled connection.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://127.0.0.1:6379".into(),
            pool_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

//! Named rate limit policies.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{PolicyConfig, RateLimitConfig};

/// Built-in policy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Generic per-IP traffic.
    Ip,
    /// Authenticated traffic.
    User,
    /// Login attempts.
    Login,
    /// Registrations.
    Register,
    /// Uploads.
    Upload,
    /// Admin endpoints.
    Admin,
}

impl PolicyKind {
    /// Every built-in policy.
    pub const ALL: [Self; 6] = [
        Self::Ip,
        Self::User,
        Self::Login,
        Self::Register,
        Self::Upload,
        Self::Admin,
    ];

    /// Returns the policy name used in cache keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::User => "user",
            Self::Login => "login",
            Self::Register => "register",
            Self::Upload => "upload",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown rate limit policy '{s}'"))
    }
}

/// A `(limit, window)` budget under a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Name used in cache keys.
    pub name: String,
    /// Requests allowed per window.
    pub limit: u32,
    /// Window length; sub-second parts are ignored.
    pub window: Duration,
    /// Carried from configuration, not used by the fixed-window algorithm.
    pub burst: Option<u32>,
}

impl RateLimitPolicy {
    /// Creates a custom policy.
    #[must_use]
    pub fn new(name: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            limit,
            window,
            burst: None,
        }
    }

    /// Builds a named policy from its configured tuple.
    #[must_use]
    pub fn from_config(kind: PolicyKind, config: &PolicyConfig) -> Self {
        Self {
            name: kind.as_str().to_string(),
            limit: config.limit,
            window: config.window,
            burst: config.burst,
        }
    }

    /// Built-in policy `kind` as configured.
    #[must_use]
    pub fn builtin(kind: PolicyKind, config: &RateLimitConfig) -> Self {
        Self::from_config(kind, &config.policy(kind))
    }

    /// Window length in whole seconds, at least one.
    #[must_use]
    pub fn window_secs(&self) -> i64 {
        i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX).max(1)
    }
}

//! Pipeline configuration.
//!
//! All sections default to sensible values except the signing secret, which
//! must always be supplied.
//!
//! # Example (TOML)
//!
//! ```toml
//! [gatekeeper]
//! timeout = "30s"
//!
//! [gatekeeper.token]
//! secret = "change-me-to-at-least-32-bytes-of-entropy"
//! issuer = "turnstile"
//! default_ttl = "24h"
//! refresh_window = "1h"
//!
//! [gatekeeper.rate_limit.login]
//! limit = 5
//! window = "15m"
//!
//! [gatekeeper.ip_filter]
//! deny = ["203.0.113.0/24"]
//! ```

use std::collections::HashMap;
use std::time::Duration;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::permission::Permission;
use crate::rate_limit::PolicyKind;

/// Minimum accepted length of the HMAC signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Root configuration for the gatekeeper pipeline.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Token signing and lifetime settings.
    pub token: TokenConfig,

    /// Permission resolution settings.
    pub permissions: PermissionConfig,

    /// Rate limiting policies.
    pub rate_limit: RateLimitConfig,

    /// Client IP allow/deny lists.
    pub ip_filter: IpFilterConfig,

    /// Request deadline. `None` disables the timeout stage.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl GatekeeperConfig {
    /// Default configuration with the given signing secret.
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.token.secret = secret.into();
        config
    }
}

/// Token codec settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Shared HMAC secret. Must be at least [`MIN_SECRET_LEN`] bytes.
    pub secret: String,

    /// Value of the `iss` claim; verification rejects any other issuer.
    pub issuer: String,

    /// Lifetime of tokens issued without an explicit TTL.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// A token may be refreshed once its remaining lifetime drops to this.
    #[serde(with = "humantime_serde")]
    pub refresh_window: Duration,

    /// Clock skew tolerated when checking `exp` and `nbf`.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "turnstile".to_string(),
            default_ttl: Duration::from_secs(24 * 3600),
            refresh_window: Duration::from_secs(3600),
            leeway: Duration::ZERO,
        }
    }
}

/// Permission resolver settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// TTL of cached effective permission sets.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// TTL of cached resource owners.
    #[serde(with = "humantime_serde")]
    pub ownership_cache_ttl: Duration,

    /// Role overrides. A listed role replaces the built-in defaults entirely;
    /// unknown roles are added.
    pub roles: HashMap<String, Vec<String>>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(2 * 3600),
            ownership_cache_ttl: Duration::from_secs(600),
            roles: HashMap::new(),
        }
    }
}

/// A single `(limit, window[, burst])` rate limit tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Requests allowed per window.
    pub limit: u32,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Accepted for compatibility; the fixed-window limiter ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
}

impl PolicyConfig {
    /// Creates a tuple without burst.
    #[must_use]
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            burst: None,
        }
    }
}

/// Rate limiting settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Disables every rate-limit stage when `false`.
    pub enabled: bool,

    /// Read the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,

    /// Generic per-IP traffic.
    pub ip: PolicyConfig,

    /// Authenticated traffic, keyed by principal.
    pub user: PolicyConfig,

    /// Login attempts.
    pub login: PolicyConfig,

    /// Registrations.
    pub register: PolicyConfig,

    /// Uploads.
    pub upload: PolicyConfig,

    /// Admin endpoints.
    pub admin: PolicyConfig,

    /// Roles that skip the admin policy.
    pub admin_exempt_roles: Vec<String>,
}

impl RateLimitConfig {
    /// Returns the tuple configured for a policy.
    #[must_use]
    pub fn policy(&self, kind: PolicyKind) -> PolicyConfig {
        match kind {
            PolicyKind::Ip => self.ip,
            PolicyKind::User => self.user,
            PolicyKind::Login => self.login,
            PolicyKind::Register => self.register,
            PolicyKind::Upload => self.upload,
            PolicyKind::Admin => self.admin,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_forwarded_headers: false,
            ip: PolicyConfig::new(100, Duration::from_secs(60)),
            user: PolicyConfig::new(300, Duration::from_secs(60)),
            login: PolicyConfig::new(5, Duration::from_secs(15 * 60)),
            register: PolicyConfig::new(3, Duration::from_secs(3600)),
            upload: PolicyConfig::new(10, Duration::from_secs(60)),
            admin: PolicyConfig::new(1000, Duration::from_secs(60)),
            admin_exempt_roles: vec!["super_admin".to_string()],
        }
    }
}

/// Client IP allow/deny lists in CIDR notation. Bare addresses are treated
/// as single-host networks.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IpFilterConfig {
    /// When non-empty, only these networks are admitted.
    pub allow: Vec<String>,

    /// Networks that are always rejected.
    pub deny: Vec<String>,
}

impl IpFilterConfig {
    /// Returns `true` if neither list has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl GatekeeperConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the signing secret is empty and
    /// `ConfigError::InvalidValue` if:
    /// - The secret is shorter than [`MIN_SECRET_LEN`] bytes
    /// - The issuer is empty
    /// - Any TTL, window or limit is zero
    /// - A role override contains an unparseable permission
    /// - An IP filter entry is not a valid address or CIDR network
    pub fn validate(&self) -> Result<(), ConfigError> {
        let token = &self.token;
        if token.secret.is_empty() {
            return Err(ConfigError::Missing("token.secret".to_string()));
        }
        if token.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "token.secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if token.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "token.issuer cannot be empty".to_string(),
            ));
        }
        if token.default_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "token.default_ttl must be > 0".to_string(),
            ));
        }
        if token.refresh_window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "token.refresh_window must be > 0".to_string(),
            ));
        }

        if self.permissions.cache_ttl.is_zero() || self.permissions.ownership_cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "permission cache TTLs must be > 0".to_string(),
            ));
        }
        for (role, permissions) in &self.permissions.roles {
            for raw in permissions {
                raw.parse::<Permission>().map_err(|e| {
                    ConfigError::InvalidValue(format!("permissions.roles.{role}: {e}"))
                })?;
            }
        }

        for kind in PolicyKind::ALL {
            let policy = self.rate_limit.policy(kind);
            if policy.limit == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limit.{kind}.limit must be > 0"
                )));
            }
            if policy.window.as_secs() == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "rate_limit.{kind}.window must be at least 1s"
                )));
            }
        }

        for entry in self.ip_filter.allow.iter().chain(&self.ip_filter.deny) {
            entry.parse::<IpNetwork>().map_err(|e| {
                ConfigError::InvalidValue(format!("ip_filter entry '{entry}': {e}"))
            })?;
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidValue("timeout must be > 0".to_string()));
        }

        Ok(())
    }
}

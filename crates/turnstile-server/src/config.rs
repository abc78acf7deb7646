use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use turnstile_auth::GatekeeperConfig;
use turnstile_auth_redis::RedisConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub gatekeeper: GatekeeperConfig,
    /// Accounts accepted by the demo login endpoint.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl AppConfig {
    /// Checks cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, prefixed with the offending key.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port: must be non-zero".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes: must be non-zero".into());
        }
        LevelFilter::from_str(&self.logging.level).map_err(|_| {
            format!(
                "logging.level: '{}' is not one of trace, debug, info, warn, error, off",
                self.logging.level
            )
        })?;
        if self.redis.enabled && self.redis.url.is_empty() {
            return Err("redis.url: required when redis is enabled".into());
        }
        if let Some(user) = self
            .users
            .iter()
            .find(|u| u.username.is_empty() || u.password.is_empty())
        {
            return Err(format!("users[{}]: username and password are required", user.id));
        }
        self.gatekeeper
            .validate()
            .map_err(|e| format!("gatekeeper: {e}"))
    }

    /// Address the listener binds to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Requests with larger bodies are rejected with 413.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            body_limit_bytes: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level used unless `RUST_LOG` is set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

/// Demo account. The password is given in plain text and hashed at startup.
/// Prefer setting it through `TURNSTILE__USERS__<n>__PASSWORD`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: u64,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}
fn default_role() -> String {
    "user".into()
}

/// Reads [`AppConfig`] from a TOML file overlaid with `TURNSTILE__*` variables.
pub mod loader {
    use std::path::Path;

    use config::{Config, ConfigError, Environment, File, FileFormat};

    use super::AppConfig;

    /// File read when no path is given.
    pub const DEFAULT_PATH: &str = "turnstile.toml";

    /// Prefix of environment overrides. Nested keys join with `__`, so
    /// `TURNSTILE__GATEKEEPER__TOKEN__SECRET` sets `gatekeeper.token.secret`.
    pub const ENV_PREFIX: &str = "TURNSTILE";

    fn layered(path: &Path) -> Result<AppConfig, ConfigError> {
        Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Loads and validates the configuration at `path`.
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply.
    ///
    /// # Errors
    ///
    /// Returns a message naming the file when it cannot be parsed, or the
    /// first validation failure.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let path = Path::new(path.unwrap_or(DEFAULT_PATH));
        let cfg = layered(path).map_err(|e| format!("{}: {e}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

//! Configuration management for Threadcast
//!
//! Configuration comes from an optional TOML file, then environment
//! variables override individual fields. The environment names are the ones
//! deployments of the service already use (`TWITTER_USERNAME`, `CLIENT_ID`,
//! ...), so a bare environment with no file is a complete configuration.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//!
//! [account]
//! username = "threadbot"
//! password = "hunter2"
//! email = "bot@example.com"
//! two_factor_secret = "JBSWY3DPEHPK3PXP"
//!
//! [auth]
//! client_id = "ci"
//! client_secret = "cs"
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! classification = "structured"
//! ```

use secrecy::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, FailureKind, PlatformError, Result};

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// X weighs URLs and wide characters and lifts the limit for some
/// accounts, so no local limit is applied unless one is configured.
pub const DEFAULT_CHARACTER_LIMIT: usize = 0;

#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub account: AccountConfig,
    pub auth: AuthConfig,
    pub retry: RetryConfig,
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

/// Login credentials for the platform account that publishes threads
#[derive(Debug)]
pub struct AccountConfig {
    pub username: String,
    pub password: SecretString,
    pub email: Option<String>,
    pub two_factor_secret: Option<SecretString>,
}

/// Basic-auth credentials callers must present
#[derive(Debug)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub classification: ClassificationMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            classification: ClassificationMode::Structured,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// How failed post attempts are sorted into retry behaviors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    /// Use the error variant produced by the platform client
    Structured,
    /// Look for session keywords in the error text
    Text,
}

impl ClassificationMode {
    pub fn classify(self, error: &PlatformError) -> FailureKind {
        match self {
            ClassificationMode::Structured => error.kind(),
            ClassificationMode::Text => error.kind_from_text(),
        }
    }
}

impl std::str::FromStr for ClassificationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured" => Ok(ClassificationMode::Structured),
            "text" => Ok(ClassificationMode::Text),
            _ => Err(format!(
                "Invalid classification mode: '{}'. Valid options: structured, text",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Web origin serving the GraphQL API
    pub web_url: String,
    /// REST origin serving guest activation and the login flow
    pub api_url: String,
    /// Maximum characters per post; 0 disables the check
    pub character_limit: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            web_url: "https://twitter.com".to_string(),
            api_url: "https://api.twitter.com".to_string(),
            character_limit: DEFAULT_CHARACTER_LIMIT,
        }
    }
}

impl PlatformConfig {
    pub fn character_limit(&self) -> Option<usize> {
        (self.character_limit > 0).then_some(self.character_limit)
    }
}

/// On-disk shape of the config file. Every field is optional so the
/// environment can fill in the rest.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    server: RawServer,
    account: RawAccount,
    auth: RawAuth,
    retry: RetryConfig,
    platform: PlatformConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawServer {
    bind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAccount {
    username: Option<String>,
    password: Option<String>,
    email: Option<String>,
    two_factor_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAuth {
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl RawConfig {
    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        };

        set(&mut self.server.bind, "THREADCAST_BIND");
        set(&mut self.account.username, "TWITTER_USERNAME");
        set(&mut self.account.password, "TWITTER_PASSWORD");
        set(&mut self.account.email, "TWITTER_EMAIL");
        set(&mut self.account.two_factor_secret, "TWITTER_2FA_SECRET");
        set(&mut self.auth.client_id, "CLIENT_ID");
        set(&mut self.auth.client_secret, "CLIENT_SECRET");

        if let Some(mode) = lookup("THREADCAST_RETRY_CLASSIFICATION").filter(|v| !v.is_empty()) {
            self.retry.classification =
                mode.parse().map_err(|reason| ConfigError::InvalidValue {
                    field: "retry.classification".to_string(),
                    reason,
                })?;
        }

        Ok(())
    }

    fn finish(self) -> Result<Config> {
        let bind_str = self.server.bind.unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "server.bind".to_string(),
                reason: format!("'{}': {}", bind_str, e),
            })?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        let account = AccountConfig {
            username: required(self.account.username, "account.username")?,
            password: required(self.account.password, "account.password")?.into(),
            email: self.account.email,
            two_factor_secret: self.account.two_factor_secret.map(SecretString::from),
        };

        let auth = AuthConfig {
            client_id: required(self.auth.client_id, "auth.client_id")?,
            client_secret: required(self.auth.client_secret, "auth.client_secret")?.into(),
        };

        Ok(Config {
            server: ServerConfig { bind },
            account,
            auth,
            retry: self.retry,
            platform: self.platform,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| ConfigError::MissingField(field.to_string()).into())
}

impl Config {
    /// Load configuration from the default location and the process environment
    ///
    /// A missing config file is not an error; the environment alone may
    /// carry every required field.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let raw = if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            read_raw(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using environment only",
                config_path.display()
            );
            RawConfig::default()
        };
        Self::from_raw(raw, |key| std::env::var(key).ok())
    }

    /// Load configuration from a specific path, then apply environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = read_raw(path)?;
        Self::from_raw(raw, |key| std::env::var(key).ok())
    }

    /// Build configuration purely from a variable lookup
    ///
    /// `lookup` stands in for the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_raw(RawConfig::default(), lookup)
    }

    fn from_raw<F>(mut raw: RawConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        raw.apply_env(lookup)?;
        raw.finish()
    }
}

fn read_raw(path: &Path) -> Result<RawConfig> {
    let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
    let raw: RawConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;
    Ok(raw)
}

/// Resolve the configuration file path under the platform config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("THREADCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("threadcast").join("config.toml"))
}

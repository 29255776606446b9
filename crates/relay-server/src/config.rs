//! Server configuration.
//!
//! Configuration can be loaded from:
//! - A TOML file (`$CHANRELAY_CONFIG`, `chanrelay.toml`, `/etc/chanrelay/`,
//!   `~/.config/chanrelay/`)
//! - Environment variables, as defaults for keys the file leaves out
//! - A `credentials.json` file holding the bot token

use anyhow::{bail, Context, Result};
use chanrelay_store::{RedisStoreConfig, DEFAULT_ROUTABLE_SET_KEY};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind the HTTP service to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the HTTP service.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Chat service configuration.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Rule store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Chat service configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token. Falls back to the credentials file when unset.
    #[serde(default = "default_token")]
    pub token: Option<String>,

    /// Path of the credentials file.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,

    /// Base URL of the Web API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

/// Which rule store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis server.
    Redis,
    /// Process memory; rules are lost on exit.
    Memory,
}

/// Rule store configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend.
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Redis host.
    #[serde(default = "default_store_host")]
    pub host: String,

    /// Redis port.
    #[serde(default = "default_store_port")]
    pub port: u16,

    /// Redis password.
    #[serde(default = "default_store_password")]
    pub password: Option<String>,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Idle connection lifetime in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Connection checkout timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Key of the routable-channel set.
    #[serde(default = "default_set_key")]
    pub routable_set_key: String,

    /// Write rule and set membership in one transaction.
    #[serde(default)]
    pub atomic_registration: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Bot credentials file.
#[derive(Debug, Deserialize)]
struct Credentials {
    bot: BotCredentials,
}

#[derive(Debug, Deserialize)]
struct BotCredentials {
    token: String,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// Default value functions
fn default_host() -> String {
    env_var("CHANRELAY_HOST")
        .or_else(|| env_var("OPENSHIFT_GO_IP"))
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    ["CHANRELAY_PORT", "OPENSHIFT_GO_PORT", "PORT"]
        .iter()
        .find_map(|name| env_var(name).and_then(|p| p.parse().ok()))
        .unwrap_or(8080)
}

fn default_token() -> Option<String> {
    env_var("SLACK_BOT_TOKEN")
}

fn default_credentials_file() -> String {
    match env_var("OPENSHIFT_DATA_DIR") {
        Some(dir) => Path::new(&dir)
            .join("credentials.json")
            .to_string_lossy()
            .into_owned(),
        None => "credentials.json".to_string(),
    }
}

fn default_api_base() -> String {
    env_var("SLACK_API_BASE").unwrap_or_else(|| "https://slack.com/api".to_string())
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_store_host() -> String {
    env_var("REDISCLOUD_HOSTNAME").unwrap_or_else(|| "127.0.0.1".to_string())
}

fn default_store_port() -> u16 {
    env_var("REDISCLOUD_PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(6379)
}

fn default_store_password() -> Option<String> {
    env_var("REDISCLOUD_PASSWORD")
}

fn default_max_connections() -> u32 {
    3
}

fn default_idle_timeout() -> u64 {
    240
}

fn default_connect_timeout() -> u64 {
    5_000 // 5 seconds
}

fn default_set_key() -> String {
    DEFAULT_ROUTABLE_SET_KEY.to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            slack: SlackConfig::default(),
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
            credentials_file: default_credentials_file(),
            api_base: default_api_base(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_store_host(),
            port: default_store_port(),
            password: default_store_password(),
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            routable_set_key: default_set_key(),
            atomic_registration: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

// Secrets stay out of Debug output.
impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("credentials_file", &self.credentials_file)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("max_connections", &self.max_connections)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("routable_set_key", &self.routable_set_key)
            .field("atomic_registration", &self.atomic_registration)
            .finish()
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// `$CHANRELAY_CONFIG` names a file that cannot be read.
    pub fn load() -> Result<Self> {
        if let Some(path) = env_var("CHANRELAY_CONFIG") {
            return Self::from_file(shellexpand::tilde(&path).as_ref());
        }

        let config_paths = [
            "chanrelay.toml",
            "/etc/chanrelay/chanrelay.toml",
            "~/.config/chanrelay/chanrelay.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Resolve the bot token from configuration or the credentials file.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is configured and the credentials file
    /// is missing, unreadable, or holds an empty token.
    pub fn bot_token(&self) -> Result<String> {
        if let Some(token) = self.slack.token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }

        let path = PathBuf::from(shellexpand::tilde(&self.slack.credentials_file).as_ref());
        let contents = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "No bot token configured and credentials file {} is unreadable",
                path.display()
            )
        })?;

        let credentials: Credentials = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials file: {}", path.display()))?;

        if credentials.bot.token.is_empty() {
            bail!("Credentials file {} has an empty bot token", path.display());
        }
        Ok(credentials.bot.token)
    }

    /// Redis store settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the store address is invalid.
    pub fn redis_config(&self) -> Result<RedisStoreConfig> {
        let store = &self.store;
        let url = RedisStoreConfig::url_for(&store.host, store.port, store.password.as_deref())?;

        Ok(RedisStoreConfig {
            url,
            max_connections: store.max_connections,
            idle_timeout: Duration::from_secs(store.idle_timeout_secs),
            connect_timeout: Duration::from_millis(store.connect_timeout_ms),
            routable_set_key: store.routable_set_key.clone(),
            atomic_registration: store.atomic_registration,
        })
    }
}

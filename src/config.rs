//! Configuration management for the model proxy
//!
//! Configuration is loaded once at startup from a YAML file, with a few
//! environment overrides for the listener address. It is not reloadable.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Fallback ceiling for non-streaming admission
pub const DEFAULT_NON_STREAM_CONCURRENCY: usize = 300;
/// Fallback ceiling for streaming admission
pub const DEFAULT_STREAM_CONCURRENCY: usize = 50;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub http_client: HttpClientConfig,
    /// Model name -> upstream endpoints serving it
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

/// Listener configuration for the proxy itself
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path prefix the proxy is mounted at
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Bound on reading a request body (0 disables)
    #[serde(default)]
    pub read_timeout_seconds: u64,
    /// Bound on producing the response head (0 disables)
    #[serde(default)]
    pub write_timeout_seconds: u64,
    /// Bound on an idle keep-alive connection (0 disables)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// How long in-flight connections may drain after shutdown is signalled
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

/// Admission ceilings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub non_stream_concurrency: i64,
    #[serde(default)]
    pub stream_concurrency: i64,
}

/// Connection pool sizing applied to every upstream client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpClientConfig {
    /// Max in-flight exchanges per upstream client (0 = unlimited)
    #[serde(default)]
    pub max_conns_per_host: usize,
    /// Overall idle connection cap (0 = unlimited)
    #[serde(default)]
    pub max_idle_conns: usize,
    /// Idle connection cap per host (0 = unlimited)
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_conns_per_host: usize,
    /// How long an idle pooled connection is kept (0 = forever)
    #[serde(default = "default_idle_conn_timeout")]
    pub idle_conn_timeout_seconds: u64,
}

/// Endpoints configured for one model
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// One physical upstream target and its credential
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
}

// Keeps API keys out of logs.
impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("name", &self.name)
            .field("api_base", &self.api_base)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_api_prefix() -> String {
    "/v1".to_string()
}

fn default_idle_timeout() -> u64 {
    90
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_max_idle_per_host() -> usize {
    10
}

fn default_idle_conn_timeout() -> u64 {
    90
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_prefix: default_api_prefix(),
            read_timeout_seconds: 0,
            write_timeout_seconds: 0,
            idle_timeout_seconds: default_idle_timeout(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        optional_secs(self.read_timeout_seconds)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        optional_secs(self.write_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        optional_secs(self.idle_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Prefix normalized to a leading slash and no trailing slash
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.api_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

impl LimitsConfig {
    /// Non-streaming ceiling, falling back to the default when unset or <= 0
    pub fn non_stream_capacity(&self) -> usize {
        positive_or(self.non_stream_concurrency, DEFAULT_NON_STREAM_CONCURRENCY)
    }

    /// Streaming ceiling, falling back to the default when unset or <= 0
    pub fn stream_capacity(&self) -> usize {
        positive_or(self.stream_concurrency, DEFAULT_STREAM_CONCURRENCY)
    }
}

fn positive_or(value: i64, fallback: usize) -> usize {
    if value <= 0 {
        fallback
    } else {
        usize::try_from(value).unwrap_or(fallback)
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_conns_per_host: 0,
            max_idle_conns: 0,
            max_idle_conns_per_host: default_max_idle_per_host(),
            idle_conn_timeout_seconds: default_idle_conn_timeout(),
        }
    }
}

impl HttpClientConfig {
    /// Idle connections kept per upstream client.
    ///
    /// Every client talks to a single host, so the overall idle cap and the
    /// per-host cap both bound the same pool.
    pub fn idle_per_client(&self) -> usize {
        match (self.max_idle_conns, self.max_idle_conns_per_host) {
            (0, 0) => usize::MAX,
            (0, per_host) => per_host,
            (total, 0) => total,
            (total, per_host) => total.min(per_host),
        }
    }

    pub fn idle_conn_timeout(&self) -> Option<Duration> {
        optional_secs(self.idle_conn_timeout_seconds)
    }
}

impl Config {
    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load from `MODEL_PROXY_CONFIG` (or the default path) and apply
    /// environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            env::var("MODEL_PROXY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("MODEL_PROXY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("MODEL_PROXY_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "MODEL_PROXY_PORT",
                value: port,
            })?;
        }
        Ok(())
    }
}

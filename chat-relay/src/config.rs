//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: CHAT_RELAY_, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/chat-relay/{service_name}/config.toml
//! 4. System directory: /etc/chat-relay/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::sse::SseConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CHAT_RELAY_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Pub/sub backend selection and queue sizing
    #[serde(default)]
    pub pubsub: PubSubConfig,

    /// Redis configuration (required by the `redis` backend)
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// Streaming transport configuration
    #[serde(default)]
    pub sse: SseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Middleware configuration
    #[serde(default)]
    pub middleware: MiddlewareConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Request timeout in seconds (applies until response headers are sent)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable output
    Pretty,
}

/// Which pub/sub backend fans events out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PubSubBackend {
    /// In-process delivery only
    #[default]
    Local,
    /// Delivery relayed through Redis pub/sub, shared by every process on the topic
    Redis,
}

impl fmt::Display for PubSubBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

/// Pub/sub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    /// Backend, selected once at startup
    #[serde(default)]
    pub backend: PubSubBackend,

    /// Per-subscriber queue capacity for the local backend
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,

    /// Per-subscriber queue capacity for the Redis backend
    #[serde(default = "default_bridged_capacity")]
    pub bridged_capacity: usize,

    /// Redis topic carrying JSON-encoded messages
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl PubSubConfig {
    /// Queue capacity that applies to the selected backend
    pub fn capacity(&self) -> usize {
        match self.backend {
            PubSubBackend::Local => self.local_capacity,
            PubSubBackend::Redis => self.bridged_capacity,
        }
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            backend: PubSubBackend::default(),
            local_capacity: default_local_capacity(),
            bridged_capacity: default_bridged_capacity(),
            topic: default_topic(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (redis://[:password@]host:port/db)
    pub url: String,

    /// Maximum number of pooled publish connections
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Maximum retry attempts for the initial connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Upper bound for the receive loop's reconnect backoff in seconds
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,
}

impl RedisConfig {
    /// Base retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Maximum reconnect delay as a Duration
    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_delay_secs)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            max_connections: default_redis_max_connections(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared bearer token; authentication is disabled when unset
    #[serde(default)]
    pub token: Option<String>,
}

/// Middleware configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Request body size limit in MB
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,

    /// CORS mode (permissive, restrictive)
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            body_limit_mb: default_body_limit_mb(),
            cors_mode: default_cors_mode(),
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_local_capacity() -> usize {
    1
}

fn default_bridged_capacity() -> usize {
    10
}

fn default_topic() -> String {
    "chat:messages".to_string()
}

fn default_redis_max_connections() -> usize {
    20
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

fn default_max_reconnect_delay() -> u64 {
    30
}

fn default_body_limit_mb() -> usize {
    1
}

fn default_cors_mode() -> String {
    "permissive".to_string()
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "chat-relay".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut defaults = Config::default();
        defaults.service.name = service_name.to_string();

        let mut figment = Figment::new().merge(Serialized::defaults(defaults));

        // Lowest priority first so that higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the XDG and system directories; environment variables still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("chat-relay");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/chat-relay")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Get Redis URL
    pub fn redis_url(&self) -> Option<&str> {
        self.redis.as_ref().map(|r| r.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "chat-relay".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                log_format: LogFormat::default(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
            },
            pubsub: PubSubConfig::default(),
            redis: None,
            sse: SseConfig::default(),
            auth: AuthConfig::default(),
            middleware: MiddlewareConfig::default(),
        }
    }
}

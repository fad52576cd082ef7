//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Realtime change bus configuration.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis channels.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Realtime change bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Distribute change events through Redis Pub/Sub.
    ///
    /// When disabled, events only reach feeds served by this process.
    #[serde(default = "default_true")]
    pub use_redis: bool,
    /// Capacity of the in-process broadcast buffer.
    ///
    /// Subscribers that fall further behind than this are reported as lagged
    /// and reload their feed.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            use_redis: default_true(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_redis_prefix() -> String {
    "huddle".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_buffer_size() -> usize {
    1000
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `HUDDLE_ENV`)
    /// 3. Environment variables with `HUDDLE_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("HUDDLE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("HUDDLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("HUDDLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

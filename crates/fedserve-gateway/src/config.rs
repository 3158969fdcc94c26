//! Gateway configuration.
//!
//! Loaded from a TOML file (default `fedserve.toml`) with environment
//! overrides such as `FEDSERVE__POOL__LOAD_FACTOR_THRESHOLD=20` or
//! `FEDSERVE__REDIS__ENABLED=true`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use fedserve_cache::{CacheConfig, RedisConfig};
use fedserve_pool::PoolConfig;
use serde::{Deserialize, Serialize};

/// Default configuration file looked up when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "fedserve.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "FEDSERVE";

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "FEDSERVE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Pool validations
        let pool = &self.pool;
        if pool.max_channels_per_endpoint == 0 {
            return Err(ConfigError::invalid("pool.max_channels_per_endpoint must be > 0"));
        }
        if pool.check_interval_ms == 0 {
            return Err(ConfigError::invalid("pool.check_interval_ms must be > 0"));
        }
        let channel = &pool.channel;
        if channel.connect_timeout_ms == 0 || channel.probe_timeout_ms == 0 {
            return Err(ConfigError::invalid("pool.channel timeouts must be > 0"));
        }
        if channel.request_buffer_size == 0 {
            return Err(ConfigError::invalid("pool.channel.request_buffer_size must be > 0"));
        }
        if channel.max_retry_attempts == 0 {
            return Err(ConfigError::invalid("pool.channel.max_retry_attempts must be > 0"));
        }

        // Cache and store validations
        self.cache
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        self.redis
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;

        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// Configuration file to load: `--config <path>` or `--config=<path>` in
/// `args`, then a non-empty `env_path` (the [`CONFIG_PATH_ENV`] value), then
/// [`DEFAULT_CONFIG_FILE`].
pub fn config_path<I>(args: I, env_path: Option<String>) -> PathBuf
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return PathBuf::from(path);
        }
    }
    env_path
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load configuration from `path` (or [`DEFAULT_CONFIG_FILE`]) and the
/// process environment, then validate it. A missing file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    load_config_with_env(path, None)
}

/// Like [`load_config`], but overrides come from `env` instead of the
/// process environment when it is given.
pub fn load_config_with_env(
    path: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<GatewayConfig, ConfigError> {
    let mut builder = Config::builder();
    let file = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if file.exists() {
        builder = builder.add_source(File::from(file));
    }
    // Environment variable overrides, e.g., FEDSERVE__REDIS__URL=redis://cache:6379
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__")
            .source(env.map(|vars| vars.into_iter().collect())),
    );

    let merged: GatewayConfig = builder.build()?.try_deserialize()?;
    merged.validate()?;
    Ok(merged)
}

//! Configuration management for dagstore
//!
//! Configuration comes from defaults, a TOML file, or `DAGSTORE_*`
//! environment variables, and is validated before use.

use crate::logging::{LogConfig, LogFormat, LogLevel};
use crate::store::{DEFAULT_LOOKUP_BATCH_SIZE, MAX_LOOKUP_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` opens a private temporary store that is
    /// removed when the store is closed.
    pub path: Option<PathBuf>,

    /// Use WAL journaling instead of a rollback journal
    pub enable_wal: bool,

    /// Maximum hashes per lookup statement in `get_messages`
    pub lookup_batch_size: usize,

    /// How long to wait for the store connection
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            enable_wal: true,
            lookup_batch_size: DEFAULT_LOOKUP_BATCH_SIZE,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    /// Store backed by the given database file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()), ..Default::default() }
    }

    /// Validate store settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookup_batch_size == 0 || self.lookup_batch_size > MAX_LOOKUP_BATCH_SIZE {
            return Err(ConfigError::ValidationFailed(format!(
                "lookup_batch_size must be between 1 and {}, got {}",
                MAX_LOOKUP_BATCH_SIZE, self.lookup_batch_size
            )));
        }

        if self.connection_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "connection_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Build the logging subsystem configuration
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = LogLevel::from_str(&self.level)
            .ok_or_else(|| ConfigError::InvalidValue(format!("Invalid log level: {}", self.level)))?;

        let format = if self.json_format { LogFormat::Json } else { LogFormat::Plain };
        Ok(LogConfig::new(level)
            .format(format)
            .timestamps(self.with_timestamp)
            .targets(self.with_target))
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: DAGSTORE_<SECTION>_<KEY>
    /// Example: DAGSTORE_STORE_PATH=/var/lib/dagstore/messages.db
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Store config
        if let Some(path) = lookup("DAGSTORE_STORE_PATH") {
            config.store.path = Some(PathBuf::from(path));
        }
        if let Some(enable_wal) = lookup("DAGSTORE_STORE_ENABLE_WAL") {
            config.store.enable_wal = enable_wal
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid WAL flag: {}", e)))?;
        }
        if let Some(batch) = lookup("DAGSTORE_STORE_LOOKUP_BATCH_SIZE") {
            config.store.lookup_batch_size = batch.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid lookup batch size: {}", e))
            })?;
        }
        if let Some(timeout) = lookup("DAGSTORE_STORE_CONNECTION_TIMEOUT") {
            config.store.connection_timeout =
                humantime::parse_duration(&timeout).map_err(|e| {
                    ConfigError::InvalidValue(format!("Invalid connection timeout: {}", e))
                })?;
        }

        // Logging config
        if let Some(level) = lookup("DAGSTORE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = lookup("DAGSTORE_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;

        if LogLevel::from_str(&self.logging.level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents)
            .map_err(|source| ConfigError::FileWrite { path: path.to_path_buf(), source })?;

        Ok(())
    }
}

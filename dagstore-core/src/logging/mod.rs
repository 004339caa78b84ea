//! Logging subsystem
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a plain or
//! JSON formatter writing to stderr. The configured level applies to the
//! dagstore crates; dependencies such as `r2d2` stay at `warn`. `RUST_LOG`
//! replaces the whole filter when set.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Crates whose events follow the configured level
const OWN_TARGETS: [&str; 2] = ["dagstore_core", "dagstore"];

/// Output encoding of log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Logging setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Prefix lines with a timestamp
    pub timestamps: bool,
    /// Include the emitting module
    pub targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, format: LogFormat::Plain, timestamps: true, targets: true }
    }

    pub fn format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn timestamps(self, timestamps: bool) -> Self {
        Self { timestamps, ..self }
    }

    pub fn targets(self, targets: bool) -> Self {
        Self { targets, ..self }
    }

    /// Filter directives used when `RUST_LOG` is unset, e.g.
    /// `warn,dagstore_core=debug,dagstore=debug`
    pub fn directives(&self) -> String {
        let mut directives = String::from("warn");
        for target in OWN_TARGETS {
            directives.push_str(&format!(",{}={}", target, self.level));
        }
        directives
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        // stdout belongs to command output
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(self.targets);
        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => layer.json().boxed(),
            (LogFormat::Json, false) => layer.json().without_time().boxed(),
            (LogFormat::Plain, true) => layer.boxed(),
            (LogFormat::Plain, false) => layer.without_time().boxed(),
        }
    }
}

/// Install the global subscriber with plain `info` output
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
///
/// # Example
/// ```
/// use dagstore_core::logging::{init_logging_with_config, LogConfig, LogFormat, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).format(LogFormat::Json).timestamps(false);
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(config.env_filter())
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_plain_info() {
        let config = LogConfig::default();
        assert_eq!(config, LogConfig::new(LogLevel::Info));
        assert_eq!(config.format, LogFormat::Plain);
        assert!(config.timestamps && config.targets);
    }

    #[test]
    fn test_directives_scope_level_to_own_crates() {
        let config = LogConfig::new(LogLevel::Trace);
        assert_eq!(config.directives(), "warn,dagstore_core=trace,dagstore=trace");
    }

    #[test]
    fn test_builder_keeps_other_fields() {
        let config = LogConfig::new(LogLevel::Error).format(LogFormat::Json).targets(false);
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.timestamps);
        assert!(!config.targets);
    }

    #[test]
    fn test_second_init_fails() {
        // Whichever call wins the global slot, the other must report failure
        let first = init_logging_with_config(LogConfig::new(LogLevel::Warn));
        let second = init_logging_with_config(LogConfig::new(LogLevel::Warn));
        assert!(first.is_err() || second.is_err());
        assert!(matches!(second, Err(LoggingError::InitializationFailed(_))));
    }
}

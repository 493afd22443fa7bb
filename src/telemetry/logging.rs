//! Logging configuration and initialization for the payment gate.
//!
//! Supports JSON and pretty-printed formats with configurable output paths.

use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Human-readable pretty printing (for development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format (JSON or Pretty).
    pub format: LogFormat,
    /// Log level filter (e.g., "info", "debug", "echopay_core=trace").
    pub level: String,
    /// Optional file path for log output. If None, logs to stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

impl LogConfig {
    /// Build from `ECHOPAY_LOG_LEVEL`, `ECHOPAY_LOG_FORMAT` (`json` or
    /// `pretty`), and `ECHOPAY_LOG_PATH`. Unset or unrecognized values
    /// keep the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("ECHOPAY_LOG_LEVEL") {
            if !level.is_empty() {
                config.level = level;
            }
        }
        if let Ok(format) = std::env::var("ECHOPAY_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "pretty" => config.format = LogFormat::Pretty,
                "json" => config.format = LogFormat::Json,
                _ => {}
            }
        }
        if let Ok(path) = std::env::var("ECHOPAY_LOG_PATH") {
            if !path.is_empty() {
                config.output_path = Some(PathBuf::from(path));
            }
        }
        config
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Initialize the tracing subscriber with the given configuration.
///
/// This should be called once at application startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;

    let writer = match &config.output_path {
        Some(path) => {
            let file =
                std::fs::File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(writer))
            .try_init(),
    }
    .map_err(|_| LogError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env mutations are process-wide; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "ECHOPAY_LOG_LEVEL",
        "ECHOPAY_LOG_FORMAT",
        "ECHOPAY_LOG_PATH",
    ];

    fn clear_env_vars() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_from_env_defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env_vars();

        let config = LogConfig::from_env();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
        assert!(config.output_path.is_none());
    }

    #[test]
    fn test_from_env_reads_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env_vars();

        std::env::set_var("ECHOPAY_LOG_LEVEL", "echopay_core=trace");
        std::env::set_var("ECHOPAY_LOG_FORMAT", "pretty");
        std::env::set_var("ECHOPAY_LOG_PATH", "/tmp/echopay.log");

        let config = LogConfig::from_env();
        assert_eq!(config.level, "echopay_core=trace");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.output_path, Some(PathBuf::from("/tmp/echopay.log")));

        clear_env_vars();
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = LogConfig {
            level: "not==valid==filter".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(LogError::InvalidFilter(_))
        ));
    }
}


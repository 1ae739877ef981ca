//! Structured logging setup and span helpers
//!
//! All crates emit `tracing` events; installing a subscriber is left to the
//! embedding application, which can use [`init_logging`] for the common setup.

use crate::config::{parse_env_flag, ConfigLoader};
use crate::error::{Result, SparseRecError};
use std::str::FromStr;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = SparseRecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(SparseRecError::Configuration {
                message: format!("Unknown log format `{}` (expected pretty or json)", other),
                key: Some("SPARSEREC_LOG_FORMAT".to_string()),
            }),
        }
    }
}

/// Logging configuration
///
/// # Environment Variables
///
/// - `SPARSEREC_LOG_LEVEL` (optional): filter directive (default: "info")
/// - `SPARSEREC_LOG_FORMAT` (optional): `pretty` or `json` (default: pretty)
/// - `SPARSEREC_LOG_THREAD_IDS` (optional): include thread ids (default: true)
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `sparserec_engine=debug`
    pub level: String,
    pub format: LogFormat,
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            thread_ids: true,
        }
    }
}

impl ConfigLoader for LogConfig {
    fn from_env() -> Result<Self> {
        let defaults = LogConfig::default();
        let level = std::env::var("SPARSEREC_LOG_LEVEL").unwrap_or(defaults.level);
        let format = match std::env::var("SPARSEREC_LOG_FORMAT") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.format,
        };
        let thread_ids = parse_env_flag("SPARSEREC_LOG_THREAD_IDS", defaults.thread_ids)?;

        Ok(Self {
            level,
            format,
            thread_ids,
        })
    }

    fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.level).map_err(|e| SparseRecError::Configuration {
            message: format!("Invalid log filter `{}`: {}", self.level, e),
            key: Some("SPARSEREC_LOG_LEVEL".to_string()),
        })?;
        Ok(())
    }
}

/// Install a global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// # Errors
///
/// Returns a `Configuration` error if the filter is invalid or a global
/// subscriber has already been installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    config.validate()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_thread_ids(config.thread_ids),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init(),
    };

    installed.map_err(|e| SparseRecError::Configuration {
        message: format!("Failed to initialize tracing subscriber: {}", e),
        key: None,
    })?;

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

/// Span wrapping one parallel row-block operation
pub fn operation_span(operation: &'static str, n_rows: usize, n_threads: usize) -> Span {
    tracing::debug_span!("sparse_op", operation, n_rows, n_threads)
}

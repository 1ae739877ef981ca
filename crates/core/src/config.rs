//! Shared configuration loader for sparserec components
//!
//! Configuration values are read from environment variables carrying the
//! `SPARSEREC_` prefix. Missing optional values fall back to defaults, values
//! that are present but unparsable are reported as `Configuration` errors.
//!
//! Override hierarchy: defaults < .env < environment.
//!
//! # Example
//!
//! ```no_run
//! use sparserec_core::config::{load_dotenv, ConfigLoader};
//! use sparserec_core::observability::LogConfig;
//!
//! # fn example() -> sparserec_core::Result<()> {
//! load_dotenv();
//! let log_config = LogConfig::from_env()?;
//! log_config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SparseRecError};

/// Prefix shared by every environment variable read by sparserec
pub const ENV_PREFIX: &str = "SPARSEREC_";

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if a variable is present but cannot be parsed.
    fn from_env() -> Result<Self>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if any validation check fails.
    fn validate(&self) -> Result<()>;
}

/// Parse an environment variable into `T`, returning `default` when unset
pub fn parse_env_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| SparseRecError::Configuration {
                    message: format!("Failed to parse {}: {}", key, e),
                    key: Some(key.to_string()),
                })
        })
        .unwrap_or(Ok(default))
}

/// Parse a boolean flag; accepts `1/0`, `true/false`, `yes/no` (case-insensitive)
pub fn parse_env_flag(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(SparseRecError::Configuration {
                message: format!("Failed to parse {}: `{}` is not a boolean", key, other),
                key: Some(key.to_string()),
            }),
        },
    }
}

/// Load .env file if present
///
/// Does not return an error if the .env file is not found.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "Failed to load .env file");
        }
    }
}

//! services/scheduler/src/config.rs
//!
//! Defines the service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::str::FromStr;

use chrono::FixedOffset;
use exam_prep_core::review::DEFAULT_HISTORY_LIMIT;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub log_level: Level,
    /// Offset used to decide which calendar day a review falls on.
    pub review_utc_offset: FixedOffset,
    pub history_limit: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let max_connections =
            parse_var("DATABASE_MAX_CONNECTIONS", env_opt("DATABASE_MAX_CONNECTIONS"), 5)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let offset_minutes: i32 =
            parse_var("REVIEW_UTC_OFFSET_MINUTES", env_opt("REVIEW_UTC_OFFSET_MINUTES"), 0)?;
        let review_utc_offset = utc_offset(offset_minutes)?;

        let history_limit = parse_var(
            "REVIEW_HISTORY_LIMIT",
            env_opt("REVIEW_HISTORY_LIMIT"),
            DEFAULT_HISTORY_LIMIT,
        )?;

        Ok(Self {
            database_url,
            max_connections,
            log_level,
            review_utc_offset,
            history_limit,
        })
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Parses an optional raw value, falling back to `default` when unset.
fn parse_var<T>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}

fn utc_offset(minutes: i32) -> Result<FixedOffset, ConfigError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "REVIEW_UTC_OFFSET_MINUTES".to_string(),
                format!("{} minutes is not a valid UTC offset", minutes),
            )
        })
}

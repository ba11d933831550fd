//! services/scheduler/src/error.rs
//!
//! Defines the primary error type for the scheduler service.

use crate::config::ConfigError;
use exam_prep_core::ports::PortError;

/// The primary error type for the `scheduler` service.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Represents a standard Input/Output error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

// Central Error Type for the Application

use std::path::PathBuf;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Unknown job or file reference. Callers should start fresh.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Removal requested while operations are still outstanding. Retry later.
    #[error("Busy: {0}")]
    Busy(String),

    /// Disk create/write/delete failure. Not retried by the core.
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory deletion failed part way; the job stays registered for a retry.
    #[error("Job {job_id} degraded: {reason}")]
    Degraded { job_id: String, reason: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

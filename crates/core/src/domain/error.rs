// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid entity label '{0}': use 1-64 ASCII letters, digits, '_' or '-'")]
    InvalidLabel(String),

    #[error("Invalid filename '{0}'")]
    InvalidFilename(String),

    #[error("Unsupported file format '{0}' (allowed: csv, tsv, txt)")]
    UnsupportedFormat(String),

    #[error("Invalid session token: {0}")]
    InvalidSessionToken(String),

    #[error("Name '{0}' is already taken by another file in this job")]
    NameCollision(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

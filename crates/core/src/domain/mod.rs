// Domain Layer - Pure types and validation rules

pub mod error;
pub mod file;
pub mod job;

// Re-exports
pub use error::DomainError;
pub use file::{EntityFile, FileFormat, LabelFile};
pub use job::{Job, JobId, JobStatus};

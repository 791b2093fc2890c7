// Port Layer - Interfaces for external dependencies

pub mod id_provider;
pub mod job_storage;
pub mod time_provider;

// Re-exports
pub use id_provider::{IdProvider, TimestampIdProvider};
pub use job_storage::{JobStorage, StagedFile};
pub use time_provider::{SystemTimeProvider, TimeProvider};

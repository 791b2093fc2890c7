// Jobspace Core - Domain Logic, Ports & Lifecycle Services
// NO filesystem access here: disk work goes through port::JobStorage

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{LifecycleManager, ReclamationHandle, ReclamationScheduler};
pub use config::LifecycleConfig;
pub use error::{AppError, Result};

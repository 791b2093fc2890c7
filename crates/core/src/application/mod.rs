// Application Layer - Lifecycle use cases

pub mod constants;
pub mod lifecycle;
pub mod reclamation;
pub mod registry;
pub mod session;

// Re-exports
pub use lifecycle::{CleanupReport, JobInfo, LifecycleManager, SweepReport, TempStats};
pub use reclamation::{ReclamationHandle, ReclamationScheduler, SchedulerStatus};
pub use registry::{JobLease, JobRegistry};
pub use session::SessionBinder;

// Lifecycle reports (serializable views for callers and status endpoints)

use crate::domain::{EntityFile, JobId, JobStatus, LabelFile};
use serde::Serialize;
use std::path::PathBuf;

/// Detailed view of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub dir: PathBuf,
    pub created_at: i64,
    pub last_touched_at: i64,
    pub age_ms: i64,
    pub status: JobStatus,
    pub entity_files: Vec<EntityFile>, // sorted by label
    pub label_file: Option<LabelFile>,
    pub total_size_bytes: u64,
}

/// Per-job line of [`TempStats`]
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub id: JobId,
    pub created_at: i64,
    pub age_ms: i64,
    pub idle_ms: i64,
    pub files: usize,
    pub size_bytes: u64,
    pub busy: bool,
    pub degraded: bool,
}

/// Disk usage of the whole temp root, measured from the files on disk
#[derive(Debug, Clone, Default, Serialize)]
pub struct TempStats {
    pub total_jobs: usize,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub jobs: Vec<JobStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    /// Job ID or directory that could not be removed
    pub target: String,
    pub error: String,
}

/// Result of `force_cleanup_all` and the startup/shutdown sweeps
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub orphans_removed: usize,
    pub sessions_pruned: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of one reclamation cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub reclaimed: usize,
    pub skipped_busy: usize,
    pub sessions_pruned: usize,
    pub failures: Vec<CleanupFailure>,
}

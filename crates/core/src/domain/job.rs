// Job Domain Model

use super::file::{EntityFile, LabelFile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Every job directory name starts with this prefix
pub const JOB_DIR_PREFIX: &str = "job_";

/// Per-job directory handed to the downstream pipeline for its outputs
pub const OUTPUT_DIR_NAME: &str = "data_output";

/// Job ID: `job_<YYYYMMDD>_<HHhMMmSSs>_<suffix>`
///
/// Opaque to callers. IDs sort lexicographically by creation second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Registry-side state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepting operations
    Active,
    /// Directory deletion in progress; new acquires are refused
    Removing,
    /// Directory deletion failed; kept registered so a retry can finish it
    Degraded,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Active => write!(f, "ACTIVE"),
            JobStatus::Removing => write!(f, "REMOVING"),
            JobStatus::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// Point-in-time snapshot of a registered job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub dir: PathBuf,
    pub created_at: i64,      // epoch ms
    pub last_touched_at: i64, // epoch ms
    pub entity_files: Vec<EntityFile>,
    pub label_file: Option<LabelFile>,
    pub ref_count: usize,
    pub status: JobStatus,
}

impl Job {
    pub fn is_busy(&self) -> bool {
        self.ref_count > 0
    }

    pub fn age_ms(&self, now_millis: i64) -> i64 {
        (now_millis - self.created_at).max(0)
    }

    pub fn idle_ms(&self, now_millis: i64) -> i64 {
        (now_millis - self.last_touched_at).max(0)
    }

    /// Inactive for longer than `expiry_ms`
    pub fn is_expired(&self, now_millis: i64, expiry_ms: i64) -> bool {
        self.idle_ms(now_millis) > expiry_ms
    }

    pub fn file_count(&self) -> usize {
        self.entity_files.len() + usize::from(self.label_file.is_some())
    }

    /// Every file path recorded for this job
    pub fn file_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entity_files
            .iter()
            .map(|f| &f.path)
            .chain(self.label_file.iter().map(|f| &f.path))
    }
}

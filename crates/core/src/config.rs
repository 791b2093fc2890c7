// Lifecycle configuration

use crate::application::constants::{
    DEFAULT_CLEANUP_INTERVAL_MINUTES, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_TEMP_DIR_NAME,
};
use crate::error::{AppError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Recognized options. Every field has a default, so a partial file or a
/// handful of environment variables is enough.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Base path; the temp root lives below it
    pub project_root: PathBuf,

    /// Name of the temp root directory under `project_root`
    pub temp_dir_name: String,

    /// How often the reclamation scheduler wakes up
    pub cleanup_interval_minutes: u64,

    /// Inactivity after which a job expires (defaults to the interval)
    pub job_expiry_minutes: Option<u64>,

    /// How long a forced removal waits for in-flight operations
    pub drain_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            temp_dir_name: DEFAULT_TEMP_DIR_NAME.to_string(),
            cleanup_interval_minutes: DEFAULT_CLEANUP_INTERVAL_MINUTES,
            job_expiry_minutes: None,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl LifecycleConfig {
    /// `<project_root>/<temp_dir_name>`
    pub fn temp_root(&self) -> PathBuf {
        self.project_root.join(&self.temp_dir_name)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_minutes * 60)
    }

    pub fn job_expiry(&self) -> Duration {
        let minutes = self
            .job_expiry_minutes
            .unwrap_or(self.cleanup_interval_minutes);
        Duration::from_secs(minutes * 60)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval_minutes == 0 {
            return Err(AppError::Config(
                "cleanup_interval_minutes must be greater than zero".to_string(),
            ));
        }
        if self.job_expiry_minutes == Some(0) {
            return Err(AppError::Config(
                "job_expiry_minutes must be greater than zero".to_string(),
            ));
        }
        let name = self.temp_dir_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\'][..]) {
            return Err(AppError::Config(format!(
                "temp_dir_name '{}' must be a single directory name",
                name
            )));
        }
        Ok(())
    }
}

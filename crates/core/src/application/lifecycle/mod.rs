// Lifecycle Manager - public façade over registry, sessions and storage

mod cleanup;
mod files;
pub mod report;


pub use report::{CleanupFailure, CleanupReport, JobInfo, JobStats, SweepReport, TempStats};

use super::reclamation::{ReclamationHandle, ReclamationScheduler};
use super::registry::JobRegistry;
use super::session::SessionBinder;
use crate::config::LifecycleConfig;
use crate::domain::job::OUTPUT_DIR_NAME;
use crate::domain::{JobId, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStorage, TimeProvider};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Lifecycle Manager
///
/// Every file operation holds a [`JobLease`](super::registry::JobLease) for
/// its whole duration, so the job cannot be reclaimed underneath it.
pub struct LifecycleManager {
    config: LifecycleConfig,
    registry: Arc<JobRegistry>,
    sessions: SessionBinder,
    storage: Arc<dyn JobStorage>,
    time_provider: Arc<dyn TimeProvider>,
    reclamation_started: AtomicBool,
}

impl LifecycleManager {
    pub fn new(
        config: LifecycleConfig,
        storage: Arc<dyn JobStorage>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(JobRegistry::new(
            config.temp_root(),
            Arc::clone(&storage),
            id_provider,
            Arc::clone(&time_provider),
            config.drain_timeout(),
        ));

        Ok(Self {
            sessions: SessionBinder::new(Arc::clone(&registry)),
            config,
            registry,
            storage,
            time_provider,
            reclamation_started: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    // ========================================================================
    // Jobs & sessions
    // ========================================================================

    /// Job for a session token: same token, same live job
    pub async fn bind_session(&self, session_token: &str) -> Result<JobId> {
        self.sessions.bind(session_token).await
    }

    /// Fresh job not tied to any session
    pub async fn create_job(&self) -> Result<JobId> {
        Ok(self.registry.create_job().await?.id)
    }

    /// Drop session mappings whose job is gone
    pub async fn prune_sessions(&self) -> usize {
        self.sessions.prune().await
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Save `data` as the entity file for `label`, replacing any previous one
    ///
    /// The stored extension comes from `source_filename` (csv, tsv or txt).
    /// Returns the final path `<job_dir>/<label>.<ext>`.
    pub async fn save_entity_file(
        &self,
        job_id: &JobId,
        label: &str,
        source_filename: &str,
        data: &[u8],
    ) -> Result<PathBuf> {
        let lease = self.registry.acquire(job_id)?;
        files::save_entity(
            self.storage.as_ref(),
            self.time_provider.as_ref(),
            &lease,
            label,
            source_filename,
            data,
        )
        .await
    }

    /// Save the job's label file under its original name
    pub async fn save_label_file(
        &self,
        job_id: &JobId,
        data: &[u8],
        original_filename: &str,
    ) -> Result<PathBuf> {
        let lease = self.registry.acquire(job_id)?;
        files::save_label(
            self.storage.as_ref(),
            self.time_provider.as_ref(),
            &lease,
            data,
            original_filename,
        )
        .await
    }

    /// Delete the entity file for `label`. `Ok(false)` if there was none.
    ///
    /// The answer reflects the job's record, not the disk: a recorded file
    /// whose bytes already vanished still yields `Ok(true)`.
    pub async fn delete_uploaded_file(&self, job_id: &JobId, label: &str) -> Result<bool> {
        let lease = self.registry.acquire(job_id)?;
        files::delete_entity(
            self.storage.as_ref(),
            self.time_provider.as_ref(),
            &lease,
            label,
        )
        .await
    }

    /// Delete the label file if it is stored as `filename`. Same `bool`
    /// meaning as [`Self::delete_uploaded_file`].
    pub async fn delete_label_file(&self, job_id: &JobId, filename: &str) -> Result<bool> {
        let lease = self.registry.acquire(job_id)?;
        files::delete_label(
            self.storage.as_ref(),
            self.time_provider.as_ref(),
            &lease,
            filename,
        )
        .await
    }

    /// `<job_dir>/data_output`, created on demand for downstream results
    pub async fn output_dir(&self, job_id: &JobId) -> Result<PathBuf> {
        let lease = self.registry.acquire(job_id)?;
        let dir = lease.dir().join(OUTPUT_DIR_NAME);
        self.storage.create_dir_all(&dir).await?;
        lease.touch(self.time_provider.now_millis());
        Ok(dir)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Recorded state of one job. Reading does not count as activity.
    pub async fn get_job_info(&self, job_id: &JobId) -> Result<JobInfo> {
        let job = self
            .registry
            .get(job_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

        let now = self.time_provider.now_millis();
        let total_size_bytes = job.entity_files.iter().map(|f| f.size).sum::<u64>()
            + job.label_file.as_ref().map_or(0, |f| f.size);

        Ok(JobInfo {
            age_ms: job.age_ms(now),
            id: job.id,
            dir: job.dir,
            created_at: job.created_at,
            last_touched_at: job.last_touched_at,
            status: job.status,
            entity_files: job.entity_files,
            label_file: job.label_file,
            total_size_bytes,
        })
    }

    /// Disk usage per job, measured on disk without holding the registry lock
    ///
    /// Files that disappear between listing and measuring are skipped.
    pub async fn get_stats(&self) -> TempStats {
        let jobs = self.registry.list_jobs().await;
        let now = self.time_provider.now_millis();
        let mut stats = TempStats::default();

        for job in jobs {
            let mut files = 0;
            let mut size_bytes = 0;
            for path in job.file_paths() {
                match self.storage.file_size(path).await {
                    Ok(Some(size)) => {
                        files += 1;
                        size_bytes += size;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(job_id = %job.id, path = %path.display(), error = %e, "Failed to stat file");
                    }
                }
            }

            stats.total_files += files;
            stats.total_size_bytes += size_bytes;
            stats.jobs.push(JobStats {
                id: job.id.clone(),
                created_at: job.created_at,
                age_ms: job.age_ms(now),
                idle_ms: job.idle_ms(now),
                files,
                size_bytes,
                busy: job.is_busy(),
                degraded: job.status == JobStatus::Degraded,
            });
        }

        stats.total_jobs = stats.jobs.len();
        stats
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Remove every job (waiting for in-flight operations to drain) and every
    /// unregistered job directory under the temp root
    ///
    /// Per-job failures end up in the report; `Err` only if the temp root
    /// itself cannot be listed.
    pub async fn force_cleanup_all(&self) -> Result<CleanupReport> {
        let mut report = cleanup::force_remove_all(&self.registry).await?;
        report.sessions_pruned = self.sessions.prune().await;
        Ok(report)
    }

    /// Ensure the temp root exists and clear anything left by an earlier run
    pub async fn startup_sweep(&self) -> Result<CleanupReport> {
        let root = self.config.temp_root();
        self.storage.create_dir_all(&root).await?;
        info!(temp_root = %root.display(), "Running startup sweep");
        self.force_cleanup_all().await
    }

    /// Remove everything before the process exits
    pub async fn shutdown_sweep(&self) -> Result<CleanupReport> {
        info!(jobs = self.registry.len(), "Running shutdown sweep");
        self.force_cleanup_all().await
    }

    /// Spawn the background reclamation scheduler. Only one may run per manager.
    #[must_use = "dropping the handle stops the scheduler and sweeps every job"]
    pub fn start_reclamation(self: &Arc<Self>) -> Result<ReclamationHandle> {
        if self
            .reclamation_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::Conflict(
                "reclamation scheduler already started".to_string(),
            ));
        }
        let scheduler = ReclamationScheduler::new(Arc::clone(self), Arc::clone(&self.time_provider));
        Ok(scheduler.spawn())
    }
}

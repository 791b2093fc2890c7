//! Job Registry - in-memory map of live jobs and their reference counts
//!
//! Locking discipline:
//! - One global `std::sync::Mutex` guards the map structure and every job's
//!   status. It is never held across an `.await`.
//! - `ref_count` is incremented only under the global lock (`acquire`) and
//!   removal checks it for zero under that same lock, then flips the job to
//!   `Removing` so no new acquire can slip in while the directory is deleted.
//! - Releases are lock-free; the 1 -> 0 transition wakes a forced remover
//!   waiting for in-flight operations to drain.
//! - Each job's file records sit behind their own `tokio::sync::Mutex`, held
//!   only while committing or reading records, never by the registry itself.
//!
//! Lock order is always global -> status -> files.

use crate::domain::job::JOB_DIR_PREFIX;
use crate::domain::{EntityFile, Job, JobId, JobStatus, LabelFile};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStorage, TimeProvider};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// File records of one job
#[derive(Debug, Default)]
pub(crate) struct JobFiles {
    pub(crate) entity: BTreeMap<String, EntityFile>,
    pub(crate) label: Option<LabelFile>,
}

/// Registry-side state of one job
pub(crate) struct JobEntry {
    id: JobId,
    dir: PathBuf,
    created_at: i64,
    last_touched_at: AtomicI64,
    ref_count: AtomicUsize,
    status: Mutex<JobStatus>,
    files: tokio::sync::Mutex<JobFiles>,
    drained: Notify,
    /// Woken when a removal leaves `Removing` (done, degraded or rolled back)
    settled: Notify,
}

impl JobEntry {
    fn new(id: JobId, dir: PathBuf, now_millis: i64, initial_refs: usize) -> Self {
        Self {
            id,
            dir,
            created_at: now_millis,
            last_touched_at: AtomicI64::new(now_millis),
            ref_count: AtomicUsize::new(initial_refs),
            status: Mutex::new(JobStatus::Active),
            files: tokio::sync::Mutex::new(JobFiles::default()),
            drained: Notify::new(),
            settled: Notify::new(),
        }
    }

    fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    fn last_touched_at(&self) -> i64 {
        self.last_touched_at.load(Ordering::SeqCst)
    }

    fn touch(&self, now_millis: i64) {
        self.last_touched_at.fetch_max(now_millis, Ordering::SeqCst);
    }

    fn lock_status(&self) -> MutexGuard<'_, JobStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decrement, saturating at zero
    fn release(&self) {
        let previous = self
            .ref_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.drained.notify_waiters();
        }
    }

    async fn snapshot(&self) -> Job {
        let status = *self.lock_status();
        let files = self.files.lock().await;
        Job {
            id: self.id.clone(),
            dir: self.dir.clone(),
            created_at: self.created_at,
            last_touched_at: self.last_touched_at(),
            entity_files: files.entity.values().cloned().collect(),
            label_file: files.label.clone(),
            ref_count: self.ref_count(),
            status,
        }
    }
}

/// One outstanding `acquire`. Dropping the lease releases it, so every exit
/// path of an operation gives the job back.
pub struct JobLease {
    entry: Arc<JobEntry>,
    armed: bool,
}

impl JobLease {
    fn new(entry: Arc<JobEntry>) -> Self {
        Self { entry, armed: true }
    }

    pub fn id(&self) -> &JobId {
        &self.entry.id
    }

    pub fn dir(&self) -> &Path {
        &self.entry.dir
    }

    pub fn created_at(&self) -> i64 {
        self.entry.created_at
    }

    pub fn last_touched_at(&self) -> i64 {
        self.entry.last_touched_at()
    }

    pub fn touch(&self, now_millis: i64) {
        self.entry.touch(now_millis);
    }

    /// Keep the reference past this guard; pair with [`JobRegistry::release`]
    pub fn detach(mut self) -> JobId {
        self.armed = false;
        self.entry.id.clone()
    }

    pub(crate) async fn files(&self) -> tokio::sync::MutexGuard<'_, JobFiles> {
        self.entry.files.lock().await
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        if self.armed {
            self.entry.release();
        }
    }
}

/// Outcome of removing job directories that have no registry entry
#[derive(Debug, Default)]
pub struct OrphanPurge {
    pub removed: usize,
    pub failures: Vec<(PathBuf, String)>,
}

/// Process-wide job registry
///
/// Empty when constructed; the lifecycle manager purges leftover directories
/// from earlier runs at startup and empties the registry again at shutdown.
pub struct JobRegistry {
    root: PathBuf,
    jobs: Mutex<HashMap<JobId, Arc<JobEntry>>>,
    storage: Arc<dyn JobStorage>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    drain_timeout: Duration,
}

impl JobRegistry {
    pub fn new(
        root: impl Into<PathBuf>,
        storage: Arc<dyn JobStorage>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            jobs: Mutex::new(HashMap::new()),
            storage,
            id_provider,
            time_provider,
            drain_timeout,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobEntry>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries(&self) -> Vec<Arc<JobEntry>> {
        self.jobs().values().cloned().collect()
    }

    fn set_status(&self, entry: &JobEntry, status: JobStatus) {
        {
            let _jobs = self.jobs();
            *entry.lock_status() = status;
        }
        entry.settled.notify_waiters();
    }

    fn is_registered(&self, entry: &JobEntry) -> bool {
        self.jobs()
            .get(&entry.id)
            .is_some_and(|current| std::ptr::eq(current.as_ref(), entry))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.jobs().contains_key(job_id)
    }

    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.jobs().get(job_id).map(|e| *e.lock_status())
    }

    /// Create a job directory and register it with `ref_count = 0`
    ///
    /// The entry is registered (holding one reference) before the directory
    /// is created, so an orphan sweep never mistakes the new directory for a
    /// leftover and a forced removal waits for creation to finish.
    pub async fn create_job(&self) -> Result<Job> {
        let id = self.id_provider.generate_id();
        let dir = self.root.join(id.as_str());
        let now = self.time_provider.now_millis();
        let entry = Arc::new(JobEntry::new(id.clone(), dir.clone(), now, 1));

        {
            let mut jobs = self.jobs();
            if jobs.contains_key(&id) {
                return Err(AppError::Internal(format!("duplicate job id {}", id)));
            }
            jobs.insert(id.clone(), Arc::clone(&entry));
        }
        let lease = JobLease::new(Arc::clone(&entry));

        if let Err(e) = self.storage.create_dir_all(&dir).await {
            self.jobs().remove(&id);
            warn!(job_id = %id, error = %e, "Failed to create job directory");
            return Err(e);
        }

        drop(lease);
        info!(job_id = %id, dir = %dir.display(), "Job created");
        Ok(entry.snapshot().await)
    }

    /// Take a reference on a job; it cannot be removed until the lease drops
    pub fn acquire(&self, job_id: &JobId) -> Result<JobLease> {
        let jobs = self.jobs();
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

        match *entry.lock_status() {
            JobStatus::Active => {}
            JobStatus::Removing => {
                return Err(AppError::NotFound(format!(
                    "job {} is being removed",
                    job_id
                )))
            }
            JobStatus::Degraded => {
                return Err(AppError::Degraded {
                    job_id: job_id.to_string(),
                    reason: "awaiting cleanup retry".to_string(),
                })
            }
        }

        entry.ref_count.fetch_add(1, Ordering::SeqCst);
        Ok(JobLease::new(Arc::clone(entry)))
    }

    /// Drop one reference taken by a detached lease. Never goes below zero;
    /// unknown jobs are ignored.
    pub fn release(&self, job_id: &JobId) {
        let entry = self.jobs().get(job_id).cloned();
        if let Some(entry) = entry {
            entry.release();
        }
    }

    /// Refresh `last_touched_at`. False if the job is gone or not active.
    pub fn touch(&self, job_id: &JobId) -> bool {
        let jobs = self.jobs();
        match jobs.get(job_id) {
            Some(entry) if *entry.lock_status() == JobStatus::Active => {
                entry.touch(self.time_provider.now_millis());
                true
            }
            _ => false,
        }
    }

    /// Snapshot of one job, whatever its status
    pub async fn get(&self, job_id: &JobId) -> Option<Job> {
        let entry = self.jobs().get(job_id).cloned()?;
        Some(entry.snapshot().await)
    }

    /// All jobs ordered by creation time
    pub async fn list_jobs(&self) -> Vec<Job> {
        let entries = self.entries();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.snapshot().await);
        }
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs
    }

    /// Delete a job's directory and registry entry
    ///
    /// Without `force`, a job with operations in flight is refused with
    /// `Busy`. With `force`, new operations are refused immediately and the
    /// call waits up to the drain timeout for in-flight ones to finish.
    /// A forced call that finds another removal under way waits for it
    /// instead: `Ok` once the job is gone, or it takes over if that removal
    /// left the job `Degraded` or rolled it back.
    /// A failed directory deletion leaves the job registered as `Degraded`.
    pub async fn remove_job(&self, job_id: &JobId, force: bool) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        let mut waited = false;
        loop {
            match self.begin_removal(job_id, force, None) {
                Ok((entry, previous)) => return self.finish_removal(entry, previous, force).await,
                // The removal we waited on finished the job
                Err(AppError::NotFound(_)) if waited => return Ok(()),
                // With force, begin_removal only refuses a job already being removed
                Err(AppError::Busy(_)) if force => {
                    let entry = self.jobs().get(job_id).cloned();
                    if let Some(entry) = entry {
                        debug!(job_id = %job_id, "Waiting for removal already in progress");
                        self.wait_for_settle(&entry, deadline).await?;
                    }
                    waited = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Non-forced removal that only proceeds if the job has not been touched
    /// since `idle_before`. Returns false if it was touched in the meantime.
    pub async fn reclaim_expired(&self, job_id: &JobId, idle_before: i64) -> Result<bool> {
        let (entry, previous) = match self.begin_removal(job_id, false, Some(idle_before)) {
            Ok(started) => started,
            Err(AppError::Conflict(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        self.finish_removal(entry, previous, false).await.map(|_| true)
    }

    fn begin_removal(
        &self,
        job_id: &JobId,
        force: bool,
        idle_before: Option<i64>,
    ) -> Result<(Arc<JobEntry>, JobStatus)> {
        let jobs = self.jobs();
        let entry = jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

        let mut status = entry.lock_status();
        let previous = *status;
        if previous == JobStatus::Removing {
            return Err(AppError::Busy(format!(
                "job {} is already being removed",
                job_id
            )));
        }

        let in_flight = entry.ref_count();
        if in_flight > 0 && !force {
            return Err(AppError::Busy(format!(
                "job {} has {} operation(s) in flight",
                job_id, in_flight
            )));
        }

        if let Some(cutoff) = idle_before {
            if previous == JobStatus::Active && entry.last_touched_at() >= cutoff {
                return Err(AppError::Conflict(format!(
                    "job {} was touched since the sweep started",
                    job_id
                )));
            }
        }

        *status = JobStatus::Removing;
        drop(status);
        Ok((entry, previous))
    }

    async fn finish_removal(
        &self,
        entry: Arc<JobEntry>,
        previous: JobStatus,
        force: bool,
    ) -> Result<()> {
        if force {
            if let Err(e) = self.wait_for_drain(&entry).await {
                self.set_status(&entry, previous);
                return Err(e);
            }
        }

        match self.storage.remove_dir_all(&entry.dir).await {
            Ok(()) => {
                self.jobs().remove(&entry.id);
                entry.settled.notify_waiters();
                info!(job_id = %entry.id, forced = force, "Job removed");
                Ok(())
            }
            Err(e) => {
                self.set_status(&entry, JobStatus::Degraded);
                warn!(
                    job_id = %entry.id,
                    error = %e,
                    "Job directory deletion failed, job kept as degraded"
                );
                Err(AppError::Degraded {
                    job_id: entry.id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn wait_for_drain(&self, entry: &JobEntry) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        loop {
            let drained = entry.drained.notified();
            let in_flight = entry.ref_count();
            if in_flight == 0 {
                return Ok(());
            }
            debug!(job_id = %entry.id, in_flight, "Waiting for in-flight operations");
            if tokio::time::timeout_at(deadline, drained).await.is_err() && entry.ref_count() > 0 {
                return Err(AppError::Busy(format!(
                    "job {} still has {} operation(s) in flight after {:?}",
                    entry.id,
                    entry.ref_count(),
                    self.drain_timeout
                )));
            }
        }
    }

    /// Wait until another task's removal of `entry` completes or gives up
    async fn wait_for_settle(
        &self,
        entry: &JobEntry,
        deadline: tokio::time::Instant,
    ) -> Result<()> {
        let settled = entry.settled.notified();
        tokio::pin!(settled);
        settled.as_mut().enable();

        let removing = *entry.lock_status() == JobStatus::Removing;
        if !removing || !self.is_registered(entry) {
            return Ok(());
        }
        tokio::time::timeout_at(deadline, settled)
            .await
            .map_err(|_| {
                AppError::Busy(format!(
                    "job {} is still being removed after {:?}",
                    entry.id, self.drain_timeout
                ))
            })
    }

    /// Delete `job_*` directories under the root that have no registry entry
    /// (leftovers from an earlier process, or a degraded job already dropped)
    pub async fn purge_unregistered_dirs(&self) -> Result<OrphanPurge> {
        let dirs = self.storage.list_dirs(&self.root, JOB_DIR_PREFIX).await?;
        let mut purge = OrphanPurge::default();

        for dir in dirs {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.contains(&JobId::new(name)) {
                continue;
            }
            match self.storage.remove_dir_all(&dir).await {
                Ok(()) => {
                    info!(dir = %dir.display(), "Removed unregistered job directory");
                    purge.removed += 1;
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to remove unregistered job directory");
                    purge.failures.push((dir, e.to_string()));
                }
            }
        }

        Ok(purge)
    }
}

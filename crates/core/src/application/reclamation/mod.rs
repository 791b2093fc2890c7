// Reclamation Scheduler - periodic deletion of expired, idle jobs

pub mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use super::lifecycle::{CleanupFailure, LifecycleManager, SweepReport};
use crate::domain::JobStatus;
use crate::error::{AppError, Result};
use crate::port::TimeProvider;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Snapshot of the scheduler's progress
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub expiry_secs: u64,
    pub cycles_completed: u64,
    pub last_cycle_at: Option<i64>, // epoch ms
    pub last_report: Option<SweepReport>,
}

type SharedStatus = Arc<Mutex<SchedulerStatus>>;

fn lock_status(state: &SharedStatus) -> MutexGuard<'_, SchedulerStatus> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reclamation scheduler
///
/// Wakes every `cleanup_interval`, removes jobs idle for longer than the
/// expiry that have no operation in flight, and retries degraded jobs.
/// On shutdown it runs the lifecycle manager's shutdown sweep.
pub struct ReclamationScheduler {
    manager: Arc<LifecycleManager>,
    time_provider: Arc<dyn TimeProvider>,
    interval: Duration,
    expiry: Duration,
    state: SharedStatus,
}

impl ReclamationScheduler {
    pub fn new(manager: Arc<LifecycleManager>, time_provider: Arc<dyn TimeProvider>) -> Self {
        let interval = manager.config().cleanup_interval();
        let expiry = manager.config().job_expiry();
        Self {
            manager,
            time_provider,
            interval,
            expiry,
            state: Arc::new(Mutex::new(SchedulerStatus {
                interval_secs: interval.as_secs(),
                expiry_secs: expiry.as_secs(),
                ..Default::default()
            })),
        }
    }

    /// Override the tick period (expiry stays as configured)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        lock_status(&self.state).interval_secs = interval.as_secs();
        self
    }

    pub fn status(&self) -> SchedulerStatus {
        lock_status(&self.state).clone()
    }

    /// One reclamation pass. Never fails; per-job errors are logged and
    /// reported.
    pub async fn run_cycle(&self) -> SweepReport {
        let registry = self.manager.registry();
        let now = self.time_provider.now_millis();
        let expiry_ms = i64::try_from(self.expiry.as_millis()).unwrap_or(i64::MAX);
        let idle_before = now.saturating_sub(expiry_ms);

        let jobs = registry.list_jobs().await;
        let mut report = SweepReport {
            scanned: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            if job.is_busy() {
                debug!(job_id = %job.id, ref_count = job.ref_count, "Skipping busy job");
                report.skipped_busy += 1;
                continue;
            }

            let outcome = match job.status {
                JobStatus::Degraded => registry.remove_job(&job.id, false).await.map(|_| true),
                JobStatus::Active if job.is_expired(now, expiry_ms) => {
                    registry.reclaim_expired(&job.id, idle_before).await
                }
                _ => continue,
            };

            match outcome {
                Ok(true) => {
                    info!(job_id = %job.id, idle_ms = job.idle_ms(now), "Reclaimed job");
                    report.reclaimed += 1;
                }
                // Touched again since the listing
                Ok(false) => {}
                Err(AppError::Busy(_)) => report.skipped_busy += 1,
                Err(AppError::NotFound(_)) => {}
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to reclaim job");
                    report.failures.push(CleanupFailure {
                        target: job.id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.sessions_pruned = self.manager.prune_sessions().await;

        let mut state = lock_status(&self.state);
        state.cycles_completed += 1;
        state.last_cycle_at = Some(now);
        state.last_report = Some(report.clone());
        drop(state);

        report
    }

    /// Run the reclamation loop until `shutdown` fires, then run the
    /// shutdown sweep
    ///
    /// The first cycle runs one interval after start.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            expiry_secs = self.expiry.as_secs(),
            "Reclamation scheduler started"
        );
        lock_status(&self.state).running = true;

        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let report = self.run_cycle().await;
                    if report.reclaimed > 0 || !report.failures.is_empty() {
                        info!(
                            scanned = report.scanned,
                            reclaimed = report.reclaimed,
                            skipped_busy = report.skipped_busy,
                            failures = report.failures.len(),
                            "Reclamation cycle completed"
                        );
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        info!("Reclamation scheduler stopping");
        match self.manager.shutdown_sweep().await {
            Ok(report) if report.is_clean() => {}
            Ok(report) => {
                warn!(failures = report.failures.len(), "Shutdown sweep left jobs behind");
            }
            Err(e) => error!(error = %e, "Shutdown sweep failed"),
        }
        lock_status(&self.state).running = false;
    }

    /// Spawn the loop on the tokio runtime
    pub fn spawn(self) -> ReclamationHandle {
        let (sender, token) = shutdown_channel();
        let state = Arc::clone(&self.state);
        lock_status(&state).running = true;
        let join = tokio::spawn(self.run(token));
        ReclamationHandle {
            sender,
            join,
            state,
        }
    }
}

/// Handle to a spawned scheduler
///
/// Dropping it closes the shutdown channel, which stops the loop and runs the
/// shutdown sweep; keep it alive for as long as jobs should survive.
#[must_use = "dropping the handle stops the scheduler and sweeps every job"]
pub struct ReclamationHandle {
    sender: ShutdownSender,
    join: JoinHandle<()>,
    state: SharedStatus,
}

impl ReclamationHandle {
    pub fn status(&self) -> SchedulerStatus {
        lock_status(&self.state).clone()
    }

    /// Signal shutdown and wait for the loop (and its shutdown sweep) to end
    pub async fn shutdown(self) -> Result<()> {
        self.sender.signal();
        self.join
            .await
            .map_err(|e| AppError::Internal(format!("reclamation task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_storage::mocks::MemoryJobStorage;
    use crate::port::time_provider::mocks::ManualClock;

    const MINUTE: Duration = Duration::from_secs(60);

    struct Fixture {
        manager: Arc<LifecycleManager>,
        storage: Arc<MemoryJobStorage>,
        clock: Arc<ManualClock>,
    }

    fn setup() -> Fixture {
        let storage = Arc::new(MemoryJobStorage::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = LifecycleConfig {
            project_root: "/srv/app".into(),
            cleanup_interval_minutes: 30,
            ..Default::default()
        };
        let manager = LifecycleManager::new(
            config,
            storage.clone(),
            Arc::new(SequentialIdProvider::new()),
            clock.clone(),
        )
        .unwrap();
        Fixture {
            manager: Arc::new(manager),
            storage,
            clock,
        }
    }

    fn scheduler(f: &Fixture) -> ReclamationScheduler {
        ReclamationScheduler::new(f.manager.clone(), f.clock.clone())
    }

    #[tokio::test]
    async fn test_cycle_reclaims_only_expired_jobs() {
        let f = setup();
        let old = f.manager.create_job().await.unwrap();
        f.clock.advance(20 * MINUTE);
        let fresh = f.manager.create_job().await.unwrap();
        f.clock.advance(11 * MINUTE);

        let report = scheduler(&f).run_cycle().await;

        assert_eq!(report.scanned, 2);
        assert_eq!(report.reclaimed, 1);
        assert!(!f.manager.registry().contains(&old));
        assert!(f.manager.registry().contains(&fresh));
    }

    #[tokio::test]
    async fn test_cycle_never_reclaims_leased_job() {
        let f = setup();
        let job = f.manager.create_job().await.unwrap();
        let lease = f.manager.registry().acquire(&job).unwrap();
        f.clock.advance(120 * MINUTE);

        let scheduler = scheduler(&f);
        let report = scheduler.run_cycle().await;
        assert_eq!(report.skipped_busy, 1);
        assert_eq!(report.reclaimed, 0);
        assert!(f.manager.registry().contains(&job));

        drop(lease);
        let report = scheduler.run_cycle().await;
        assert_eq!(report.reclaimed, 1);
        assert!(f.manager.registry().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_retries_degraded_job() {
        let f = setup();
        let job = f.manager.create_job().await.unwrap();
        let dir = f.manager.registry().get(&job).await.unwrap().dir;
        f.storage.fail_remove_dir(&dir);
        f.clock.advance(31 * MINUTE);

        let scheduler = scheduler(&f);
        let first = scheduler.run_cycle().await;
        assert_eq!(first.failures.len(), 1);
        assert_eq!(f.manager.registry().status(&job), Some(JobStatus::Degraded));

        f.storage.clear_failures();
        let second = scheduler.run_cycle().await;
        assert_eq!(second.reclaimed, 1);
        assert!(second.failures.is_empty());
        assert!(!f.storage.dir_exists(&dir));
        assert_eq!(scheduler.status().cycles_completed, 2);
    }

    #[tokio::test]
    async fn test_cycle_prunes_sessions_of_reclaimed_jobs() {
        let f = setup();
        f.manager.bind_session("s1").await.unwrap();
        f.clock.advance(31 * MINUTE);

        let report = scheduler(&f).run_cycle().await;

        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.sessions_pruned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_scheduler_ticks_and_sweeps_on_shutdown() {
        let f = setup();
        let expired = f.manager.create_job().await.unwrap();
        f.clock.advance(31 * MINUTE);

        let handle = f.manager.start_reclamation().unwrap();
        assert!(handle.status().running);

        // Nothing happens before the first interval has elapsed
        tokio::time::sleep(29 * MINUTE).await;
        assert!(f.manager.registry().contains(&expired));

        while handle.status().cycles_completed == 0 {
            tokio::time::sleep(MINUTE).await;
        }
        assert!(!f.manager.registry().contains(&expired));

        let pending = f.manager.create_job().await.unwrap();
        handle.shutdown().await.unwrap();
        assert!(!f.manager.registry().contains(&pending));
        assert!(f.manager.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_stops_scheduler_and_sweeps() {
        let f = setup();
        let job = f.manager.create_job().await.unwrap();

        let handle = f.manager.start_reclamation().unwrap();
        let state = Arc::clone(&handle.state);
        drop(handle);

        while lock_status(&state).running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!f.manager.registry().contains(&job));
    }

    #[tokio::test]
    async fn test_start_reclamation_only_once() {
        let f = setup();
        let handle = f.manager.start_reclamation().unwrap();

        assert!(matches!(
            f.manager.start_reclamation(),
            Err(AppError::Conflict(_))
        ));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_interval_overrides_tick_period() {
        let f = setup();
        let scheduler = scheduler(&f).with_interval(Duration::from_secs(5));
        assert_eq!(scheduler.status().interval_secs, 5);
        assert_eq!(scheduler.status().expiry_secs, 30 * 60);

        let handle = scheduler.spawn();
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(handle.status().cycles_completed >= 3);
        handle.shutdown().await.unwrap();
    }
}

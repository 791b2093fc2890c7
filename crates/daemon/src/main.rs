//! Jobspace Daemon - Main Entry Point
//! Owns the temp root: startup sweep, background reclamation, shutdown sweep

mod logging;
mod settings;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// Import workspace crates
use jobspace_core::application::constants::SHUTDOWN_JOIN_TIMEOUT;
use jobspace_core::application::CleanupReport;
use jobspace_core::port::{SystemTimeProvider, TimestampIdProvider};
use jobspace_core::{LifecycleManager, ReclamationHandle};
use jobspace_infra_fs::FsJobStorage;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn log_sweep(stage: &str, report: &CleanupReport) {
    if report.is_clean() {
        info!(
            stage,
            removed = report.removed,
            orphans_removed = report.orphans_removed,
            "Sweep completed"
        );
    } else {
        for failure in &report.failures {
            warn!(stage, entry = %failure.target, error = %failure.error, "Sweep left an entry behind");
        }
    }
}

/// Stop the scheduler and make sure the shutdown sweep has run
///
/// If the scheduler fails or does not finish within `join_timeout`, the sweep
/// runs here instead. Removals already in progress are waited on, not
/// repeated.
async fn stop_reclamation(
    manager: &LifecycleManager,
    reclamation: ReclamationHandle,
    join_timeout: Duration,
) -> Result<()> {
    match tokio::time::timeout(join_timeout, reclamation.shutdown()).await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "Reclamation scheduler failed; sweeping directly");
        }
        Err(_) => warn!(
            timeout_secs = join_timeout.as_secs(),
            "Reclamation scheduler did not stop in time; sweeping directly"
        ),
    }
    let report = manager.shutdown_sweep().await?;
    log_sweep("shutdown", &report);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let _log_guard = logging::init_tracing()?;

    info!("Jobspace daemon v{} starting...", VERSION);

    // 2. Load configuration
    let config = settings::load()?;
    info!(
        temp_root = %config.temp_root().display(),
        cleanup_interval_minutes = config.cleanup_interval_minutes,
        job_expiry_secs = config.job_expiry().as_secs(),
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(TimestampIdProvider::new(time_provider.clone()));
    let storage = Arc::new(FsJobStorage::new());

    let manager = Arc::new(LifecycleManager::new(
        config,
        storage,
        id_provider,
        time_provider,
    )?);

    // 4. Clear whatever an earlier run left behind
    let report = manager.startup_sweep().await?;
    log_sweep("startup", &report);

    // 5. Start background reclamation
    let reclamation = manager.start_reclamation()?;

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: the scheduler runs the shutdown sweep on exit
    stop_reclamation(&manager, reclamation, SHUTDOWN_JOIN_TIMEOUT).await?;

    info!(remaining_jobs = manager.registry().len(), "Shutdown complete.");

    Ok(())
}

// Forced cleanup of every job plus leftover directories

use super::report::{CleanupFailure, CleanupReport};
use crate::application::registry::JobRegistry;
use crate::error::{AppError, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Force-remove all registered jobs concurrently, then purge unregistered
/// `job_*` directories. Per-job failures are collected, not returned.
pub(super) async fn force_remove_all(registry: &Arc<JobRegistry>) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();

    let mut removals = JoinSet::new();
    for job in registry.list_jobs().await {
        let registry = Arc::clone(registry);
        removals.spawn(async move {
            let outcome = registry.remove_job(&job.id, true).await;
            (job.id, outcome)
        });
    }

    while let Some(joined) = removals.join_next().await {
        match joined {
            Ok((_, Ok(()))) => report.removed += 1,
            // Removed by someone else in the meantime
            Ok((_, Err(AppError::NotFound(_)))) => {}
            Ok((job_id, Err(e))) => {
                error!(job_id = %job_id, error = %e, "Forced job removal failed");
                report.failures.push(CleanupFailure {
                    target: job_id.to_string(),
                    error: e.to_string(),
                });
            }
            Err(e) => {
                error!(error = %e, "Removal task failed");
                report.failures.push(CleanupFailure {
                    target: "<removal task>".to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let purge = registry.purge_unregistered_dirs().await?;
    report.orphans_removed = purge.removed;
    report
        .failures
        .extend(purge.failures.into_iter().map(|(dir, error)| CleanupFailure {
            target: dir.display().to_string(),
            error,
        }));

    info!(
        removed = report.removed,
        orphans_removed = report.orphans_removed,
        failures = report.failures.len(),
        "Forced cleanup finished"
    );
    Ok(report)
}

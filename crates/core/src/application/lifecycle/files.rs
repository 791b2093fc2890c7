// File use cases: stage outside the lock, commit under the per-job lock

use crate::application::registry::{JobFiles, JobLease};
use crate::domain::file::{entity_file_name, validate_filename, validate_label};
use crate::domain::{DomainError, EntityFile, FileFormat, LabelFile};
use crate::error::Result;
use crate::port::{JobStorage, StagedFile, TimeProvider};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Entity file names and the label file name share one namespace
fn name_taken_by_entity(files: &JobFiles, name: &str) -> bool {
    files.entity.values().any(|f| f.file_name() == name)
}

/// Rename the staged file into place; the staged copy is discarded on any error
async fn commit_or_discard(
    storage: &dyn JobStorage,
    staged: &StagedFile,
    dest: &Path,
    collision: Option<DomainError>,
) -> Result<()> {
    let outcome = match collision {
        Some(e) => Err(e.into()),
        None => storage.commit_file(staged, dest).await,
    };
    if outcome.is_err() {
        storage.discard_file(staged).await;
    }
    outcome
}

/// A replaced record pointed at another file; leaving it would be stale
async fn remove_replaced(storage: &dyn JobStorage, lease: &JobLease, old: &Path) {
    if let Err(e) = storage.remove_file(old).await {
        warn!(
            job_id = %lease.id(),
            path = %old.display(),
            error = %e,
            "Failed to remove replaced file; it will go with the job directory"
        );
    }
}

pub(super) async fn save_entity(
    storage: &dyn JobStorage,
    time: &dyn TimeProvider,
    lease: &JobLease,
    label: &str,
    source_filename: &str,
    data: &[u8],
) -> Result<PathBuf> {
    validate_label(label)?;
    let format = FileFormat::from_filename(source_filename)?;
    let name = entity_file_name(label, format);
    let dest = lease.dir().join(&name);

    let staged = storage.stage_file(lease.dir(), data).await?;

    let mut files = lease.files().await;
    let collision = files
        .label
        .as_ref()
        .filter(|l| l.original_filename == name)
        .map(|_| DomainError::NameCollision(name.clone()));
    commit_or_discard(storage, &staged, &dest, collision).await?;

    let now = time.now_millis();
    let previous = files.entity.insert(
        label.to_string(),
        EntityFile {
            label: label.to_string(),
            format,
            path: dest.clone(),
            size: staged.size,
            saved_at: now,
        },
    );
    if let Some(old) = previous.filter(|old| old.path != dest) {
        remove_replaced(storage, lease, &old.path).await;
    }
    lease.touch(now);

    debug!(
        job_id = %lease.id(),
        label,
        format = %format,
        size = staged.size,
        "Entity file saved"
    );
    Ok(dest)
}

pub(super) async fn save_label(
    storage: &dyn JobStorage,
    time: &dyn TimeProvider,
    lease: &JobLease,
    data: &[u8],
    original_filename: &str,
) -> Result<PathBuf> {
    validate_filename(original_filename)?;
    let dest = lease.dir().join(original_filename);

    let staged = storage.stage_file(lease.dir(), data).await?;

    let mut files = lease.files().await;
    let collision = name_taken_by_entity(&files, original_filename)
        .then(|| DomainError::NameCollision(original_filename.to_string()));
    commit_or_discard(storage, &staged, &dest, collision).await?;

    let now = time.now_millis();
    let previous = files.label.replace(LabelFile {
        original_filename: original_filename.to_string(),
        path: dest.clone(),
        size: staged.size,
        saved_at: now,
    });
    if let Some(old) = previous.filter(|old| old.path != dest) {
        remove_replaced(storage, lease, &old.path).await;
    }
    lease.touch(now);

    debug!(
        job_id = %lease.id(),
        filename = original_filename,
        size = staged.size,
        "Label file saved"
    );
    Ok(dest)
}

pub(super) async fn delete_entity(
    storage: &dyn JobStorage,
    time: &dyn TimeProvider,
    lease: &JobLease,
    label: &str,
) -> Result<bool> {
    let mut files = lease.files().await;
    let Some(record) = files.entity.remove(label) else {
        return Ok(false);
    };

    match storage.remove_file(&record.path).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(job_id = %lease.id(), label, path = %record.path.display(), "Entity file was already gone from disk");
        }
        Err(e) => {
            files.entity.insert(label.to_string(), record);
            return Err(e);
        }
    }
    lease.touch(time.now_millis());

    debug!(job_id = %lease.id(), label, "Entity file deleted");
    Ok(true)
}

pub(super) async fn delete_label(
    storage: &dyn JobStorage,
    time: &dyn TimeProvider,
    lease: &JobLease,
    filename: &str,
) -> Result<bool> {
    let mut files = lease.files().await;
    let matches = files
        .label
        .as_ref()
        .is_some_and(|l| l.original_filename == filename);
    if !matches {
        return Ok(false);
    }
    let Some(record) = files.label.take() else {
        return Ok(false);
    };

    match storage.remove_file(&record.path).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(job_id = %lease.id(), path = %record.path.display(), "Label file was already gone from disk");
        }
        Err(e) => {
            files.label = Some(record);
            return Err(e);
        }
    }
    lease.touch(time.now_millis());

    debug!(job_id = %lease.id(), filename, "Label file deleted");
    Ok(true)
}

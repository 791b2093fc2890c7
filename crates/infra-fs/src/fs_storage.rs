// Filesystem JobStorage (tokio::fs)

use async_trait::async_trait;
use jobspace_core::error::{AppError, Result};
use jobspace_core::port::job_storage::staging_path;
use jobspace_core::port::{JobStorage, StagedFile};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Job directories on the local filesystem
///
/// Staged files are written next to their destination so the commit is a
/// same-directory `rename`, which replaces any existing file atomically.
#[derive(Debug, Default, Clone)]
pub struct FsJobStorage;

impl FsJobStorage {
    pub fn new() -> Self {
        Self
    }
}

async fn write_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.sync_all().await
}

#[async_trait]
impl JobStorage for FsJobStorage {
    async fn create_dir_all(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::storage(dir, e))
    }

    async fn remove_dir_all(&self, dir: &Path) -> Result<()> {
        match fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Directory already gone");
                Ok(())
            }
            Err(e) => Err(AppError::storage(dir, e)),
        }
    }

    async fn stage_file(&self, dir: &Path, data: &[u8]) -> Result<StagedFile> {
        let path = staging_path(dir);
        if let Err(e) = write_new_file(&path, data).await {
            // Partial staging files must not outlive the failed write
            let _ = fs::remove_file(&path).await;
            return Err(AppError::storage(path, e));
        }
        Ok(StagedFile {
            path,
            size: data.len() as u64,
        })
    }

    async fn commit_file(&self, staged: &StagedFile, dest: &Path) -> Result<()> {
        fs::rename(&staged.path, dest)
            .await
            .map_err(|e| AppError::storage(dest, e))
    }

    async fn discard_file(&self, staged: &StagedFile) {
        match fs::remove_file(&staged.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %staged.path.display(), error = %e, "Failed to discard staged file");
            }
        }
    }

    async fn remove_file(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::storage(path, e)),
        }
    }

    async fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::storage(path, e)),
        }
    }

    async fn list_dirs(&self, root: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::storage(root, e)),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::storage(root, e))?
        {
            let is_match = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix));
            if !is_match {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => dirs.push(entry.path()),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to read entry type");
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

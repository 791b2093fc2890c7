// Job Storage Port (directory and file operations behind the registry)

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Bytes written to a hidden file in the job directory, not yet visible
/// under their final name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Hidden per-upload path inside `dir`. Never collides with entity or label
/// file names, which cannot start with a dot.
pub fn staging_path(dir: &Path) -> PathBuf {
    dir.join(format!(".upload-{}.part", uuid::Uuid::new_v4().simple()))
}

/// Storage interface for job directories
#[async_trait]
pub trait JobStorage: Send + Sync {
    /// Create a directory (and missing parents). Existing is fine.
    async fn create_dir_all(&self, dir: &Path) -> Result<()>;

    /// Recursively delete a directory. Already absent counts as success.
    async fn remove_dir_all(&self, dir: &Path) -> Result<()>;

    /// Write `data` to a fresh staging file inside `dir`
    async fn stage_file(&self, dir: &Path, data: &[u8]) -> Result<StagedFile>;

    /// Atomically move a staged file to `dest`, replacing any existing file
    async fn commit_file(&self, staged: &StagedFile, dest: &Path) -> Result<()>;

    /// Best-effort removal of a staged file that will not be committed
    async fn discard_file(&self, staged: &StagedFile);

    /// Delete a file. `Ok(false)` if it did not exist.
    async fn remove_file(&self, path: &Path) -> Result<bool>;

    /// Size in bytes, `None` if the file does not exist
    async fn file_size(&self, path: &Path) -> Result<Option<u64>>;

    /// Directories directly under `root` whose name starts with `prefix`.
    /// A missing root yields an empty list.
    async fn list_dirs(&self, root: &Path, prefix: &str) -> Result<Vec<PathBuf>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::{BTreeMap, BTreeSet, HashSet};
    use std::io;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryState {
        dirs: BTreeSet<PathBuf>,
        files: BTreeMap<PathBuf, Vec<u8>>,
        fail_remove_dir: HashSet<PathBuf>,
        fail_create: bool,
        fail_writes: bool,
        create_delay: Option<Duration>,
        remove_delay: Option<Duration>,
    }

    /// In-memory storage with failure injection
    #[derive(Default)]
    pub struct MemoryJobStorage {
        state: Mutex<MemoryState>,
    }

    fn io_err(kind: io::ErrorKind, msg: &str) -> io::Error {
        io::Error::new(kind, msg.to_string())
    }

    impl MemoryJobStorage {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, MemoryState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
            self.state().files.get(path).cloned()
        }

        pub fn dir_exists(&self, dir: &Path) -> bool {
            self.state().dirs.contains(dir)
        }

        /// Files (staged ones included) anywhere below `dir`
        pub fn files_under(&self, dir: &Path) -> Vec<PathBuf> {
            self.state()
                .files
                .keys()
                .filter(|p| p.starts_with(dir))
                .cloned()
                .collect()
        }

        pub fn bytes_under(&self, dir: &Path) -> u64 {
            self.state()
                .files
                .iter()
                .filter(|(p, _)| p.starts_with(dir))
                .map(|(_, data)| data.len() as u64)
                .sum()
        }

        /// Make `remove_dir_all(dir)` fail after deleting the files inside
        pub fn fail_remove_dir(&self, dir: &Path) {
            self.state().fail_remove_dir.insert(dir.to_path_buf());
        }

        pub fn set_fail_create(&self, fail: bool) {
            self.state().fail_create = fail;
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.state().fail_writes = fail;
        }

        /// Make every `create_dir_all` sleep before touching the store
        pub fn set_create_delay(&self, delay: Duration) {
            self.state().create_delay = Some(delay);
        }

        /// Make every `remove_dir_all` sleep before touching the store
        pub fn set_remove_delay(&self, delay: Duration) {
            self.state().remove_delay = Some(delay);
        }

        pub fn clear_failures(&self) {
            let mut state = self.state();
            state.fail_remove_dir.clear();
            state.fail_create = false;
            state.fail_writes = false;
        }

        /// Put a file straight into the store (e.g. to fake a leftover)
        pub fn insert_file(&self, path: &Path, data: &[u8]) {
            self.state().files.insert(path.to_path_buf(), data.to_vec());
        }

        /// Remove a file behind the registry's back
        pub fn vanish(&self, path: &Path) {
            self.state().files.remove(path);
        }
    }

    #[async_trait]
    impl JobStorage for MemoryJobStorage {
        async fn create_dir_all(&self, dir: &Path) -> Result<()> {
            let delay = self.state().create_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state();
            if state.fail_create {
                return Err(AppError::storage(
                    dir,
                    io_err(io::ErrorKind::PermissionDenied, "create refused"),
                ));
            }
            state.dirs.insert(dir.to_path_buf());
            Ok(())
        }

        async fn remove_dir_all(&self, dir: &Path) -> Result<()> {
            let delay = self.state().remove_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state();
            state.files.retain(|p, _| !p.starts_with(dir));
            if state.fail_remove_dir.contains(dir) {
                return Err(AppError::storage(
                    dir,
                    io_err(io::ErrorKind::PermissionDenied, "directory is locked"),
                ));
            }
            state.dirs.retain(|d| !d.starts_with(dir));
            Ok(())
        }

        async fn stage_file(&self, dir: &Path, data: &[u8]) -> Result<StagedFile> {
            tokio::task::yield_now().await;
            let path = staging_path(dir);
            let mut state = self.state();
            if state.fail_writes {
                return Err(AppError::storage(
                    &path,
                    io_err(io::ErrorKind::Other, "no space left on device"),
                ));
            }
            if !state.dirs.contains(dir) {
                return Err(AppError::storage(
                    &path,
                    io_err(io::ErrorKind::NotFound, "job directory missing"),
                ));
            }
            state.files.insert(path.clone(), data.to_vec());
            Ok(StagedFile {
                path,
                size: data.len() as u64,
            })
        }

        async fn commit_file(&self, staged: &StagedFile, dest: &Path) -> Result<()> {
            tokio::task::yield_now().await;
            let mut state = self.state();
            match state.files.remove(&staged.path) {
                Some(data) => {
                    state.files.insert(dest.to_path_buf(), data);
                    Ok(())
                }
                None => Err(AppError::storage(
                    &staged.path,
                    io_err(io::ErrorKind::NotFound, "staged file missing"),
                )),
            }
        }

        async fn discard_file(&self, staged: &StagedFile) {
            self.state().files.remove(&staged.path);
        }

        async fn remove_file(&self, path: &Path) -> Result<bool> {
            Ok(self.state().files.remove(path).is_some())
        }

        async fn file_size(&self, path: &Path) -> Result<Option<u64>> {
            Ok(self.state().files.get(path).map(|d| d.len() as u64))
        }

        async fn list_dirs(&self, root: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
            Ok(self
                .state()
                .dirs
                .iter()
                .filter(|d| d.parent() == Some(root))
                .filter(|d| {
                    d.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(prefix))
                })
                .cloned()
                .collect())
        }
    }
}

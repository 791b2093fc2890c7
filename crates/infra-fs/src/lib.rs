// Jobspace Infrastructure - Filesystem Adapter
// Implements: JobStorage

pub mod fs_storage;

pub use fs_storage::FsJobStorage;

// Lifecycle constants (no magic values)
use std::time::Duration;

/// Reclamation scheduler wake interval (30 minutes)
pub const DEFAULT_CLEANUP_INTERVAL_MINUTES: u64 = 30;

/// Temp root directory name under the project root
pub const DEFAULT_TEMP_DIR_NAME: &str = "temp";

/// How long a forced removal waits for in-flight operations to finish (5s)
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5000;

/// How long the daemon waits for the scheduler's shutdown sweep (30s)
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on session token length
pub const MAX_SESSION_TOKEN_LEN: usize = 256;

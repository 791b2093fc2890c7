//! Logging setup
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `jobspace=info`)
//! - `JOBSPACE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `JOBSPACE_LOG_DIR`: if set, also write JSON logs to a daily rolling file there

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const DEFAULT_LOG_FILTER: &str = "jobspace=info";
const LOG_FILE_PREFIX: &str = "jobspace-daemon.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_tracing() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("Failed to create env filter")?;

    let log_format =
        std::env::var("JOBSPACE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let mut layers: Vec<BoxedLayer> = Vec::new();
    match log_format.as_str() {
        // Production: JSON structured logging
        "json" => layers.push(fmt::layer().json().boxed()),
        // Development: pretty formatting with colors
        _ => layers.push(fmt::layer().pretty().boxed()),
    }

    let mut guard = None;
    if let Ok(dir) = std::env::var("JOBSPACE_LOG_DIR") {
        let dir = shellexpand::tilde(&dir).into_owned();
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .build(&dir)
            .with_context(|| format!("Failed to open log directory {}", dir))?;
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

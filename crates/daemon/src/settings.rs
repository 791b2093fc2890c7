//! Daemon configuration
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. `jobspace.toml` in the working directory, or the file named by
//!    `JOBSPACE_CONFIG` (optional)
//! 3. `JOBSPACE_*` environment variables, e.g. `JOBSPACE_CLEANUP_INTERVAL_MINUTES=10`

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use jobspace_core::LifecycleConfig;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "jobspace.toml";
const ENV_PREFIX: &str = "JOBSPACE";

/// Load and validate the lifecycle configuration
pub fn load() -> Result<LifecycleConfig> {
    let path = std::env::var("JOBSPACE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let path = PathBuf::from(shellexpand::tilde(&path).into_owned());
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<LifecycleConfig> {
    let settings = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let mut config: LifecycleConfig = settings
        .try_deserialize()
        .context("Invalid configuration")?;

    let root = config.project_root.to_string_lossy().into_owned();
    config.project_root = PathBuf::from(shellexpand::tilde(&root).into_owned());

    config.validate()?;
    Ok(config)
}

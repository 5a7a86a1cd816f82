use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use rfp_analyst_core::Config;

const LOG_FILE: &str = "rfp-analyst.log";

/// Default filter: our crates at `level`, everything else at warn
fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("rfp_analyst={level},rfp_analyst_core={level},warn")
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// Log to a file in the config directory. The terminal belongs to the TUI,
/// so nothing may be written to stdout or stderr while it runs.
pub fn init(verbose: bool) -> Result<PathBuf> {
    let path = Config::config_dir()?.join(LOG_FILE);
    init_at(&path, verbose)?;
    Ok(path)
}

fn init_at(path: &Path, verbose: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

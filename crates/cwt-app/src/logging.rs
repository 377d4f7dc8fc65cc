use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// `<repo_root>/.cwt/cwt.log`
pub fn log_file_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".cwt").join("cwt.log")
}

/// Send all log output to the log file. The TUI owns the terminal, so
/// nothing may be written to stdout or stderr while it runs.
pub fn init(repo_root: &Path) -> Result<PathBuf> {
    let path = log_file_path(repo_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))?;

    Ok(path)
}

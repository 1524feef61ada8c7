//! Logging configuration for evidence-snowflake.
//!
//! Logs go to a file. stdout carries the query result and stderr the
//! single-line error.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to the file at `path`.
///
/// If the file cannot be created the error is returned and no subscriber is
/// installed, so logging stays off.
pub fn init_file_logging(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Truncate on each run to avoid unbounded growth
    let log_file = File::create(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false) // No ANSI colors in file output
        .init();
    Ok(())
}

/// Returns the default log file path.
///
/// Uses the XDG state directory on Linux (`~/.local/state/evidence-snowflake/query.log`),
/// or falls back to the config directory on other platforms.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("evidence-snowflake").join("query.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("evidence-snowflake").join("query.log");
    }

    std::env::temp_dir().join("evidence-snowflake-query.log")
}

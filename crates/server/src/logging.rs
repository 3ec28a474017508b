//! Log subscriber setup for the `testsync` binary.
//!
//! Logs go to `<logging.dir>/test-sync.log`, appended. If that file cannot
//! be opened the subscriber writes to stderr instead and says so once.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::EnvFilter;

use testsync_core::{Error, Result};
use testsync_engine::LoggingConfig;

/// Where log output ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// The configured log file
    File(PathBuf),
    /// Stderr, because the file could not be opened
    Stderr,
}

/// Parse a level name or `RUST_LOG`-style directive string.
///
/// # Errors
///
/// `Error::Config` if the string is not a valid filter.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    EnvFilter::try_new(level)
        .map_err(|e| Error::Config(format!("Invalid logging.level '{level}': {e}")))
}

/// Open the log file for appending, creating its directory if needed.
pub fn open_log_file(config: &LoggingConfig) -> std::io::Result<(PathBuf, File)> {
    fs::create_dir_all(&config.dir)?;
    let path = config.file_path();
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Install the global subscriber.
///
/// # Errors
///
/// `Error::Config` for an invalid level or if a subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<LogTarget> {
    let filter = build_filter(&config.level)?;

    match open_log_file(config) {
        Ok((path, file)) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| Error::Config(format!("Could not install logger: {e}")))?;
            Ok(LogTarget::File(path))
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| Error::Config(format!("Could not install logger: {e}")))?;
            warn!(
                target: "testsync::logging",
                path = %config.file_path().display(),
                error = %e,
                "Could not open log file, logging to stderr"
            );
            Ok(LogTarget::Stderr)
        }
    }
}

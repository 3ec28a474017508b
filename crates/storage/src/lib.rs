//! Storage layer for testsync
//!
//! This crate implements the data store collaborators:
//! - MemoryStore: `HashMap` behind a `parking_lot::RwLock`, lost on restart
//! - SqliteStore: one row per test in a SQLite file
//! - `open_store`: backend selection from the `[storage]` config section

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use testsync_core::{DataStore, Result};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage settings, the `[storage]` section of `testsync.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend: `"memory"` (default) or `"sqlite"`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Database file used when `type = "sqlite"`.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_kind() -> String {
    "memory".to_string()
}

fn default_sqlite_path() -> String {
    "testsync.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

/// Open the backend selected by `config`.
///
/// An unknown backend name falls back to memory with a warning; an empty
/// `sqlite_path` falls back to `testsync.db`.
///
/// # Errors
///
/// Returns `Error::Storage` if the SQLite database cannot be opened.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn DataStore>> {
    match config.kind.to_lowercase().as_str() {
        "" | "memory" => {
            info!(target: "testsync::storage", "Using in-memory data store");
            Ok(Arc::new(MemoryStore::new()))
        }
        "sqlite" => {
            let path = if config.sqlite_path.trim().is_empty() {
                default_sqlite_path()
            } else {
                config.sqlite_path.clone()
            };
            info!(target: "testsync::storage", path = %path, "Using SQLite data store");
            Ok(Arc::new(SqliteStore::open(path)?))
        }
        other => {
            warn!(target: "testsync::storage", kind = other, "Unknown storage type, defaulting to memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

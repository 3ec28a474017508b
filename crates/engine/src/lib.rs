//! Synchronization engine for testsync
//!
//! This crate holds all per-test state and the rules that govern it:
//! - ConnectionRegistry: append-only indexed connection handles
//! - Checkpoint / CheckpointRegistry: named barriers and their get-or-create map
//! - TestRun: the per-test aggregate (payload, connections, checkpoints)
//! - TestDirectory: process-wide map of live tests
//! - TestCleaner: background eviction of expired tests
//! - TestDataService: payload reads and writes through the data store
//! - ServerConfig: `testsync.toml`
//!
//! The engine knows nothing about sockets. Transports hand it
//! [`ChannelConnection`] handles and drain the matching receivers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod checkpoint;
pub mod cleaner;
pub mod config;
pub mod connection;
pub mod directory;
pub mod service;
pub mod test_run;

pub use channel::{ChannelConnection, Outbound};
pub use checkpoint::{Arrival, Checkpoint, CheckpointRegistry, RELEASE_GRACE_MS};
pub use cleaner::{SweepReport, TestCleaner, MIN_CHECK_INTERVAL};
pub use config::{CleanupConfig, Credentials, LoggingConfig, ServerConfig, CONFIG_FILE_NAME};
pub use connection::ConnectionRegistry;
pub use directory::TestDirectory;
pub use service::TestDataService;
pub use test_run::TestRun;

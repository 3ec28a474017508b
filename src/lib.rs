//! testsync - shared test data and checkpoint synchronization
//!
//! Distributed test runners register with a test by ID, share one data
//! payload, and meet at named checkpoints: once the target number of
//! runners has arrived, every arrived runner is released with a common
//! start time.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use testsync::{ChannelConnection, Executor, MemoryStore, Session, TestDataService, TestDirectory, TestId};
//!
//! let service = TestDataService::new(Arc::new(TestDirectory::new()), Arc::new(MemoryStore::new()));
//! let executor = Arc::new(Executor::new(Arc::new(service)));
//!
//! let (conn, mut outbound) = ChannelConnection::new();
//! let session = Session::open(executor, TestId::new(1), conn);
//! session.handle_frame(br#"{"command":"get_connection_count"}"#)?;
//! ```
//!
//! # Architecture
//!
//! Frames from a connection go through a per-connection [`Session`] to the
//! shared [`Executor`], which acts on the test's [`TestRun`]. The network
//! front end lives in the `testsync-server` crate.

pub use testsync_core::*;
pub use testsync_engine::*;
pub use testsync_executor::*;
pub use testsync_storage::{open_store, MemoryStore, SqliteStore, StorageConfig};

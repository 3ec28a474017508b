//! Error types for testsync
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Categories
//!
//! | Category | Variants | Connection outcome |
//! |----------|----------|--------------------|
//! | Protocol | `Decode`, `UnknownCommand` | logged, stays open |
//! | Addressing | `ConnectionNotFound` | command aborted, stays open |
//! | Data | `TestNotFound`, `TestExists` | reported to caller |
//! | Collaborator | `Storage` | reported to caller, stays open |
//! | Delivery | `Delivery` | isolated per recipient |
//! | Process | `Config`, `Io` | startup / shutdown only |

use crate::types::{ConnectionIndex, TestId};
use std::io;
use thiserror::Error;

/// Result type alias for testsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for testsync
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed command envelope or command content
    #[error("Decode error: {0}")]
    Decode(String),

    /// Envelope carried a command name the server does not know
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Connection index does not resolve to a live connection
    #[error("Connection {index} not found for test {test_id}")]
    ConnectionNotFound {
        /// Test the index was resolved against
        test_id: TestId,
        /// The stale or out-of-range index
        index: ConnectionIndex,
    },

    /// No payload exists for the test, neither persisted nor in memory
    #[error("Test {0} not found")]
    TestNotFound(TestId),

    /// Payload creation refused because the test already has data
    #[error("Test {0} already has data")]
    TestExists(TestId),

    /// Data store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Message could not be handed to a connection
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (sockets, files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

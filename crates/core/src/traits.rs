//! Core traits for connection and data store abstraction
//!
//! These traits let the engine stay ignorant of the transport a client
//! uses and of where test payloads are persisted.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::TestId;
use crate::wire::{Frame, Message};

/// Handle to one participant's duplex channel.
///
/// Handles are shared between the connection's own task and any other
/// task that broadcasts to it, so every method takes `&self`.
///
/// Thread safety: All methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait Connection: Send + Sync {
    /// Queue a frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns `Error::Delivery` if the connection can no longer accept frames.
    fn send(&self, frame: Frame) -> Result<()>;

    /// Close the connection. Idempotent.
    fn close(&self) -> Result<()>;

    /// Whether the connection has been closed by either side.
    fn is_closed(&self) -> bool;

    /// Encode and queue an envelope.
    fn send_message(&self, message: &Message) -> Result<()> {
        self.send(message.to_frame()?)
    }
}

/// Persistence for test payloads.
///
/// Retention of persisted payloads is the store's own concern: evicting a
/// test from memory never deletes its payload here.
pub trait DataStore: Send + Sync {
    /// Store `data` for `test_id`, replacing any previous payload and
    /// refreshing its timestamp.
    fn save(&self, test_id: TestId, data: &[u8]) -> Result<()>;

    /// Load the payload for `test_id`, `None` when nothing is stored.
    fn load(&self, test_id: TestId) -> Result<Option<Vec<u8>>>;

    /// Remove the payload for `test_id`. Removing a missing payload is not an error.
    fn delete(&self, test_id: TestId) -> Result<()>;

    /// Remove every payload saved before `cutoff`, returning how many were removed.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Release backend resources.
    fn close(&self) -> Result<()>;
}

//! Output enum for command execution results.

use testsync_engine::Arrival;

/// What executing a command did, for the caller's bookkeeping.
///
/// Replies themselves are already queued on the connection by the time an
/// `Output` is returned; this only tells the transport what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// State changed, nothing was sent (`update_data`)
    Unit,
    /// A reply was queued for the caller
    Replied,
    /// The caller arrived at a checkpoint
    Checkpoint(Arrival),
    /// The caller's connection was closed; stop reading from it
    Closed,
}

impl Output {
    /// Whether the transport should stop its read loop.
    pub fn is_closed(&self) -> bool {
        matches!(self, Output::Closed)
    }
}

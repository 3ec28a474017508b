//! Channel-backed connection handle
//!
//! The transport owns the socket; the engine only ever sees a
//! [`ChannelConnection`], which queues outbound work on an unbounded
//! channel drained by the transport's writer task. Sending never blocks,
//! so a broadcast from one connection's task cannot stall on a slow peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use testsync_core::{Connection, Error, Frame, Result};

/// Work queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Deliver a frame
    Frame(Frame),
    /// Send a keepalive probe
    Ping,
    /// Close the socket and stop writing
    Close,
}

/// [`Connection`] implementation over an unbounded channel.
#[derive(Debug)]
pub struct ChannelConnection {
    tx: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
}

impl ChannelConnection {
    /// Create a handle and the receiver its writer task drains.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            tx,
            closed: AtomicBool::new(false),
        });
        (conn, rx)
    }

    /// Queue a keepalive probe.
    pub fn ping(&self) -> Result<()> {
        self.push(Outbound::Ping)
    }

    /// Record that the peer went away without queueing a close.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn push(&self, item: Outbound) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Delivery("connection is closed".to_string()));
        }
        self.tx.send(item).map_err(|_| {
            self.mark_closed();
            Error::Delivery("connection writer has stopped".to_string())
        })
    }
}

impl Connection for ChannelConnection {
    fn send(&self, frame: Frame) -> Result<()> {
        self.push(Outbound::Frame(frame))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // The writer may already be gone; the handle is closed either way.
        let _ = self.tx.send(Outbound::Close);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

//! Connection registry
//!
//! Append-only, indexed list of the connection handles registered for one
//! test. A connection's index is its position in the list; slots are never
//! cleared or reused, so an index stays meaningful for the lifetime of the
//! test even after the connection closes. Closure is tracked by the handle
//! itself and surfaces here as a lookup miss.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use testsync_core::{Connection, ConnectionIndex, Error, Result, TestId};

/// Indexed connection handles for one test.
pub struct ConnectionRegistry {
    test_id: TestId,
    connections: RwLock<Vec<Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry for `test_id`.
    pub fn new(test_id: TestId) -> Self {
        Self {
            test_id,
            connections: RwLock::new(Vec::new()),
        }
    }

    /// Test this registry belongs to.
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    /// Append a connection and return its zero-based index.
    pub fn register(&self, connection: Arc<dyn Connection>) -> ConnectionIndex {
        let mut connections = self.connections.write();
        connections.push(connection);
        let index = connections.len() - 1;
        debug!(target: "testsync::connections", test_id = %self.test_id, conn_idx = index, "Connection registered");
        index
    }

    /// Resolve an index to a live connection.
    ///
    /// Returns `None` for an out-of-range index or a connection that has
    /// since closed.
    pub fn lookup(&self, index: ConnectionIndex) -> Option<Arc<dyn Connection>> {
        let connections = self.connections.read();
        connections
            .get(index)
            .filter(|conn| !conn.is_closed())
            .map(Arc::clone)
    }

    /// Like [`lookup`](Self::lookup), but a miss is an error.
    pub fn resolve(&self, index: ConnectionIndex) -> Result<Arc<dyn Connection>> {
        self.lookup(index).ok_or(Error::ConnectionNotFound {
            test_id: self.test_id,
            index,
        })
    }

    /// Number of connections ever registered.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Point-in-time copy, safe to iterate without holding the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn Connection>> {
        self.connections.read().clone()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("test_id", &self.test_id)
            .field("count", &self.count())
            .finish()
    }
}

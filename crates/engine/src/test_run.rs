//! Test aggregate
//!
//! A [`TestRun`] groups everything the server knows about one test ID: the
//! in-memory copy of its payload, its connection registry and its
//! checkpoints. It is created lazily on the first connection or payload
//! write and owned by the [`TestDirectory`](crate::TestDirectory).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use testsync_core::{Connection, ConnectionIndex, Result, TestId};

use crate::checkpoint::{Checkpoint, CheckpointRegistry};
use crate::connection::ConnectionRegistry;

/// In-memory state of one test.
#[derive(Debug)]
pub struct TestRun {
    id: TestId,
    created_at: DateTime<Utc>,
    payload: RwLock<Option<Vec<u8>>>,
    connections: Arc<ConnectionRegistry>,
    checkpoints: CheckpointRegistry,
}

impl TestRun {
    /// Create an empty test stamped with the current time.
    pub fn new(id: TestId) -> Self {
        Self::with_created_at(id, Utc::now())
    }

    /// Create an empty test with an explicit creation time.
    pub fn with_created_at(id: TestId, created_at: DateTime<Utc>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new(id));
        Self {
            id,
            created_at,
            payload: RwLock::new(None),
            checkpoints: CheckpointRegistry::new(Arc::clone(&connections)),
            connections,
        }
    }

    /// Test ID.
    pub fn id(&self) -> TestId {
        self.id
    }

    /// When this aggregate was created; drives eviction.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// In-memory payload, if one was written.
    pub fn payload(&self) -> Option<Vec<u8>> {
        self.payload.read().clone()
    }

    /// Replace the in-memory payload.
    pub fn set_payload(&self, data: Vec<u8>) {
        *self.payload.write() = Some(data);
    }

    /// Register a connection and return its stable index.
    pub fn register_connection(&self, connection: Arc<dyn Connection>) -> ConnectionIndex {
        let index = self.connections.register(connection);
        info!(target: "testsync::test", test_id = %self.id, conn_idx = index, "Connection joined test");
        index
    }

    /// Resolve an index to a live connection.
    pub fn connection(&self, index: ConnectionIndex) -> Option<Arc<dyn Connection>> {
        self.connections.lookup(index)
    }

    /// Resolve an index to a live connection, failing with
    /// `Error::ConnectionNotFound` on a miss.
    pub fn resolve_connection(&self, index: ConnectionIndex) -> Result<Arc<dyn Connection>> {
        self.connections.resolve(index)
    }

    /// Number of connections ever registered.
    pub fn connection_count(&self) -> usize {
        self.connections.count()
    }

    /// The connection registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Get or create a checkpoint.
    pub fn ensure_checkpoint(&self, identifier: &str, target_count: usize) -> Arc<Checkpoint> {
        self.checkpoints.ensure(identifier, target_count)
    }

    /// Look up an existing checkpoint.
    pub fn checkpoint(&self, identifier: &str) -> Option<Arc<Checkpoint>> {
        self.checkpoints.get(identifier)
    }

    /// The checkpoint registry.
    pub fn checkpoints(&self) -> &CheckpointRegistry {
        &self.checkpoints
    }
}

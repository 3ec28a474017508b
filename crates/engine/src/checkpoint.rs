//! Checkpoint barrier
//!
//! A checkpoint is a named rendezvous inside one test. Participants arrive
//! by connection index; once `target_count` distinct indices have arrived
//! the checkpoint finishes and every arrived participant is sent a release
//! carrying a shared start time.
//!
//! # State machine
//!
//! ```text
//! Open --(arrivals reach target)--> Finished
//! ```
//!
//! `Finished` is terminal. The transition, the snapshot of recipients and
//! the decision to broadcast all happen under the checkpoint's lock, on the
//! one arrival that crosses the threshold, so the release is broadcast
//! exactly once no matter how many arrivals race. The broadcast itself runs
//! after the lock is released.
//!
//! An arrival that finds the checkpoint already finished is still recorded,
//! and [`Arrival::AlreadyFinished`] tells the caller to answer it directly:
//! no further broadcast will ever happen.
//!
//! Checkpoints hold a reference to their test's [`ConnectionRegistry`],
//! never to connection handles, so a release can only reach connections
//! that are still live when it is sent.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use testsync_core::wire::WAIT_CHECKPOINT;
use testsync_core::{CheckpointRelease, ConnectionIndex, Message};

use crate::connection::ConnectionRegistry;

/// Lead time between a release being sent and the start time it announces.
pub const RELEASE_GRACE_MS: i64 = 500;

/// Outcome of recording an arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Recorded; the checkpoint is still open.
    Waiting {
        /// Distinct arrivals so far
        arrived: usize,
        /// Arrivals needed for release
        target: usize,
    },
    /// This arrival finished the checkpoint and triggered the broadcast.
    Released {
        /// Recipients the release was handed to
        delivered: usize,
    },
    /// The checkpoint had already finished before this arrival.
    AlreadyFinished,
}

#[derive(Debug, Default)]
struct CheckpointState {
    arrived: BTreeSet<ConnectionIndex>,
    finished: bool,
}

/// One named barrier.
pub struct Checkpoint {
    identifier: String,
    target_count: usize,
    connections: Arc<ConnectionRegistry>,
    state: Mutex<CheckpointState>,
}

impl Checkpoint {
    /// Create an open checkpoint with no arrivals.
    ///
    /// A `target_count` of zero behaves like one: the first arrival releases.
    pub fn new(
        identifier: impl Into<String>,
        target_count: usize,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        let identifier = identifier.into();
        info!(
            target: "testsync::checkpoint",
            test_id = %connections.test_id(),
            identifier = %identifier,
            target_count,
            "Checkpoint created"
        );
        Self {
            identifier,
            target_count,
            connections,
            state: Mutex::new(CheckpointState::default()),
        }
    }

    /// Checkpoint name.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Arrivals required for release, as supplied by the first requester.
    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// Whether the checkpoint has released.
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Distinct connection indices that have arrived, ascending.
    pub fn arrived(&self) -> Vec<ConnectionIndex> {
        self.state.lock().arrived.iter().copied().collect()
    }

    /// Record that connection `index` reached this checkpoint.
    ///
    /// Repeated arrivals of the same index count once. Arrivals after the
    /// release are still recorded.
    pub fn add_arrival(&self, index: ConnectionIndex) -> Arrival {
        let recipients: Vec<ConnectionIndex> = {
            let mut state = self.state.lock();
            state.arrived.insert(index);

            if state.finished {
                return Arrival::AlreadyFinished;
            }

            let target = self.target_count.max(1);
            if state.arrived.len() < target {
                debug!(
                    target: "testsync::checkpoint",
                    identifier = %self.identifier,
                    conn_idx = index,
                    arrived = state.arrived.len(),
                    target,
                    "Arrival recorded"
                );
                return Arrival::Waiting {
                    arrived: state.arrived.len(),
                    target,
                };
            }

            state.finished = true;
            state.arrived.iter().copied().collect()
        };

        let delivered = self.broadcast(&recipients);
        Arrival::Released { delivered }
    }

    /// Send the release to every recipient that still resolves.
    ///
    /// A failed delivery is logged and does not stop the others.
    fn broadcast(&self, recipients: &[ConnectionIndex]) -> usize {
        let release = CheckpointRelease {
            identifier: self.identifier.clone(),
            finished: true,
            start_at: Utc::now().timestamp_millis() + RELEASE_GRACE_MS,
        };
        let message = match Message::new(WAIT_CHECKPOINT, &release) {
            Ok(message) => message,
            Err(e) => {
                error!(target: "testsync::checkpoint", identifier = %self.identifier, error = %e, "Could not encode release");
                return 0;
            }
        };

        let mut delivered = 0;
        for &index in recipients {
            let Some(conn) = self.connections.lookup(index) else {
                debug!(target: "testsync::checkpoint", identifier = %self.identifier, conn_idx = index, "Skipping closed participant");
                continue;
            };
            match conn.send_message(&message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    target: "testsync::checkpoint",
                    identifier = %self.identifier,
                    conn_idx = index,
                    error = %e,
                    "Could not broadcast release"
                ),
            }
        }

        info!(
            target: "testsync::checkpoint",
            test_id = %self.connections.test_id(),
            identifier = %self.identifier,
            participants = recipients.len(),
            delivered,
            start_at = release.start_at,
            "Checkpoint released"
        );
        delivered
    }
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Checkpoint")
            .field("identifier", &self.identifier)
            .field("target_count", &self.target_count)
            .field("arrived", &state.arrived)
            .field("finished", &state.finished)
            .finish()
    }
}

/// Get-or-create map of one test's checkpoints.
///
/// Concurrent first requests for the same identifier observe a single
/// checkpoint; the first writer's `target_count` wins.
#[derive(Debug)]
pub struct CheckpointRegistry {
    connections: Arc<ConnectionRegistry>,
    checkpoints: DashMap<String, Arc<Checkpoint>>,
}

impl CheckpointRegistry {
    /// Create an empty registry resolving participants through `connections`.
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            connections,
            checkpoints: DashMap::new(),
        }
    }

    /// Return the checkpoint named `identifier`, creating it with
    /// `target_count` if it does not exist yet.
    pub fn ensure(&self, identifier: &str, target_count: usize) -> Arc<Checkpoint> {
        if let Some(existing) = self.checkpoints.get(identifier) {
            return Arc::clone(existing.value());
        }

        let entry = self
            .checkpoints
            .entry(identifier.to_string())
            .or_insert_with(|| {
                Arc::new(Checkpoint::new(
                    identifier,
                    target_count,
                    Arc::clone(&self.connections),
                ))
            });
        Arc::clone(entry.value())
    }

    /// Look up an existing checkpoint.
    pub fn get(&self, identifier: &str) -> Option<Arc<Checkpoint>> {
        self.checkpoints
            .get(identifier)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of checkpoints created so far.
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Whether no checkpoint has been created.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelConnection, Outbound};
    use testsync_core::{Connection, Frame, TestId};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn setup(n: usize) -> (Arc<ConnectionRegistry>, Vec<UnboundedReceiver<Outbound>>) {
        let registry = Arc::new(ConnectionRegistry::new(TestId::new(1)));
        let receivers = (0..n)
            .map(|_| {
                let (conn, rx) = ChannelConnection::new();
                registry.register(conn);
                rx
            })
            .collect();
        (registry, receivers)
    }

    fn release_of(rx: &mut UnboundedReceiver<Outbound>) -> Option<serde_json::Value> {
        match rx.try_recv().ok()? {
            Outbound::Frame(Frame::Text(text)) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    #[test]
    fn single_target_releases_first_arrival() {
        let (registry, mut rxs) = setup(1);
        let cp = Checkpoint::new("cp", 1, registry);

        let before = Utc::now().timestamp_millis();
        assert_eq!(cp.add_arrival(0), Arrival::Released { delivered: 1 });
        assert!(cp.is_finished());

        let msg = release_of(&mut rxs[0]).unwrap();
        assert_eq!(msg["command"], "wait_checkpoint");
        assert_eq!(msg["content"]["identifier"], "cp");
        assert_eq!(msg["content"]["finished"], true);
        let start_at = msg["content"]["start_at"].as_i64().unwrap();
        assert!(start_at >= before + RELEASE_GRACE_MS);
        assert!(start_at <= Utc::now().timestamp_millis() + RELEASE_GRACE_MS);
    }

    #[test]
    fn waits_until_target_reached() {
        let (registry, mut rxs) = setup(2);
        let cp = Checkpoint::new("cp1", 2, registry);

        assert_eq!(cp.add_arrival(0), Arrival::Waiting { arrived: 1, target: 2 });
        assert!(!cp.is_finished());
        assert!(release_of(&mut rxs[0]).is_none());

        assert_eq!(cp.add_arrival(1), Arrival::Released { delivered: 2 });
        assert!(release_of(&mut rxs[0]).is_some());
        assert!(release_of(&mut rxs[1]).is_some());
    }

    #[test]
    fn duplicate_arrivals_count_once() {
        let (registry, _rxs) = setup(2);
        let cp = Checkpoint::new("dup", 2, registry);

        cp.add_arrival(0);
        assert_eq!(cp.add_arrival(0), Arrival::Waiting { arrived: 1, target: 2 });
        assert!(!cp.is_finished());
        assert_eq!(cp.arrived(), vec![0]);
    }

    #[test]
    fn late_arrival_is_recorded_without_second_broadcast() {
        let (registry, mut rxs) = setup(2);
        let cp = Checkpoint::new("late", 1, registry);

        cp.add_arrival(0);
        assert!(release_of(&mut rxs[0]).is_some());

        assert_eq!(cp.add_arrival(1), Arrival::AlreadyFinished);
        assert_eq!(cp.arrived(), vec![0, 1]);
        assert!(release_of(&mut rxs[0]).is_none());
        assert!(release_of(&mut rxs[1]).is_none());
    }

    #[test]
    fn zero_target_behaves_as_one() {
        let (registry, _rxs) = setup(1);
        let cp = Checkpoint::new("zero", 0, registry);

        assert_eq!(cp.add_arrival(0), Arrival::Released { delivered: 1 });
    }

    #[test]
    fn broadcast_skips_closed_and_unknown_participants() {
        let (registry, mut rxs) = setup(2);
        registry.lookup(0).unwrap().close().unwrap();
        let cp = Checkpoint::new("skip", 3, registry);

        cp.add_arrival(0);
        cp.add_arrival(7);
        assert_eq!(cp.add_arrival(1), Arrival::Released { delivered: 1 });

        assert!(cp.is_finished());
        assert!(release_of(&mut rxs[1]).is_some());
    }

    struct RefusingConnection;

    impl Connection for RefusingConnection {
        fn send(&self, _frame: Frame) -> testsync_core::Result<()> {
            Err(testsync_core::Error::Delivery("refused".to_string()))
        }

        fn close(&self) -> testsync_core::Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[test]
    fn delivery_failure_does_not_abort_broadcast() {
        let registry = Arc::new(ConnectionRegistry::new(TestId::new(1)));
        registry.register(Arc::new(RefusingConnection));
        let (conn, mut rx) = ChannelConnection::new();
        registry.register(conn);
        let cp = Checkpoint::new("partial", 2, registry);

        cp.add_arrival(0);
        assert_eq!(cp.add_arrival(1), Arrival::Released { delivered: 1 });
        assert!(cp.is_finished());
        assert!(release_of(&mut rx).is_some());
    }

    #[test]
    fn registry_ensure_is_get_or_create() {
        let (registry, _rxs) = setup(0);
        let checkpoints = CheckpointRegistry::new(registry);

        let first = checkpoints.ensure("a", 3);
        let second = checkpoints.ensure("a", 10);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.target_count(), 3);
        assert_eq!(checkpoints.len(), 1);
        assert!(checkpoints.get("b").is_none());
    }
}

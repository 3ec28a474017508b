//! Property tests for the connection registry and checkpoint barrier.

use std::sync::Arc;

use proptest::prelude::*;
use testsync_core::{Connection, TestId};
use testsync_engine::{Arrival, ChannelConnection, Checkpoint, ConnectionRegistry};

#[derive(Debug, Clone)]
enum Op {
    Register,
    Close(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Register),
        1 => (0usize..64).prop_map(Op::Close),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Count never decreases, indices are handed out densely and a closed
    /// slot keeps missing forever.
    #[test]
    fn count_is_monotonic(ops in prop::collection::vec(op(), 0..64)) {
        let registry = ConnectionRegistry::new(TestId::new(1));
        let mut receivers = Vec::new();
        let mut closed = Vec::new();
        let mut last_count = 0;

        for op in ops {
            match op {
                Op::Register => {
                    let (conn, rx) = ChannelConnection::new();
                    receivers.push(rx);
                    prop_assert_eq!(registry.register(conn), last_count);
                }
                Op::Close(i) => {
                    if let Some(conn) = registry.lookup(i) {
                        conn.close().unwrap();
                        closed.push(i);
                    }
                }
            }
            let count = registry.count();
            prop_assert!(count >= last_count);
            last_count = count;
        }

        for i in closed {
            prop_assert!(registry.lookup(i).is_none());
        }
        prop_assert!(registry.lookup(last_count).is_none());
    }

    /// Whatever the arrival order and duplicates, the checkpoint releases
    /// exactly once and only when the distinct arrivals reach the target.
    #[test]
    fn releases_exactly_once(
        target in 1usize..6,
        arrivals in prop::collection::vec(0usize..8, 0..24),
    ) {
        let registry = Arc::new(ConnectionRegistry::new(TestId::new(2)));
        let _receivers: Vec<_> = (0..8)
            .map(|_| {
                let (conn, rx) = ChannelConnection::new();
                registry.register(conn);
                rx
            })
            .collect();
        let cp = Checkpoint::new("prop", target, registry);

        let mut seen = std::collections::BTreeSet::new();
        let mut released = 0;
        for idx in arrivals {
            seen.insert(idx);
            match cp.add_arrival(idx) {
                Arrival::Waiting { arrived, .. } => {
                    prop_assert_eq!(arrived, seen.len());
                    prop_assert!(seen.len() < target);
                }
                Arrival::Released { delivered } => {
                    released += 1;
                    prop_assert_eq!(seen.len(), target);
                    prop_assert_eq!(delivered, target);
                }
                Arrival::AlreadyFinished => prop_assert!(released == 1),
            }
        }

        prop_assert!(released <= 1);
        prop_assert_eq!(cp.is_finished(), seen.len() >= target);
        prop_assert_eq!(cp.arrived().len(), seen.len());
    }
}

//! Test directory
//!
//! Process-wide map from test ID to [`TestRun`]. The directory is an
//! ordinary owned value: the server builds one and hands `Arc`s of it to
//! whoever needs it, and tests build as many independent ones as they like.
//!
//! Iteration always goes through [`TestDirectory::snapshot`], so a sweep
//! never holds the directory lock while it inspects or removes entries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use testsync_core::TestId;

use crate::test_run::TestRun;

/// Map of live tests.
#[derive(Debug, Default)]
pub struct TestDirectory {
    tests: RwLock<HashMap<TestId, Arc<TestRun>>>,
}

impl TestDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a test.
    pub fn get(&self, id: TestId) -> Option<Arc<TestRun>> {
        self.tests.read().get(&id).cloned()
    }

    /// Insert or replace a test under its own ID.
    pub fn set(&self, run: Arc<TestRun>) {
        self.tests.write().insert(run.id(), run);
    }

    /// Return the test for `id`, creating an empty one if absent.
    pub fn ensure(&self, id: TestId) -> Arc<TestRun> {
        if let Some(run) = self.get(id) {
            return run;
        }

        let mut tests = self.tests.write();
        Arc::clone(tests.entry(id).or_insert_with(|| {
            info!(target: "testsync::directory", test_id = %id, "Test created");
            Arc::new(TestRun::new(id))
        }))
    }

    /// Remove a test, returning it if it was present.
    pub fn delete(&self, id: TestId) -> Option<Arc<TestRun>> {
        self.tests.write().remove(&id)
    }

    /// Remove `id` only if it still maps to `expected`.
    ///
    /// Returns false when the entry is gone or was replaced by a newer test.
    pub fn remove_if_same(&self, id: TestId, expected: &Arc<TestRun>) -> bool {
        let mut tests = self.tests.write();
        match tests.get(&id) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                tests.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<(TestId, Arc<TestRun>)> {
        self.tests
            .read()
            .iter()
            .map(|(id, run)| (*id, Arc::clone(run)))
            .collect()
    }

    /// Remove every test created before `cutoff`, returning the removed IDs.
    ///
    /// Works from a snapshot; a test recreated for the same ID after the
    /// snapshot was taken is left alone.
    pub fn evict_created_before(&self, cutoff: DateTime<Utc>) -> Vec<TestId> {
        let mut evicted = Vec::new();
        for (id, run) in self.snapshot() {
            if run.created_at() < cutoff && self.remove_if_same(id, &run) {
                info!(target: "testsync::directory", test_id = %id, created_at = %run.created_at(), "Deleting expired test");
                evicted.push(id);
            }
        }
        evicted.sort();
        evicted
    }

    /// Number of live tests.
    pub fn len(&self) -> usize {
        self.tests.read().len()
    }

    /// Whether no test is live.
    pub fn is_empty(&self) -> bool {
        self.tests.read().is_empty()
    }
}

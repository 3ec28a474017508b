//! MemoryStore: in-process payload storage
//!
//! Payloads live in a `HashMap` guarded by a `parking_lot::RwLock` and are
//! lost on restart. Each record carries the time it was last saved so the
//! retention sweep can drop stale payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use testsync_core::{DataStore, Result, TestId};

#[derive(Debug, Clone)]
struct Record {
    data: Vec<u8>,
    saved_at: DateTime<Utc>,
}

/// In-memory [`DataStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<TestId, Record>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no payloads.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn save_at(&self, test_id: TestId, data: &[u8], saved_at: DateTime<Utc>) {
        self.records.write().insert(
            test_id,
            Record {
                data: data.to_vec(),
                saved_at,
            },
        );
    }
}

impl DataStore for MemoryStore {
    fn save(&self, test_id: TestId, data: &[u8]) -> Result<()> {
        self.save_at(test_id, data, Utc::now());
        Ok(())
    }

    fn load(&self, test_id: TestId) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().get(&test_id).map(|r| r.data.clone()))
    }

    fn delete(&self, test_id: TestId) -> Result<()> {
        self.records.write().remove(&test_id);
        Ok(())
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| record.saved_at >= cutoff);
        Ok(before - records.len())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

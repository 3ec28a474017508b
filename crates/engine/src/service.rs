//! Payload service
//!
//! Combines the [`TestDirectory`] with the [`DataStore`]: writes go to the
//! store first and then to the in-memory aggregate, reads prefer the store.

use std::sync::Arc;

use tracing::{debug, info};

use testsync_core::{DataStore, Error, Result, TestId};

use crate::directory::TestDirectory;
use crate::test_run::TestRun;

/// Read/write access to test payloads.
pub struct TestDataService {
    directory: Arc<TestDirectory>,
    store: Arc<dyn DataStore>,
}

impl TestDataService {
    /// Create a service over a directory and a store.
    pub fn new(directory: Arc<TestDirectory>, store: Arc<dyn DataStore>) -> Self {
        Self { directory, store }
    }

    /// The directory this service writes through.
    pub fn directory(&self) -> &Arc<TestDirectory> {
        &self.directory
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Store the first payload for a test.
    ///
    /// # Errors
    ///
    /// `TestExists` when the test already has a payload in memory or in the
    /// store. An aggregate that only holds connections does not count.
    pub fn create_data(&self, test_id: TestId, data: &[u8]) -> Result<Arc<TestRun>> {
        let existing = self.directory.get(test_id);
        let in_memory = existing.as_ref().is_some_and(|run| run.payload().is_some());
        if in_memory || self.store.load(test_id)?.is_some() {
            return Err(Error::TestExists(test_id));
        }

        self.store.save(test_id, data)?;
        let run = existing.unwrap_or_else(|| self.directory.ensure(test_id));
        run.set_payload(data.to_vec());
        info!(target: "testsync::data", test_id = %test_id, bytes = data.len(), "Test data created");
        Ok(run)
    }

    /// Overwrite a test's payload, creating the test if needed.
    pub fn update_data(&self, test_id: TestId, data: &[u8]) -> Result<Arc<TestRun>> {
        self.store.save(test_id, data)?;
        let run = self.directory.ensure(test_id);
        run.set_payload(data.to_vec());
        debug!(target: "testsync::data", test_id = %test_id, bytes = data.len(), "Test data updated");
        Ok(run)
    }

    /// Read a test's payload: the store first, then the in-memory copy.
    ///
    /// # Errors
    ///
    /// `TestNotFound` when neither holds a payload.
    pub fn read_data(&self, test_id: TestId) -> Result<Vec<u8>> {
        if let Some(data) = self.store.load(test_id)? {
            return Ok(data);
        }
        self.directory
            .get(test_id)
            .and_then(|run| run.payload())
            .ok_or(Error::TestNotFound(test_id))
    }
}

impl std::fmt::Debug for TestDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDataService")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

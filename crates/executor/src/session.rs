//! Per-connection dispatch context.
//!
//! A [`Session`] binds the shared [`Executor`] to one registered
//! connection: the test it joined and the index it was given. The
//! transport creates one session per connection and feeds it every inbound
//! frame in arrival order.
//!
//! The session keeps its own `Arc` of the test, so it keeps working after
//! the cleaner evicts that test from the directory.
//!
//! # Usage
//!
//! ```ignore
//! let (conn, rx) = ChannelConnection::new();
//! let session = Session::open(executor.clone(), test_id, conn);
//!
//! // For each inbound frame:
//! match session.handle_frame(&bytes) {
//!     Ok(out) if out.is_closed() => break,
//!     Ok(_) => {}
//!     Err(e) => warn!(error = %e, "Command failed"),
//! }
//! ```

use std::sync::Arc;

use testsync_core::{Connection, ConnectionIndex, Result, TestId};
use testsync_engine::TestRun;

use crate::{Command, Executor, Output};

/// One registered connection's view of the executor.
#[derive(Debug)]
pub struct Session {
    executor: Arc<Executor>,
    test: Arc<TestRun>,
    index: ConnectionIndex,
}

impl Session {
    /// Join `test_id`, creating the test if needed, and register `connection`.
    pub fn open(executor: Arc<Executor>, test_id: TestId, connection: Arc<dyn Connection>) -> Self {
        let test = executor.service().directory().ensure(test_id);
        let index = test.register_connection(connection);
        Self {
            executor,
            test,
            index,
        }
    }

    /// The test this connection joined.
    pub fn test(&self) -> &Arc<TestRun> {
        &self.test
    }

    /// The test's ID.
    pub fn test_id(&self) -> TestId {
        self.test.id()
    }

    /// This connection's index within the test.
    pub fn index(&self) -> ConnectionIndex {
        self.index
    }

    /// Execute a decoded command.
    pub fn execute(&self, cmd: Command) -> Result<Output> {
        self.executor.execute(&self.test, self.index, cmd)
    }

    /// Decode and execute one inbound frame.
    ///
    /// # Errors
    ///
    /// Decode failures, unknown commands, a stale index and store failures
    /// are all returned; none of them affect the connection or other
    /// participants.
    pub fn handle_frame(&self, bytes: &[u8]) -> Result<Output> {
        self.execute(Command::decode(bytes)?)
    }
}

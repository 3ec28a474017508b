//! The Executor - routes connection commands into the engine.
//!
//! The Executor is a stateless dispatcher: it holds the payload service and
//! nothing else. Per-connection context (which test, which index) is
//! supplied by the caller, normally a [`Session`](crate::Session).

use std::sync::Arc;

use tracing::debug;

use testsync_core::wire::{GET_CONNECTION_COUNT, WAIT_CHECKPOINT};
use testsync_core::{
    CheckpointStatus, ConnectionCount, ConnectionIndex, Error, Frame, Message, Result,
};
use testsync_engine::{Arrival, TestDataService, TestRun};

use crate::{Command, Output};

/// The command executor.
///
/// # Thread Safety
///
/// Executor is `Send + Sync` and is shared by every connection task.
pub struct Executor {
    service: Arc<TestDataService>,
}

impl Executor {
    /// Create an executor over the payload service.
    pub fn new(service: Arc<TestDataService>) -> Self {
        Self { service }
    }

    /// The payload service, and through it the test directory.
    pub fn service(&self) -> &Arc<TestDataService> {
        &self.service
    }

    /// Execute one command on behalf of connection `index` of `test`.
    ///
    /// Commands that address the caller resolve its index first; a closed
    /// or unknown index fails with `Error::ConnectionNotFound` and changes
    /// nothing.
    pub fn execute(&self, test: &TestRun, index: ConnectionIndex, cmd: Command) -> Result<Output> {
        debug!(
            target: "testsync::executor",
            test_id = %test.id(),
            conn_idx = index,
            command = cmd.name(),
            "Command received"
        );

        match cmd {
            Command::ReadData => {
                let conn = test.resolve_connection(index)?;
                let data = match self.service.read_data(test.id()) {
                    Ok(data) => data,
                    // The directory may have dropped this test while the
                    // connection still holds it.
                    Err(Error::TestNotFound(id)) => {
                        test.payload().ok_or(Error::TestNotFound(id))?
                    }
                    Err(e) => return Err(e),
                };
                conn.send(Frame::Binary(data))?;
                Ok(Output::Replied)
            }
            Command::UpdateData { payload } => {
                let current = self.service.update_data(test.id(), &payload)?;
                if !std::ptr::eq(Arc::as_ptr(&current), test) {
                    test.set_payload(payload);
                }
                Ok(Output::Unit)
            }
            Command::GetConnectionCount => {
                let conn = test.resolve_connection(index)?;
                let reply = ConnectionCount {
                    count: test.connection_count(),
                };
                conn.send_message(&Message::new(GET_CONNECTION_COUNT, &reply)?)?;
                Ok(Output::Replied)
            }
            Command::WaitCheckpoint {
                identifier,
                target_count,
            } => {
                let conn = test.resolve_connection(index)?;
                let checkpoint = test.ensure_checkpoint(&identifier, target_count);
                let arrival = checkpoint.add_arrival(index);
                if arrival == Arrival::AlreadyFinished {
                    let reply = CheckpointStatus {
                        identifier,
                        finished: true,
                    };
                    conn.send_message(&Message::new(WAIT_CHECKPOINT, &reply)?)?;
                }
                Ok(Output::Checkpoint(arrival))
            }
            Command::Close => {
                test.resolve_connection(index)?.close()?;
                Ok(Output::Closed)
            }
            Command::Unrecognized { name } => Err(Error::UnknownCommand(name)),
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

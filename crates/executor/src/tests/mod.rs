//! Test modules for the executor crate.


use std::sync::Arc;

use testsync_core::{DataStore, Frame, TestId};
use testsync_engine::{ChannelConnection, Outbound, TestDataService, TestDirectory};
use testsync_storage::MemoryStore;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{Executor, Session};

pub(crate) fn executor() -> Arc<Executor> {
    executor_with_store(Arc::new(MemoryStore::new()))
}

pub(crate) fn executor_with_store(store: Arc<dyn DataStore>) -> Arc<Executor> {
    let service = TestDataService::new(Arc::new(TestDirectory::new()), store);
    Arc::new(Executor::new(Arc::new(service)))
}

/// A registered session plus the receiver its writer task would drain.
pub(crate) struct Client {
    pub conn: Arc<ChannelConnection>,
    pub session: Session,
    pub rx: UnboundedReceiver<Outbound>,
}

impl Client {
    pub fn join(executor: &Arc<Executor>, test_id: u64) -> Self {
        let (conn, rx) = ChannelConnection::new();
        let session = Session::open(Arc::clone(executor), TestId::new(test_id), conn.clone());
        Self { conn, session, rx }
    }

    pub fn send(&self, json: &str) -> testsync_core::Result<crate::Output> {
        self.session.handle_frame(json.as_bytes())
    }

    /// Next queued frame, if any.
    pub fn recv(&mut self) -> Option<Frame> {
        match self.rx.try_recv().ok()? {
            Outbound::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// Next queued frame parsed as a JSON envelope.
    pub fn recv_json(&mut self) -> Option<serde_json::Value> {
        match self.recv()? {
            Frame::Text(text) => serde_json::from_str(&text).ok(),
            Frame::Binary(_) => None,
        }
    }
}

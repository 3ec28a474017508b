//! HTTP and WebSocket front end for testsync
//!
//! Two listeners share one [`AppState`]:
//! - [`http`]: the payload API (`/tests/{test_id}`) and health probe
//! - [`ws`]: `/register/{test_id}`, where test runners join a test and
//!   exchange commands
//!
//! The `testsync` binary wires these together with configuration, logging,
//! the data store and the cleaner; tests drive the same functions against
//! ephemeral ports.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod http;
pub mod logging;
pub mod ws;

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use testsync_core::Connection;
use testsync_engine::{Credentials, TestDataService};
use testsync_executor::Executor;

/// Shortest accepted keepalive interval; smaller values are raised to this.
pub const MIN_KEEPALIVE: Duration = Duration::from_millis(10);

/// State shared by every handler on both listeners.
#[derive(Clone)]
pub struct AppState {
    /// Command executor, and through it the payload service and directory
    pub executor: Arc<Executor>,
    /// Credentials clients must present
    pub credentials: Arc<Credentials>,
    /// Interval between keepalive pings
    pub keepalive: Duration,
}

impl AppState {
    /// Bundle the shared pieces.
    ///
    /// `keepalive` is raised to [`MIN_KEEPALIVE`] if shorter.
    pub fn new(executor: Arc<Executor>, credentials: Credentials, keepalive: Duration) -> Self {
        Self {
            executor,
            credentials: Arc::new(credentials),
            keepalive: keepalive.max(MIN_KEEPALIVE),
        }
    }

    /// The payload service.
    pub fn service(&self) -> &Arc<TestDataService> {
        self.executor.service()
    }

    /// Close every registered connection of every live test.
    ///
    /// Each connection task sees its handle close, sends a close frame and
    /// exits. Returns how many handles were closed.
    pub fn disconnect_all(&self) -> usize {
        let mut closed = 0;
        for (_, test) in self.service().directory().snapshot() {
            for conn in test.connections().snapshot() {
                if !conn.is_closed() && conn.close().is_ok() {
                    closed += 1;
                }
            }
        }
        closed
    }
}

/// Serve the HTTP API on `listener` until `shutdown` resolves.
pub async fn serve_http<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(target: "testsync::http", addr = ?listener.local_addr().ok(), "HTTP API listening");
    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Serve the WebSocket endpoint on `listener` until `shutdown` resolves.
pub async fn serve_ws<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(target: "testsync::ws", addr = ?listener.local_addr().ok(), "WebSocket endpoint listening");
    axum::serve(listener, ws::router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use testsync_engine::{Credentials, TestDataService, TestDirectory};
    use testsync_executor::Executor;
    use testsync_storage::MemoryStore;

    use crate::AppState;

    pub fn state_with(credentials: Credentials) -> AppState {
        let service = TestDataService::new(
            Arc::new(TestDirectory::new()),
            Arc::new(MemoryStore::new()),
        );
        AppState::new(
            Arc::new(Executor::new(Arc::new(service))),
            credentials,
            Duration::from_secs(10),
        )
    }

    pub fn basic(username: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
    }
}

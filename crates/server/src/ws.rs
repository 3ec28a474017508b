//! WebSocket registration endpoint and per-connection task.
//!
//! `GET /register/{test_id}` upgrades the request and hands the socket to
//! [`run_connection`], which owns it for its whole life:
//!
//! - the socket is registered with the test and gets a stable index
//! - a writer task drains the connection's outbound queue into the socket
//! - a keepalive task queues a ping every `keepalive_secs`
//! - the reader loop feeds inbound frames to the connection's session, one
//!   at a time, in arrival order
//!
//! When the reader loop ends the handle is closed. Its index stays taken.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use testsync_core::{Connection, ConnectionIndex, Frame, TestId};
use testsync_engine::{ChannelConnection, Outbound};
use testsync_executor::Session;

use crate::auth::{authorize, unauthorized, AuthQuery};
use crate::http::parse_test_id;
use crate::AppState;

/// Build the WebSocket router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/register/{test_id}", get(register))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /`
async fn banner() -> &'static str {
    "testsync WebSocket, reporting for duty!\n"
}

/// `GET /register/{test_id}`
async fn register(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorize(&state.credentials, &headers, Some(&query)) {
        debug!(target: "testsync::ws", test_id = %raw_id, "Rejected unauthorized registration");
        return unauthorized();
    }
    let test_id = match parse_test_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    ws.on_upgrade(move |socket| run_connection(socket, state, test_id))
}

/// Serve one registered connection until either side closes it.
pub async fn run_connection(socket: WebSocket, state: AppState, test_id: TestId) {
    let (conn, outbound) = ChannelConnection::new();
    let session = Session::open(Arc::clone(&state.executor), test_id, conn.clone());
    let index = session.index();
    info!(target: "testsync::ws", test_id = %test_id, conn_idx = index, "Connection established");

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, outbound, Arc::clone(&conn), test_id, index));
    let keepalive = tokio::spawn(keepalive_loop(Arc::clone(&conn), state.keepalive));

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "testsync::ws", test_id = %test_id, conn_idx = index, error = %e, "Failed to read message");
                break;
            }
        };

        let result = match &message {
            Message::Text(text) => session.handle_frame(text.as_str().as_bytes()),
            Message::Binary(data) => session.handle_frame(data),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match result {
            Ok(output) if output.is_closed() => break,
            Ok(_) => {}
            Err(e) => warn!(
                target: "testsync::ws",
                test_id = %test_id,
                conn_idx = index,
                error = %e,
                "Failed to process message"
            ),
        }
    }

    // Queues a close frame unless the handle is already closed.
    let _ = conn.close();
    keepalive.abort();
    if let Err(e) = writer.await {
        debug!(target: "testsync::ws", test_id = %test_id, conn_idx = index, error = %e, "Writer task ended abnormally");
    }
    info!(target: "testsync::ws", test_id = %test_id, conn_idx = index, "Connection closed");
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: UnboundedReceiver<Outbound>,
    conn: Arc<ChannelConnection>,
    test_id: TestId,
    index: ConnectionIndex,
) {
    while let Some(item) = outbound.recv().await {
        let (message, last) = match item {
            Outbound::Frame(Frame::Text(text)) => (Message::Text(text.into()), false),
            Outbound::Frame(Frame::Binary(data)) => (Message::Binary(data.into()), false),
            Outbound::Ping => (Message::Ping(Bytes::from_static(b"ping")), false),
            Outbound::Close => (Message::Close(None), true),
        };

        if let Err(e) = sink.send(message).await {
            debug!(target: "testsync::ws", test_id = %test_id, conn_idx = index, error = %e, "Could not write to socket");
            conn.mark_closed();
            break;
        }
        if last {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn keepalive_loop(conn: Arc<ChannelConnection>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if conn.ping().is_err() {
            break;
        }
    }
}

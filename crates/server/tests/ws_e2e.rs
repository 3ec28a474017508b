//! End-to-end tests for the WebSocket endpoint.
//!
//! Each test binds a server to an ephemeral port and drives it with a real
//! WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use testsync_core::TestId;
use testsync_engine::{Credentials, TestDataService, TestDirectory, RELEASE_GRACE_MS};
use testsync_executor::Executor;
use testsync_server::{serve_ws, AppState};
use testsync_storage::MemoryStore;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server(credentials: Credentials) -> (SocketAddr, AppState) {
    start_server_with(credentials, Duration::from_secs(30)).await
}

async fn start_server_with(credentials: Credentials, keepalive: Duration) -> (SocketAddr, AppState) {
    let service = TestDataService::new(
        Arc::new(TestDirectory::new()),
        Arc::new(MemoryStore::new()),
    );
    let state = AppState::new(
        Arc::new(Executor::new(Arc::new(service))),
        credentials,
        keepalive,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_ws(listener, state.clone(), std::future::pending()));
    (addr, state)
}

async fn join(addr: SocketAddr, test_id: u64) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/register/{test_id}"))
        .await
        .unwrap();
    client
}

async fn send(client: &mut Client, json: &str) {
    client.send(Message::text(json.to_string())).await.unwrap();
}

/// Next data or close frame, skipping keepalive traffic.
async fn next_frame(client: &mut Client) -> Message {
    loop {
        let message = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("socket error");
        match message {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

async fn recv_json(client: &mut Client) -> serde_json::Value {
    match next_frame(client).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn connection_count(client: &mut Client) -> u64 {
    send(client, r#"{"command":"get_connection_count"}"#).await;
    let reply = recv_json(client).await;
    assert_eq!(reply["command"], "get_connection_count");
    reply["content"]["count"].as_u64().unwrap()
}

fn wait(identifier: &str, target_count: usize) -> String {
    format!(
        r#"{{"command":"wait_checkpoint","content":{{"identifier":"{identifier}","target_count":{target_count}}}}}"#
    )
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

#[tokio::test]
async fn update_then_read_returns_payload_as_binary() {
    let (addr, state) = start_server(Credentials::default()).await;
    let mut client = join(addr, 1).await;

    send(&mut client, r#"{"command":"update_data","content":{"users":["a","b"]}}"#).await;
    send(&mut client, r#"{"command":"read_data"}"#).await;

    match next_frame(&mut client).await {
        Message::Binary(data) => assert_eq!(&data[..], br#"{"users":["a","b"]}"#),
        other => panic!("expected a binary frame, got {other:?}"),
    }
    assert_eq!(
        state.service().read_data(TestId::new(1)).unwrap(),
        br#"{"users":["a","b"]}"#.to_vec()
    );
}

#[tokio::test]
async fn connection_count_grows_per_registration() {
    let (addr, _state) = start_server(Credentials::default()).await;

    let mut a = join(addr, 2).await;
    assert_eq!(connection_count(&mut a).await, 1);

    let mut b = join(addr, 2).await;
    assert_eq!(connection_count(&mut b).await, 2);

    // Other tests are counted separately.
    let mut other = join(addr, 3).await;
    assert_eq!(connection_count(&mut other).await, 1);
}

#[tokio::test]
async fn checkpoint_releases_all_participants_together() {
    let (addr, _state) = start_server(Credentials::default()).await;
    let mut a = join(addr, 4).await;
    let mut b = join(addr, 4).await;

    let before = now_ms();
    send(&mut a, &wait("cp1", 2)).await;
    // a is parked until b arrives.
    assert!(timeout(Duration::from_millis(200), a.next()).await.is_err());
    send(&mut b, &wait("cp1", 2)).await;

    let ra = recv_json(&mut a).await;
    let rb = recv_json(&mut b).await;
    assert_eq!(ra["command"], "wait_checkpoint");
    assert_eq!(ra["content"]["identifier"], "cp1");
    assert_eq!(ra["content"]["finished"], true);
    assert_eq!(ra["content"]["start_at"], rb["content"]["start_at"]);
    assert!(ra["content"]["start_at"].as_i64().unwrap() >= before + RELEASE_GRACE_MS);
}

#[tokio::test]
async fn late_joiner_gets_finished_reply() {
    let (addr, _state) = start_server(Credentials::default()).await;
    let mut a = join(addr, 5).await;

    send(&mut a, &wait("go", 1)).await;
    let release = recv_json(&mut a).await;
    assert!(release["content"]["start_at"].is_i64());

    let mut late = join(addr, 5).await;
    send(&mut late, &wait("go", 1)).await;
    let reply = recv_json(&mut late).await;
    assert_eq!(reply["command"], "wait_checkpoint");
    assert_eq!(reply["content"]["identifier"], "go");
    assert_eq!(reply["content"]["finished"], true);
    assert!(reply["content"].get("start_at").is_none());
}

#[tokio::test]
async fn keepalive_pings_registered_connections() {
    let (addr, _state) = start_server_with(Credentials::default(), Duration::from_millis(50)).await;
    let mut client = join(addr, 12).await;

    let mut pings = 0;
    while pings < 2 {
        let message = timeout(WAIT, client.next())
            .await
            .expect("no keepalive ping")
            .expect("stream ended")
            .expect("socket error");
        if let Message::Ping(payload) = message {
            assert_eq!(&payload[..], b"ping");
            pings += 1;
        }
    }

    // Pings do not disturb command traffic.
    assert_eq!(connection_count(&mut client).await, 1);
}

#[tokio::test]
async fn bad_frames_do_not_close_the_connection() {
    let (addr, _state) = start_server(Credentials::default()).await;
    let mut client = join(addr, 6).await;

    send(&mut client, "not json").await;
    send(&mut client, r#"{"command":"launch_rockets"}"#).await;
    send(&mut client, r#"{"command":"wait_checkpoint","content":{"identifier":7}}"#).await;

    assert_eq!(connection_count(&mut client).await, 1);
}

#[tokio::test]
async fn read_without_data_sends_nothing() {
    let (addr, _state) = start_server(Credentials::default()).await;
    let mut client = join(addr, 7).await;

    send(&mut client, r#"{"command":"read_data"}"#).await;
    // The next reply is the count, not a payload.
    assert_eq!(connection_count(&mut client).await, 1);
}

#[tokio::test]
async fn close_command_closes_socket() {
    let (addr, state) = start_server(Credentials::default()).await;
    let mut client = join(addr, 8).await;
    assert_eq!(connection_count(&mut client).await, 1);

    send(&mut client, r#"{"command":"close"}"#).await;
    assert!(matches!(next_frame(&mut client).await, Message::Close(_)));

    // The index stays taken.
    let test = state.service().directory().get(TestId::new(8)).unwrap();
    assert_eq!(test.connection_count(), 1);
    let mut next = join(addr, 8).await;
    assert_eq!(connection_count(&mut next).await, 2);
}

#[tokio::test]
async fn disconnect_all_closes_open_sockets() {
    let (addr, state) = start_server(Credentials::default()).await;
    let mut a = join(addr, 9).await;
    let mut b = join(addr, 10).await;
    assert_eq!(connection_count(&mut a).await, 1);
    assert_eq!(connection_count(&mut b).await, 1);

    assert_eq!(state.disconnect_all(), 2);

    assert!(matches!(next_frame(&mut a).await, Message::Close(_)));
    assert!(matches!(next_frame(&mut b).await, Message::Close(_)));
}

#[tokio::test]
async fn registration_requires_credentials_when_configured() {
    let (addr, _state) = start_server(Credentials {
        username: "runner".to_string(),
        password: "pw".to_string(),
    })
    .await;

    match connect_async(format!("ws://{addr}/register/11")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED)
        }
        Err(e) => panic!("expected 401, got {e}"),
        Ok(_) => panic!("expected 401, connection was accepted"),
    }

    let mut request = format!("ws://{addr}/register/11")
        .into_client_request()
        .unwrap();
    let header = format!("Basic {}", STANDARD.encode("runner:pw"));
    request
        .headers_mut()
        .insert(AUTHORIZATION, HeaderValue::from_str(&header).unwrap());
    let (mut with_header, _) = connect_async(request).await.unwrap();
    assert_eq!(connection_count(&mut with_header).await, 1);

    let (mut with_query, _) =
        connect_async(format!("ws://{addr}/register/11?username=runner&password=pw"))
            .await
            .unwrap();
    assert_eq!(connection_count(&mut with_query).await, 2);
}

#[tokio::test]
async fn non_numeric_test_id_rejected() {
    let (addr, _state) = start_server(Credentials::default()).await;

    match connect_async(format!("ws://{addr}/register/abc")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::BAD_REQUEST)
        }
        Err(e) => panic!("expected 400, got {e}"),
        Ok(_) => panic!("expected 400, connection was accepted"),
    }
}

// tests/integration/websocket_test.rs

//! End-to-end tests against the WebSocket listener.

use futures::{SinkExt, StreamExt};
use posture_relay::config::Config;
use posture_relay::core::accounts::{Account, MemoryAccountStore};
use posture_relay::core::state::ServerState;
use posture_relay::server::{WebSocketState, run_websocket_server};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, broadcast};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const TIMEOUT: Duration = Duration::from_secs(2);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsServer {
    base: String,
    state: Arc<ServerState>,
    _shutdown_tx: broadcast::Sender<()>,
}

impl WsServer {
    fn url(&self) -> String {
        format!("{}{}", self.base, self.state.config.websocket.path)
    }

    /// Waits until the hub holds exactly `n` connections.
    async fn wait_for_connections(&self, n: usize) {
        tokio::time::timeout(TIMEOUT, async {
            while self.state.hub.snapshot().connections != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection count never settled");
    }
}

async fn start(config: Config, max_clients: usize) -> WsServer {
    let store = MemoryAccountStore::with_accounts([Account::new("Ann", "ann@example.com")]);
    let state = ServerState::with_store(config, Arc::new(store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, _) = broadcast::channel(1);

    let ws_state = WebSocketState {
        state: state.clone(),
        shutdown_tx: shutdown_tx.clone(),
        connection_permits: Arc::new(Semaphore::new(max_clients)),
    };
    tokio::spawn(run_websocket_server(
        listener,
        ws_state,
        shutdown_tx.subscribe(),
    ));

    WsServer {
        base: format!("ws://{addr}"),
        state,
        _shutdown_tx: shutdown_tx,
    }
}

async fn dial(server: &WsServer) -> Client {
    let (mut client, _) = connect_async(server.url().as_str()).await.unwrap();
    assert_eq!(recv(&mut client).await["action"], "connection_response");
    client
}

async fn send(client: &mut Client, frame: Value) {
    client.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn recv_text(client: &mut Client) -> String {
    loop {
        let message = tokio::time::timeout(TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a frame");
        match message {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn recv(client: &mut Client) -> Value {
    serde_json::from_str(&recv_text(client).await).unwrap()
}

#[tokio::test]
async fn test_ws_pair_and_relay() {
    let server = start(Config::default(), 16).await;
    let mut producer = dial(&server).await;
    let mut consumer = dial(&server).await;

    send(&mut producer, json!({"action": "register", "type": "producer"})).await;
    assert_eq!(recv(&mut producer).await["status"], "success");
    send(
        &mut consumer,
        json!({"action": "register", "type": "consumer", "email": "ann@example.com"}),
    )
    .await;
    assert_eq!(recv(&mut consumer).await["status"], "success");

    send(&mut consumer, json!({"action": "connect_to_producer"})).await;
    assert_eq!(recv(&mut consumer).await["message"], "Connected to Device");

    let frame = r#"{"action":"update","posture":{"overall":"GOOD","neck":7}}"#;
    producer
        .send(Message::Text(frame.to_string()))
        .await
        .unwrap();
    assert_eq!(recv_text(&mut consumer).await, frame);
    assert_eq!(recv(&mut producer).await["message"], "Successful update");
}

#[tokio::test]
async fn test_ws_binary_frames() {
    let server = start(Config::default(), 16).await;
    let mut client = dial(&server).await;

    client
        .send(Message::Binary(vec![0xff, 0xfe, 0x00]))
        .await
        .unwrap();
    assert_eq!(
        recv(&mut client).await,
        json!({"action": "error", "message": "Invalid message format"})
    );

    // The connection is still usable, and UTF-8 binary frames count as text.
    let register = json!({"action": "register", "type": "producer"}).to_string();
    client
        .send(Message::Binary(register.into_bytes()))
        .await
        .unwrap();
    assert_eq!(recv(&mut client).await["status"], "success");
    assert_eq!(server.state.hub.snapshot().producers, 1);
}

#[tokio::test]
async fn test_ws_close_frame_cleans_up() {
    let server = start(Config::default(), 16).await;
    let mut producer = dial(&server).await;
    send(&mut producer, json!({"action": "register", "type": "producer"})).await;
    recv(&mut producer).await;
    server.wait_for_connections(1).await;

    producer.send(Message::Close(None)).await.unwrap();
    server.wait_for_connections(0).await;
    assert_eq!(server.state.hub.snapshot().unpaired_producers, 0);
}

#[tokio::test]
async fn test_ws_oversized_message_closes_connection() {
    let mut config = Config::default();
    config.connection.max_frame_bytes = 128;
    let server = start(config, 16).await;
    let mut client = dial(&server).await;
    server.wait_for_connections(1).await;

    // The send may race the server closing the socket.
    let _ = client.send(Message::Text("x".repeat(512))).await;
    server.wait_for_connections(0).await;
}

#[tokio::test]
async fn test_ws_upgrade_rejected_at_max_clients() {
    let server = start(Config::default(), 1).await;
    let mut first = dial(&server).await;

    assert!(connect_async(server.url().as_str()).await.is_err());

    first.send(Message::Close(None)).await.unwrap();
    server.wait_for_connections(0).await;
    // The permit is returned once the first connection is gone.
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if let Ok((mut client, _)) = connect_async(server.url().as_str()).await {
                assert_eq!(recv(&mut client).await["action"], "connection_response");
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("permit was never returned");
}

#[tokio::test]
async fn test_ws_only_serves_configured_path() {
    let mut config = Config::default();
    config.websocket.path = "/relay".to_string();
    let server = start(config, 16).await;

    let wrong_path = format!("{}/", server.base);
    assert!(connect_async(wrong_path.as_str()).await.is_err());
    dial(&server).await;
}

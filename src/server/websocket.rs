// src/server/websocket.rs

//! The WebSocket listener used by browser dashboards and capture devices.
//!
//! Each text message is one frame. Binary messages are accepted if they hold
//! UTF-8 text; ping and pong are answered by axum and never reach the relay.

use crate::config::Config;
use crate::connection;
use crate::core::RelayError;
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt, future};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tracing::{info, warn};

/// Shared with every upgrade request.
#[derive(Clone)]
pub struct WebSocketState {
    pub state: Arc<ServerState>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub connection_permits: Arc<Semaphore>,
}

/// Binds the WebSocket port up front so a port conflict fails startup.
pub async fn bind(config: &Config) -> Result<TcpListener> {
    let listener = TcpListener::bind((config.host.as_str(), config.websocket.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind WebSocket listener on {}:{}",
                config.host, config.websocket.port
            )
        })?;
    info!(
        "Posture relay listening for WebSocket clients on ws://{}:{}{}",
        config.host, config.websocket.port, config.websocket.path
    );
    Ok(listener)
}

pub async fn run_websocket_server(
    listener: TcpListener,
    ws_state: WebSocketState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let path = ws_state.state.config.websocket.path.clone();
    let app = axum::Router::new()
        .route(&path, get(websocket_handler))
        .with_state(ws_state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_rx.recv().await.ok();
        info!("WebSocket server shutting down.");
    })
    .await
    .context("WebSocket server failed")
}

async fn websocket_handler(
    State(ws_state): State<WebSocketState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let Ok(permit) = ws_state.connection_permits.clone().try_acquire_owned() else {
        warn!("Rejecting WebSocket upgrade from {}: max_clients reached.", addr);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let max_frame_bytes = ws_state.state.config.connection.max_frame_bytes;
    ws.max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, addr, ws_state, permit))
}

async fn handle_socket(
    socket: WebSocket,
    addr: SocketAddr,
    ws_state: WebSocketState,
    _permit: OwnedSemaphorePermit,
) {
    info!("Accepted new WebSocket connection from: {}", addr);
    let (sink, stream) = socket.split();

    let frames = stream
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|_| RelayError::Protocol("binary frame is not UTF-8".into())),
                ),
                Ok(_) => None,
                Err(e) => Some(Err(RelayError::from(e))),
            })
        });

    let sink = sink.with(|frame: String| {
        future::ready(Ok::<_, axum::Error>(Message::Text(frame.into())))
    });

    let shutdown_rx = ws_state.shutdown_tx.subscribe();
    if let Err(e) = connection::serve(frames, sink, addr, ws_state.state, shutdown_rx).await {
        warn!("WebSocket connection from {} terminated unexpectedly: {}", addr, e);
    }
}

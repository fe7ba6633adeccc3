// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection;
use crate::core::RelayError;
use crate::core::state::ServerState;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{OwnedSemaphorePermit, broadcast};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, info, warn};

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) {
    let mut client_tasks = JoinSet::new();

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to register signal handlers: {}. Shutting down.", e);
            return;
        }
    };

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                            warn!("Rejecting connection from {}: max_clients reached.", addr);
                            continue;
                        };
                        info!("Accepted new TCP connection from: {}", addr);
                        let state = ctx.state.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();
                        client_tasks.spawn(async move {
                            if let Err(e) = serve_tcp(socket, addr, state, shutdown_rx, permit).await {
                                warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        debug!("No task was listening for the shutdown signal.");
    }

    while client_tasks.join_next().await.is_some() {}
    info!("All client connections closed.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    let snapshot = ctx.state.hub.snapshot();
    info!(
        "Server shutdown complete. {} connections served, {} frames processed; {} still registered.",
        ctx.state.stats.get_total_connections(),
        ctx.state.stats.get_total_frames(),
        snapshot.connections
    );
}

/// Serves one TCP client speaking newline-delimited JSON. The permit is held
/// until the connection ends.
pub async fn serve_tcp(
    socket: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_rx: broadcast::Receiver<()>,
    _permit: OwnedSemaphorePermit,
) -> Result<(), RelayError> {
    let max_frame_bytes = state.config.connection.max_frame_bytes;
    let (read_half, write_half) = socket.into_split();
    let frames = FramedRead::new(read_half, LinesCodec::new_with_max_length(max_frame_bytes))
        .map(|frame| frame.map_err(RelayError::from));
    let sink = FramedWrite::new(write_half, LinesCodec::new());
    connection::serve(frames, sink, addr, state, shutdown_rx).await
}

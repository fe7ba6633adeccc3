// src/server/spawner.rs

//! Spawns the server's long-running background tasks.

use super::context::ServerContext;
use super::{metrics_server, websocket};
use anyhow::Result;
use tracing::info;

/// Spawns all background tasks into the context's JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let server_state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;
    let config = server_state.config.clone();

    // --- Metrics Server ---
    if config.metrics.enabled {
        let metrics_state = server_state.clone();
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics).await
        });
    }

    // --- WebSocket Listener ---
    if config.websocket.enabled {
        let listener = websocket::bind(&config).await?;
        let ws_state = websocket::WebSocketState {
            state: server_state.clone(),
            shutdown_tx: shutdown_tx.clone(),
            connection_permits: ctx.connection_permits.clone(),
        };
        let shutdown_rx_ws = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            websocket::run_websocket_server(listener, ws_state, shutdown_rx_ws).await
        });
    }

    info!("All background tasks have been spawned.");
    Ok(())
}

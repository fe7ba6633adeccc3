// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;
mod websocket;

pub use connection_loop::serve_tcp;
pub use websocket::{WebSocketState, run_websocket_server};

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize server state, the account store and the TCP listener.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn the metrics and WebSocket servers.
    spawner::spawn_all(&mut server_context).await?;

    // 3. Start the main connection acceptance loop. This function will run until shutdown.
    connection_loop::run(server_context).await;

    Ok(())
}

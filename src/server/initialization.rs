// src/server/initialization.rs

//! Handles server initialization: state setup, the account store and the
//! TCP listener.

use super::context::ServerContext;
use crate::config::{Config, StorageBackend};
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    prepare_storage_dir(&config).await?;

    let host = config.host.clone();
    let port = config.port;
    let max_clients = config.max_clients;

    let state = ServerState::initialize(config)
        .await
        .context("Failed to open the account store")?;

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind relay listener on {host}:{port}"))?;
    info!("Posture relay listening for TCP clients on {}:{}", host, port);

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        connection_permits: Arc::new(Semaphore::new(max_clients)),
    })
}

/// Creates the parent directory of the accounts file, if the file backend is used.
async fn prepare_storage_dir(config: &Config) -> Result<()> {
    if config.storage.backend != StorageBackend::File {
        return Ok(());
    }
    let path = std::path::Path::new(&config.storage.path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create storage directory '{}'", parent.display())
        })?;
        info!("Created storage directory: {}", parent.display());
    }
    Ok(())
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!("Accepting at most {} concurrent connections.", config.max_clients);
    match config.connection.idle_timeout {
        Some(timeout) => info!("Idle connections are closed after {:?}.", timeout),
        None => info!("Idle timeout disabled."),
    }
    if !config.relay.persistence_ack {
        info!("Producers will not receive posture_data_update acknowledgements.");
    }
    if !config.websocket.enabled {
        warn!("WebSocket listener disabled; browser and camera clients cannot connect.");
    }
}

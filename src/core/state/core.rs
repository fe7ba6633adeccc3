// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::stats::StatsState;
use crate::config::Config;
use crate::core::RelayError;
use crate::core::accounts::{self, AccountStore};
use crate::core::relay::{RelayHub, RelayRouter};
use std::sync::Arc;
use tracing::info;

/// The state shared by every listener and connection task.
///
/// The configuration is fixed for the life of the process; there is no
/// runtime reconfiguration.
#[derive(Debug)]
pub struct ServerState {
    pub config: Arc<Config>,
    /// Owns the connection registry and the pairing index.
    pub hub: Arc<RelayHub>,
    /// Forwards measurements and persists readings.
    pub router: RelayRouter,
    pub accounts: Arc<dyn AccountStore>,
    pub stats: StatsState,
}

impl ServerState {
    /// Opens the configured account store and builds the shared state around it.
    pub async fn initialize(config: Config) -> Result<Arc<Self>, RelayError> {
        let accounts = accounts::open_store(&config.storage).await?;
        let state = Self::with_store(config, accounts);
        info!("Server state initialized.");
        Ok(state)
    }

    /// Builds the shared state around an already opened account store.
    pub fn with_store(config: Config, accounts: Arc<dyn AccountStore>) -> Arc<Self> {
        let hub = Arc::new(RelayHub::new());
        let router = RelayRouter::new(hub.clone(), accounts.clone());
        Arc::new(Self {
            config: Arc::new(config),
            hub,
            router,
            accounts,
            stats: StatsState::new(),
        })
    }
}

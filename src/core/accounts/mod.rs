// src/core/accounts/mod.rs

//! The account store the relay appends posture readings to.
//!
//! The relay only needs two things from it: look an account up by identity
//! (email) and append readings to that account's history. Everything else about
//! accounts (sign-up, login, passwords) belongs to the surrounding product.

mod file;
mod memory;

pub use file::FileAccountStore;
pub use memory::MemoryAccountStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::core::RelayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// A user account as far as the relay is concerned.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub name: String,
    pub email: String,
    /// Stored readings, oldest first.
    #[serde(default)]
    pub posture: Vec<Value>,
}

impl Account {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            posture: Vec::new(),
        }
    }
}

/// The on-disk shape of the accounts file.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AccountsFile {
    pub accounts: Vec<Account>,
}

#[async_trait]
pub trait AccountStore: Send + Sync + std::fmt::Debug {
    /// Looks an account up by its identity.
    async fn find_account(&self, identity: &str) -> Result<Option<Account>, RelayError>;

    /// Appends readings to the account's history, preserving their order.
    /// Fails with `UnknownIdentity` if no account matches.
    async fn append_readings(&self, identity: &str, readings: Vec<Value>) -> Result<(), RelayError>;

    /// Adds or replaces an account.
    async fn upsert_account(&self, account: Account) -> Result<(), RelayError>;
}

/// Builds the account store selected in the configuration and seeds it with
/// any accounts listed there.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn AccountStore>, RelayError> {
    let store: Arc<dyn AccountStore> = match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory account store.");
            Arc::new(MemoryAccountStore::new())
        }
        StorageBackend::File => {
            let store = FileAccountStore::open(&config.path).await?;
            info!(
                "Using file account store at '{}' ({} accounts loaded).",
                config.path,
                store.len().await
            );
            Arc::new(store)
        }
    };

    for seed in &config.accounts {
        if store.find_account(&seed.email).await?.is_none() {
            store
                .upsert_account(Account::new(seed.name.clone(), seed.email.clone()))
                .await?;
        }
    }
    Ok(store)
}

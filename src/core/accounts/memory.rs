// src/core/accounts/memory.rs

use super::{Account, AccountStore};
use crate::core::RelayError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

/// A process-local account store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, Account>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.accounts.insert(account.email.clone(), account);
        }
        store
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_account(&self, identity: &str) -> Result<Option<Account>, RelayError> {
        Ok(self.accounts.get(identity).map(|a| a.value().clone()))
    }

    async fn append_readings(&self, identity: &str, readings: Vec<Value>) -> Result<(), RelayError> {
        let mut account = self
            .accounts
            .get_mut(identity)
            .ok_or_else(|| RelayError::UnknownIdentity(identity.to_string()))?;
        account.posture.extend(readings);
        Ok(())
    }

    async fn upsert_account(&self, account: Account) -> Result<(), RelayError> {
        self.accounts.insert(account.email.clone(), account);
        Ok(())
    }
}

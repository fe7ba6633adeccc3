// src/core/accounts/file.rs

//! An account store backed by a single JSON document.
//!
//! The whole document is loaded at startup. Every append rewrites it to a
//! temporary file which is then renamed over the original, so a crash never
//! leaves a torn file behind.

use super::{Account, AccountStore, AccountsFile};
use crate::core::RelayError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error};

#[derive(Debug)]
pub struct FileAccountStore {
    path: PathBuf,
    accounts: Mutex<BTreeMap<String, Account>>,
}

impl FileAccountStore {
    /// Loads the store from `path`. A missing file is treated as an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref().to_path_buf();
        let accounts = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => {
                let file: AccountsFile = serde_json::from_str(&contents).map_err(|e| {
                    RelayError::Storage(format!(
                        "Failed to parse accounts file '{}': {e}",
                        path.display()
                    ))
                })?;
                file.accounts
                    .into_iter()
                    .map(|a| (a.email.clone(), a))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "Accounts file '{}' does not exist yet; starting empty.",
                    path.display()
                );
                BTreeMap::new()
            }
            Err(e) => {
                return Err(RelayError::Storage(format!(
                    "Failed to read accounts file '{}': {e}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            path,
            accounts: Mutex::new(accounts),
        })
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }

    /// Writes the current contents to disk through a temporary file.
    async fn flush(&self, accounts: &BTreeMap<String, Account>) -> Result<(), RelayError> {
        let document = AccountsFile {
            accounts: accounts.values().cloned().collect(),
        };
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|e| RelayError::Storage(format!("Failed to encode accounts: {e}")))?;

        let temp_path = PathBuf::from(format!(
            "{}.tmp.{}",
            self.path.display(),
            uuid::Uuid::new_v4().simple()
        ));
        if let Err(e) = fs::write(&temp_path, &body).await {
            return Err(RelayError::Storage(format!(
                "Failed to write temporary accounts file '{}': {e}",
                temp_path.display()
            )));
        }
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            error!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                self.path.display(),
                e
            );
            if let Err(remove_err) = fs::remove_file(&temp_path).await {
                error!(
                    "Additionally failed to remove temporary accounts file '{}': {remove_err}",
                    temp_path.display()
                );
            }
            return Err(RelayError::Storage(format!(
                "Failed to replace accounts file '{}': {e}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn find_account(&self, identity: &str) -> Result<Option<Account>, RelayError> {
        Ok(self.accounts.lock().await.get(identity).cloned())
    }

    async fn append_readings(&self, identity: &str, readings: Vec<Value>) -> Result<(), RelayError> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(identity)
            .ok_or_else(|| RelayError::UnknownIdentity(identity.to_string()))?;
        let previous_len = account.posture.len();
        account.posture.extend(readings);

        if let Err(e) = self.flush(&accounts).await {
            // Keep memory in line with what is on disk.
            if let Some(account) = accounts.get_mut(identity) {
                account.posture.truncate(previous_len);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn upsert_account(&self, account: Account) -> Result<(), RelayError> {
        let mut accounts = self.accounts.lock().await;
        let previous = accounts.insert(account.email.clone(), account.clone());
        if let Err(e) = self.flush(&accounts).await {
            match previous {
                Some(old) => accounts.insert(old.email.clone(), old),
                None => accounts.remove(&account.email),
            };
            return Err(e);
        }
        Ok(())
    }
}

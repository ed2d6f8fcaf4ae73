use std::path::PathBuf;
#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::account::Account;

use super::json_file::{read_document, write_document, StoreError};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn load(&self) -> Vec<Account>;
    async fn persist(&self, accounts: &[Account]) -> Result<(), StoreError>;
}

pub struct JsonAccountStore {
    path: PathBuf,
}

impl JsonAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonAccountStore { path: path.into() }
    }
}

#[async_trait]
impl AccountRepository for JsonAccountStore {
    async fn load(&self) -> Vec<Account> {
        let accounts = read_document::<Vec<Account>>(&self.path)
            .await
            .unwrap_or_default();
        log::info!("Loaded {} accounts from {}", accounts.len(), self.path.display());
        accounts
    }

    async fn persist(&self, accounts: &[Account]) -> Result<(), StoreError> {
        write_document(&self.path, &accounts).await
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Vec<Account>>,
    fail_persist: bool,
}

#[cfg(test)]
impl MemoryAccountStore {
    pub fn new(accounts: Vec<Account>) -> Self {
        MemoryAccountStore {
            accounts: Mutex::new(accounts),
            fail_persist: false,
        }
    }

    pub fn failing(accounts: Vec<Account>) -> Self {
        MemoryAccountStore {
            accounts: Mutex::new(accounts),
            fail_persist: true,
        }
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.accounts.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl AccountRepository for MemoryAccountStore {
    async fn load(&self) -> Vec<Account> {
        self.accounts()
    }

    async fn persist(&self, accounts: &[Account]) -> Result<(), StoreError> {
        if self.fail_persist {
            return Err(StoreError::Io {
                path: PathBuf::from("memory://accounts"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "persist disabled"),
            });
        }
        *self.accounts.lock().unwrap() = accounts.to_vec();
        Ok(())
    }
}

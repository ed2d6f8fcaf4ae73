use std::{collections::BTreeSet, path::PathBuf};
#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::identity::normalize;

use super::json_file::{read_document, write_document, StoreError};

#[async_trait]
pub trait SentRepository: Send + Sync {
    async fn load(&self) -> BTreeSet<String>;
    async fn persist(&self, handles: &BTreeSet<String>) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SentDocument {
    #[serde(default)]
    emails: Vec<String>,
}

pub struct JsonSentStore {
    path: PathBuf,
}

impl JsonSentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonSentStore { path: path.into() }
    }
}

#[async_trait]
impl SentRepository for JsonSentStore {
    async fn load(&self) -> BTreeSet<String> {
        let document = read_document::<SentDocument>(&self.path)
            .await
            .unwrap_or_default();

        let handles: BTreeSet<String> = document.emails.iter().map(|e| normalize(e)).collect();
        log::info!("Loaded {} sent emails from {}", handles.len(), self.path.display());
        handles
    }

    async fn persist(&self, handles: &BTreeSet<String>) -> Result<(), StoreError> {
        let document = SentDocument {
            emails: handles.iter().cloned().collect(),
        };
        write_document(&self.path, &document).await
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemorySentStore {
    persisted: Mutex<BTreeSet<String>>,
    persist_calls: Mutex<usize>,
}

#[cfg(test)]
impl MemorySentStore {
    pub fn new(initial: impl IntoIterator<Item = &'static str>) -> Self {
        MemorySentStore {
            persisted: Mutex::new(initial.into_iter().map(normalize).collect()),
            persist_calls: Mutex::new(0),
        }
    }

    pub fn persisted(&self) -> BTreeSet<String> {
        self.persisted.lock().unwrap().clone()
    }

    pub fn persist_calls(&self) -> usize {
        *self.persist_calls.lock().unwrap()
    }
}

#[cfg(test)]
#[async_trait]
impl SentRepository for MemorySentStore {
    async fn load(&self) -> BTreeSet<String> {
        self.persisted()
    }

    async fn persist(&self, handles: &BTreeSet<String>) -> Result<(), StoreError> {
        *self.persisted.lock().unwrap() = handles.clone();
        *self.persist_calls.lock().unwrap() += 1;
        Ok(())
    }
}

pub struct SentLedger<R: SentRepository> {
    handles: BTreeSet<String>,
    repository: R,
}

impl<R: SentRepository> SentLedger<R> {
    pub async fn load(repository: R) -> Self {
        let handles = repository.load().await;
        SentLedger {
            handles,
            repository,
        }
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.handles.contains(&normalize(handle))
    }

    pub fn add(&mut self, handle: &str) -> bool {
        self.handles.insert(normalize(handle))
    }

    pub async fn persist(&self) -> Result<(), StoreError> {
        self.repository.persist(&self.handles).await
    }

    /// `add` followed by `persist`; the send counts as committed once this
    /// returns Ok.
    pub async fn commit(&mut self, handle: &str) -> Result<(), StoreError> {
        self.add(handle);
        self.persist().await?;
        log::debug!("Saved sent email: {}", handle);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[cfg(test)]
    pub fn repository(&self) -> &R {
        &self.repository
    }
}

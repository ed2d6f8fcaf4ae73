use std::path::PathBuf;
#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::Identity;

use super::json_file::{read_document, write_document, StoreError};

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn load(&self) -> Vec<Identity>;
    async fn persist(&self, entries: &[Identity]) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdentityDocument {
    #[serde(default)]
    emails: Vec<IdentityRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityRecord {
    email: String,
    timestamp: String,
}

// Legacy files carry naive ISO-8601 stamps without an offset; those are
// read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

pub struct JsonIdentityStore {
    path: PathBuf,
}

impl JsonIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonIdentityStore { path: path.into() }
    }
}

#[async_trait]
impl IdentityRepository for JsonIdentityStore {
    async fn load(&self) -> Vec<Identity> {
        let Some(document) = read_document::<IdentityDocument>(&self.path).await else {
            return vec![];
        };

        let entries: Vec<Identity> = document
            .emails
            .into_iter()
            .filter_map(|record| match parse_timestamp(&record.timestamp) {
                Some(timestamp) => Some(Identity {
                    email: record.email,
                    timestamp,
                }),
                None => {
                    log::error!(
                        "Invalid timestamp {:?} for {}, dropping entry",
                        record.timestamp,
                        record.email
                    );
                    None
                }
            })
            .collect();

        log::info!("Loaded {} identities from {}", entries.len(), self.path.display());
        entries
    }

    async fn persist(&self, entries: &[Identity]) -> Result<(), StoreError> {
        let document = IdentityDocument {
            emails: entries
                .iter()
                .map(|entry| IdentityRecord {
                    email: entry.email.clone(),
                    timestamp: entry.timestamp.to_rfc3339(),
                })
                .collect(),
        };

        write_document(&self.path, &document).await?;
        log::debug!("Saved {} identities to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryIdentityStore {
    initial: Vec<Identity>,
    snapshots: Mutex<Vec<Vec<Identity>>>,
}

#[cfg(test)]
impl MemoryIdentityStore {
    pub fn new(initial: Vec<Identity>) -> Self {
        MemoryIdentityStore {
            initial,
            snapshots: Mutex::new(vec![]),
        }
    }

    pub fn snapshots(&self) -> Vec<Vec<Identity>> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn latest(&self) -> Vec<Identity> {
        self.snapshots()
            .pop()
            .unwrap_or_else(|| self.initial.clone())
    }
}

#[cfg(test)]
#[async_trait]
impl IdentityRepository for MemoryIdentityStore {
    async fn load(&self) -> Vec<Identity> {
        self.latest()
    }

    async fn persist(&self, entries: &[Identity]) -> Result<(), StoreError> {
        self.snapshots.lock().unwrap().push(entries.to_vec());
        Ok(())
    }
}

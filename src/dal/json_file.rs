use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub async fn read_document<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No file found at {}, starting fresh", path.display());
            return None;
        }
        Err(e) => {
            log::warn!("Failed to read {}, starting fresh: {:?}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(document) => Some(document),
        Err(e) => {
            log::warn!("Failed to decode {}, starting fresh: {:?}", path.display(), e);
            None
        }
    }
}

async fn write_synced(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(payload).await?;
    file.sync_all().await
}

/// Overwrites `path` with `document`. The payload is flushed to disk in a
/// sibling temp file and then renamed into place, so readers only ever see
/// the old or the new document.
pub async fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let payload = serde_json::to_vec_pretty(document).map_err(|source| StoreError::Encode {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    if let Err(e) = write_synced(&temp_path, &payload).await {
        _ = tokio::fs::remove_file(&temp_path).await;
        return Err(io_error(e));
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        _ = tokio::fs::remove_file(&temp_path).await;
        return Err(io_error(e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{read_document, write_document};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        emails: Vec<String>,
    }

    #[tokio::test]
    async fn write_then_read_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let doc = Doc {
            emails: vec!["a@b.com".to_string()],
        };

        write_document(&path, &doc).await.unwrap();

        assert_eq!(read_document::<Doc>(&path).await, Some(doc));
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn shorter_document_fully_replaces_longer_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let long = Doc {
            emails: (0..50).map(|i| format!("user{}@mail.com", i)).collect(),
        };
        let short = Doc {
            emails: vec!["x@y.com".to_string()],
        };

        write_document(&path, &long).await.unwrap();
        write_document(&path, &short).await.unwrap();

        assert_eq!(
            std::fs::read(&path).unwrap(),
            serde_json::to_vec_pretty(&short).unwrap()
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn unreadable_documents_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{\"emails\": [").unwrap();

        assert_eq!(read_document::<Doc>(&missing).await, None);
        assert_eq!(read_document::<Doc>(&broken).await, None);
    }
}

//! Blob storage for chat transcripts and uploaded documents.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::core::errors::ApiError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write bytes at `path`, overwriting any existing blob.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), ApiError>;

    /// Read the blob at `path`; `NotFound` if absent.
    async fn get(&self, path: &str) -> Result<Vec<u8>, ApiError>;

    /// Delete the blob at `path`; deleting an absent blob succeeds.
    async fn delete(&self, path: &str) -> Result<(), ApiError>;

    async fn exists(&self, path: &str) -> Result<bool, ApiError>;
}

/// Filesystem-backed blob store rooted at a single directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a relative blob path under the root. Absolute paths and
    /// parent components are rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf, ApiError> {
        let relative = Path::new(path);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || traversal {
            return Err(ApiError::BadRequest(format!("invalid blob path: {path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), ApiError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ApiError::storage)?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(ApiError::storage)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ApiError::NotFound(format!("blob not found: {path}")))
            }
            Err(err) => Err(ApiError::storage(err)),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ApiError::storage(err)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, ApiError> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full).await.map_err(ApiError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> FsBlobStore {
        let dir = std::env::temp_dir().join(format!("docchat-blob-test-{}", uuid::Uuid::new_v4()));
        FsBlobStore::new(dir)
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = test_store();

        store.put("chat_logs/a.json", b"[1,2]").await.unwrap();
        assert!(store.exists("chat_logs/a.json").await.unwrap());
        assert_eq!(store.get("chat_logs/a.json").await.unwrap(), b"[1,2]");

        store.delete("chat_logs/a.json").await.unwrap();
        assert!(!store.exists("chat_logs/a.json").await.unwrap());
        assert!(matches!(
            store.get("chat_logs/a.json").await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn delete_of_absent_blob_succeeds() {
        let store = test_store();
        store.delete("never/written.bin").await.unwrap();
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let store = test_store();
        for bad in ["../outside.txt", "/etc/passwd", "a/../../b"] {
            assert!(matches!(
                store.put(bad, b"x").await.unwrap_err(),
                ApiError::BadRequest(_)
            ));
        }
    }
}

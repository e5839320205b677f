//! The narrow object-store interface the core consumes rather than owning
//! blob storage itself (the spec treats the OLTP store, vector store, queue,
//! and object store as external collaborators reached through interfaces).
//!
//! `FsObjectStore` is the one concrete adapter: it addresses content under a
//! local root directory the same way a real bucket would, keyed by the same
//! `object_key` an S3-backed deployment would use. Swapping in a networked
//! object store means implementing this trait, not touching callers.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ObjectStoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, object_key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, object_key: &str) -> Result<Vec<u8>>;
}

/// Filesystem-backed `ObjectStore`, rooted at `root`. `object_key` segments
/// (`knowledge/<tenant>/<brand>/<sha256>`) become nested directories.
pub struct FsObjectStore {
    root: std::path::PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, object_key: &str) -> std::path::PathBuf {
        self.root.join(object_key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, object_key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(object_key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, object_key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(object_key);
        tokio::fs::read(&path)
            .await
            .map_err(|_| ObjectStoreError::NotFound(object_key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_content_addressed_bytes() {
        let dir = std::env::temp_dir().join(format!("convo-object-store-test-{}", std::process::id()));
        let store = FsObjectStore::new(&dir);
        store.put("knowledge/t1/b1/deadbeef", b"hello").await.unwrap();
        let bytes = store.get("knowledge/t1/b1/deadbeef").await.unwrap();
        assert_eq!(bytes, b"hello");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = std::env::temp_dir().join(format!("convo-object-store-test-missing-{}", std::process::id()));
        let store = FsObjectStore::new(&dir);
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::NotFound(_)));
    }
}

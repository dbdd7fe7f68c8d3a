//! In-memory blob store backend.
//!
//! Used by tests and local development. Same identity and NotFound
//! semantics as the S3 backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use audex_models::BlobId;

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    #[allow(dead_code)]
    content_type: String,
}

/// Blob store backed by a process-local map.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, StoredBlob>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// True when no blobs are stored.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> StorageResult<BlobId> {
        let id = BlobId::from_string(Uuid::new_v4().to_string());
        self.blobs.write().await.insert(
            id.as_str().to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> StorageResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(id.as_str())
            .map(|b| b.bytes.clone())
            .ok_or_else(|| StorageError::not_found(id.as_str()))
    }

    async fn delete(&self, id: &BlobId) -> StorageResult<()> {
        self.blobs
            .write()
            .await
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(id.as_str()))
    }

    async fn exists(&self, id: &BlobId) -> StorageResult<bool> {
        Ok(self.blobs.read().await.contains_key(id.as_str()))
    }

    async fn list(&self) -> StorageResult<Vec<BlobId>> {
        Ok(self
            .blobs
            .read()
            .await
            .keys()
            .map(|k| BlobId::from(k.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_returns_bytes() {
        let store = MemoryBlobStore::new();

        let id = store.put(b"payload".to_vec(), "video/mp4").await.unwrap();
        let bytes = store.get(&id).await.unwrap();

        assert_eq!(bytes, b"payload");
    }

    #[tokio::test]
    async fn each_put_gets_a_fresh_id() {
        let store = MemoryBlobStore::new();

        let a = store.put(b"a".to_vec(), "video/mp4").await.unwrap();
        let b = store.put(b"a".to_vec(), "video/mp4").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn get_after_delete_is_not_found() {
        let store = MemoryBlobStore::new();

        let id = store.put(b"payload".to_vec(), "video/mp4").await.unwrap();
        store.delete(&id).await.unwrap();

        let err = store.get(&id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_not_found() {
        let store = MemoryBlobStore::new();

        let err = store.delete(&BlobId::from("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

//! Blob store capability trait.

use async_trait::async_trait;

use audex_models::BlobId;

use crate::error::StorageResult;

/// Write-once binary storage with store-generated identifiers.
///
/// Blobs are immutable: written once, read any number of times, deleted
/// once. Implementations must be safe under concurrent independent calls
/// from multiple workers; no cross-blob coordination is required.
///
/// `get` and `delete` on an unknown or already-deleted id return
/// [`StorageError::NotFound`](crate::StorageError::NotFound), which callers
/// must treat as permanent, distinct from retryable transport errors.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a payload and return the identifier the store assigned to it.
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> StorageResult<BlobId>;

    /// Fetch a blob's bytes.
    async fn get(&self, id: &BlobId) -> StorageResult<Vec<u8>>;

    /// Delete a blob.
    async fn delete(&self, id: &BlobId) -> StorageResult<()>;

    /// Check whether a blob exists.
    async fn exists(&self, id: &BlobId) -> StorageResult<bool>;

    /// List all blob ids currently stored.
    ///
    /// Used by operational tooling and orphan-detection tests; not part of
    /// the pipeline hot path.
    async fn list(&self) -> StorageResult<Vec<BlobId>>;
}

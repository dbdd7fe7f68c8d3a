//! Content-addressed blob store for pipeline payloads.
//!
//! This crate provides:
//! - The [`BlobStore`] capability trait (put/get/delete)
//! - An S3-compatible backend (R2, MinIO, AWS S3)
//! - An in-memory backend for tests and local development

pub mod error;
pub mod memory;
pub mod s3;
mod store;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryBlobStore;
pub use s3::{S3BlobStore, S3Config};
pub use store::BlobStore;

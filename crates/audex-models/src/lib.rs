//! Shared data models for the audex pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Blob identifiers (store-generated, opaque)
//! - Queue job messages exchanged between pipeline stages

pub mod blob;
pub mod job;

pub use blob::BlobId;
pub use job::{ConvertAudioJob, JobId, NotifyOwnerJob, QueueJob};

//! Pipeline error types.

use thiserror::Error;

use audex_queue::QueueError;
use audex_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The downstream publish failed. The blob written by this step has
    /// already been compensated (deleted) by the time this surfaces.
    #[error("Publish failed after store (blob compensated): {0}")]
    Publish(#[source] QueueError),
}

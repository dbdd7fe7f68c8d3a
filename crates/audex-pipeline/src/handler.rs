//! Job handler trait consumed by the executor.

use async_trait::async_trait;
use thiserror::Error;

use audex_models::QueueJob;
use audex_queue::QueueName;

/// Failure modes of a job handler.
///
/// Both kinds go through the executor's bounded retry counter and land on
/// the DLQ once it is exhausted; the distinction exists for logging and
/// for the DLQ record, since retrying a terminal failure is expected to
/// keep failing.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Transient failure (transport, downstream publish); redelivery may
    /// succeed.
    #[error("retryable: {0}")]
    Retryable(anyhow::Error),

    /// Payload-level failure (corrupt or unsupported input); redelivery
    /// will fail the same way.
    #[error("terminal: {0}")]
    Terminal(anyhow::Error),
}

impl HandlerError {
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        Self::Retryable(err.into())
    }

    pub fn terminal(err: impl Into<anyhow::Error>) -> Self {
        Self::Terminal(err.into())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HandlerError::Terminal(_))
    }
}

/// One pipeline stage's processing logic.
///
/// The executor owns delivery, acknowledgment, retry accounting, and
/// dead-lettering; the handler owns only the job's side effects. Returning
/// `Ok` tells the executor every durable side effect has completed and the
/// message may be acknowledged. Returning `Err` leaves the message
/// unacked for redelivery.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// The queue this handler consumes.
    fn queue(&self) -> QueueName;

    /// Process one job. Must be idempotent under replay.
    async fn handle(&self, job: &QueueJob) -> Result<(), HandlerError>;
}

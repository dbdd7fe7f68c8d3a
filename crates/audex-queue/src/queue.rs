//! Job queue capability trait.

use std::fmt;

use async_trait::async_trait;

use audex_models::QueueJob;

use crate::error::QueueResult;

/// The two logical queues of the pipeline, one per stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// Ingestion → conversion worker
    Conversion,
    /// Conversion worker → notification worker
    Notification,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Conversion => "conversion",
            QueueName::Notification => "notification",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message handed to a consumer. The message id doubles as the ack
/// handle.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-assigned message id, passed back to `ack` or `dead_letter`
    pub message_id: String,
    /// The deserialized job payload
    pub job: QueueJob,
}

/// Durable, at-least-once message channel between pipeline stages.
///
/// A published message survives broker and process restarts once `publish`
/// returns. A consumed message is removed only by `ack` (or `dead_letter`);
/// anything else — crash, dropped future, handler error — leaves it pending
/// for redelivery via `claim_stale`. Consumers must therefore make their
/// processing idempotent under replay.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Create queue resources (streams, consumer groups). Idempotent.
    async fn init(&self) -> QueueResult<()>;

    /// Durably publish a job. Returns the broker message id.
    async fn publish(&self, queue: QueueName, job: &QueueJob) -> QueueResult<String>;

    /// Consume up to `count` new messages, blocking up to `block_ms`.
    async fn consume(
        &self,
        queue: QueueName,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Acknowledge a message, removing it from the queue. The commit
    /// point of a stage: call only after every durable side effect of
    /// processing has completed.
    async fn ack(&self, queue: QueueName, message_id: &str) -> QueueResult<()>;

    /// Move a message to the dead-letter stream and acknowledge it.
    async fn dead_letter(
        &self,
        queue: QueueName,
        message_id: &str,
        job: &QueueJob,
        error: &str,
    ) -> QueueResult<()>;

    /// Claim messages that have been pending unacked for at least
    /// `min_idle_ms` (crash recovery for dead consumers).
    async fn claim_stale(
        &self,
        queue: QueueName,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Increment and return the delivery-failure count for a message.
    async fn incr_retry(&self, queue: QueueName, message_id: &str) -> QueueResult<u32>;

    /// Number of messages on a queue.
    async fn len(&self, queue: QueueName) -> QueueResult<u64>;

    /// Number of messages on the dead-letter stream.
    async fn dlq_len(&self) -> QueueResult<u64>;
}

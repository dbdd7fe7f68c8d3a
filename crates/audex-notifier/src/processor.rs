//! Notification job processing.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::info;

use audex_models::{NotifyOwnerJob, QueueJob};
use audex_pipeline::{HandlerError, JobHandler};
use audex_queue::QueueName;

use crate::notify::Notifier;

/// Handler for the `notification` queue.
///
/// Returns `Ok` — and thereby lets the executor ack — only after the
/// notifier reported successful delivery. A duplicate notification after a
/// crash-before-ack is the documented cost of at-least-once delivery.
pub struct NotifyHandler {
    notifier: Arc<dyn Notifier>,
}

impl NotifyHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    async fn notify(&self, job: &NotifyOwnerJob) -> Result<(), HandlerError> {
        // Delivery failures are transport problems: leave the message
        // unacked and let redelivery retry, bounded by the DLQ policy.
        self.notifier
            .deliver(&job.owner, &job.derived_blob_id)
            .await
            .map_err(HandlerError::retryable)?;

        counter!("audex_notifications_total").increment(1);
        info!(
            job_id = %job.job_id,
            derived_blob_id = %job.derived_blob_id,
            "Owner notified"
        );
        Ok(())
    }
}

#[async_trait]
impl JobHandler for NotifyHandler {
    fn queue(&self) -> QueueName {
        QueueName::Notification
    }

    async fn handle(&self, job: &QueueJob) -> Result<(), HandlerError> {
        match job {
            QueueJob::NotifyOwner(job) => self.notify(job).await,
            other => Err(HandlerError::terminal(anyhow::anyhow!(
                "unexpected {} job on notification queue",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::Mutex;

    use audex_models::{BlobId, ConvertAudioJob, JobId};
    use audex_queue::{JobQueue, MemoryJobQueue};

    use crate::notify::{NotifyError, NotifyResult};

    /// Fails the first `fail_first` deliveries, then succeeds, recording
    /// every successful delivery.
    struct FlakyNotifier {
        fail_first: u32,
        calls: AtomicU32,
        delivered: Mutex<Vec<(String, String)>>,
    }

    impl FlakyNotifier {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                calls: AtomicU32::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn deliver(&self, owner: &str, reference: &BlobId) -> NotifyResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(NotifyError::delivery_failed("smtp relay refused"));
            }
            self.delivered
                .lock()
                .await
                .push((owner.to_string(), reference.as_str().to_string()));
            Ok(())
        }
    }

    fn notify_job() -> QueueJob {
        QueueJob::NotifyOwner(NotifyOwnerJob::new(
            JobId::new(),
            BlobId::from("mp3-1"),
            "user@example.com",
        ))
    }

    #[tokio::test]
    async fn delivery_failure_then_success_notifies_exactly_once() {
        let notifier = Arc::new(FlakyNotifier::new(1));
        let handler = NotifyHandler::new(Arc::clone(&notifier) as Arc<dyn Notifier>);
        let queue = MemoryJobQueue::new();
        let job = notify_job();

        queue.publish(QueueName::Notification, &job).await.unwrap();
        let delivery = queue
            .consume(QueueName::Notification, "n1", 100, 1)
            .await
            .unwrap()
            .remove(0);

        // First attempt fails: no ack, message stays pending.
        let err = handler.handle(&delivery.job).await.unwrap_err();
        assert!(!err.is_terminal());
        assert_eq!(queue.pending_len(QueueName::Notification).await, 1);

        // Redelivery succeeds; only then is the message acked.
        let redelivered = queue
            .claim_stale(QueueName::Notification, "n2", 0, 1)
            .await
            .unwrap()
            .remove(0);
        handler.handle(&redelivered.job).await.unwrap();
        queue
            .ack(QueueName::Notification, &redelivered.message_id)
            .await
            .unwrap();

        let delivered = notifier.delivered.lock().await;
        assert_eq!(
            *delivered,
            vec![("user@example.com".to_string(), "mp3-1".to_string())]
        );
        assert_eq!(queue.len(QueueName::Notification).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn misrouted_job_is_terminal() {
        let handler = NotifyHandler::new(Arc::new(FlakyNotifier::new(0)));
        let job = QueueJob::ConvertAudio(ConvertAudioJob::new(BlobId::from("b"), "owner"));

        let err = handler.handle(&job).await.unwrap_err();
        assert!(err.is_terminal());
    }
}

//! Conversion job processing.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{info, warn};

use audex_media::AudioTransform;
use audex_models::{ConvertAudioJob, NotifyOwnerJob, QueueJob};
use audex_pipeline::{store_then_publish, HandlerError, JobHandler};
use audex_queue::{JobQueue, QueueName};
use audex_storage::BlobStore;

/// Handler for the `conversion` queue.
///
/// Per job: fetch the source blob, extract its audio, store the result,
/// publish the notification job, delete the source. The incoming message
/// is acked by the executor only after all of that succeeded, so any crash
/// along the way replays the whole job — and the replay is absorbed by
/// treating a missing source blob as "already processed".
pub struct ConvertHandler {
    store: Arc<dyn BlobStore>,
    queue: Arc<dyn JobQueue>,
    transform: Arc<dyn AudioTransform>,
}

impl ConvertHandler {
    pub fn new(
        store: Arc<dyn BlobStore>,
        queue: Arc<dyn JobQueue>,
        transform: Arc<dyn AudioTransform>,
    ) -> Self {
        Self {
            store,
            queue,
            transform,
        }
    }

    async fn convert(&self, job: &ConvertAudioJob) -> Result<(), HandlerError> {
        // Fetch the source. A missing blob means a previous delivery of
        // this job already ran to completion and deleted it: success.
        let source = match self.store.get(&job.source_blob_id).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                info!(
                    job_id = %job.job_id,
                    source_blob_id = %job.source_blob_id,
                    "Source blob gone, job already processed"
                );
                return Ok(());
            }
            Err(e) => return Err(HandlerError::retryable(e)),
        };

        // The transform releases its scratch space on every exit path.
        let audio = match self.transform.extract_audio(&source).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_transform_failure() => return Err(HandlerError::terminal(e)),
            Err(e) => return Err(HandlerError::retryable(e)),
        };

        // Store the audio, then announce it. A failed announce deletes the
        // audio blob again inside the saga; surfacing a retryable error
        // (without acking) lets redelivery restart the job from the top.
        let announcement = store_then_publish(
            self.store.as_ref(),
            self.queue.as_ref(),
            QueueName::Notification,
            audio,
            "audio/mpeg",
            |blob_id| {
                QueueJob::NotifyOwner(NotifyOwnerJob::new(
                    job.job_id.clone(),
                    blob_id,
                    job.owner.clone(),
                ))
            },
        )
        .await
        .map_err(HandlerError::retryable)?;

        counter!("audex_conversions_total").increment(1);
        info!(
            job_id = %job.job_id,
            derived_blob_id = %announcement.blob_id,
            "Audio stored and notification queued"
        );

        // The notification is durably queued; a failed source cleanup is
        // an orphan for out-of-band cleanup, not a pipeline failure.
        match self.store.delete(&job.source_blob_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(
                    job_id = %job.job_id,
                    source_blob_id = %job.source_blob_id,
                    "Source blob cleanup failed, leaving orphan: {}",
                    e
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl JobHandler for ConvertHandler {
    fn queue(&self) -> QueueName {
        QueueName::Conversion
    }

    async fn handle(&self, job: &QueueJob) -> Result<(), HandlerError> {
        match job {
            QueueJob::ConvertAudio(job) => self.convert(job).await,
            other => Err(HandlerError::terminal(anyhow::anyhow!(
                "unexpected {} job on conversion queue",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audex_media::{MediaError, MediaResult};
    use audex_models::BlobId;
    use audex_queue::MemoryJobQueue;
    use audex_storage::MemoryBlobStore;

    struct FakeTransform;

    #[async_trait]
    impl AudioTransform for FakeTransform {
        async fn extract_audio(&self, input: &[u8]) -> MediaResult<Vec<u8>> {
            // 10 KB of video becomes 2 KB of audio, near enough.
            Ok(input.iter().copied().step_by(5).collect())
        }
    }

    struct RejectingTransform;

    #[async_trait]
    impl AudioTransform for RejectingTransform {
        async fn extract_audio(&self, _input: &[u8]) -> MediaResult<Vec<u8>> {
            Err(MediaError::transform_failed("no audio stream"))
        }
    }

    struct Fixture {
        store: MemoryBlobStore,
        queue: MemoryJobQueue,
        handler: ConvertHandler,
    }

    fn fixture_with(transform: Arc<dyn AudioTransform>) -> Fixture {
        let store = MemoryBlobStore::new();
        let queue = MemoryJobQueue::new();
        let handler = ConvertHandler::new(
            Arc::new(store.clone()),
            Arc::new(queue.clone()),
            transform,
        );
        Fixture {
            store,
            queue,
            handler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(FakeTransform))
    }

    async fn seed_source(f: &Fixture) -> ConvertAudioJob {
        let source_id = f
            .store
            .put(vec![7u8; 10 * 1024], "video/mp4")
            .await
            .unwrap();
        ConvertAudioJob::new(source_id, "user@example.com")
    }

    #[tokio::test]
    async fn happy_path_stores_audio_deletes_source_and_queues_notification() {
        let f = fixture();
        let job = seed_source(&f).await;

        f.handler
            .handle(&QueueJob::ConvertAudio(job.clone()))
            .await
            .unwrap();

        // Source is gone, exactly one (derived) blob remains.
        assert!(f
            .store
            .get(&job.source_blob_id)
            .await
            .unwrap_err()
            .is_not_found());
        let remaining = f.store.list().await.unwrap();
        assert_eq!(remaining.len(), 1);

        // One notification job naming the derived blob and the owner.
        let deliveries = f
            .queue
            .consume(QueueName::Notification, "t", 100, 10)
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        match &deliveries[0].job {
            QueueJob::NotifyOwner(n) => {
                assert_eq!(n.owner, "user@example.com");
                assert_eq!(n.job_id, job.job_id);
                assert_eq!(n.derived_blob_id, remaining[0]);
                // Write-before-announce: the derived blob is retrievable.
                assert!(f.store.get(&n.derived_blob_id).await.is_ok());
            }
            other => panic!("unexpected job: {other:?}"),
        }
    }

    #[tokio::test]
    async fn replay_after_completion_is_a_no_op() {
        let f = fixture();
        let job = seed_source(&f).await;
        let wire = QueueJob::ConvertAudio(job);

        // First delivery completes; the redelivery simulates a crash after
        // the source delete but before the ack.
        f.handler.handle(&wire).await.unwrap();
        f.handler.handle(&wire).await.unwrap();

        // Exactly one derived blob and one notification job, not two.
        assert_eq!(f.store.list().await.unwrap().len(), 1);
        assert_eq!(f.queue.len(QueueName::Notification).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn publish_failure_compensates_the_derived_blob() {
        let f = fixture();
        let job = seed_source(&f).await;
        f.queue.set_fail_publishes(true);

        let err = f
            .handler
            .handle(&QueueJob::ConvertAudio(job.clone()))
            .await
            .unwrap_err();
        assert!(!err.is_terminal());

        // The derived blob was deleted again; the source survives for the
        // retry; nothing reached the notification queue.
        let remaining = f.store.list().await.unwrap();
        assert_eq!(remaining, vec![job.source_blob_id.clone()]);
        assert_eq!(f.queue.len(QueueName::Notification).await.unwrap(), 0);

        // Redelivery after the broker recovers completes the job.
        f.queue.set_fail_publishes(false);
        f.handler
            .handle(&QueueJob::ConvertAudio(job))
            .await
            .unwrap();
        assert_eq!(f.queue.len(QueueName::Notification).await.unwrap(), 1);
        assert_eq!(f.store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_payload_is_terminal_and_leaves_the_source() {
        let f = fixture_with(Arc::new(RejectingTransform));
        let job = seed_source(&f).await;

        let err = f
            .handler
            .handle(&QueueJob::ConvertAudio(job.clone()))
            .await
            .unwrap_err();

        assert!(err.is_terminal());
        // Nothing stored, nothing published; the source stays for the DLQ
        // post-mortem.
        assert_eq!(f.store.list().await.unwrap(), vec![job.source_blob_id]);
        assert_eq!(f.queue.len(QueueName::Notification).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn misrouted_job_is_terminal() {
        let f = fixture();
        let job = QueueJob::NotifyOwner(NotifyOwnerJob::new(
            audex_models::JobId::new(),
            BlobId::from("b"),
            "owner",
        ));

        let err = f.handler.handle(&job).await.unwrap_err();
        assert!(err.is_terminal());
    }
}

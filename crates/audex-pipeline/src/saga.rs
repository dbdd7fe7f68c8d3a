//! Write-then-announce-or-compensate.
//!
//! Every stage that stores a blob and announces it downstream follows the
//! same two-step saga: the blob must be durably written before the job
//! naming it is published, and a blob whose announcement failed must not
//! outlive the failure. This module is that saga, shared by the ingestion
//! boundary and the conversion worker.

use tracing::{info, warn};

use audex_models::{BlobId, ConvertAudioJob, QueueJob};
use audex_queue::{JobQueue, QueueName};
use audex_storage::BlobStore;

use crate::error::{PipelineError, PipelineResult};

/// Result of a successful store-and-announce step.
#[derive(Debug, Clone)]
pub struct Announcement {
    /// Identifier the store assigned to the written blob
    pub blob_id: BlobId,
    /// Broker message id of the published job
    pub message_id: String,
}

/// Store `bytes`, then publish the job `build_job` constructs for the new
/// blob id.
///
/// If the publish fails, the just-written blob is deleted before the error
/// is returned, so a failed call leaves no state behind. A failed
/// compensating delete is logged as an orphan for out-of-band cleanup and
/// never changes the reported error.
pub async fn store_then_publish<F>(
    store: &dyn BlobStore,
    queue: &dyn JobQueue,
    queue_name: QueueName,
    bytes: Vec<u8>,
    content_type: &str,
    build_job: F,
) -> PipelineResult<Announcement>
where
    F: FnOnce(BlobId) -> QueueJob,
{
    let blob_id = store.put(bytes, content_type).await?;
    let job = build_job(blob_id.clone());

    match queue.publish(queue_name, &job).await {
        Ok(message_id) => {
            info!(
                blob_id = %blob_id,
                queue = %queue_name,
                job_id = %job.job_id(),
                "Stored blob and published job"
            );
            Ok(Announcement { blob_id, message_id })
        }
        Err(publish_err) => {
            match store.delete(&blob_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(delete_err) => {
                    warn!(
                        blob_id = %blob_id,
                        "Orphaned blob: compensating delete failed: {}",
                        delete_err
                    );
                }
            }
            Err(PipelineError::Publish(publish_err))
        }
    }
}

/// Ingestion entry point: store an uploaded payload and enqueue the
/// conversion job for it.
pub async fn ingest_source(
    store: &dyn BlobStore,
    queue: &dyn JobQueue,
    bytes: Vec<u8>,
    content_type: &str,
    owner: &str,
) -> PipelineResult<Announcement> {
    store_then_publish(
        store,
        queue,
        QueueName::Conversion,
        bytes,
        content_type,
        |blob_id| QueueJob::ConvertAudio(ConvertAudioJob::new(blob_id, owner)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use audex_queue::MemoryJobQueue;
    use audex_storage::MemoryBlobStore;

    #[tokio::test]
    async fn successful_ingest_stores_blob_and_queues_job() {
        let store = MemoryBlobStore::new();
        let queue = MemoryJobQueue::new();

        let announcement = ingest_source(
            &store,
            &queue,
            vec![0u8; 10 * 1024],
            "video/mp4",
            "user@example.com",
        )
        .await
        .unwrap();

        // The blob is durably readable at the moment the job exists.
        assert!(store.get(&announcement.blob_id).await.is_ok());

        let deliveries = queue
            .consume(QueueName::Conversion, "t", 100, 10)
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        match &deliveries[0].job {
            QueueJob::ConvertAudio(job) => {
                assert_eq!(job.source_blob_id, announcement.blob_id);
                assert_eq!(job.owner, "user@example.com");
            }
            other => panic!("unexpected job on conversion queue: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_failure_leaves_no_orphan() {
        let store = MemoryBlobStore::new();
        let queue = MemoryJobQueue::new();
        queue.set_fail_publishes(true);

        let err = ingest_source(&store, &queue, b"payload".to_vec(), "video/mp4", "owner")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Publish(_)));
        // Compensation: the store holds nothing from the failed call.
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(queue.len(QueueName::Conversion).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn announcement_names_the_published_blob() {
        let store = MemoryBlobStore::new();
        let queue = MemoryJobQueue::new();

        let announcement = store_then_publish(
            &store,
            &queue,
            QueueName::Notification,
            b"mp3 bytes".to_vec(),
            "audio/mpeg",
            |blob_id| {
                QueueJob::NotifyOwner(audex_models::NotifyOwnerJob::new(
                    audex_models::JobId::new(),
                    blob_id,
                    "owner",
                ))
            },
        )
        .await
        .unwrap();

        let deliveries = queue
            .consume(QueueName::Notification, "t", 100, 1)
            .await
            .unwrap();
        match &deliveries[0].job {
            QueueJob::NotifyOwner(job) => {
                assert_eq!(job.derived_blob_id, announcement.blob_id);
                // Write-before-announce: the referenced blob is retrievable.
                assert_eq!(store.get(&job.derived_blob_id).await.unwrap(), b"mp3 bytes");
            }
            other => panic!("unexpected job: {other:?}"),
        }
    }
}

//! At-least-once pipeline properties, driven over the in-memory backends.
//!
//! Each test simulates a worker crash at a different point of the
//! conversion state machine by dropping the ack, then checks that
//! redelivery converges on exactly one derived blob and one notification
//! job — never zero, never two.

use std::sync::Arc;

use async_trait::async_trait;

use audex_media::{AudioTransform, MediaResult};
use audex_models::{ConvertAudioJob, QueueJob};
use audex_pipeline::{ingest_source, JobHandler};
use audex_queue::{JobQueue, MemoryJobQueue, QueueName};
use audex_storage::{BlobStore, MemoryBlobStore};
use audex_worker::ConvertHandler;

struct HalvingTransform;

#[async_trait]
impl AudioTransform for HalvingTransform {
    async fn extract_audio(&self, input: &[u8]) -> MediaResult<Vec<u8>> {
        Ok(input[..input.len() / 2].to_vec())
    }
}

struct Env {
    store: MemoryBlobStore,
    queue: MemoryJobQueue,
    handler: ConvertHandler,
}

fn env() -> Env {
    let store = MemoryBlobStore::new();
    let queue = MemoryJobQueue::new();
    let handler = ConvertHandler::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        Arc::new(HalvingTransform),
    );
    Env {
        store,
        queue,
        handler,
    }
}

async fn upload(env: &Env) -> ConvertAudioJob {
    ingest_source(
        &env.store,
        &env.queue,
        vec![3u8; 10 * 1024],
        "video/mp4",
        "user@example.com",
    )
    .await
    .unwrap();

    let deliveries = env
        .queue
        .consume(QueueName::Conversion, "w1", 100, 1)
        .await
        .unwrap();
    match deliveries.into_iter().next().unwrap().job {
        QueueJob::ConvertAudio(job) => job,
        other => panic!("unexpected job: {other:?}"),
    }
}

async fn assert_converged(env: &Env) {
    // Exactly one notification job, naming a retrievable derived blob.
    let notifications = env
        .queue
        .consume(QueueName::Notification, "n1", 100, 10)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    let QueueJob::NotifyOwner(notify) = &notifications[0].job else {
        panic!("unexpected job on notification queue");
    };
    assert_eq!(notify.owner, "user@example.com");
    assert!(env.store.get(&notify.derived_blob_id).await.is_ok());

    // Exactly one blob total: the source was cleaned up.
    assert_eq!(env.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn crash_before_processing_converges_after_redelivery() {
    let env = env();
    let job = upload(&env).await;

    // The worker died right after consuming: the message is pending,
    // nothing was processed. Another worker claims and processes it.
    let claimed = env
        .queue
        .claim_stale(QueueName::Conversion, "w2", 0, 1)
        .await
        .unwrap();
    assert_eq!(claimed[0].job, QueueJob::ConvertAudio(job));

    env.handler.handle(&claimed[0].job).await.unwrap();
    env.queue
        .ack(QueueName::Conversion, &claimed[0].message_id)
        .await
        .unwrap();

    assert_converged(&env).await;
}

#[tokio::test]
async fn crash_after_completion_before_ack_converges_without_duplicates() {
    let env = env();
    let job = upload(&env).await;
    let wire = QueueJob::ConvertAudio(job);

    // Full processing happened, then the worker died before acking.
    env.handler.handle(&wire).await.unwrap();

    // Redelivery: the replay sees the source gone and no-ops, then acks.
    let claimed = env
        .queue
        .claim_stale(QueueName::Conversion, "w2", 0, 1)
        .await
        .unwrap();
    env.handler.handle(&claimed[0].job).await.unwrap();
    env.queue
        .ack(QueueName::Conversion, &claimed[0].message_id)
        .await
        .unwrap();

    assert_converged(&env).await;
}

#[tokio::test]
async fn broker_outage_at_announce_converges_after_recovery() {
    let env = env();
    let job = upload(&env).await;
    let wire = QueueJob::ConvertAudio(job);

    // The notification publish fails mid-job: the derived blob is
    // compensated and the handler reports a retryable failure.
    env.queue.set_fail_publishes(true);
    let err = env.handler.handle(&wire).await.unwrap_err();
    assert!(!err.is_terminal());
    assert_eq!(env.queue.len(QueueName::Notification).await.unwrap(), 0);

    // Broker recovers; redelivery runs the whole job again.
    env.queue.set_fail_publishes(false);
    let claimed = env
        .queue
        .claim_stale(QueueName::Conversion, "w2", 0, 1)
        .await
        .unwrap();
    env.handler.handle(&claimed[0].job).await.unwrap();
    env.queue
        .ack(QueueName::Conversion, &claimed[0].message_id)
        .await
        .unwrap();

    assert_converged(&env).await;
}

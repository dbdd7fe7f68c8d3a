//! At-least-once consumer loop.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use audex_queue::{Delivery, JobQueue, QueueResult};

use crate::handler::JobHandler;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Consumer name registered with the broker
    pub consumer_name: String,
    /// Maximum concurrent jobs in this process
    pub max_concurrent_jobs: usize,
    /// Delivery failures before a message is dead-lettered
    pub max_retries: u32,
    /// Broker block time per consume call
    pub block_ms: u64,
    /// Sleep when a consume call returns nothing
    pub idle_sleep: Duration,
    /// How often to scan for stale pending messages
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message is claimed
    pub claim_min_idle: Duration,
    /// Graceful shutdown wait for in-flight jobs
    pub shutdown_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            consumer_name: format!("worker-{}", Uuid::new_v4()),
            max_concurrent_jobs: 2,
            max_retries: 3,
            block_ms: 1000,
            idle_sleep: Duration::from_millis(100),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

/// Consumer loop that drives a [`JobHandler`] with at-least-once
/// semantics.
///
/// Per message: the handler runs, and only a handler `Ok` acknowledges.
/// On failure the message stays pending; the broker redelivers it (via the
/// stale-claim scan) until the bounded retry count is exhausted, at which
/// point it is dead-lettered. A crash anywhere before the ack therefore
/// loses nothing: the message comes back and the handler's idempotence
/// absorbs the replay.
pub struct Executor {
    config: ExecutorConfig,
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl Executor {
    pub fn new(queue: Arc<dyn JobQueue>, handler: Arc<dyn JobHandler>, config: ExecutorConfig) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);

        Self {
            config,
            queue,
            handler,
            job_semaphore,
            shutdown,
        }
    }

    /// Run until [`Executor::shutdown`] is called.
    pub async fn run(&self) -> QueueResult<()> {
        let queue_name = self.handler.queue();
        info!(
            "Starting executor '{}' on queue '{}' with {} max concurrent jobs",
            self.config.consumer_name, queue_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically claim messages whose consumer died before acking.
        let claim_queue = Arc::clone(&self.queue);
        let claim_handler = Arc::clone(&self.handler);
        let claim_semaphore = Arc::clone(&self.job_semaphore);
        let claim_config = self.config.clone();
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            // First scan one full interval in: messages pending at startup
            // are either in flight here or below the idle threshold anyway.
            let mut interval = tokio::time::interval_at(
                tokio::time::Instant::now() + claim_config.claim_interval,
                claim_config.claim_interval,
            );
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let claimed = claim_queue
                            .claim_stale(
                                queue_name,
                                &claim_config.consumer_name,
                                claim_config.claim_min_idle.as_millis() as u64,
                                claim_config.max_concurrent_jobs,
                            )
                            .await;
                        match claimed {
                            Ok(deliveries) if !deliveries.is_empty() => {
                                info!("Claimed {} stale messages", deliveries.len());
                                for delivery in deliveries {
                                    let Ok(permit) =
                                        Arc::clone(&claim_semaphore).acquire_owned().await
                                    else {
                                        return;
                                    };
                                    let queue = Arc::clone(&claim_queue);
                                    let handler = Arc::clone(&claim_handler);
                                    let max_retries = claim_config.max_retries;
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_delivery(queue, handler, max_retries, delivery)
                                            .await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim stale messages: {}", e),
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_batch() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Executor stopped");
        Ok(())
    }

    /// Consume and dispatch one batch of messages.
    async fn consume_batch(&self) -> QueueResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(
                self.handler.queue(),
                &self.config.consumer_name,
                self.config.block_ms,
                available.min(5),
            )
            .await?;

        if deliveries.is_empty() {
            tokio::time::sleep(self.config.idle_sleep).await;
            return Ok(());
        }

        debug!("Consumed {} messages", deliveries.len());

        for delivery in deliveries {
            let Ok(permit) = Arc::clone(&self.job_semaphore).acquire_owned().await else {
                break;
            };
            let queue = Arc::clone(&self.queue);
            let handler = Arc::clone(&self.handler);
            let max_retries = self.config.max_retries;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_delivery(queue, handler, max_retries, delivery).await;
            });
        }

        Ok(())
    }

    /// Run the handler for one message and settle it: ack on success,
    /// leave pending or dead-letter on failure.
    pub(crate) async fn execute_delivery(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        max_retries: u32,
        delivery: Delivery,
    ) {
        let queue_name = handler.queue();
        let job_id = delivery.job.job_id().clone();
        let kind = delivery.job.kind();
        info!(job_id = %job_id, kind, "Executing job");

        match handler.handle(&delivery.job).await {
            Ok(()) => {
                if let Err(e) = queue.ack(queue_name, &delivery.message_id).await {
                    // The work is durable; redelivery will hit the
                    // idempotent replay path and settle the message.
                    error!(job_id = %job_id, "Failed to ack completed job: {}", e);
                    return;
                }
                counter!("audex_jobs_completed_total", "queue" => queue_name.as_str()).increment(1);
                info!(job_id = %job_id, "Job completed");
            }
            Err(e) => {
                error!(job_id = %job_id, terminal = e.is_terminal(), "Job failed: {}", e);
                counter!("audex_jobs_failed_total", "queue" => queue_name.as_str()).increment(1);

                let retry_count = queue
                    .incr_retry(queue_name, &delivery.message_id)
                    .await
                    .unwrap_or(u32::MAX);

                if retry_count >= max_retries {
                    warn!(
                        job_id = %job_id,
                        "Job exceeded max retries ({}), moving to DLQ",
                        max_retries
                    );
                    if let Err(dlq_err) = queue
                        .dead_letter(queue_name, &delivery.message_id, &delivery.job, &e.to_string())
                        .await
                    {
                        error!(job_id = %job_id, "Failed to dead-letter job: {}", dlq_err);
                    } else {
                        counter!("audex_jobs_dead_lettered_total", "queue" => queue_name.as_str())
                            .increment(1);
                    }
                } else {
                    info!(
                        job_id = %job_id,
                        "Job will be redelivered (attempt {}/{})",
                        retry_count,
                        max_retries
                    );
                }
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use audex_models::{BlobId, ConvertAudioJob, QueueJob};
    use audex_queue::{MemoryJobQueue, QueueName};

    use crate::handler::HandlerError;

    struct CountingHandler {
        queue: QueueName,
        calls: AtomicU32,
        fail_first: u32,
        terminal: bool,
    }

    impl CountingHandler {
        fn ok(queue: QueueName) -> Self {
            Self {
                queue,
                calls: AtomicU32::new(0),
                fail_first: 0,
                terminal: false,
            }
        }

        fn failing(queue: QueueName, fail_first: u32, terminal: bool) -> Self {
            Self {
                queue,
                calls: AtomicU32::new(0),
                fail_first,
                terminal,
            }
        }
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        fn queue(&self) -> QueueName {
            self.queue
        }

        async fn handle(&self, _job: &QueueJob) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                let err = anyhow::anyhow!("induced failure");
                if self.terminal {
                    Err(HandlerError::terminal(err))
                } else {
                    Err(HandlerError::retryable(err))
                }
            } else {
                Ok(())
            }
        }
    }

    fn convert_job() -> QueueJob {
        QueueJob::ConvertAudio(ConvertAudioJob::new(BlobId::from("b"), "owner"))
    }

    async fn deliver_one(queue: &MemoryJobQueue) -> Delivery {
        queue
            .consume(QueueName::Conversion, "t", 100, 1)
            .await
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn success_acks_the_message() {
        let queue = MemoryJobQueue::new();
        let handler = Arc::new(CountingHandler::ok(QueueName::Conversion));

        queue
            .publish(QueueName::Conversion, &convert_job())
            .await
            .unwrap();
        let delivery = deliver_one(&queue).await;

        Executor::execute_delivery(Arc::new(queue.clone()), handler, 3, delivery).await;

        assert_eq!(queue.pending_len(QueueName::Conversion).await, 0);
        assert_eq!(queue.dlq_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failure_below_max_leaves_message_pending() {
        let queue = MemoryJobQueue::new();
        let handler = Arc::new(CountingHandler::failing(QueueName::Conversion, 10, false));

        queue
            .publish(QueueName::Conversion, &convert_job())
            .await
            .unwrap();
        let delivery = deliver_one(&queue).await;

        Executor::execute_delivery(Arc::new(queue.clone()), handler, 3, delivery).await;

        // Not acked, not dead-lettered: the broker will redeliver.
        assert_eq!(queue.pending_len(QueueName::Conversion).await, 1);
        assert_eq!(queue.dlq_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retries_exhausted_dead_letters_the_message() {
        let queue = MemoryJobQueue::new();
        let handler = Arc::new(CountingHandler::failing(QueueName::Conversion, 10, true));

        queue
            .publish(QueueName::Conversion, &convert_job())
            .await
            .unwrap();

        for attempt in 1..=3u32 {
            let delivery = if attempt == 1 {
                deliver_one(&queue).await
            } else {
                queue
                    .claim_stale(QueueName::Conversion, "t", 0, 1)
                    .await
                    .unwrap()
                    .remove(0)
            };
            Executor::execute_delivery(
                Arc::new(queue.clone()),
                Arc::clone(&handler) as Arc<dyn JobHandler>,
                3,
                delivery,
            )
            .await;
        }

        assert_eq!(queue.dlq_len().await.unwrap(), 1);
        assert_eq!(queue.pending_len(QueueName::Conversion).await, 0);
        let dead = queue.dead_letters().await;
        assert!(dead[0].error.contains("induced failure"));
    }

    #[tokio::test]
    async fn run_drains_the_queue_until_shutdown() {
        let queue = MemoryJobQueue::new();
        let handler = Arc::new(CountingHandler::ok(QueueName::Conversion));

        for _ in 0..3 {
            queue
                .publish(QueueName::Conversion, &convert_job())
                .await
                .unwrap();
        }

        let executor = Arc::new(Executor::new(
            Arc::new(queue.clone()),
            Arc::clone(&handler) as Arc<dyn JobHandler>,
            ExecutorConfig {
                max_concurrent_jobs: 2,
                idle_sleep: Duration::from_millis(10),
                ..Default::default()
            },
        ));

        let run_handle = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.run().await })
        };

        // Give the loop time to drain all three messages.
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(queue.len(QueueName::Conversion).await.unwrap(), 0);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

        executor.shutdown();
        run_handle.await.unwrap().unwrap();
    }
}

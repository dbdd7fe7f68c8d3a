//! In-memory queue backend.
//!
//! Deterministic stand-in for the Redis backend in tests and local
//! development. Mirrors the broker semantics that matter to the pipeline:
//! consumed-but-unacked messages sit in a pending set and come back via
//! `claim_stale`; acked messages are gone; dead-lettered messages land on
//! an inspectable DLQ. Publish failure injection is provided for
//! compensation tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use audex_models::QueueJob;

use crate::error::{QueueError, QueueResult};
use crate::queue::{Delivery, JobQueue, QueueName};

/// A message routed to the dead-letter queue.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub queue: QueueName,
    pub job: QueueJob,
    pub error: String,
    pub original_message_id: String,
}

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    ready: VecDeque<(String, QueueJob)>,
    pending: HashMap<String, QueueJob>,
}

#[derive(Default)]
struct Inner {
    conversion: QueueState,
    notification: QueueState,
    dlq: Vec<DeadLetter>,
    retries: HashMap<String, u32>,
}

impl Inner {
    fn state(&mut self, queue: QueueName) -> &mut QueueState {
        match queue {
            QueueName::Conversion => &mut self.conversion,
            QueueName::Notification => &mut self.notification,
        }
    }
}

/// Job queue backed by process-local state.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    inner: Arc<Mutex<Inner>>,
    fail_publishes: Arc<AtomicBool>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `publish` fail until cleared. Failure
    /// injection for compensation tests.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the dead-letter queue.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock().await.dlq.clone()
    }

    /// Messages consumed but not yet acknowledged on a queue.
    pub async fn pending_len(&self, queue: QueueName) -> usize {
        self.inner.lock().await.state(queue).pending.len()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn publish(&self, queue: QueueName, job: &QueueJob) -> QueueResult<String> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(QueueError::publish_failed("injected publish failure"));
        }

        let mut inner = self.inner.lock().await;
        let state = inner.state(queue);
        state.next_seq += 1;
        let message_id = format!("{}-0", state.next_seq);
        state.ready.push_back((message_id.clone(), job.clone()));
        Ok(message_id)
    }

    async fn consume(
        &self,
        queue: QueueName,
        _consumer: &str,
        _block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut inner = self.inner.lock().await;
        let state = inner.state(queue);

        let mut deliveries = Vec::new();
        while deliveries.len() < count {
            let Some((message_id, job)) = state.ready.pop_front() else {
                break;
            };
            state.pending.insert(message_id.clone(), job.clone());
            deliveries.push(Delivery { message_id, job });
        }

        Ok(deliveries)
    }

    async fn ack(&self, queue: QueueName, message_id: &str) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state(queue).pending.remove(message_id);
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: QueueName,
        message_id: &str,
        job: &QueueJob,
        error: &str,
    ) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner.dlq.push(DeadLetter {
            queue,
            job: job.clone(),
            error: error.to_string(),
            original_message_id: message_id.to_string(),
        });
        inner.state(queue).pending.remove(message_id);
        Ok(())
    }

    async fn claim_stale(
        &self,
        queue: QueueName,
        _consumer: &str,
        _min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        // No clock here: every pending message counts as stale. Tests use
        // this to force redelivery after a simulated crash.
        let mut inner = self.inner.lock().await;
        let state = inner.state(queue);

        let mut deliveries: Vec<Delivery> = state
            .pending
            .iter()
            .take(count)
            .map(|(message_id, job)| Delivery {
                message_id: message_id.clone(),
                job: job.clone(),
            })
            .collect();
        deliveries.sort_by(|a, b| a.message_id.cmp(&b.message_id));

        Ok(deliveries)
    }

    async fn incr_retry(&self, queue: QueueName, message_id: &str) -> QueueResult<u32> {
        let mut inner = self.inner.lock().await;
        let key = format!("{}:{}", queue.as_str(), message_id);
        let count = inner.retries.entry(key).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn len(&self, queue: QueueName) -> QueueResult<u64> {
        let mut inner = self.inner.lock().await;
        let state = inner.state(queue);
        Ok((state.ready.len() + state.pending.len()) as u64)
    }

    async fn dlq_len(&self) -> QueueResult<u64> {
        Ok(self.inner.lock().await.dlq.len() as u64)
    }
}

//! Redis Streams queue backend.
//!
//! Each logical queue is a stream with its own consumer group. Unacked
//! messages stay in the group's pending entries list and are reclaimed
//! with XCLAIM after a crash. A single shared DLQ stream records messages
//! that exhausted their retries, together with the error and the original
//! message id.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use audex_models::QueueJob;

use crate::error::{QueueError, QueueResult};
use crate::queue::{Delivery, JobQueue, QueueName};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct RedisQueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for conversion jobs
    pub conversion_stream: String,
    /// Stream name for notification jobs
    pub notification_stream: String,
    /// Consumer group for conversion workers
    pub conversion_group: String,
    /// Consumer group for notification workers
    pub notification_group: String,
    /// Dead letter queue stream name
    pub dlq_stream: String,
    /// TTL for retry counters, seconds
    pub retry_ttl_secs: i64,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            conversion_stream: "audex:conversion".to_string(),
            notification_stream: "audex:notification".to_string(),
            conversion_group: "audex:converters".to_string(),
            notification_group: "audex:notifiers".to_string(),
            dlq_stream: "audex:dlq".to_string(),
            retry_ttl_secs: 86400,
        }
    }
}

impl RedisQueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            conversion_stream: std::env::var("QUEUE_CONVERSION_STREAM")
                .unwrap_or(defaults.conversion_stream),
            notification_stream: std::env::var("QUEUE_NOTIFICATION_STREAM")
                .unwrap_or(defaults.notification_stream),
            conversion_group: std::env::var("QUEUE_CONVERSION_GROUP")
                .unwrap_or(defaults.conversion_group),
            notification_group: std::env::var("QUEUE_NOTIFICATION_GROUP")
                .unwrap_or(defaults.notification_group),
            dlq_stream: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream),
            retry_ttl_secs: std::env::var("QUEUE_RETRY_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_ttl_secs),
        }
    }
}

/// Job queue backed by Redis Streams.
pub struct RedisJobQueue {
    client: redis::Client,
    config: RedisQueueConfig,
}

impl RedisJobQueue {
    /// Create a new queue client.
    pub fn new(config: RedisQueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(RedisQueueConfig::from_env())
    }

    fn stream(&self, queue: QueueName) -> &str {
        match queue {
            QueueName::Conversion => &self.config.conversion_stream,
            QueueName::Notification => &self.config.notification_stream,
        }
    }

    fn group(&self, queue: QueueName) -> &str {
        match queue {
            QueueName::Conversion => &self.config.conversion_group,
            QueueName::Notification => &self.config.notification_group,
        }
    }

    fn retry_key(&self, queue: QueueName, message_id: &str) -> String {
        format!("audex:retry:{}:{}", queue.as_str(), message_id)
    }

    async fn create_group(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        stream: &str,
        group: &str,
    ) -> QueueResult<()> {
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group {} on {}", group, stream),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group {} already exists on {}", group, stream);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Ack a malformed payload after recording it on the DLQ, so it does
    /// not poison the consumer group.
    async fn dead_letter_raw(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: QueueName,
        message_id: &str,
        payload: &str,
        error: &str,
    ) -> QueueResult<()> {
        redis::cmd("XADD")
            .arg(&self.config.dlq_stream)
            .arg("*")
            .arg("queue")
            .arg(queue.as_str())
            .arg("job")
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;

        self.ack(queue, message_id).await
    }

    fn parse_entries(
        entries: Vec<(String, Option<Vec<u8>>)>,
    ) -> (Vec<Delivery>, Vec<(String, String, String)>) {
        let mut deliveries = Vec::new();
        let mut malformed = Vec::new();

        for (message_id, payload) in entries {
            let Some(payload) = payload else {
                malformed.push((message_id, String::new(), "missing job field".to_string()));
                continue;
            };
            let payload_str = String::from_utf8_lossy(&payload).to_string();
            match serde_json::from_str::<QueueJob>(&payload_str) {
                Ok(job) => {
                    debug!("Consumed job {} from stream", job.job_id());
                    deliveries.push(Delivery { message_id, job });
                }
                Err(e) => {
                    warn!("Failed to parse job payload: {}", e);
                    malformed.push((message_id, payload_str, e.to_string()));
                }
            }
        }

        (deliveries, malformed)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        self.create_group(
            &mut conn,
            &self.config.conversion_stream,
            &self.config.conversion_group,
        )
        .await?;
        self.create_group(
            &mut conn,
            &self.config.notification_stream,
            &self.config.notification_group,
        )
        .await?;

        Ok(())
    }

    async fn publish(&self, queue: QueueName, job: &QueueJob) -> QueueResult<String> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;

        let payload = serde_json::to_string(job)?;

        let message_id: String = redis::cmd("XADD")
            .arg(self.stream(queue))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;

        info!(
            "Published job {} to {} as message {}",
            job.job_id(),
            queue,
            message_id
        );

        Ok(message_id)
    }

    async fn consume(
        &self,
        queue: QueueName,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(self.group(queue))
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.stream(queue))
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut entries = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                let payload = match entry.map.get("job") {
                    Some(redis::Value::BulkString(p)) => Some(p.clone()),
                    _ => None,
                };
                entries.push((entry.id, payload));
            }
        }

        let (deliveries, malformed) = Self::parse_entries(entries);
        for (message_id, payload, error) in malformed {
            self.dead_letter_raw(&mut conn, queue, &message_id, &payload, &error)
                .await
                .ok();
        }

        Ok(deliveries)
    }

    async fn ack(&self, queue: QueueName, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(self.stream(queue))
            .arg(self.group(queue))
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(self.stream(queue))
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message {} on {}", message_id, queue);
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: QueueName,
        message_id: &str,
        job: &QueueJob,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        self.dead_letter_raw(&mut conn, queue, message_id, &payload, error)
            .await?;

        warn!("Moved job {} to DLQ: {}", job.job_id(), error);
        Ok(())
    }

    async fn claim_stale(
        &self,
        queue: QueueName,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(self.stream(queue))
            .arg(self.group(queue))
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let result: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(self.stream(queue))
            .arg(self.group(queue))
            .arg(consumer)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut entries = Vec::new();
        for entry in result.ids {
            let payload = match entry.map.get("job") {
                Some(redis::Value::BulkString(p)) => Some(p.clone()),
                _ => None,
            };
            entries.push((entry.id, payload));
        }

        let (deliveries, malformed) = Self::parse_entries(entries);
        for (message_id, payload, error) in malformed {
            self.dead_letter_raw(&mut conn, queue, &message_id, &payload, &error)
                .await
                .ok();
        }

        if !deliveries.is_empty() {
            info!("Claimed {} stale messages on {}", deliveries.len(), queue);
        }

        Ok(deliveries)
    }

    async fn incr_retry(&self, queue: QueueName, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = self.retry_key(queue, message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, self.config.retry_ttl_secs).await?;
        Ok(count)
    }

    async fn len(&self, queue: QueueName) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.stream(queue)).await?;
        Ok(len)
    }

    async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream).await?;
        Ok(len)
    }
}

//! Notifier worker configuration.

use std::time::Duration;

use audex_pipeline::ExecutorConfig;

/// Notifier worker configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Maximum concurrent deliveries
    pub max_concurrent_jobs: usize,
    /// Delivery failures before a message is dead-lettered
    pub max_retries: u32,
    /// How often the worker scans for stale pending messages
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be claimed
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_retries: 3,
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl NotifierConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("NOTIFIER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            max_retries: std::env::var("NOTIFIER_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            claim_interval: Duration::from_secs(
                std::env::var("NOTIFIER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("NOTIFIER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("NOTIFIER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Executor settings for this worker.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_concurrent_jobs: self.max_concurrent_jobs,
            max_retries: self.max_retries,
            claim_interval: self.claim_interval,
            claim_min_idle: self.claim_min_idle,
            shutdown_timeout: self.shutdown_timeout,
            ..ExecutorConfig::default()
        }
    }
}

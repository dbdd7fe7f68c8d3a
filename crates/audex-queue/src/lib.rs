//! Durable at-least-once job queues.
//!
//! This crate provides:
//! - The [`JobQueue`] capability trait (publish/consume/ack/dead-letter)
//! - A Redis Streams backend with consumer groups and crash recovery
//! - An in-memory backend for tests and local development
//!
//! Delivery is at-least-once: a message that is consumed but never
//! acknowledged is redelivered, so consumers must tolerate replay.

pub mod error;
pub mod memory;
mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryJobQueue;
pub use queue::{Delivery, JobQueue, QueueName};
pub use redis_queue::{RedisJobQueue, RedisQueueConfig};

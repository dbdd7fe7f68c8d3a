//! Durable hand-off machinery shared by every pipeline stage.
//!
//! This crate provides:
//! - [`store_then_publish`]: the write-then-announce-or-compensate saga
//!   used by ingestion and the conversion worker
//! - [`Executor`]: the at-least-once consumer loop with bounded retry and
//!   dead-lettering, generic over a [`JobHandler`]

pub mod error;
pub mod executor;
pub mod handler;
pub mod saga;

pub use error::{PipelineError, PipelineResult};
pub use executor::{Executor, ExecutorConfig};
pub use handler::{HandlerError, JobHandler};
pub use saga::{ingest_source, store_then_publish, Announcement};

//! Audio conversion worker.
//!
//! This crate provides:
//! - The conversion job handler (fetch source, extract audio, store and
//!   announce the result, clean up the source)
//! - Worker configuration and the binary entry point

pub mod config;
pub mod processor;

pub use config::WorkerConfig;
pub use processor::ConvertHandler;

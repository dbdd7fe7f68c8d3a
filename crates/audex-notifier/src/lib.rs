//! Notification worker.
//!
//! This crate provides:
//! - The [`Notifier`] capability trait and its webhook implementation
//! - The notification job handler (deliver, then let the executor ack)
//! - Worker configuration and the binary entry point

pub mod config;
pub mod notify;
pub mod processor;

pub use config::NotifierConfig;
pub use notify::{Notifier, NotifyError, NotifyResult, WebhookNotifier};
pub use processor::NotifyHandler;

//! Notifier capability.
//!
//! Delivery transport is external to the pipeline; this trait is the whole
//! contract. The production implementation posts a webhook; swapping in
//! email or push means another implementor, not a pipeline change.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use audex_models::BlobId;

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Notifier misconfigured: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl NotifyError {
    pub fn delivery_failed(msg: impl Into<String>) -> Self {
        Self::DeliveryFailed(msg.into())
    }
}

/// Deliver a ready-notification to an owner.
///
/// Duplicate deliveries for the same job are acceptable under at-least-once
/// replay; implementations need not deduplicate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, owner: &str, reference: &BlobId) -> NotifyResult<()>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    reference: &'a str,
    message: String,
}

/// Notifier that posts a JSON webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> NotifyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.into(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> NotifyResult<Self> {
        let webhook_url = std::env::var("NOTIFY_WEBHOOK_URL")
            .map_err(|_| NotifyError::ConfigError("NOTIFY_WEBHOOK_URL not set".to_string()))?;
        Self::new(webhook_url)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, owner: &str, reference: &BlobId) -> NotifyResult<()> {
        let payload = WebhookPayload {
            recipient: owner,
            reference: reference.as_str(),
            message: format!("Audio {} is now ready for download", reference),
        };

        debug!("Posting notification for {} to webhook", owner);

        let response = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::delivery_failed(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        info!(owner, reference = %reference, "Notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_recipient_and_reference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "recipient": "user@example.com",
                "reference": "mp3-42",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri())).unwrap();
        notifier
            .deliver("user@example.com", &BlobId::from("mp3-42"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_a_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        let err = notifier
            .deliver("user@example.com", &BlobId::from("mp3-42"))
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::DeliveryFailed(_)));
    }
}

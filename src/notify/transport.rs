use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::{NotificationError, NotificationPayload};

/// Delivers one message. Errors are retried by the queue.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotificationError>;
}

/// Writes messages to the log. Used when no relay is configured.
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotificationError> {
        info!(
            to = %payload.to,
            subject = %payload.subject(),
            "Notification delivered to log transport"
        );
        Ok(())
    }
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct WebhookTransport {
    http: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    /// `timeout` bounds a whole request; a relay that accepts the connection
    /// and never answers fails the attempt instead of holding the worker.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({
                "to": payload.to,
                "subject": payload.subject(),
                "text": payload.text_body(),
                "data": payload.confirmation,
            }))
            .send()
            .await
            .map_err(|e| NotificationError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %payload.to, "Relay accepted notification");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotificationError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

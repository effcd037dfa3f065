//! Notification sinks
//!
//! Scanner hits and stranded-capital sell failures are pushed through a
//! [`Notifier`]. Delivery is best-effort; a failed notification is logged
//! and dropped, never propagated into trading paths.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

/// Notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}

/// Slack incoming-webhook sink
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, text: &str) {
        let result = self
            .client
            .post(&self.webhook_url)
            .json(&SlackPayload { text })
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!("Slack webhook returned {}", response.status());
            }
            Err(e) => warn!("Slack notification failed: {}", e),
            _ => {}
        }
    }
}

/// Log-only sink, used when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) {
        info!("notification: {}", text);
    }
}

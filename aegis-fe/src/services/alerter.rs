//! Urgent feedback alerts
//!
//! Posts a Discord-compatible `{"content": ...}` message to the configured
//! webhook whenever a newly committed record is urgent. Delivery runs in a
//! detached task and never affects the request; failures are only logged.

use crate::models::FeedbackRecord;
use serde_json::json;
use std::time::Duration;

const ALERT_TIMEOUT: Duration = Duration::from_secs(5);
const PREVIEW_CHARS: usize = 200;

#[derive(Clone)]
pub struct WebhookAlerter {
    http_client: reqwest::Client,
    webhook_url: Option<String>,
}

impl WebhookAlerter {
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            tracing::info!("No webhook configured, urgent alerts disabled");
        }
        Self {
            http_client: reqwest::Client::new(),
            webhook_url,
        }
    }

    pub fn disabled() -> Self {
        Self {
            http_client: reqwest::Client::new(),
            webhook_url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Fire-and-forget alert for an urgent record
    pub fn notify_urgent(&self, record: &FeedbackRecord) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };

        let client = self.http_client.clone();
        let payload = json!({ "content": alert_message(record) });
        let id = record.id;

        tokio::spawn(async move {
            let result = client.post(&url).timeout(ALERT_TIMEOUT).json(&payload).send().await;
            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(%id, "Urgent alert delivered");
                }
                Ok(response) => {
                    tracing::warn!(%id, status = response.status().as_u16(), "Webhook rejected urgent alert");
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "Failed to deliver urgent alert");
                }
            }
        });
    }
}

/// Message body for an urgent record
pub fn alert_message(record: &FeedbackRecord) -> String {
    let mut preview: String = record.sanitized_content.chars().take(PREVIEW_CHARS).collect();
    if record.sanitized_content.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    let topics: Vec<&str> = record.topics.iter().map(|t| t.as_str()).collect();

    format!(
        "**URGENT feedback** routed to {}\nSentiment: {} | Topics: {} | Source: {} ({})\n> {}",
        record.department,
        record.sentiment,
        topics.join(", "),
        record.source,
        record.provider,
        preview
    )
}

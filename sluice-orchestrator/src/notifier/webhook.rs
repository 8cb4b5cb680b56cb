use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use sluice_core::domain::event::Severity;
use std::time::Duration;

use super::NotificationChannel;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event_type: &'a str,
    message: &'a str,
    severity: Severity,
}

/// Posts notifications as JSON to a chat webhook
pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook client")?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(
        &self,
        event_type: &str,
        message: &str,
        severity: Severity,
    ) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&WebhookPayload {
                event_type,
                message,
                severity,
            })
            .send()
            .await
            .context("Failed to reach webhook")?
            .error_for_status()
            .context("Webhook rejected notification")?;

        Ok(())
    }
}

//! Slack-compatible incoming webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use cwalert_common::config::SlackConfig;
use cwalert_common::error::AppResult;
use cwalert_common::types::{ChatChannel, Severity};

use crate::ChatSender;
use crate::format::FOOTER;

/// Values left behind by deployment templates that were never filled in.
const PLACEHOLDER_URLS: &[&str] = &["SLACK_WEBHOOK_URL_REGULAR", "SLACK_WEBHOOK_URL_URGENT"];

/// Webhook body using the legacy `attachments` format for the color bar.
#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct Attachment {
    /// `#rrggbb`
    pub color: String,
    pub title: String,
    pub text: String,
    /// Unix timestamp in seconds
    pub ts: i64,
    pub footer: String,
}

impl WebhookPayload {
    pub fn new(title: &str, body: &str, severity: Severity, ts: i64) -> Self {
        Self {
            attachments: vec![Attachment {
                color: severity.hex_color(),
                title: title.to_string(),
                text: body.to_string(),
                ts,
                footer: FOOTER.to_string(),
            }],
        }
    }
}

/// Sends chat notifications to the urgent or regular webhook.
pub struct SlackNotifier {
    client: Client,
    regular_url: Option<String>,
    urgent_url: Option<String>,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            regular_url: config.regular_webhook_url.clone(),
            urgent_url: config.urgent_webhook_url.clone(),
        })
    }

    /// Webhook URL for a channel, or `None` if unset or still a placeholder.
    pub fn webhook_url(&self, channel: ChatChannel) -> Option<&str> {
        let url = match channel {
            ChatChannel::Urgent => self.urgent_url.as_deref(),
            ChatChannel::Regular => self.regular_url.as_deref(),
        }?
        .trim();

        if url.is_empty() || PLACEHOLDER_URLS.contains(&url) {
            None
        } else {
            Some(url)
        }
    }

    async fn post(&self, url: &str, payload: &WebhookPayload) -> AppResult<()> {
        self.client
            .post(url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl ChatSender for SlackNotifier {
    async fn send_chat(
        &self,
        title: &str,
        body: &str,
        channel: ChatChannel,
        severity: Severity,
    ) -> bool {
        let Some(url) = self.webhook_url(channel) else {
            tracing::warn!(%channel, "Slack webhook URL not configured, skipping Slack alert");
            return false;
        };

        let payload = WebhookPayload::new(title, body, severity, chrono::Utc::now().timestamp());

        match self.post(url, &payload).await {
            Ok(()) => {
                tracing::info!(%channel, %severity, "Slack notification sent");
                true
            }
            Err(e) => {
                tracing::error!(%channel, %severity, error = %e, "Failed to send Slack webhook");
                false
            }
        }
    }
}

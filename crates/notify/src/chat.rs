//! Incoming-webhook chat bridge. Payloads use the block layout chat
//! platforms render: header, field section, divider, bounded item list.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{instrument, warn};

use sentinel_common::config::ChatConfig;
use sentinel_common::{Result, SentinelError};

use crate::payload::{DeliveryChannel, NotificationPayload, PayloadKind};

const CHAT_TIMEOUT: Duration = Duration::from_secs(30);
/// At most this many activity lines per message.
const MAX_LISTED: usize = 10;

pub struct ChatNotifier {
    http: reqwest::Client,
    username: String,
    channel: String,
}

impl ChatNotifier {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CHAT_TIMEOUT)
            .build()
            .map_err(|e| SentinelError::Config(e.to_string()))?;
        Ok(Self {
            http,
            username: if config.username.is_empty() {
                "repo-sentinel".to_string()
            } else {
                config.username.clone()
            },
            channel: config.channel.clone(),
        })
    }

    pub fn build_message(&self, payload: &NotificationPayload) -> serde_json::Value {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": { "type": "plain_text", "text": payload.subject }
            }),
            json!({
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Repository:* {}", payload.repo) },
                    { "type": "mrkdwn", "text": format!("*Event:* {}", payload.kind.event_type()) },
                ]
            }),
            json!({ "type": "divider" }),
        ];

        if let Some(items) = payload.data.get("activities").and_then(|v| v.as_array()) {
            for item in items.iter().take(MAX_LISTED) {
                let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("(untitled)");
                let author = item.get("author").and_then(|v| v.as_str()).unwrap_or("unknown");
                let url = item.get("url").and_then(|v| v.as_str()).unwrap_or("");
                blocks.push(json!({
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": format!("<{url}|{title}> — {author}") }
                }));
            }
        } else if let Some(title) = payload.data.get("title").and_then(|v| v.as_str()) {
            blocks.push(json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": title }
            }));
        }

        let mut message = json!({
            "text": payload.subject,
            "username": self.username,
            "blocks": blocks,
        });
        if !self.channel.is_empty() {
            message["channel"] = json!(self.channel);
        }
        message
    }
}

#[async_trait]
impl DeliveryChannel for ChatNotifier {
    fn name(&self) -> &'static str {
        "chat"
    }

    /// Single attempt per hook; chat bridges are not retried.
    #[instrument(skip(self, payload), fields(kind = payload.kind.event_type()))]
    async fn deliver(&self, targets: &[String], payload: &NotificationPayload) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let message = self.build_message(payload);
        let mut delivered = 0usize;
        for hook in targets {
            let response = self.http.post(hook).json(&message).send().await;
            match response {
                Ok(r) if r.status().is_success() => delivered += 1,
                Ok(r) => warn!(status = %r.status(), "chat webhook rejected message"),
                Err(e) => warn!(error = %e, "chat webhook unreachable"),
            }
        }
        if delivered == 0 {
            return Err(SentinelError::Notification(
                "no chat webhook accepted the message".to_string(),
            ));
        }
        Ok(())
    }
}

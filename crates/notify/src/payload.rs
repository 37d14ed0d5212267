//! The channel-independent notification payload and the delivery trait the
//! engine fans out over.

use async_trait::async_trait;

use sentinel_common::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Activity,
    Report,
    System,
}

impl PayloadKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            PayloadKind::Activity => "subscription_activity",
            PayloadKind::Report => "report_generated",
            PayloadKind::System => "system_notification",
        }
    }
}

/// One logical notification, rendered per channel at delivery time.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub kind: PayloadKind,
    pub repo: String,
    pub subject: String,
    /// Pre-rendered HTML for the email channel.
    pub html_body: String,
    /// Structured fields for the chat and webhook channels.
    pub data: serde_json::Value,
}

/// One delivery channel. Implementations never panic the engine: failures
/// come back as errors and stay isolated per channel.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, targets: &[String], payload: &NotificationPayload) -> Result<()>;
}

/// Per-event fan-out record: `None` means the channel was not attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeliverySummary {
    pub email: Option<bool>,
    pub chat: Option<bool>,
    pub webhook: Option<bool>,
}

//! Frame types exchanged over the realtime socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server → client frames. Serialized with a `type` tag matching the wire
/// protocol the front-end speaks.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        user_id: i64,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    SubscriptionSuccess {
        channel: String,
        timestamp: DateTime<Utc>,
    },
    UnsubscriptionSuccess {
        channel: String,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Status {
        active_users: usize,
        total_connections: usize,
        channels: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    ActivityNotification {
        notification_id: Uuid,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    AiInsight {
        notification_id: Uuid,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    ReportNotification {
        notification_id: Uuid,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    SystemAnnouncement {
        notification_id: Uuid,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    ProgressUpdate {
        task_id: String,
        /// 0-100
        progress: u8,
        status: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
    TaskCancelled {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    RuleTriggered {
        rule_id: String,
        rule_kind: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Client → server frames. Unknown types are preserved so the session loop
/// can log and ignore them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Ping,
    GetStatus,
}

pub enum ParsedClientMessage {
    Known(ClientMessage),
    Unknown(String),
    Invalid,
}

pub fn parse_client_message(text: &str) -> ParsedClientMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => ParsedClientMessage::Known(message),
        Err(_) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => ParsedClientMessage::Unknown(
                value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("missing")
                    .to_string(),
            ),
            Err(_) => ParsedClientMessage::Invalid,
        },
    }
}

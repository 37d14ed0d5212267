//! Generic HTTPS webhook delivery: versioned JSON envelope, delivery id,
//! optional HMAC signature.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{instrument, warn};
use uuid::Uuid;

use sentinel_common::config::WebhookConfig;
use sentinel_common::{Result, SentinelError};

use crate::payload::{DeliveryChannel, NotificationPayload};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENVELOPE_VERSION: &str = "1.0";

pub struct WebhookNotifier {
    http: reqwest::Client,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| SentinelError::Config(e.to_string()))?;
        Ok(Self {
            http,
            secret: config.secret.clone(),
        })
    }

    pub fn envelope(payload: &NotificationPayload) -> serde_json::Value {
        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event_type": payload.kind.event_type(),
            "source": "sentinel",
            "version": ENVELOPE_VERSION,
            "data": payload.data,
        })
    }
}

/// `sha256=<hex hmac>` over the exact request body.
pub fn sign_payload(body: &str, secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl DeliveryChannel for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip(self, payload), fields(kind = payload.kind.event_type()))]
    async fn deliver(&self, targets: &[String], payload: &NotificationPayload) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let body = Self::envelope(payload).to_string();
        let mut delivered = 0usize;

        for url in targets {
            let delivery_id = Uuid::new_v4().to_string();
            let mut request = self
                .http
                .post(url)
                .header("Content-Type", "application/json")
                .header("X-Event-Type", payload.kind.event_type())
                .header("X-Delivery-Id", &delivery_id)
                .body(body.clone());
            if let Some(secret) = &self.secret {
                request = request.header("X-Signature", sign_payload(&body, secret));
            }

            match request.send().await {
                Ok(r) if r.status().is_success() => delivered += 1,
                Ok(r) => warn!(status = %r.status(), delivery_id, "webhook endpoint rejected delivery"),
                Err(e) => warn!(error = %e, delivery_id, "webhook endpoint unreachable"),
            }
        }
        if delivered == 0 {
            return Err(SentinelError::Notification(
                "no webhook endpoint accepted the delivery".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadKind;

    #[test]
    fn envelope_shape() {
        let payload = NotificationPayload {
            kind: PayloadKind::Activity,
            repo: "acme/widget".to_string(),
            subject: "s".to_string(),
            html_body: String::new(),
            data: serde_json::json!({"external_id": "42"}),
        };
        let envelope = WebhookNotifier::envelope(&payload);
        assert_eq!(envelope["event_type"], "subscription_activity");
        assert_eq!(envelope["source"], "sentinel");
        assert_eq!(envelope["version"], ENVELOPE_VERSION);
        assert_eq!(envelope["data"]["external_id"], "42");
        assert!(envelope["timestamp"].as_str().is_some());
    }

    #[test]
    fn signature_is_stable_hex_hmac() {
        let sig = sign_payload(r#"{"a":1}"#, "shh");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        // Deterministic for the same body and secret
        assert_eq!(sig, sign_payload(r#"{"a":1}"#, "shh"));
        // Sensitive to both body and secret
        assert_ne!(sig, sign_payload(r#"{"a":2}"#, "shh"));
        assert_ne!(sig, sign_payload(r#"{"a":1}"#, "other"));
    }
}

//! Notification engine and delivery channels: rule evaluation, email over
//! SMTP, incoming-webhook chat bridges, signed generic webhooks, and the
//! realtime fan-in.

pub mod chat;
pub mod content;
pub mod email;
pub mod engine;
pub mod payload;
pub mod rules;
pub mod webhook;

pub use chat::ChatNotifier;
pub use email::EmailNotifier;
pub use engine::NotificationEngine;
pub use payload::{DeliveryChannel, DeliverySummary, NotificationPayload, PayloadKind};
pub use rules::{rule_matches, RuleContext};
pub use webhook::{sign_payload, WebhookNotifier};

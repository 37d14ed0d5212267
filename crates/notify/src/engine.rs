//! The notification engine: consumes pipeline events, evaluates per-user
//! rules, and fans out across delivery channels.
//!
//! Channel failures are independent: one channel erroring never skips or
//! aborts the others, and nothing propagates back to the event producer.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use sentinel_common::config::NotificationConfig;
use sentinel_common::types::{Activity, Report, Subscription};
use sentinel_common::{EventBus, SentinelEvent};
use sentinel_realtime::{repository_channel, Hub, ServerMessage};

use crate::chat::ChatNotifier;
use crate::content;
use crate::email::EmailNotifier;
use crate::payload::{DeliveryChannel, DeliverySummary, NotificationPayload, PayloadKind};
use crate::rules::{rule_matches, RuleContext};
use crate::webhook::WebhookNotifier;

pub struct NotificationEngine {
    hub: Arc<Hub>,
    config: NotificationConfig,
    email: Option<Arc<dyn DeliveryChannel>>,
    chat: Option<Arc<dyn DeliveryChannel>>,
    webhook: Option<Arc<dyn DeliveryChannel>>,
}

impl NotificationEngine {
    /// Wire the real channels from configuration. A channel that fails to
    /// construct is disabled, not fatal.
    pub fn from_config(config: &NotificationConfig, hub: Arc<Hub>) -> Self {
        let email: Option<Arc<dyn DeliveryChannel>> = if config.email.enabled {
            match EmailNotifier::new(&config.email) {
                Ok(notifier) => Some(Arc::new(notifier)),
                Err(e) => {
                    warn!(error = %e, "email channel disabled");
                    None
                }
            }
        } else {
            None
        };
        let chat: Option<Arc<dyn DeliveryChannel>> = if config.chat.enabled {
            match ChatNotifier::new(&config.chat) {
                Ok(notifier) => Some(Arc::new(notifier)),
                Err(e) => {
                    warn!(error = %e, "chat channel disabled");
                    None
                }
            }
        } else {
            None
        };
        let webhook: Option<Arc<dyn DeliveryChannel>> = if config.webhook.enabled {
            match WebhookNotifier::new(&config.webhook) {
                Ok(notifier) => Some(Arc::new(notifier)),
                Err(e) => {
                    warn!(error = %e, "webhook channel disabled");
                    None
                }
            }
        } else {
            None
        };
        Self {
            hub,
            config: config.clone(),
            email,
            chat,
            webhook,
        }
    }

    /// Test seam: inject channel implementations directly.
    pub fn with_channels(
        hub: Arc<Hub>,
        config: NotificationConfig,
        email: Option<Arc<dyn DeliveryChannel>>,
        chat: Option<Arc<dyn DeliveryChannel>>,
        webhook: Option<Arc<dyn DeliveryChannel>>,
    ) -> Self {
        Self {
            hub,
            config,
            email,
            chat,
            webhook,
        }
    }

    /// Consume the event bus until cancelled.
    pub async fn run(self: Arc<Self>, events: EventBus, cancel: CancellationToken) {
        let mut rx = events.subscribe();
        info!("notification engine running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("notification engine stopped");
                    return;
                }
                event = rx.recv() => match event {
                    Ok(SentinelEvent::NewActivity { activity, subscription }) => {
                        self.handle_new_activity(&activity, &subscription).await;
                    }
                    Ok(SentinelEvent::ReportReady { report, subscription }) => {
                        self.handle_report_ready(&report, subscription.as_ref()).await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event bus lagged, notifications dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }

    #[instrument(skip_all, fields(subscription_id = subscription.id, kind = activity.kind.as_str()))]
    pub async fn handle_new_activity(&self, activity: &Activity, subscription: &Subscription) {
        let data = activity_data(activity, subscription);

        // Realtime first: broadcast on the repository channel.
        self.hub
            .broadcast_channel(
                &repository_channel(&subscription.repo_ref),
                ServerMessage::ActivityNotification {
                    notification_id: Uuid::new_v4(),
                    data: data.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;

        // Per-user rules.
        let ctx = RuleContext::from_activity(activity, subscription);
        for rule in self.hub.rules_for(subscription.owner_user_id).await {
            if !rule_matches(&rule, &ctx) {
                continue;
            }
            self.execute_rule_actions(&rule, subscription, &data).await;
        }

        // Declared delivery channels.
        let payload = NotificationPayload {
            kind: PayloadKind::Activity,
            repo: subscription.repo_ref.clone(),
            subject: content::activity_subject(subscription, activity),
            html_body: content::activity_email_html(subscription, activity),
            data,
        };
        let summary = self.fan_out(&payload, subscription).await;
        info!(?summary, "activity fan-out finished");
    }

    #[instrument(skip_all, fields(report_id = report.id))]
    pub async fn handle_report_ready(&self, report: &Report, subscription: Option<&Subscription>) {
        let data = json!({
            "report_id": report.id,
            "title": report.title,
            "kind": report.kind.as_str(),
            "summary": report.summary,
            "period_start": report.period_start.to_rfc3339(),
            "period_end": report.period_end.to_rfc3339(),
            "repository": subscription.map(|s| s.repo_ref.clone()),
            "stats": report.stats,
        });

        self.hub
            .send_personal(
                report.owner_user_id,
                ServerMessage::ReportNotification {
                    notification_id: Uuid::new_v4(),
                    data: data.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;

        if let Some(subscription) = subscription {
            let payload = NotificationPayload {
                kind: PayloadKind::Report,
                repo: subscription.repo_ref.clone(),
                subject: content::report_subject(report),
                html_body: content::report_email_html(report),
                data,
            };
            let summary = self.fan_out(&payload, subscription).await;
            info!(?summary, "report fan-out finished");
        }
    }

    async fn execute_rule_actions(
        &self,
        rule: &sentinel_common::types::NotificationRule,
        subscription: &Subscription,
        data: &serde_json::Value,
    ) {
        if rule.actions.realtime {
            self.hub
                .send_personal(
                    rule.owner_user_id,
                    ServerMessage::RuleTriggered {
                        rule_id: rule.id.clone(),
                        rule_kind: format!("{:?}", rule.kind).to_lowercase(),
                        data: data.clone(),
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }
        if rule.actions.email {
            if let Some(email) = &self.email {
                let targets = self.email_targets(subscription);
                let payload = NotificationPayload {
                    kind: PayloadKind::Activity,
                    repo: subscription.repo_ref.clone(),
                    subject: format!("[Sentinel] rule matched on {}", subscription.repo_ref),
                    html_body: format!(
                        "<html><body><p>Rule {} matched.</p><pre>{}</pre></body></html>",
                        content::html_escape(&rule.id),
                        content::html_escape(&data.to_string())
                    ),
                    data: data.clone(),
                };
                if let Err(e) = email.deliver(&targets, &payload).await {
                    warn!(rule_id = %rule.id, error = %e, "rule email action failed");
                }
            }
        }
        for channel in &rule.actions.external_channels {
            let target = match channel.as_str() {
                "chat" => self.chat.as_ref(),
                "webhook" => self.webhook.as_ref(),
                other => {
                    warn!(channel = other, "unknown external channel in rule");
                    None
                }
            };
            if let Some(target) = target {
                let payload = NotificationPayload {
                    kind: PayloadKind::Activity,
                    repo: subscription.repo_ref.clone(),
                    subject: format!("Rule {} matched", rule.id),
                    html_body: String::new(),
                    data: data.clone(),
                };
                let targets = match channel.as_str() {
                    "chat" => self.chat_targets(subscription),
                    _ => self.webhook_targets(subscription),
                };
                if let Err(e) = target.deliver(&targets, &payload).await {
                    warn!(rule_id = %rule.id, channel, error = %e, "rule external action failed");
                }
            }
        }
    }

    /// Fan out one payload across the subscription's channels concurrently.
    /// Each leg is independent; the summary records per-channel outcomes.
    pub async fn fan_out(
        &self,
        payload: &NotificationPayload,
        subscription: &Subscription,
    ) -> DeliverySummary {
        let email_leg = async {
            match (&self.email, subscription.delivery.email_enabled) {
                (Some(channel), true) => {
                    let targets = self.email_targets(subscription);
                    deliver_leg(channel.as_ref(), &targets, payload).await
                }
                _ => None,
            }
        };
        let chat_leg = async {
            match (&self.chat, subscription.delivery.chat_enabled) {
                (Some(channel), true) => {
                    let targets = self.chat_targets(subscription);
                    deliver_leg(channel.as_ref(), &targets, payload).await
                }
                _ => None,
            }
        };
        let webhook_leg = async {
            match (&self.webhook, subscription.delivery.webhook_enabled) {
                (Some(channel), true) => {
                    let targets = self.webhook_targets(subscription);
                    deliver_leg(channel.as_ref(), &targets, payload).await
                }
                _ => None,
            }
        };

        let (email, chat, webhook) = tokio::join!(email_leg, chat_leg, webhook_leg);
        DeliverySummary {
            email,
            chat,
            webhook,
        }
    }

    fn email_targets(&self, subscription: &Subscription) -> Vec<String> {
        if !subscription.delivery.emails.is_empty() {
            subscription.delivery.emails.clone()
        } else {
            self.config.email.to.clone()
        }
    }

    fn chat_targets(&self, subscription: &Subscription) -> Vec<String> {
        if !subscription.delivery.chat_hooks.is_empty() {
            subscription.delivery.chat_hooks.clone()
        } else if !self.config.chat.webhook_url.is_empty() {
            vec![self.config.chat.webhook_url.clone()]
        } else {
            Vec::new()
        }
    }

    fn webhook_targets(&self, subscription: &Subscription) -> Vec<String> {
        if !subscription.delivery.webhook_urls.is_empty() {
            subscription.delivery.webhook_urls.clone()
        } else {
            self.config.webhook.urls.clone()
        }
    }
}

async fn deliver_leg(
    channel: &dyn DeliveryChannel,
    targets: &[String],
    payload: &NotificationPayload,
) -> Option<bool> {
    if targets.is_empty() {
        return None;
    }
    match channel.deliver(targets, payload).await {
        Ok(()) => Some(true),
        Err(e) => {
            warn!(channel = channel.name(), error = %e, "channel delivery failed");
            Some(false)
        }
    }
}

fn activity_data(activity: &Activity, subscription: &Subscription) -> serde_json::Value {
    json!({
        "subscription_id": subscription.id,
        "repository": subscription.repo_ref,
        "activity_id": activity.id,
        "external_id": activity.external_id,
        "kind": activity.kind.as_str(),
        "title": activity.title,
        "author": activity.author.login,
        "url": activity.url,
        "state": activity.state,
        "created_at": activity.source_created_at.map(|t| t.to_rfc3339()),
    })
}

//! SMTP delivery over STARTTLS with bounded retries.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument, warn};

use sentinel_common::config::EmailConfig;
use sentinel_common::{redact, Result, SentinelError};

use crate::payload::{DeliveryChannel, NotificationPayload};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Transient SMTP failures get this many extra attempts.
const SMTP_RETRIES: u32 = 2;

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| SentinelError::Config(format!("smtp relay: {e}")))?
            .port(config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            username = %redact(&config.username),
            "email notifier configured"
        );
        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }

    #[instrument(skip(self, html), fields(to = %to))]
    async fn send_one(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| SentinelError::Config(format!("bad from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| SentinelError::InvalidInput(format!("bad recipient: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| SentinelError::Notification(e.to_string()))?;

        let mut attempt = 0u32;
        loop {
            match self.transport.send(message.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() && attempt < SMTP_RETRIES => {
                    attempt += 1;
                    warn!(attempt, "transient smtp failure, retrying");
                    tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                }
                Err(e) => return Err(SentinelError::Notification(format!("smtp: {e}"))),
            }
        }
    }
}

#[async_trait]
impl DeliveryChannel for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, targets: &[String], payload: &NotificationPayload) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let mut last_err = None;
        let mut sent = 0usize;
        for to in targets {
            match self.send_one(to, &payload.subject, &payload.html_body).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(error = %e, "email delivery failed");
                    last_err = Some(e);
                }
            }
        }
        match (sent, last_err) {
            (0, Some(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

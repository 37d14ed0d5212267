//! Application configuration loaded from a YAML file with documented defaults.
//!
//! Lookup order is `config/config.yml` then `config/config.yaml`; a missing
//! file yields the defaults below. Secrets are redacted wherever the config
//! is echoed back (logs, the settings endpoint).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SentinelError};

pub const CONFIG_PATHS: [&str; 2] = ["config/config.yml", "config/config.yaml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    /// Allows the demo bearer token. Must stay off in production.
    pub dev_mode: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "repo-sentinel".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sentinel.db".to_string(),
        }
    }
}

/// Accepted for parity with deployments that front the service with Redis;
/// the core pipeline does not use it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RedisConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub db: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub token: String,
    pub api_url: String,
    pub max_requests_per_hour: u32,
    pub retries: u32,
    pub delay_secs: u64,
    /// Upper bound on pages walked per list call.
    pub page_cap: u32,
    /// Longest a caller may block waiting for a rate-limit token.
    pub rate_limit_wait_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: "https://api.github.com".to_string(),
            max_requests_per_hour: 5000,
            retries: 3,
            delay_secs: 1,
            page_cap: 10,
            rate_limit_wait_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            api_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// "HH:MM" in the configured timezone.
    pub daily_time: String,
    /// ISO weekday, 1 = Monday .. 7 = Sunday.
    pub weekly_day: u8,
    pub weekly_time: String,
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_time: "08:00".to_string(),
            weekly_day: 1,
            weekly_time: "08:00".to_string(),
            timezone: "Asia/Shanghai".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChatConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub channel: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub urls: Vec<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub email: EmailConfig,
    pub chat: ChatConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub app: AppSection,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub github: GithubConfig,
    pub ai: AiConfig,
    pub schedule: ScheduleConfig,
    pub notification: NotificationConfig,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            github: GithubConfig::default(),
            ai: AiConfig::default(),
            schedule: ScheduleConfig::default(),
            notification: NotificationConfig::default(),
            log_level: "info".to_string(),
            log_file: Some("logs/sentinel.log".to_string()),
        }
    }
}

impl SentinelConfig {
    /// Load from the first config file that exists, falling back to defaults.
    pub fn load() -> Result<Self> {
        for candidate in CONFIG_PATHS {
            if Path::new(candidate).exists() {
                return Self::load_from(candidate);
            }
        }
        tracing::warn!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: SentinelConfig = serde_yaml::from_str(&raw)
            .map_err(|e| SentinelError::Config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Serialize back to YAML, e.g. for the settings endpoint PUT path.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SentinelError::Config(e.to_string()))
    }

    /// Copy with every secret replaced by a placeholder, safe to echo.
    pub fn redacted(&self) -> Self {
        let mut c = self.clone();
        c.github.token = redact(&c.github.token);
        c.ai.api_key = c.ai.api_key.as_deref().map(redact);
        c.notification.email.password = redact(&c.notification.email.password);
        c.notification.webhook.secret = c.notification.webhook.secret.as_deref().map(redact);
        c.redis.password = c.redis.password.as_deref().map(redact);
        c
    }
}

/// Mask a secret, keeping emptiness observable.
pub fn redact(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}

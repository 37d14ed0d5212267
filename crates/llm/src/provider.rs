//! Pluggable completion providers. The default speaks the
//! OpenAI-compatible chat-completion protocol, which also covers local
//! runtimes exposing the same surface.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use sentinel_common::config::AiConfig;
use sentinel_common::{Result, SentinelError};

pub const LLM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatTurn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
}

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// Returns `None` when no credentials are configured; the adapter then
    /// runs on the deterministic fallback alone.
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .map_err(|e| SentinelError::Config(e.to_string()))?;
        Ok(Some(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        }))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    #[instrument(skip_all, fields(model = %self.model, turns = request.messages.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = WireRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SentinelError::Llm(format!("request: {e}")))?;

        if !response.status().is_success() {
            return Err(SentinelError::Llm(format!(
                "provider returned {}",
                response.status()
            )));
        }
        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| SentinelError::Llm(format!("response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| SentinelError::Llm("empty completion".to_string()))
    }
}

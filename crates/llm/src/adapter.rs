//! The adapter the rest of the system talks to. Enrichment calls never
//! fail: any provider error, timeout or missing credential falls back to a
//! deterministic text synthesized from the window statistics.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use sentinel_common::config::AiConfig;
use sentinel_common::types::ReportStats;
use sentinel_common::Result;

use crate::provider::{ChatTurn, CompletionProvider, CompletionRequest, OpenAiProvider, Role, LLM_TIMEOUT};

/// Turns kept per user in chat memory.
pub const CHAT_WINDOW: usize = 10;

const CHAT_SYSTEM_PROMPT: &str = "You are the assistant of a repository activity monitor. \
You answer questions about commits, issues, pull requests, releases and development trends \
using the context you are given. Be concise and concrete.";

/// Everything the fallback needs to stay deterministic.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentContext {
    pub repo: String,
    pub period_start: String,
    pub period_end: String,
    pub stats: ReportStats,
    /// A few notable activity titles.
    pub highlights: Vec<String>,
}

pub struct LlmAdapter {
    provider: Option<Arc<dyn CompletionProvider>>,
    max_tokens: u32,
    temperature: f32,
    /// user id → (question, answer) ring, newest last
    memory: Mutex<HashMap<i64, Vec<(String, String)>>>,
}

impl LlmAdapter {
    pub fn from_config(config: &AiConfig) -> Self {
        let provider = match OpenAiProvider::from_config(config) {
            Ok(Some(provider)) => {
                info!(model = %config.model, "llm provider configured");
                Some(Arc::new(provider) as Arc<dyn CompletionProvider>)
            }
            Ok(None) => {
                info!("no llm credentials, running on deterministic fallback");
                None
            }
            Err(e) => {
                warn!(error = %e, "llm provider unavailable, running on fallback");
                None
            }
        };
        Self {
            provider,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_provider(provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        Self {
            provider,
            max_tokens: 1000,
            temperature: 0.7,
            memory: Mutex::new(HashMap::new()),
        }
    }

    /// Raw completion; errors surface to the caller.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| sentinel_common::SentinelError::Llm("no provider configured".to_string()))?;
        let request = CompletionRequest {
            messages: vec![ChatTurn {
                role: Role::User,
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        tokio::time::timeout(LLM_TIMEOUT, provider.complete(request))
            .await
            .map_err(|_| sentinel_common::SentinelError::Llm("completion timed out".to_string()))?
    }

    /// Report summary paragraph; infallible.
    pub async fn summarize(&self, ctx: &EnrichmentContext) -> String {
        let prompt = format!(
            "Summarize the development activity of {} between {} and {} in one paragraph. \
             Totals: {} commits, {} issues, {} pull requests, {} releases. Notable items: {}.",
            ctx.repo,
            ctx.period_start,
            ctx.period_end,
            ctx.stats.commits,
            ctx.stats.issues,
            ctx.stats.pull_requests,
            ctx.stats.releases,
            ctx.highlights.join("; "),
        );
        self.enrich(&prompt, fallback_summary(ctx)).await
    }

    /// Trend analysis paragraph; infallible.
    pub async fn analyze_trends(&self, ctx: &EnrichmentContext) -> String {
        let prompt = format!(
            "Describe the activity trend for {} over the reported period. \
             Totals: {} activities across {} repositories. Focus on what the mix of \
             {} commits, {} issues, {} pull requests and {} releases suggests.",
            ctx.repo,
            ctx.stats.activities,
            ctx.stats.repos.max(1),
            ctx.stats.commits,
            ctx.stats.issues,
            ctx.stats.pull_requests,
            ctx.stats.releases,
        );
        self.enrich(&prompt, fallback_trends(ctx)).await
    }

    async fn enrich(&self, prompt: &str, fallback: String) -> String {
        match self.complete(prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "enrichment fell back to deterministic text");
                fallback
            }
        }
    }

    /// Chat with per-user memory bounded by turn count. Provider failures
    /// produce an apology rather than an error.
    pub async fn chat(&self, user_id: i64, message: &str, context: Option<&str>) -> String {
        let history: Vec<(String, String)> = {
            let memory = self.memory.lock().await;
            memory.get(&user_id).cloned().unwrap_or_default()
        };

        let mut messages = vec![ChatTurn {
            role: Role::System,
            content: CHAT_SYSTEM_PROMPT.to_string(),
        }];
        for (question, answer) in &history {
            messages.push(ChatTurn {
                role: Role::User,
                content: question.clone(),
            });
            messages.push(ChatTurn {
                role: Role::Assistant,
                content: answer.clone(),
            });
        }
        let content = match context {
            Some(context) => format!("Context:\n{context}\n\nQuestion: {message}"),
            None => message.to_string(),
        };
        messages.push(ChatTurn {
            role: Role::User,
            content,
        });

        let answer = match &self.provider {
            Some(provider) => {
                let request = CompletionRequest {
                    messages,
                    max_tokens: self.max_tokens,
                    temperature: self.temperature,
                };
                match tokio::time::timeout(LLM_TIMEOUT, provider.complete(request)).await {
                    Ok(Ok(text)) => text,
                    Ok(Err(e)) => {
                        warn!(error = %e, "chat completion failed");
                        "Sorry, the assistant is unavailable right now.".to_string()
                    }
                    Err(_) => {
                        warn!("chat completion timed out");
                        "Sorry, the assistant took too long to answer.".to_string()
                    }
                }
            }
            None => "The assistant is not configured on this deployment.".to_string(),
        };

        let mut memory = self.memory.lock().await;
        let turns = memory.entry(user_id).or_default();
        turns.push((message.to_string(), answer.clone()));
        // Eviction is by turn count, not time.
        while turns.len() > CHAT_WINDOW {
            turns.remove(0);
        }
        answer
    }

    pub async fn clear_chat_memory(&self, user_id: i64) {
        self.memory.lock().await.remove(&user_id);
    }

    pub async fn chat_history_len(&self, user_id: i64) -> usize {
        self.memory
            .lock()
            .await
            .get(&user_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

pub fn fallback_summary(ctx: &EnrichmentContext) -> String {
    let repo = if ctx.repo.is_empty() {
        "The watched repositories".to_string()
    } else {
        ctx.repo.clone()
    };
    format!(
        "{} recorded {} activities between {} and {}: {} commits, {} issues, \
         {} pull requests and {} releases.",
        repo,
        ctx.stats.activities,
        ctx.period_start,
        ctx.period_end,
        ctx.stats.commits,
        ctx.stats.issues,
        ctx.stats.pull_requests,
        ctx.stats.releases,
    )
}

pub fn fallback_trends(ctx: &EnrichmentContext) -> String {
    let stats = &ctx.stats;
    let busiest = [
        (stats.commits, "commit work"),
        (stats.issues, "issue triage"),
        (stats.pull_requests, "code review"),
        (stats.releases, "release activity"),
    ]
    .into_iter()
    .max_by_key(|(count, _)| *count)
    .map(|(_, label)| label)
    .unwrap_or("activity");

    if stats.activities == 0 {
        "No activity was recorded in this period.".to_string()
    } else {
        format!(
            "Activity in this period was dominated by {busiest}, with {} events in total.",
            stats.activities
        )
    }
}

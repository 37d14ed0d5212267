//! Adapter contract tests with scripted providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sentinel_common::types::ReportStats;
use sentinel_common::{Result, SentinelError};
use sentinel_llm::{
    CompletionProvider, CompletionRequest, EnrichmentContext, LlmAdapter, CHAT_WINDOW,
};

struct FailingProvider;

#[async_trait]
impl CompletionProvider for FailingProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        Err(SentinelError::Llm("scripted outage".to_string()))
    }
}

struct EchoProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionProvider for EchoProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("echo of {} turns", request.messages.len()))
    }
}

fn ctx() -> EnrichmentContext {
    EnrichmentContext {
        repo: "acme/widget".to_string(),
        period_start: "2026-07-01".to_string(),
        period_end: "2026-07-02".to_string(),
        stats: ReportStats {
            repos: 1,
            activities: 10,
            commits: 6,
            issues: 2,
            pull_requests: 1,
            releases: 1,
        },
        highlights: vec!["Crash on startup".to_string()],
    }
}

#[tokio::test]
async fn enrichment_falls_back_when_provider_fails() {
    let adapter = LlmAdapter::with_provider(Some(Arc::new(FailingProvider)));

    let summary = adapter.summarize(&ctx()).await;
    assert!(!summary.is_empty());
    assert!(summary.contains("acme/widget"));
    assert!(summary.contains("6 commits"));

    let trends = adapter.analyze_trends(&ctx()).await;
    assert!(!trends.is_empty());
    assert!(trends.contains("commit work"));
}

#[tokio::test]
async fn enrichment_falls_back_without_credentials() {
    let adapter = LlmAdapter::with_provider(None);
    let summary = adapter.summarize(&ctx()).await;
    assert!(summary.contains("10 activities"));
}

#[tokio::test]
async fn fallback_is_deterministic() {
    let adapter = LlmAdapter::with_provider(None);
    let a = adapter.summarize(&ctx()).await;
    let b = adapter.summarize(&ctx()).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn raw_complete_surfaces_errors() {
    let adapter = LlmAdapter::with_provider(Some(Arc::new(FailingProvider)));
    assert!(adapter.complete("hello").await.is_err());

    let adapter = LlmAdapter::with_provider(None);
    assert!(adapter.complete("hello").await.is_err());
}

#[tokio::test]
async fn chat_memory_is_bounded_by_turn_count() {
    let provider = Arc::new(EchoProvider {
        calls: AtomicUsize::new(0),
    });
    let adapter = LlmAdapter::with_provider(Some(provider.clone()));

    for i in 0..(CHAT_WINDOW + 5) {
        let answer = adapter.chat(1, &format!("question {i}"), None).await;
        assert!(answer.starts_with("echo"));
    }
    assert_eq!(adapter.chat_history_len(1).await, CHAT_WINDOW);
    assert_eq!(provider.calls.load(Ordering::SeqCst), CHAT_WINDOW + 5);

    // Memory is per user.
    assert_eq!(adapter.chat_history_len(2).await, 0);

    adapter.clear_chat_memory(1).await;
    assert_eq!(adapter.chat_history_len(1).await, 0);
}

#[tokio::test]
async fn chat_includes_history_in_the_request() {
    let provider = Arc::new(EchoProvider {
        calls: AtomicUsize::new(0),
    });
    let adapter = LlmAdapter::with_provider(Some(provider));

    // First call: system + user = 2 turns.
    let first = adapter.chat(1, "q1", None).await;
    assert_eq!(first, "echo of 2 turns");

    // Second call carries the first exchange: system + q1 + a1 + q2 = 4.
    let second = adapter.chat(1, "q2", None).await;
    assert_eq!(second, "echo of 4 turns");
}

#[tokio::test]
async fn chat_survives_provider_outage() {
    let adapter = LlmAdapter::with_provider(Some(Arc::new(FailingProvider)));
    let answer = adapter.chat(1, "anyone there?", None).await;
    assert!(answer.contains("unavailable"));
    // The failed exchange still lands in memory so the user sees continuity.
    assert_eq!(adapter.chat_history_len(1).await, 1);
}

//! End-to-end report generation against scripted collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use sentinel_collector::Collector;
use sentinel_common::types::*;
use sentinel_common::{EventBus, SentinelError, SentinelEvent};
use sentinel_github::models::*;
use sentinel_github::{GithubError, PlatformApi};
use sentinel_llm::{CompletionProvider, CompletionRequest, LlmAdapter};
use sentinel_realtime::{Hub, ServerMessage};
use sentinel_reports::{GenerateRequest, ReportOrchestrator};
use sentinel_storage::{NewSubscription, NewUser, SqliteStore};

struct QuietPlatform;

#[async_trait]
impl PlatformApi for QuietPlatform {
    async fn get_repo(&self, repo_ref: &str) -> Result<RepoInfo, GithubError> {
        Err(GithubError::NotFound(repo_ref.to_string()))
    }
    async fn list_commits(
        &self,
        _repo_ref: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, GithubError> {
        Ok(vec![CommitItem {
            sha: "abc123".to_string(),
            commit: CommitDetail {
                message: "fix: stop the crash".to_string(),
                author: CommitAuthorDetail {
                    name: "Bob".to_string(),
                    email: "bob@example.com".to_string(),
                    date: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                },
            },
            author: Some(UserRef {
                login: "bob".to_string(),
                avatar_url: None,
            }),
            html_url: "https://github.com/acme/widget/commit/abc123".to_string(),
        }])
    }
    async fn list_issues(
        &self,
        _repo_ref: &str,
        _since: DateTime<Utc>,
        _states: &[String],
    ) -> Result<Vec<IssueItem>, GithubError> {
        Ok(vec![])
    }
    async fn list_pulls(
        &self,
        _repo_ref: &str,
        _since_updated: DateTime<Utc>,
        _states: &[String],
    ) -> Result<Vec<PullItem>, GithubError> {
        Ok(vec![])
    }
    async fn list_releases(
        &self,
        _repo_ref: &str,
        _limit: u32,
    ) -> Result<Vec<ReleaseItem>, GithubError> {
        Ok(vec![])
    }
}

struct TimingOutProvider;

#[async_trait]
impl CompletionProvider for TimingOutProvider {
    async fn complete(&self, _request: CompletionRequest) -> sentinel_common::Result<String> {
        Err(SentinelError::Llm("timed out".to_string()))
    }
}

async fn harness() -> (ReportOrchestrator, SqliteStore, Arc<Hub>, EventBus, i64) {
    let store = SqliteStore::in_memory().await.unwrap();
    let user = store
        .create_user(NewUser {
            handle: "alice".to_string(),
            email: "alice@example.com".to_string(),
            display_name: None,
            api_token: None,
        })
        .await
        .unwrap();
    let sub = store
        .create_subscription(NewSubscription {
            owner_user_id: user.id,
            repo_ref: "acme/widget".to_string(),
            cadence: Cadence::Daily,
            watches: WatchSet {
                commits: true,
                issues: false,
                pull_requests: false,
                releases: false,
                discussions: false,
            },
            filters: SubscriptionFilters::default(),
            delivery: DeliveryConfig::default(),
        })
        .await
        .unwrap();

    let events = EventBus::new();
    let hub = Arc::new(Hub::new());
    let collector = Arc::new(Collector::new(
        Arc::new(QuietPlatform),
        store.clone(),
        events.clone(),
    ));
    let llm = Arc::new(LlmAdapter::with_provider(Some(Arc::new(TimingOutProvider))));
    let orchestrator = ReportOrchestrator::new(
        store.clone(),
        collector,
        llm,
        hub.clone(),
        events.clone(),
        chrono_tz::Asia::Shanghai,
    );
    (orchestrator, store, hub, events, sub.id)
}

#[tokio::test]
async fn report_completes_with_fallback_when_llm_is_down() {
    let (orchestrator, store, hub, events, subscription_id) = harness().await;

    // The owner is connected and watching progress.
    let (_, mut rx) = hub.attach(1).await;
    rx.recv().await.unwrap();

    let mut bus_rx = events.subscribe();

    let prepared = orchestrator
        .prepare(GenerateRequest {
            subscription_id,
            kind: ReportKind::Daily,
            format: ReportFormat::Markdown,
        })
        .await
        .unwrap();
    assert_eq!(prepared.report.status, ReportStatus::Pending);
    assert_eq!(prepared.job_key, format!("report:{}", prepared.report.id));

    let report = orchestrator
        .run(prepared.report.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::Completed);
    let summary = report.summary.clone().unwrap();
    assert!(!summary.is_empty());
    assert!(summary.contains("acme/widget"));
    let analysis = report.ai_analysis.clone().unwrap();
    assert!(!analysis.is_empty());
    let body = report.body.clone().unwrap();
    assert!(body.contains("fix: stop the crash"));
    assert_eq!(report.stats.commits, 1);

    // Progress frames arrived, ending at 100.
    let mut last_progress = 0;
    while let Ok(frame) = rx.try_recv() {
        if let ServerMessage::ProgressUpdate { progress, .. } = frame {
            assert!(progress >= last_progress);
            last_progress = progress;
        }
    }
    assert_eq!(last_progress, 100);

    // ReportReady went out on the bus (NewActivity events may precede it).
    let mut saw_ready = false;
    while let Ok(event) = bus_rx.try_recv() {
        if let SentinelEvent::ReportReady { report: ready, .. } = event {
            assert_eq!(ready.id, report.id);
            saw_ready = true;
        }
    }
    assert!(saw_ready);

    // The row is terminal now.
    let persisted = store.get_report(report.id).await.unwrap();
    assert_eq!(persisted.status, ReportStatus::Completed);
    assert!(persisted.generated_at.is_some());
}

#[tokio::test]
async fn cancelled_report_fails_with_cancelled_reason() {
    let (orchestrator, store, hub, _events, subscription_id) = harness().await;

    let (_, mut rx) = hub.attach(1).await;
    rx.recv().await.unwrap();

    let prepared = orchestrator
        .prepare(GenerateRequest {
            subscription_id,
            kind: ReportKind::Daily,
            format: ReportFormat::Html,
        })
        .await
        .unwrap();

    // Cancel before the job starts: the first stage boundary observes it.
    assert!(orchestrator.cancel_task(&prepared.task_id).await);
    let err = orchestrator
        .run(prepared.report.id, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SentinelError::Cancelled));

    let report = store.get_report(prepared.report.id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Failed);
    assert_eq!(report.error.as_deref(), Some("cancelled"));

    // The watcher got a task_cancelled frame.
    let mut saw_cancelled = false;
    while let Ok(frame) = rx.try_recv() {
        if matches!(frame, ServerMessage::TaskCancelled { .. }) {
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled);

    // Cancelling an unknown task is a no-op.
    assert!(!orchestrator.cancel_task("report_9999").await);
}

#[tokio::test]
async fn unknown_subscription_is_not_found() {
    let (orchestrator, _, _, _, _) = harness().await;
    let err = orchestrator
        .prepare(GenerateRequest {
            subscription_id: 404,
            kind: ReportKind::Weekly,
            format: ReportFormat::Markdown,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SentinelError::NotFound(_)));
}

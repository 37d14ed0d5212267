//! Collector pipeline tests against a scripted platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use sentinel_collector::Collector;
use sentinel_common::types::*;
use sentinel_common::{EventBus, SentinelEvent};
use sentinel_github::models::*;
use sentinel_github::{GithubError, PlatformApi};
use sentinel_storage::{NewSubscription, NewUser, SqliteStore};

#[derive(Default, Clone)]
struct ScriptedPlatform {
    commits: Vec<CommitItem>,
    issues: Vec<IssueItem>,
    pulls: Vec<PullItem>,
    releases: Vec<ReleaseItem>,
    fail_repos: Vec<String>,
}

#[async_trait]
impl PlatformApi for ScriptedPlatform {
    async fn get_repo(&self, repo_ref: &str) -> Result<RepoInfo, GithubError> {
        Err(GithubError::NotFound(repo_ref.to_string()))
    }

    async fn list_commits(
        &self,
        repo_ref: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, GithubError> {
        if self.fail_repos.iter().any(|r| r == repo_ref) {
            return Err(GithubError::TransientUpstream("scripted failure".to_string()));
        }
        Ok(self.commits.clone())
    }

    async fn list_issues(
        &self,
        _repo_ref: &str,
        _since: DateTime<Utc>,
        _states: &[String],
    ) -> Result<Vec<IssueItem>, GithubError> {
        Ok(self.issues.clone())
    }

    async fn list_pulls(
        &self,
        _repo_ref: &str,
        _since_updated: DateTime<Utc>,
        _states: &[String],
    ) -> Result<Vec<PullItem>, GithubError> {
        Ok(self.pulls.clone())
    }

    async fn list_releases(
        &self,
        _repo_ref: &str,
        _limit: u32,
    ) -> Result<Vec<ReleaseItem>, GithubError> {
        Ok(self.releases.clone())
    }
}

fn commit(sha: &str, minutes_ago: i64) -> CommitItem {
    let when = (Utc::now() - chrono::Duration::minutes(minutes_ago))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();
    CommitItem {
        sha: sha.to_string(),
        commit: CommitDetail {
            message: format!("commit {sha}"),
            author: CommitAuthorDetail {
                name: "Bob".to_string(),
                email: "bob@example.com".to_string(),
                date: when,
            },
        },
        author: Some(UserRef {
            login: "bob".to_string(),
            avatar_url: None,
        }),
        html_url: format!("https://github.com/acme/widget/commit/{sha}"),
    }
}

fn issue(number: i64, state: &str, labels: &[&str], minutes_ago: i64) -> IssueItem {
    let when = (Utc::now() - chrono::Duration::minutes(minutes_ago))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();
    IssueItem {
        number,
        title: format!("issue {number}"),
        body: Some("details".to_string()),
        state: state.to_string(),
        user: Some(UserRef {
            login: "carol".to_string(),
            avatar_url: None,
        }),
        labels: labels
            .iter()
            .map(|l| Label {
                name: l.to_string(),
            })
            .collect(),
        assignees: vec![],
        milestone: None,
        comments: 1,
        created_at: when.clone(),
        updated_at: when,
        closed_at: None,
        html_url: format!("https://github.com/acme/widget/issues/{number}"),
        pull_request: None,
    }
}

async fn setup(
    platform: ScriptedPlatform,
    watches: WatchSet,
    filters: SubscriptionFilters,
) -> (Collector, SqliteStore, Subscription, EventBus) {
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
            watches,
            filters,
            delivery: DeliveryConfig::default(),
        })
        .await
        .unwrap();
    let events = EventBus::new();
    let collector = Collector::new(Arc::new(platform), store.clone(), events.clone());
    (collector, store, sub, events)
}

fn commits_and_issues() -> WatchSet {
    WatchSet {
        commits: true,
        issues: true,
        pull_requests: false,
        releases: false,
        discussions: false,
    }
}

#[tokio::test]
async fn first_sync_ingests_everything_and_emits() {
    let platform = ScriptedPlatform {
        commits: vec![commit("c1", 50), commit("c2", 40), commit("c3", 30)],
        issues: vec![issue(1, "open", &[], 20), issue(2, "closed", &[], 10)],
        ..Default::default()
    };
    let (collector, store, sub, events) =
        setup(platform, commits_and_issues(), SubscriptionFilters::default()).await;
    let mut rx = events.subscribe();

    let cancel = CancellationToken::new();
    let result = collector
        .collect_for_subscription(sub.id, Duration::from_secs(24 * 3600), &cancel)
        .await
        .unwrap();

    assert_eq!(result.inserted, 5);
    assert_eq!(result.updated, 0);
    assert_eq!(store.count_activities(Some(sub.id)).await.unwrap(), 5);

    // Watermark lands on the newest observed update (issue 2, ~10m ago).
    let reloaded = store.get_subscription(sub.id).await.unwrap();
    let watermark = reloaded.last_sync_at.unwrap();
    assert!(Utc::now() - watermark < chrono::Duration::minutes(11));

    let mut event_count = 0;
    while let Ok(event) = rx.try_recv() {
        assert!(matches!(event, SentinelEvent::NewActivity { .. }));
        event_count += 1;
    }
    assert_eq!(event_count, 5);
}

#[tokio::test]
async fn resync_with_unchanged_upstream_is_a_noop() {
    let platform = ScriptedPlatform {
        commits: vec![commit("c1", 50)],
        issues: vec![issue(1, "open", &[], 20)],
        ..Default::default()
    };
    let (collector, store, sub, events) =
        setup(platform, commits_and_issues(), SubscriptionFilters::default()).await;

    let cancel = CancellationToken::new();
    let window = Duration::from_secs(24 * 3600);
    collector
        .collect_for_subscription(sub.id, window, &cancel)
        .await
        .unwrap();
    let watermark_after_first = store
        .get_subscription(sub.id)
        .await
        .unwrap()
        .last_sync_at
        .unwrap();

    let mut rx = events.subscribe();
    let second = collector
        .collect_for_subscription(sub.id, window, &cancel)
        .await
        .unwrap();

    assert_eq!(second.inserted, 0);
    assert!(second.updated <= 2);
    assert_eq!(store.count_activities(Some(sub.id)).await.unwrap(), 2);
    assert!(rx.try_recv().is_err(), "no events for already-seen activities");

    let watermark_after_second = store
        .get_subscription(sub.id)
        .await
        .unwrap()
        .last_sync_at
        .unwrap();
    assert!(watermark_after_second >= watermark_after_first);
}

#[tokio::test]
async fn excluded_label_never_reaches_the_store() {
    let platform = ScriptedPlatform {
        issues: vec![
            issue(3, "open", &["bug", "wontfix"], 5),
            issue(4, "open", &["bug"], 5),
        ],
        ..Default::default()
    };
    let watches = WatchSet {
        commits: false,
        issues: true,
        pull_requests: false,
        releases: false,
        discussions: false,
    };
    let filters = SubscriptionFilters {
        exclude_labels: vec!["wontfix".to_string()],
        ..Default::default()
    };
    let (collector, store, sub, events) = setup(platform, watches, filters).await;
    let mut rx = events.subscribe();

    let cancel = CancellationToken::new();
    let result = collector
        .collect_for_subscription(sub.id, Duration::from_secs(24 * 3600), &cancel)
        .await
        .unwrap();

    assert_eq!(result.inserted, 1);
    let stored = store.list_activities(sub.id, None, 50, 0).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].external_id, "4");

    let mut seen = 0;
    while rx.try_recv().is_ok() {
        seen += 1;
    }
    assert_eq!(seen, 1);
}

#[tokio::test]
async fn paused_subscription_collects_nothing() {
    let platform = ScriptedPlatform {
        commits: vec![commit("c1", 5)],
        ..Default::default()
    };
    let (collector, store, sub, _) =
        setup(platform, commits_and_issues(), SubscriptionFilters::default()).await;
    store
        .update_subscription(
            sub.id,
            sentinel_storage::SubscriptionPatch {
                status: Some(SubscriptionStatus::Paused),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let result = collector
        .collect_for_subscription(sub.id, Duration::from_secs(3600), &cancel)
        .await
        .unwrap();
    assert_eq!(result.inserted, 0);
    assert_eq!(result.fetched, 0);
}

#[tokio::test]
async fn sweep_isolates_failing_subscriptions() {
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
    for repo in ["acme/ok", "acme/broken"] {
        store
            .create_subscription(NewSubscription {
                owner_user_id: user.id,
                repo_ref: repo.to_string(),
                cadence: Cadence::Daily,
                watches: commits_and_issues(),
                filters: SubscriptionFilters::default(),
                delivery: DeliveryConfig::default(),
            })
            .await
            .unwrap();
    }

    let platform = ScriptedPlatform {
        commits: vec![commit("c9", 5)],
        fail_repos: vec!["acme/broken".to_string()],
        ..Default::default()
    };
    let collector = Collector::new(Arc::new(platform), store.clone(), EventBus::new());

    let cancel = CancellationToken::new();
    let summary = collector
        .collect_sweep(Duration::from_secs(3600), &cancel)
        .await
        .unwrap();

    assert_eq!(summary.subscriptions, 2);
    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.inserted, 1);
}

#[tokio::test]
async fn cancelled_token_stops_collection() {
    let platform = ScriptedPlatform {
        commits: vec![commit("c1", 5)],
        ..Default::default()
    };
    let (collector, _, sub, _) =
        setup(platform, commits_and_issues(), SubscriptionFilters::default()).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = collector
        .collect_for_subscription(sub.id, Duration::from_secs(3600), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, sentinel_common::SentinelError::Cancelled));
}

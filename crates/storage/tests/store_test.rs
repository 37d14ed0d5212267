//! Store contract tests against an in-memory database.

use chrono::{Duration, Utc};
use sentinel_common::types::*;
use sentinel_common::SentinelError;
use sentinel_storage::{NewReport, NewSubscription, NewUser, SqliteStore, TaskCounters};

async fn store_with_subscription() -> (SqliteStore, Subscription) {
    let store = SqliteStore::in_memory().await.unwrap();
    let user = store
        .create_user(NewUser {
            handle: "alice".to_string(),
            email: "alice@example.com".to_string(),
            display_name: None,
            api_token: Some("tok-alice".to_string()),
        })
        .await
        .unwrap();
    let sub = store
        .create_subscription(NewSubscription {
            owner_user_id: user.id,
            repo_ref: "acme/widget".to_string(),
            cadence: Cadence::Daily,
            watches: WatchSet::default(),
            filters: SubscriptionFilters::default(),
            delivery: DeliveryConfig::default(),
        })
        .await
        .unwrap();
    (store, sub)
}

fn draft(sub_id: i64, kind: ActivityKind, external_id: &str, title: &str) -> ActivityDraft {
    ActivityDraft {
        subscription_id: sub_id,
        kind,
        external_id: external_id.to_string(),
        title: title.to_string(),
        body: "body".to_string(),
        url: format!("https://github.com/acme/widget/{external_id}"),
        author: ActivityAuthor {
            login: "bob".to_string(),
            display_name: None,
            avatar_url: None,
        },
        labels: vec!["bug".to_string()],
        assignees: vec![],
        state: Some("open".to_string()),
        extras: serde_json::json!({"comments": 2}),
        source_created_at: Some(Utc::now() - Duration::hours(1)),
        source_updated_at: Some(Utc::now()),
    }
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let (store, sub) = store_with_subscription().await;

    let first = store
        .upsert_activity(draft(sub.id, ActivityKind::Issue, "42", "original title"))
        .await
        .unwrap();
    assert!(first.inserted);

    // Same key again: update in place, never a second row.
    let mut changed = draft(sub.id, ActivityKind::Issue, "42", "edited title");
    changed.state = Some("closed".to_string());
    let second = store.upsert_activity(changed).await.unwrap();
    assert!(!second.inserted);
    assert_eq!(second.activity.id, first.activity.id);
    assert_eq!(second.activity.title, "edited title");
    assert_eq!(second.activity.state.as_deref(), Some("closed"));

    assert_eq!(store.count_activities(Some(sub.id)).await.unwrap(), 1);
}

#[tokio::test]
async fn same_external_id_different_kind_is_distinct() {
    let (store, sub) = store_with_subscription().await;
    store
        .upsert_activity(draft(sub.id, ActivityKind::Issue, "7", "issue seven"))
        .await
        .unwrap();
    let outcome = store
        .upsert_activity(draft(sub.id, ActivityKind::PullRequest, "7", "pr seven"))
        .await
        .unwrap();
    assert!(outcome.inserted);
    assert_eq!(store.count_activities(Some(sub.id)).await.unwrap(), 2);
}

#[tokio::test]
async fn round_trip_preserves_normalized_fields() {
    let (store, sub) = store_with_subscription().await;
    let original = draft(sub.id, ActivityKind::Issue, "99", "a bug report");
    store.upsert_activity(original.clone()).await.unwrap();

    let listed = store
        .list_activities(sub.id, None, 50, 0)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    let activity = &listed[0];
    assert_eq!(activity.external_id, original.external_id);
    assert_eq!(activity.kind, original.kind);
    assert_eq!(activity.title, original.title);
    assert_eq!(activity.url, original.url);
    assert_eq!(activity.author.login, original.author.login);
    assert_eq!(activity.state, original.state);
    assert_eq!(activity.labels, original.labels);
    assert_eq!(activity.extras["comments"], 2);
}

#[tokio::test]
async fn watermark_never_moves_backwards() {
    let (store, sub) = store_with_subscription().await;
    let t1 = Utc::now();
    let t0 = t1 - Duration::hours(2);

    // Persistence is microsecond-granular, so compare at that precision.
    let micros = |dt: chrono::DateTime<Utc>| dt.timestamp_micros();

    let after_first = store.advance_last_sync(sub.id, t1).await.unwrap();
    assert_eq!(micros(after_first), micros(t1));

    // An older watermark is a no-op.
    let after_stale = store.advance_last_sync(sub.id, t0).await.unwrap();
    assert_eq!(micros(after_stale), micros(t1));

    let t2 = t1 + Duration::minutes(5);
    let after_newer = store.advance_last_sync(sub.id, t2).await.unwrap();
    assert_eq!(micros(after_newer), micros(t2));

    let reloaded = store.get_subscription(sub.id).await.unwrap();
    assert_eq!(reloaded.last_sync_at.map(micros), Some(micros(t2)));
}

#[tokio::test]
async fn duplicate_subscription_is_a_conflict() {
    let (store, sub) = store_with_subscription().await;
    let err = store
        .create_subscription(NewSubscription {
            owner_user_id: sub.owner_user_id,
            repo_ref: sub.repo_ref.clone(),
            cadence: Cadence::Weekly,
            watches: WatchSet::default(),
            filters: SubscriptionFilters::default(),
            delivery: DeliveryConfig::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SentinelError::Conflict(_)));
}

#[tokio::test]
async fn bad_repo_ref_is_invalid_input() {
    let (store, sub) = store_with_subscription().await;
    let err = store
        .create_subscription(NewSubscription {
            owner_user_id: sub.owner_user_id,
            repo_ref: "not-a-repo".to_string(),
            cadence: Cadence::Daily,
            watches: WatchSet::default(),
            filters: SubscriptionFilters::default(),
            delivery: DeliveryConfig::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SentinelError::InvalidInput(_)));
}

#[tokio::test]
async fn deleting_subscription_cascades_to_activities() {
    let (store, sub) = store_with_subscription().await;
    store
        .upsert_activity(draft(sub.id, ActivityKind::Commit, "abc123", "a commit"))
        .await
        .unwrap();
    store.delete_subscription(sub.id).await.unwrap();
    assert_eq!(store.count_activities(None).await.unwrap(), 0);
}

#[tokio::test]
async fn terminal_reports_are_immutable() {
    let (store, sub) = store_with_subscription().await;
    let report = store
        .create_report(NewReport {
            owner_user_id: sub.owner_user_id,
            subscription_ids: vec![sub.id],
            title: "daily".to_string(),
            kind: ReportKind::Daily,
            format: ReportFormat::Markdown,
            period_start: Utc::now() - Duration::days(1),
            period_end: Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Pending);

    let report = store.mark_report_generating(report.id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Generating);

    let report = store
        .complete_report(report.id, "summary", "body", "analysis", ReportStats::default())
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Completed);
    assert!(report.generated_at.is_some());

    // Completed rows refuse further transitions...
    let err = store.fail_report(report.id, "late failure").await.unwrap_err();
    assert!(matches!(err, SentinelError::Conflict(_)));
    let err = store.mark_report_generating(report.id).await.unwrap_err();
    assert!(matches!(err, SentinelError::Conflict(_)));

    // ...but deletion still works.
    store.delete_report(report.id).await.unwrap();
    assert!(matches!(
        store.get_report(report.id).await.unwrap_err(),
        SentinelError::NotFound(_)
    ));
}

#[tokio::test]
async fn task_execution_lifecycle() {
    let (store, _) = store_with_subscription().await;
    let task = store
        .start_task_execution("collection_sweep", "collection")
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(store.count_running_tasks("collection_sweep").await.unwrap(), 1);

    let finished = store
        .finish_task_execution(
            task.id,
            TaskStatus::Completed,
            TaskCounters {
                success: 3,
                errors: 1,
                processed: 4,
            },
            None,
            Some(serde_json::json!({"inserted": 12})),
        )
        .await
        .unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.success_count, 3);
    assert_eq!(finished.error_count, 1);
    assert!(finished.finished_at.is_some());
    assert_eq!(store.count_running_tasks("collection_sweep").await.unwrap(), 0);
}

#[tokio::test]
async fn token_resolution_rejects_unknown_and_inactive() {
    let (store, sub) = store_with_subscription().await;
    let user = store.get_user_by_token("tok-alice").await.unwrap();
    assert_eq!(user.id, sub.owner_user_id);

    assert!(matches!(
        store.get_user_by_token("nope").await.unwrap_err(),
        SentinelError::Unauthorized(_)
    ));

    store
        .update_user(user.id, None, Some(false), None)
        .await
        .unwrap();
    assert!(matches!(
        store.get_user_by_token("tok-alice").await.unwrap_err(),
        SentinelError::Unauthorized(_)
    ));
}

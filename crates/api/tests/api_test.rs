//! HTTP surface tests via tower's oneshot, no sockets needed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tower::ServiceExt;

use sentinel_api::{router, AppState};
use sentinel_collector::Collector;
use sentinel_common::{EventBus, SentinelConfig};
use sentinel_github::models::*;
use sentinel_github::{GithubError, PlatformApi};
use sentinel_llm::LlmAdapter;
use sentinel_realtime::Hub;
use sentinel_reports::ReportOrchestrator;
use sentinel_scheduler::Scheduler;
use sentinel_storage::SqliteStore;

struct OfflinePlatform;

#[async_trait]
impl PlatformApi for OfflinePlatform {
    async fn get_repo(&self, repo_ref: &str) -> Result<RepoInfo, GithubError> {
        Err(GithubError::NotFound(repo_ref.to_string()))
    }
    async fn list_commits(
        &self,
        _repo_ref: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, GithubError> {
        Ok(vec![])
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

async fn test_state() -> AppState {
    let store = SqliteStore::in_memory().await.unwrap();
    let events = EventBus::new();
    let hub = Arc::new(Hub::new());
    let platform: Arc<dyn PlatformApi> = Arc::new(OfflinePlatform);
    let collector = Arc::new(Collector::new(platform.clone(), store.clone(), events.clone()));
    let llm = Arc::new(LlmAdapter::with_provider(None));
    let scheduler = Scheduler::new(store.clone(), chrono_tz::Asia::Shanghai);
    let orchestrator = Arc::new(ReportOrchestrator::new(
        store.clone(),
        collector.clone(),
        llm.clone(),
        hub.clone(),
        events.clone(),
        chrono_tz::Asia::Shanghai,
    ));
    AppState {
        config: Arc::new(RwLock::new(SentinelConfig::default())),
        store,
        events,
        hub,
        platform,
        collector,
        scheduler,
        orchestrator,
        llm,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_reports_service_and_version() {
    let app = router(test_state().await);
    let response = app.oneshot(get("/api/v1/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "repo-sentinel");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = router(test_state().await);
    let response = app.oneshot(get("/api/v1/subscriptions", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn demo_token_requires_dev_mode() {
    let state = test_state().await;
    let app = router(state.clone());
    let response = app
        .clone()
        .oneshot(get("/api/v1/subscriptions", Some("demo")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Flip dev mode on and create a user; the demo token now works.
    state.config.write().await.app.dev_mode = true;
    let created = app
        .clone()
        .oneshot(post_json(
            "/api/v1/users",
            None,
            serde_json::json!({"handle": "alice", "email": "alice@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);

    let response = app
        .oneshot(get("/api/v1/subscriptions", Some("demo")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn subscription_lifecycle_over_http() {
    let app = router(test_state().await);

    let created = app
        .clone()
        .oneshot(post_json(
            "/api/v1/users",
            None,
            serde_json::json!({"handle": "alice", "email": "alice@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    let body = body_json(created).await;
    let token = body["api_token"].as_str().unwrap().to_string();

    // Repo metadata enrichment fails against the offline platform, but the
    // subscription is still created.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/subscriptions",
            Some(&token),
            serde_json::json!({"repo_ref": "acme/widget"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let subscription = body_json(response).await;
    assert_eq!(subscription["repo_ref"], "acme/widget");
    let id = subscription["id"].as_i64().unwrap();

    // Malformed repo ref → 400.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/subscriptions",
            Some(&token),
            serde_json::json!({"repo_ref": "not-a-repo"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Duplicate → 409.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/subscriptions",
            Some(&token),
            serde_json::json!({"repo_ref": "acme/widget"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Activities start empty.
    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/subscriptions/{id}/activities"), Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);

    // Unknown subscription → 404.
    let response = app
        .oneshot(get("/api/v1/subscriptions/999", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn generate_report_for_unknown_subscription_is_404() {
    let app = router(test_state().await);
    let created = app
        .clone()
        .oneshot(post_json(
            "/api/v1/users",
            None,
            serde_json::json!({"handle": "bob", "email": "bob@example.com"}),
        ))
        .await
        .unwrap();
    let token = body_json(created).await["api_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(post_json(
            "/api/v1/reports/generate",
            Some(&token),
            serde_json::json!({"subscription_id": 123, "report_type": "daily"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_are_redacted() {
    let state = test_state().await;
    state.config.write().await.github.token = "ghp_secret".to_string();
    let app = router(state.clone());

    let created = app
        .clone()
        .oneshot(post_json(
            "/api/v1/users",
            None,
            serde_json::json!({"handle": "carol", "email": "carol@example.com"}),
        ))
        .await
        .unwrap();
    let token = body_json(created).await["api_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(get("/api/v1/settings", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["github"]["token"], "***");
}

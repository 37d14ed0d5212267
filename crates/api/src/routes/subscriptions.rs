//! Subscription management, activity listing, and on-demand sync.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use tracing::{instrument, warn};

use sentinel_common::types::{
    ActivityKind, Cadence, Subscription, SubscriptionStatus,
};
use sentinel_common::SentinelError;
use sentinel_scheduler::JobOutcome;
use sentinel_storage::{NewSubscription, SubscriptionPatch, TaskCounters};

use crate::auth::AuthedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{
    ActivityListQuery, CreateSubscriptionRequest, SyncResponse, UpdateSubscriptionRequest,
};

const SYNC_WINDOW: Duration = Duration::from_secs(24 * 3600);

/// Owner check shared by the item handlers.
async fn owned_subscription(
    state: &AppState,
    user_id: i64,
    subscription_id: i64,
) -> Result<Subscription, ApiError> {
    let subscription = state.store.get_subscription(subscription_id).await?;
    if subscription.owner_user_id != user_id {
        return Err(SentinelError::NotFound(format!("subscription {subscription_id}")).into());
    }
    Ok(subscription)
}

#[instrument(skip(state, req), fields(repo = %req.repo_ref))]
pub async fn create_subscription(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(req): Json<CreateSubscriptionRequest>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state
        .store
        .create_subscription(NewSubscription {
            owner_user_id: user.id,
            repo_ref: req.repo_ref.clone(),
            cadence: Cadence::parse(&req.cadence)?,
            watches: req.watches.unwrap_or_default(),
            filters: req.filters.unwrap_or_default(),
            delivery: req.delivery.unwrap_or_default(),
        })
        .await?;

    // Best-effort metadata enrichment; the subscription works without it.
    let subscription = match state.platform.get_repo(&req.repo_ref).await {
        Ok(info) => state
            .store
            .update_subscription(
                subscription.id,
                SubscriptionPatch {
                    repo_description: info.description,
                    repo_url: Some(info.html_url),
                    repo_language: info.language,
                    repo_stars: Some(info.stargazers_count),
                    repo_forks: Some(info.forks_count),
                    ..Default::default()
                },
            )
            .await
            .unwrap_or(subscription),
        Err(e) => {
            warn!(repo = %req.repo_ref, error = %e, "repository metadata unavailable");
            subscription
        }
    };
    Ok(Json(subscription))
}

#[instrument(skip_all)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> ApiResult<Json<Vec<Subscription>>> {
    Ok(Json(state.store.list_subscriptions(Some(user.id)).await?))
}

#[instrument(skip(state))]
pub async fn get_subscription(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Subscription>> {
    Ok(Json(owned_subscription(&state, user.id, id).await?))
}

#[instrument(skip(state, req))]
pub async fn update_subscription(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> ApiResult<Json<Subscription>> {
    owned_subscription(&state, user.id, id).await?;
    let patch = SubscriptionPatch {
        status: req.status.as_deref().map(SubscriptionStatus::parse).transpose()?,
        cadence: req.cadence.as_deref().map(Cadence::parse).transpose()?,
        watches: req.watches,
        filters: req.filters,
        delivery: req.delivery,
        ..Default::default()
    };
    Ok(Json(state.store.update_subscription(id, patch).await?))
}

#[instrument(skip(state))]
pub async fn delete_subscription(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_subscription(&state, user.id, id).await?;
    state.store.delete_subscription(id).await?;
    Ok(Json(serde_json::json!({"deleted": id})))
}

#[instrument(skip(state, query))]
pub async fn list_activities(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
    Query(query): Query<ActivityListQuery>,
) -> ApiResult<Json<Vec<sentinel_common::types::Activity>>> {
    owned_subscription(&state, user.id, id).await?;
    let kind = query.kind.as_deref().map(ActivityKind::parse).transpose()?;
    let limit = query.limit.clamp(1, 500);
    let activities = state
        .store
        .list_activities(id, kind, limit, query.offset.max(0))
        .await?;
    Ok(Json(activities))
}

/// Enqueue a one-shot collection for this subscription. A second request
/// while one is in flight is rejected with a conflict.
#[instrument(skip(state))]
pub async fn sync_subscription(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<SyncResponse>> {
    owned_subscription(&state, user.id, id).await?;

    let collector = state.collector.clone();
    let job_key = format!("sync:{id}");
    let job: sentinel_scheduler::JobFn = Arc::new(move |cancel| {
        let collector = collector.clone();
        Box::pin(async move {
            let result = collector
                .collect_for_subscription(id, SYNC_WINDOW, &cancel)
                .await?;
            Ok(JobOutcome {
                counters: TaskCounters {
                    success: 1,
                    errors: 0,
                    processed: result.fetched as i64,
                },
                details: Some(serde_json::json!({
                    "inserted": result.inserted,
                    "updated": result.updated,
                })),
            })
        })
    });

    let task_execution_id = state
        .scheduler
        .submit_one_shot(&job_key, "collection", job)
        .await?;
    Ok(Json(SyncResponse {
        task_execution_id,
        job_key,
    }))
}

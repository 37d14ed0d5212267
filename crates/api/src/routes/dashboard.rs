//! Read-only aggregated stats for the dashboard.

use axum::extract::State;
use axum::Json;
use tracing::instrument;

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::DashboardOverview;

#[instrument(skip_all)]
pub async fn overview(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> ApiResult<Json<DashboardOverview>> {
    let (users, active_users) = state.store.count_users().await?;
    let subscriptions = state.store.list_subscriptions(Some(user.id)).await?;
    let activities = state.store.count_activities(None).await?;
    let reports = state.store.count_reports(Some(user.id)).await?;
    let realtime = state.hub.stats().await;
    let recent_tasks = state.store.list_task_executions(10).await?;

    Ok(Json(DashboardOverview {
        users,
        active_users,
        subscriptions: subscriptions.len(),
        activities,
        reports,
        realtime,
        recent_tasks,
    }))
}

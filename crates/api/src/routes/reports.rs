//! Report management, generation, and download.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::instrument;

use sentinel_common::types::{Report, ReportFormat, ReportKind, ReportStatus};
use sentinel_common::SentinelError;
use sentinel_reports::GenerateRequest;
use sentinel_scheduler::JobOutcome;
use sentinel_storage::TaskCounters;

use crate::auth::AuthedUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{GenerateReportRequest, GenerateReportResponse, PageQuery};

async fn owned_report(state: &AppState, user_id: i64, report_id: i64) -> Result<Report, ApiError> {
    let report = state.store.get_report(report_id).await?;
    if report.owner_user_id != user_id {
        return Err(SentinelError::NotFound(format!("report {report_id}")).into());
    }
    Ok(report)
}

#[instrument(skip(state, query))]
pub async fn list_reports(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Report>>> {
    let reports = state
        .store
        .list_reports(Some(user.id), query.limit.clamp(1, 200), query.offset.max(0))
        .await?;
    Ok(Json(reports))
}

#[instrument(skip(state))]
pub async fn get_report(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Report>> {
    Ok(Json(owned_report(&state, user.id, id).await?))
}

#[instrument(skip(state))]
pub async fn delete_report(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_report(&state, user.id, id).await?;
    state.store.delete_report(id).await?;
    Ok(Json(serde_json::json!({"deleted": id})))
}

/// Kick off generation: the report row is created synchronously, the
/// stages run as a scheduler one-shot keyed `report:<id>`, and progress
/// flows over the realtime hub.
#[instrument(skip(state, req), fields(subscription_id = req.subscription_id))]
pub async fn generate_report(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(req): Json<GenerateReportRequest>,
) -> ApiResult<Json<GenerateReportResponse>> {
    // The subscription must belong to the caller.
    let subscription = state.store.get_subscription(req.subscription_id).await?;
    if subscription.owner_user_id != user.id {
        return Err(SentinelError::NotFound(format!("subscription {}", req.subscription_id)).into());
    }

    let prepared = state
        .orchestrator
        .prepare(GenerateRequest {
            subscription_id: req.subscription_id,
            kind: ReportKind::parse(&req.report_type)?,
            format: ReportFormat::parse(&req.format)?,
        })
        .await?;

    let orchestrator = state.orchestrator.clone();
    let report_id = prepared.report.id;
    let job: sentinel_scheduler::JobFn = Arc::new(move |cancel| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            let report = orchestrator.run(report_id, cancel).await?;
            Ok(JobOutcome {
                counters: TaskCounters {
                    success: 1,
                    errors: 0,
                    processed: report.stats.activities,
                },
                details: Some(serde_json::json!({"report_id": report.id})),
            })
        })
    });

    let task_execution_id = state
        .scheduler
        .submit_one_shot(&prepared.job_key, "report", job)
        .await?;

    Ok(Json(GenerateReportResponse {
        report_id,
        task_id: prepared.task_id,
        task_execution_id,
    }))
}

/// Cancel an in-flight generation.
#[instrument(skip(state))]
pub async fn cancel_report(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_report(&state, user.id, id).await?;
    let cancelled = state.orchestrator.cancel_task(&format!("report_{id}")).await;
    if !cancelled {
        return Err(SentinelError::NotFound(format!("no running generation for report {id}")).into());
    }
    Ok(Json(serde_json::json!({"cancelled": id})))
}

/// Download the rendered body as an attachment.
#[instrument(skip(state))]
pub async fn download_report(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let report = owned_report(&state, user.id, id).await?;
    if report.status != ReportStatus::Completed {
        return Err(SentinelError::Conflict(format!(
            "report {id} is {} and has no downloadable body",
            report.status.as_str()
        ))
        .into());
    }
    let body = report
        .body
        .ok_or_else(|| SentinelError::NotFound(format!("report {id} body")))?;

    let content_type = match report.format {
        ReportFormat::Html => "text/html; charset=utf-8",
        ReportFormat::Markdown => "text/markdown; charset=utf-8",
    };
    let filename = format!("report_{id}.{}", report.format.extension());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

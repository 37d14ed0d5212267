//! The multi-stage report job: collect → aggregate → enrich → render →
//! persist → notify, with progress pushed to the realtime hub and
//! cooperative cancellation at stage boundaries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use sentinel_collector::Collector;
use sentinel_common::time::format_display_date;
use sentinel_common::types::{ActivityKind, Report, ReportFormat, ReportKind, ReportStats};
use sentinel_common::{EventBus, Result, SentinelError, SentinelEvent};
use sentinel_llm::{EnrichmentContext, LlmAdapter};
use sentinel_realtime::Hub;
use sentinel_storage::{NewReport, SqliteStore};

use crate::render::{render_html, render_markdown, RenderInput};

/// Stage boundaries, as pushed on the progress stream.
const PROGRESS_START: u8 = 0;
const PROGRESS_RESOLVE: u8 = 20;
const PROGRESS_INGEST: u8 = 50;
const PROGRESS_ENRICH: u8 = 80;
const PROGRESS_RENDER: u8 = 95;
const PROGRESS_DONE: u8 = 100;

const HIGHLIGHT_COUNT: usize = 5;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub subscription_id: i64,
    pub kind: ReportKind,
    pub format: ReportFormat,
}

#[derive(Debug, Clone)]
pub struct PreparedReport {
    pub report: Report,
    pub task_id: String,
    pub job_key: String,
}

pub struct ReportOrchestrator {
    store: SqliteStore,
    collector: Arc<Collector>,
    llm: Arc<LlmAdapter>,
    hub: Arc<Hub>,
    events: EventBus,
    tz: Tz,
    cancels: Mutex<HashMap<String, CancellationToken>>,
}

impl ReportOrchestrator {
    pub fn new(
        store: SqliteStore,
        collector: Arc<Collector>,
        llm: Arc<LlmAdapter>,
        hub: Arc<Hub>,
        events: EventBus,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            collector,
            llm,
            hub,
            events,
            tz,
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Create the pending report row and register the progress watcher.
    /// The returned job key enforces at-most-one generation per report.
    #[instrument(skip(self))]
    pub async fn prepare(&self, request: GenerateRequest) -> Result<PreparedReport> {
        let subscription = self.store.get_subscription(request.subscription_id).await?;
        let (period_start, period_end) = compute_period(request.kind, Utc::now());
        let title = format!(
            "{} {} report ({})",
            subscription.repo_ref,
            request.kind.as_str(),
            format_display_date(period_end, self.tz),
        );

        let report = self
            .store
            .create_report(NewReport {
                owner_user_id: subscription.owner_user_id,
                subscription_ids: vec![subscription.id],
                title,
                kind: request.kind,
                format: request.format,
                period_start,
                period_end,
            })
            .await?;

        let task_id = format!("report_{}", report.id);
        let job_key = format!("report:{}", report.id);
        self.hub
            .watch_progress(&task_id, subscription.owner_user_id)
            .await;
        self.cancels
            .lock()
            .await
            .insert(task_id.clone(), CancellationToken::new());

        Ok(PreparedReport {
            report,
            task_id,
            job_key,
        })
    }

    /// Run every stage for a prepared report. `outer_cancel` comes from the
    /// scheduler; a user cancel via [`cancel_task`] trips the inner token.
    #[instrument(skip(self, outer_cancel), fields(report_id = report_id))]
    pub async fn run(&self, report_id: i64, outer_cancel: CancellationToken) -> Result<Report> {
        let task_id = format!("report_{report_id}");
        let inner_cancel = {
            let cancels = self.cancels.lock().await;
            cancels.get(&task_id).cloned().unwrap_or_default()
        };

        let outcome = self
            .run_stages(report_id, &task_id, &outer_cancel, &inner_cancel)
            .await;

        self.cancels.lock().await.remove(&task_id);
        match outcome {
            Ok(report) => Ok(report),
            Err(SentinelError::Cancelled) => {
                warn!(report_id, "report generation cancelled");
                let _ = self.store.fail_report(report_id, "cancelled").await;
                self.hub.push_task_cancelled(&task_id).await;
                Err(SentinelError::Cancelled)
            }
            Err(e) => {
                warn!(report_id, error = %e, "report generation failed");
                let _ = self.store.fail_report(report_id, &e.to_string()).await;
                self.hub
                    .push_progress(&task_id, PROGRESS_DONE, "failed", &e.to_string(), None)
                    .await;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        report_id: i64,
        task_id: &str,
        outer: &CancellationToken,
        inner: &CancellationToken,
    ) -> Result<Report> {
        let cancelled = || outer.is_cancelled() || inner.is_cancelled();
        let check = |at_stage: &str| {
            if cancelled() {
                warn!(report_id, at_stage, "cancellation observed");
                Err(SentinelError::Cancelled)
            } else {
                Ok(())
            }
        };

        // start
        check("start")?;
        let report = self.store.mark_report_generating(report_id).await?;
        self.push(task_id, PROGRESS_START, "starting report generation").await;

        // resolve
        check("resolve")?;
        let subscription = self
            .store
            .get_subscription(*report.subscription_ids.first().ok_or_else(|| {
                SentinelError::Internal("report has no subscription".to_string())
            })?)
            .await?;
        self.push(task_id, PROGRESS_RESOLVE, "resolved subscription and period").await;

        // ingest
        check("ingest")?;
        let window = (report.period_end - report.period_start)
            .to_std()
            .unwrap_or(Duration::from_secs(24 * 3600));
        if let Err(e) = self
            .collector
            .collect_for_subscription(subscription.id, window, inner)
            .await
        {
            // A fresh pull is best-effort; the report still renders from
            // whatever the store already holds.
            if matches!(e, SentinelError::Cancelled) {
                return Err(e);
            }
            warn!(error = %e, "ingest stage fell back to stored activities");
        }
        let activities = self
            .store
            .list_activities_in_window(
                &report.subscription_ids,
                report.period_start,
                report.period_end,
            )
            .await?;
        self.push(
            task_id,
            PROGRESS_INGEST,
            &format!("collected {} activities", activities.len()),
        )
        .await;

        // enrich
        check("enrich")?;
        let stats = build_stats(&report, &activities);
        let context = EnrichmentContext {
            repo: subscription.repo_ref.clone(),
            period_start: format_display_date(report.period_start, self.tz),
            period_end: format_display_date(report.period_end, self.tz),
            stats,
            highlights: activities
                .iter()
                .rev()
                .take(HIGHLIGHT_COUNT)
                .map(|a| a.title.clone())
                .collect(),
        };
        // Enrichment is best-effort by contract: the adapter falls back to
        // deterministic text instead of failing.
        let summary = self.llm.summarize(&context).await;
        let trends = self.llm.analyze_trends(&context).await;
        self.push(task_id, PROGRESS_ENRICH, "enrichment finished").await;

        // render
        check("render")?;
        let render_input = RenderInput {
            title: &report.title,
            repo: &subscription.repo_ref,
            period_start: report.period_start,
            period_end: report.period_end,
            summary: &summary,
            trends: &trends,
            stats,
            activities: &activities,
            tz: self.tz,
        };
        let body = match report.format {
            ReportFormat::Markdown => render_markdown(&render_input),
            ReportFormat::Html => render_html(&render_input),
        };
        self.push(task_id, PROGRESS_RENDER, "report rendered").await;

        // finalize
        check("finalize")?;
        let ai_analysis = format!("{summary}\n\n{trends}");
        let report = self
            .store
            .complete_report(report_id, &summary, &body, &ai_analysis, stats)
            .await?;
        self.push(
            task_id,
            PROGRESS_DONE,
            &format!("report {} completed", report.id),
        )
        .await;

        self.events.emit(SentinelEvent::ReportReady {
            report: report.clone(),
            subscription: Some(subscription),
        });
        info!(report_id, "report completed");
        Ok(report)
    }

    /// User-initiated cancellation. Returns false for unknown task ids.
    pub async fn cancel_task(&self, task_id: &str) -> bool {
        let cancels = self.cancels.lock().await;
        match cancels.get(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn push(&self, task_id: &str, progress: u8, message: &str) {
        let status = if progress >= PROGRESS_DONE {
            "completed"
        } else {
            "running"
        };
        self.hub
            .push_progress(task_id, progress, status, message, None)
            .await;
    }
}

/// Rolling windows anchored at "now": a daily report covers the last day,
/// weekly the last seven, monthly the last thirty.
pub fn compute_period(kind: ReportKind, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let span = match kind {
        ReportKind::Daily | ReportKind::Custom => chrono::Duration::days(1),
        ReportKind::Weekly => chrono::Duration::days(7),
        ReportKind::Monthly => chrono::Duration::days(30),
    };
    (now - span, now)
}

fn build_stats(report: &Report, activities: &[sentinel_common::types::Activity]) -> ReportStats {
    let count = |kind: ActivityKind| activities.iter().filter(|a| a.kind == kind).count() as i64;
    ReportStats {
        repos: report.subscription_ids.len() as i64,
        activities: activities.len() as i64,
        commits: count(ActivityKind::Commit),
        issues: count(ActivityKind::Issue),
        pull_requests: count(ActivityKind::PullRequest),
        releases: count(ActivityKind::Release),
    }
}

//! Explicit service wiring. Every component is constructed here once and
//! passed down; nothing is looked up ambiently.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono_tz::Tz;
use tokio::sync::RwLock;

use sentinel_api::AppState;
use sentinel_collector::Collector;
use sentinel_common::{EventBus, SentinelConfig};
use sentinel_github::{GithubClient, PlatformApi};
use sentinel_llm::LlmAdapter;
use sentinel_notify::NotificationEngine;
use sentinel_realtime::Hub;
use sentinel_reports::ReportOrchestrator;
use sentinel_scheduler::{JobOutcome, Scheduler};
use sentinel_storage::{SqliteStore, TaskCounters};

/// Sweep and sync pulls look this far back at most.
pub const COLLECTION_WINDOW: Duration = Duration::from_secs(24 * 3600);
/// Retention applied by the hourly cleanup.
const ACTIVITY_RETENTION_DAYS: i64 = 90;
const TASK_RETENTION_DAYS: i64 = 30;

pub struct Services {
    pub state: AppState,
    pub engine: Arc<NotificationEngine>,
    pub tz: Tz,
}

pub async fn build(config: SentinelConfig) -> anyhow::Result<Services> {
    let tz = sentinel_common::time::display_zone(&config.schedule.timezone);

    let store = SqliteStore::connect(&config.database.url)
        .await
        .context("database connection failed")?;
    store.init_schema().await.context("schema setup failed")?;

    let events = EventBus::new();
    let hub = Arc::new(Hub::new());
    let platform: Arc<dyn PlatformApi> =
        Arc::new(GithubClient::new(&config.github).context("platform client setup failed")?);
    let collector = Arc::new(Collector::new(
        platform.clone(),
        store.clone(),
        events.clone(),
    ));
    let llm = Arc::new(LlmAdapter::from_config(&config.ai));
    let scheduler = Scheduler::new(store.clone(), tz);
    let orchestrator = Arc::new(ReportOrchestrator::new(
        store.clone(),
        collector.clone(),
        llm.clone(),
        hub.clone(),
        events.clone(),
        tz,
    ));
    let engine = Arc::new(NotificationEngine::from_config(
        &config.notification,
        hub.clone(),
    ));

    Ok(Services {
        state: AppState {
            config: Arc::new(RwLock::new(config)),
            store,
            events,
            hub,
            platform,
            collector,
            scheduler,
            orchestrator,
            llm,
        },
        engine,
        tz,
    })
}

/// Register the standing jobs: the per-minute collection sweep, the daily
/// and weekly report runs, and the hourly retention cleanup.
pub async fn register_jobs(services: &Services) -> anyhow::Result<()> {
    let config = services.state.config.read().await.clone();
    if !config.schedule.enabled {
        tracing::info!("scheduler disabled by configuration");
        return Ok(());
    }
    let scheduler = &services.state.scheduler;

    let collector = services.state.collector.clone();
    scheduler.register_cron(
        "collection_sweep",
        "collection",
        sentinel_scheduler::SWEEP_EXPRESSION,
        Arc::new(move |cancel| {
            let collector = collector.clone();
            Box::pin(async move {
                let summary = collector.collect_sweep(COLLECTION_WINDOW, &cancel).await?;
                Ok(JobOutcome {
                    counters: TaskCounters {
                        success: summary.success_count as i64,
                        errors: summary.error_count as i64,
                        processed: summary.subscriptions as i64,
                    },
                    details: Some(serde_json::json!({"inserted": summary.inserted})),
                })
            })
        }),
    )?;

    scheduler.register_cron(
        "daily_report",
        "report",
        &sentinel_scheduler::daily_expression(&config.schedule.daily_time)?,
        report_job(services, sentinel_common::types::Cadence::Daily),
    )?;

    scheduler.register_cron(
        "weekly_report",
        "report",
        &sentinel_scheduler::weekly_expression(
            config.schedule.weekly_day,
            &config.schedule.weekly_time,
        )?,
        report_job(services, sentinel_common::types::Cadence::Weekly),
    )?;

    let store = services.state.store.clone();
    scheduler.register_cron(
        "hourly_cleanup",
        "cleanup",
        sentinel_scheduler::HOURLY_CLEANUP_EXPRESSION,
        Arc::new(move |_cancel| {
            let store = store.clone();
            Box::pin(async move {
                let now = chrono::Utc::now();
                let activities = store
                    .delete_activities_older_than(now - chrono::Duration::days(ACTIVITY_RETENTION_DAYS))
                    .await?;
                let tasks = store
                    .delete_task_executions_older_than(now - chrono::Duration::days(TASK_RETENTION_DAYS))
                    .await?;
                Ok(JobOutcome {
                    counters: TaskCounters {
                        success: 1,
                        errors: 0,
                        processed: (activities + tasks) as i64,
                    },
                    details: Some(serde_json::json!({
                        "activities_deleted": activities,
                        "task_executions_deleted": tasks,
                    })),
                })
            })
        }),
    )?;

    Ok(())
}

/// Scheduled report generation for every active subscription of a cadence.
/// One failing subscription only bumps the error counter.
fn report_job(
    services: &Services,
    cadence: sentinel_common::types::Cadence,
) -> sentinel_scheduler::JobFn {
    let store = services.state.store.clone();
    let orchestrator = services.state.orchestrator.clone();
    Arc::new(move |cancel| {
        let store = store.clone();
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            let subscriptions = store.list_active_subscriptions_by_cadence(cadence).await?;
            let mut counters = TaskCounters::default();
            for subscription in subscriptions {
                if cancel.is_cancelled() {
                    return Err(sentinel_common::SentinelError::Cancelled);
                }
                counters.processed += 1;
                let outcome = async {
                    let prepared = orchestrator
                        .prepare(sentinel_reports::GenerateRequest {
                            subscription_id: subscription.id,
                            kind: match cadence {
                                sentinel_common::types::Cadence::Daily => {
                                    sentinel_common::types::ReportKind::Daily
                                }
                                sentinel_common::types::Cadence::Weekly => {
                                    sentinel_common::types::ReportKind::Weekly
                                }
                                sentinel_common::types::Cadence::Monthly => {
                                    sentinel_common::types::ReportKind::Monthly
                                }
                            },
                            format: sentinel_common::types::ReportFormat::Html,
                        })
                        .await?;
                    orchestrator.run(prepared.report.id, cancel.clone()).await
                }
                .await;
                match outcome {
                    Ok(_) => counters.success += 1,
                    Err(sentinel_common::SentinelError::Cancelled) => {
                        return Err(sentinel_common::SentinelError::Cancelled)
                    }
                    Err(e) => {
                        tracing::warn!(subscription_id = subscription.id, error = %e, "scheduled report failed");
                        counters.errors += 1;
                    }
                }
            }
            Ok(JobOutcome {
                counters,
                details: None,
            })
        })
    })
}

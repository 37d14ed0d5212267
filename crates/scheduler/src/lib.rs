//! Time-triggered and ad-hoc job dispatch with at-most-one-in-flight
//! semantics per job key.
//!
//! Job bodies are opaque async closures supplied at wiring time; every run
//! is recorded as a task execution row. Cron expressions are evaluated in
//! the configured timezone, which gives the usual DST behavior: a local
//! time skipped by spring-forward does not fire, a repeated fall-back time
//! fires once.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use sentinel_common::types::TaskStatus;
use sentinel_common::{Result, SentinelError};
use sentinel_storage::{SqliteStore, TaskCounters};

pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// What a job reports back into its task execution row.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    pub counters: TaskCounters,
    pub details: Option<serde_json::Value>,
}

pub type JobFuture = BoxFuture<'static, Result<JobOutcome>>;

/// A job factory: called once per trigger with a child cancellation token
/// the job must observe at its I/O boundaries.
pub type JobFn = Arc<dyn Fn(CancellationToken) -> JobFuture + Send + Sync>;

struct Inner {
    store: SqliteStore,
    tz: Tz,
    /// job key → task execution id of the in-flight run
    running: Mutex<HashMap<String, i64>>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    grace: Duration,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(store: SqliteStore, tz: Tz) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                tz,
                running: Mutex::new(HashMap::new()),
                handles: std::sync::Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
                grace: DEFAULT_GRACE,
            }),
        }
    }

    pub fn with_grace(self, grace: Duration) -> Self {
        // Only callable before jobs are registered; Arc is still unique.
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.grace = grace;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => Self { inner },
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Register a repeating job on a cron expression (seconds-resolution,
    /// six fields), evaluated in the scheduler timezone.
    #[instrument(skip(self, job))]
    pub fn register_cron(&self, key: &str, kind: &str, expression: &str, job: JobFn) -> Result<()> {
        let schedule = Schedule::from_str(expression).map_err(|e| {
            SentinelError::Config(format!("bad cron expression {expression:?} for {key}: {e}"))
        })?;
        let scheduler = self.clone();
        let key = key.to_string();
        let kind = kind.to_string();

        let handle = tokio::spawn(async move {
            loop {
                let next = match schedule.upcoming(scheduler.inner.tz).next() {
                    Some(next) => next,
                    None => {
                        warn!(key, "cron schedule has no future firings");
                        return;
                    }
                };
                // The floor keeps a just-fired second from matching twice.
                let wait = (next.with_timezone(&Utc) - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .max(Duration::from_millis(500));
                tokio::select! {
                    _ = scheduler.inner.cancel.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
                // Runs are spawned so the trigger loop keeps ticking; an
                // overlapping trigger is dropped by the claim guard.
                let runner = scheduler.clone();
                let run_key = key.clone();
                let run_kind = kind.clone();
                let run_job = job.clone();
                let run_handle = tokio::spawn(async move {
                    runner.run_guarded(&run_key, &run_kind, run_job).await;
                });
                scheduler.push_handle(run_handle);
            }
        });
        self.push_handle(handle);
        info!(expression, "cron job registered");
        Ok(())
    }

    /// User-initiated one-shot. Rejects the latecomer when the key is
    /// already in flight; returns the task execution id otherwise.
    #[instrument(skip(self, job))]
    pub async fn submit_one_shot(&self, key: &str, kind: &str, job: JobFn) -> Result<i64> {
        let execution_id = self.claim(key, kind).await?;
        let scheduler = self.clone();
        let key = key.to_string();
        let handle = tokio::spawn(async move {
            scheduler.drive(&key, execution_id, job).await;
        });
        self.push_handle(handle);
        Ok(execution_id)
    }

    /// Cooperative teardown: cancel in-flight runs, wait out the grace
    /// window, then mark whatever is still running as cancelled.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.handles.lock().expect("handles mutex poisoned");
            guard.drain(..).collect()
        };
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.inner.grace, drain).await.is_err() {
            warn!("grace window elapsed with jobs still running");
        }

        let leftovers: Vec<(String, i64)> = {
            let mut running = self.inner.running.lock().await;
            running.drain().collect()
        };
        for (key, execution_id) in leftovers {
            warn!(key, execution_id, "marking unfinished run cancelled");
            let _ = self
                .inner
                .store
                .finish_task_execution(
                    execution_id,
                    TaskStatus::Cancelled,
                    TaskCounters::default(),
                    Some("shutdown"),
                    None,
                )
                .await;
        }
        info!("scheduler stopped");
    }

    pub async fn running_keys(&self) -> Vec<String> {
        self.inner.running.lock().await.keys().cloned().collect()
    }

    fn push_handle(&self, handle: JoinHandle<()>) {
        self.inner
            .handles
            .lock()
            .expect("handles mutex poisoned")
            .push(handle);
    }

    /// Trigger path shared by cron loops: overlapping triggers are dropped
    /// and logged, never queued.
    async fn run_guarded(&self, key: &str, kind: &str, job: JobFn) {
        match self.claim(key, kind).await {
            Ok(execution_id) => self.drive(key, execution_id, job).await,
            Err(SentinelError::Conflict(_)) => {
                warn!(key, "previous run still in flight, dropping trigger");
            }
            Err(e) => error!(key, error = %e, "failed to start job"),
        }
    }

    async fn claim(&self, key: &str, kind: &str) -> Result<i64> {
        let mut running = self.inner.running.lock().await;
        if running.contains_key(key) {
            return Err(SentinelError::Conflict(format!("job {key} already running")));
        }
        let execution = self.inner.store.start_task_execution(key, kind).await?;
        running.insert(key.to_string(), execution.id);
        Ok(execution.id)
    }

    async fn drive(&self, key: &str, execution_id: i64, job: JobFn) {
        let child = self.inner.cancel.child_token();
        let outcome = job(child).await;

        let (status, counters, error, details) = match outcome {
            Ok(outcome) => (TaskStatus::Completed, outcome.counters, None, outcome.details),
            Err(SentinelError::Cancelled) => {
                (TaskStatus::Cancelled, TaskCounters::default(), Some("cancelled".to_string()), None)
            }
            Err(e) => (
                TaskStatus::Failed,
                TaskCounters::default(),
                Some(e.to_string()),
                None,
            ),
        };

        if let Err(e) = self
            .inner
            .store
            .finish_task_execution(execution_id, status, counters, error.as_deref(), details)
            .await
        {
            error!(key, execution_id, error = %e, "failed to record job outcome");
        }
        self.inner.running.lock().await.remove(key);

        match status {
            TaskStatus::Completed => info!(key, execution_id, "job finished"),
            TaskStatus::Cancelled => warn!(key, execution_id, "job cancelled"),
            _ => warn!(key, execution_id, error = ?error, "job failed"),
        }
    }
}

/// "HH:MM" in local schedule time.
pub fn parse_hhmm(raw: &str) -> Result<(u32, u32)> {
    let (h, m) = raw
        .split_once(':')
        .ok_or_else(|| SentinelError::Config(format!("bad time of day: {raw:?}")))?;
    let hour: u32 = h
        .parse()
        .map_err(|_| SentinelError::Config(format!("bad hour in {raw:?}")))?;
    let minute: u32 = m
        .parse()
        .map_err(|_| SentinelError::Config(format!("bad minute in {raw:?}")))?;
    if hour > 23 || minute > 59 {
        return Err(SentinelError::Config(format!("time out of range: {raw:?}")));
    }
    Ok((hour, minute))
}

/// Cron expression for a daily firing at HH:MM.
pub fn daily_expression(time_of_day: &str) -> Result<String> {
    let (hour, minute) = parse_hhmm(time_of_day)?;
    Ok(format!("0 {minute} {hour} * * *"))
}

/// Cron expression for a weekly firing; `weekday` is ISO 1=Mon..7=Sun.
pub fn weekly_expression(weekday: u8, time_of_day: &str) -> Result<String> {
    let (hour, minute) = parse_hhmm(time_of_day)?;
    let day = match weekday {
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        6 => "Sat",
        7 => "Sun",
        other => {
            return Err(SentinelError::Config(format!(
                "weekday must be 1-7, got {other}"
            )))
        }
    };
    Ok(format!("0 {minute} {hour} * * {day}"))
}

pub const SWEEP_EXPRESSION: &str = "0 * * * * *";
pub const HOURLY_CLEANUP_EXPRESSION: &str = "0 0 * * * *";

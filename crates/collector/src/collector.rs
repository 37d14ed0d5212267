//! Per-subscription pull cycle and the concurrent sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use sentinel_common::types::{Activity, ActivityKind, Subscription, SubscriptionStatus};
use sentinel_common::{EventBus, Result, SentinelError, SentinelEvent};
use sentinel_github::PlatformApi;
use sentinel_storage::SqliteStore;

use crate::normalize;

pub const DEFAULT_FANOUT: usize = 8;
const RELEASE_FETCH_LIMIT: u32 = 10;

#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    pub subscription_id: i64,
    pub repo_ref: String,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub new_activities: Vec<Activity>,
}

#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub subscriptions: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub inserted: usize,
}

pub struct Collector {
    platform: Arc<dyn PlatformApi>,
    store: SqliteStore,
    events: EventBus,
    fanout: usize,
}

impl Collector {
    pub fn new(platform: Arc<dyn PlatformApi>, store: SqliteStore, events: EventBus) -> Self {
        Self {
            platform,
            store,
            events,
            fanout: DEFAULT_FANOUT,
        }
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout.max(1);
        self
    }

    /// One pull cycle for one subscription: fetch windowed deltas per
    /// watched kind, filter, upsert, advance the watermark, and emit a
    /// `NewActivity` event per inserted row.
    #[instrument(skip(self, cancel), fields(subscription_id = subscription_id))]
    pub async fn collect_for_subscription(
        &self,
        subscription_id: i64,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<CollectionResult> {
        let subscription = self.store.get_subscription(subscription_id).await?;
        if subscription.status != SubscriptionStatus::Active {
            return Ok(CollectionResult {
                subscription_id,
                repo_ref: subscription.repo_ref,
                ..Default::default()
            });
        }

        let now = Utc::now();
        let window = chrono::Duration::from_std(window)
            .map_err(|e| SentinelError::InvalidInput(e.to_string()))?;
        let since = match subscription.last_sync_at {
            Some(watermark) => watermark.max(now - window),
            None => now - window,
        };

        let mut result = CollectionResult {
            subscription_id,
            repo_ref: subscription.repo_ref.clone(),
            ..Default::default()
        };
        let mut max_observed: Option<DateTime<Utc>> = None;
        let states = vec!["all".to_string()];

        for kind in subscription.watches.kinds() {
            if cancel.is_cancelled() {
                return Err(SentinelError::Cancelled);
            }
            let drafts = match kind {
                ActivityKind::Commit => self
                    .platform
                    .list_commits(&subscription.repo_ref, since)
                    .await?
                    .iter()
                    .map(|item| normalize::commit_draft(subscription.id, item))
                    .collect::<Vec<_>>(),
                ActivityKind::Issue => self
                    .platform
                    .list_issues(&subscription.repo_ref, since, &states)
                    .await?
                    .iter()
                    .map(|item| normalize::issue_draft(subscription.id, item))
                    .collect(),
                ActivityKind::PullRequest => self
                    .platform
                    .list_pulls(&subscription.repo_ref, since, &states)
                    .await?
                    .iter()
                    .map(|item| normalize::pull_draft(subscription.id, item))
                    .collect(),
                ActivityKind::Release => self
                    .platform
                    .list_releases(&subscription.repo_ref, RELEASE_FETCH_LIMIT)
                    .await?
                    .iter()
                    .map(|item| normalize::release_draft(subscription.id, item))
                    .collect(),
            };

            result.fetched += drafts.len();
            for draft in drafts {
                if !normalize::passes_filters(&draft, &subscription.filters) {
                    continue;
                }
                if let Some(updated) = draft.source_updated_at {
                    max_observed = Some(max_observed.map_or(updated, |m| m.max(updated)));
                }
                let outcome = self.store.upsert_activity(draft).await?;
                if outcome.inserted {
                    result.inserted += 1;
                    result.new_activities.push(outcome.activity);
                } else {
                    result.updated += 1;
                }
            }
        }

        let watermark = max_observed.unwrap_or(now);
        self.store
            .advance_last_sync(subscription.id, watermark)
            .await?;

        for activity in &result.new_activities {
            self.events.emit(SentinelEvent::NewActivity {
                activity: activity.clone(),
                subscription: subscription.clone(),
            });
        }

        info!(
            repo = %result.repo_ref,
            fetched = result.fetched,
            inserted = result.inserted,
            updated = result.updated,
            "collection cycle finished"
        );
        Ok(result)
    }

    /// Sweep every active subscription concurrently. A failing subscription
    /// only increments the error counter; the sweep always runs to the end.
    #[instrument(skip(self, cancel))]
    pub async fn collect_sweep(
        &self,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<SweepSummary> {
        let subscriptions = self.store.list_active_subscriptions().await?;
        self.sweep_subscriptions(&subscriptions, window, cancel).await
    }

    pub async fn sweep_subscriptions(
        &self,
        subscriptions: &[Subscription],
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<SweepSummary> {
        let mut summary = SweepSummary {
            subscriptions: subscriptions.len(),
            ..Default::default()
        };

        let mut outcomes = stream::iter(subscriptions.to_vec().into_iter().map(|sub| {
            let cancel = cancel.clone();
            async move {
                let outcome = self
                    .collect_for_subscription(sub.id, window, &cancel)
                    .await;
                (sub.id, sub.repo_ref.clone(), outcome)
            }
        }))
        .buffer_unordered(self.fanout);

        while let Some((id, repo, outcome)) = outcomes.next().await {
            match outcome {
                Ok(result) => {
                    summary.success_count += 1;
                    summary.inserted += result.inserted;
                }
                Err(SentinelError::Cancelled) => {
                    summary.error_count += 1;
                    warn!(subscription_id = id, "collection cancelled mid-sweep");
                }
                Err(e) => {
                    summary.error_count += 1;
                    warn!(subscription_id = id, repo = %repo, error = %e, "subscription collection failed");
                }
            }
        }
        Ok(summary)
    }
}

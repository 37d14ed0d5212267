//! Subscription accessors, including the monotonic watermark advance.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use sentinel_common::types::{
    validate_repo_ref, Cadence, DeliveryConfig, Subscription, SubscriptionFilters,
    SubscriptionStatus, WatchSet,
};
use sentinel_common::{Result, SentinelError};

use crate::store::{
    db_err, from_json, is_unique_violation, parse_ts_opt, to_json, ts, ts_opt, SqliteStore,
};

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub owner_user_id: i64,
    pub repo_ref: String,
    pub cadence: Cadence,
    pub watches: WatchSet,
    pub filters: SubscriptionFilters,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    pub status: Option<SubscriptionStatus>,
    pub cadence: Option<Cadence>,
    pub watches: Option<WatchSet>,
    pub filters: Option<SubscriptionFilters>,
    pub delivery: Option<DeliveryConfig>,
    pub repo_description: Option<String>,
    pub repo_url: Option<String>,
    pub repo_language: Option<String>,
    pub repo_stars: Option<i64>,
    pub repo_forks: Option<i64>,
}

fn map_subscription(row: SqliteRow) -> Result<Subscription> {
    let created_at = row.try_get::<String, _>("created_at").map_err(db_err)?;
    Ok(Subscription {
        id: row.try_get("id").map_err(db_err)?,
        owner_user_id: row.try_get("owner_user_id").map_err(db_err)?,
        repo_ref: row.try_get("repo_ref").map_err(db_err)?,
        repo_description: row.try_get("repo_description").map_err(db_err)?,
        repo_url: row.try_get("repo_url").map_err(db_err)?,
        repo_language: row.try_get("repo_language").map_err(db_err)?,
        repo_stars: row.try_get("repo_stars").map_err(db_err)?,
        repo_forks: row.try_get("repo_forks").map_err(db_err)?,
        status: SubscriptionStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        cadence: Cadence::parse(&row.try_get::<String, _>("cadence").map_err(db_err)?)?,
        watches: from_json(&row.try_get::<String, _>("watches").map_err(db_err)?),
        filters: from_json(&row.try_get::<String, _>("filters").map_err(db_err)?),
        delivery: from_json(&row.try_get::<String, _>("delivery").map_err(db_err)?),
        last_sync_at: parse_ts_opt(row.try_get("last_sync_at").map_err(db_err)?)?,
        created_at: crate::store::parse_ts(&created_at)?,
    })
}

impl SqliteStore {
    pub async fn create_subscription(&self, sub: NewSubscription) -> Result<Subscription> {
        validate_repo_ref(&sub.repo_ref)?;
        // Owner must be a live user.
        self.get_user(sub.owner_user_id).await?;

        let result = sqlx::query(
            "INSERT INTO subscriptions
                (owner_user_id, repo_ref, cadence, watches, filters, delivery, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(sub.owner_user_id)
        .bind(&sub.repo_ref)
        .bind(sub.cadence.as_str())
        .bind(to_json(&sub.watches)?)
        .bind(to_json(&sub.filters)?)
        .bind(to_json(&sub.delivery)?)
        .bind(ts(Utc::now()))
        .execute(self.pool())
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(SentinelError::Conflict(format!(
                    "subscription for {} already exists",
                    sub.repo_ref
                )))
            }
            Err(e) => return Err(db_err(e)),
        };
        self.get_subscription(id).await
    }

    pub async fn get_subscription(&self, id: i64) -> Result<Subscription> {
        sqlx::query("SELECT * FROM subscriptions WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?
            .ok_or_else(|| SentinelError::NotFound(format!("subscription {id}")))
            .and_then(map_subscription)
    }

    pub async fn list_subscriptions(&self, owner_user_id: Option<i64>) -> Result<Vec<Subscription>> {
        let rows = match owner_user_id {
            Some(owner) => {
                sqlx::query("SELECT * FROM subscriptions WHERE owner_user_id = ?1 ORDER BY id")
                    .bind(owner)
                    .fetch_all(self.pool())
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM subscriptions ORDER BY id")
                    .fetch_all(self.pool())
                    .await
            }
        }
        .map_err(db_err)?;
        rows.into_iter().map(map_subscription).collect()
    }

    pub async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>> {
        sqlx::query("SELECT * FROM subscriptions WHERE status = 'active' ORDER BY id")
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(map_subscription)
            .collect()
    }

    pub async fn list_active_subscriptions_by_cadence(
        &self,
        cadence: Cadence,
    ) -> Result<Vec<Subscription>> {
        sqlx::query("SELECT * FROM subscriptions WHERE status = 'active' AND cadence = ?1 ORDER BY id")
            .bind(cadence.as_str())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(map_subscription)
            .collect()
    }

    pub async fn count_active_subscriptions(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM subscriptions WHERE status = 'active'")
            .fetch_one(self.pool())
            .await
            .map_err(db_err)?;
        row.try_get("n").map_err(db_err)
    }

    pub async fn update_subscription(
        &self,
        id: i64,
        patch: SubscriptionPatch,
    ) -> Result<Subscription> {
        let current = self.get_subscription(id).await?;

        sqlx::query(
            "UPDATE subscriptions SET
                status = ?2, cadence = ?3, watches = ?4, filters = ?5, delivery = ?6,
                repo_description = ?7, repo_url = ?8, repo_language = ?9,
                repo_stars = ?10, repo_forks = ?11
             WHERE id = ?1",
        )
        .bind(id)
        .bind(patch.status.unwrap_or(current.status).as_str())
        .bind(patch.cadence.unwrap_or(current.cadence).as_str())
        .bind(to_json(&patch.watches.unwrap_or(current.watches))?)
        .bind(to_json(&patch.filters.unwrap_or(current.filters))?)
        .bind(to_json(&patch.delivery.unwrap_or(current.delivery))?)
        .bind(patch.repo_description.or(current.repo_description))
        .bind(patch.repo_url.or(current.repo_url))
        .bind(patch.repo_language.or(current.repo_language))
        .bind(patch.repo_stars.unwrap_or(current.repo_stars))
        .bind(patch.repo_forks.unwrap_or(current.repo_forks))
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        self.get_subscription(id).await
    }

    pub async fn delete_subscription(&self, id: i64) -> Result<()> {
        let done = sqlx::query("DELETE FROM subscriptions WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(SentinelError::NotFound(format!("subscription {id}")));
        }
        Ok(())
    }

    /// Monotonic watermark: `last_sync_at := max(last_sync_at, watermark)`.
    /// A concurrent advance cannot move it backwards; the comparison happens
    /// inside one transaction.
    pub async fn advance_last_sync(
        &self,
        id: i64,
        watermark: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let current: Option<String> =
            sqlx::query("SELECT last_sync_at FROM subscriptions WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?
                .ok_or_else(|| SentinelError::NotFound(format!("subscription {id}")))?
                .try_get("last_sync_at")
                .map_err(db_err)?;

        let current = parse_ts_opt(current)?;
        let next = match current {
            Some(existing) => existing.max(watermark),
            None => watermark,
        };

        sqlx::query("UPDATE subscriptions SET last_sync_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(ts_opt(Some(next)))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(next)
    }
}

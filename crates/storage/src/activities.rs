//! Activity accessors. The upsert is the ingestion pipeline's idempotency
//! point: one row per (subscription, kind, external id), mutable fields
//! refreshed on re-ingest.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;

use sentinel_common::types::{Activity, ActivityAuthor, ActivityDraft, ActivityKind};
use sentinel_common::{Result, SentinelError};

use crate::store::{db_err, from_json, parse_ts, parse_ts_opt, to_json, ts, ts_opt, SqliteStore};

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub inserted: bool,
    pub activity: Activity,
}

fn map_activity(row: SqliteRow) -> Result<Activity> {
    Ok(Activity {
        id: row.try_get("id").map_err(db_err)?,
        subscription_id: row.try_get("subscription_id").map_err(db_err)?,
        kind: ActivityKind::parse(&row.try_get::<String, _>("kind").map_err(db_err)?)?,
        external_id: row.try_get("external_id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        body: row.try_get("body").map_err(db_err)?,
        url: row.try_get("url").map_err(db_err)?,
        author: ActivityAuthor {
            login: row.try_get("author_login").map_err(db_err)?,
            display_name: row.try_get("author_name").map_err(db_err)?,
            avatar_url: row.try_get("author_avatar_url").map_err(db_err)?,
        },
        labels: from_json(&row.try_get::<String, _>("labels").map_err(db_err)?),
        assignees: from_json(&row.try_get::<String, _>("assignees").map_err(db_err)?),
        state: row.try_get("state").map_err(db_err)?,
        extras: serde_json::from_str(&row.try_get::<String, _>("extras").map_err(db_err)?)
            .unwrap_or(serde_json::Value::Null),
        source_created_at: parse_ts_opt(row.try_get("source_created_at").map_err(db_err)?)?,
        source_updated_at: parse_ts_opt(row.try_get("source_updated_at").map_err(db_err)?)?,
        ingested_at: parse_ts(&row.try_get::<String, _>("ingested_at").map_err(db_err)?)?,
    })
}

impl SqliteStore {
    /// Insert-or-update keyed on (subscription_id, kind, external_id).
    /// Concurrent upserts of the same key serialize on the unique index:
    /// the loser's INSERT is ignored and it takes the UPDATE path.
    pub async fn upsert_activity(&self, draft: ActivityDraft) -> Result<UpsertOutcome> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let done = sqlx::query(
            "INSERT INTO activities
                (subscription_id, kind, external_id, title, body, url,
                 author_login, author_name, author_avatar_url,
                 labels, assignees, state, extras,
                 source_created_at, source_updated_at, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(subscription_id, kind, external_id) DO NOTHING",
        )
        .bind(draft.subscription_id)
        .bind(draft.kind.as_str())
        .bind(&draft.external_id)
        .bind(&draft.title)
        .bind(&draft.body)
        .bind(&draft.url)
        .bind(&draft.author.login)
        .bind(&draft.author.display_name)
        .bind(&draft.author.avatar_url)
        .bind(to_json(&draft.labels)?)
        .bind(to_json(&draft.assignees)?)
        .bind(&draft.state)
        .bind(draft.extras.to_string())
        .bind(ts_opt(draft.source_created_at))
        .bind(ts_opt(draft.source_updated_at))
        .bind(ts(Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let inserted = done.rows_affected() == 1;
        if !inserted {
            sqlx::query(
                "UPDATE activities SET
                    title = ?4, body = ?5, state = ?6, labels = ?7, assignees = ?8,
                    extras = ?9, source_updated_at = ?10
                 WHERE subscription_id = ?1 AND kind = ?2 AND external_id = ?3",
            )
            .bind(draft.subscription_id)
            .bind(draft.kind.as_str())
            .bind(&draft.external_id)
            .bind(&draft.title)
            .bind(&draft.body)
            .bind(&draft.state)
            .bind(to_json(&draft.labels)?)
            .bind(to_json(&draft.assignees)?)
            .bind(draft.extras.to_string())
            .bind(ts_opt(draft.source_updated_at))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        let row = sqlx::query(
            "SELECT * FROM activities
             WHERE subscription_id = ?1 AND kind = ?2 AND external_id = ?3",
        )
        .bind(draft.subscription_id)
        .bind(draft.kind.as_str())
        .bind(&draft.external_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(UpsertOutcome {
            inserted,
            activity: map_activity(row)?,
        })
    }

    pub async fn get_activity(&self, id: i64) -> Result<Activity> {
        sqlx::query("SELECT * FROM activities WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?
            .ok_or_else(|| SentinelError::NotFound(format!("activity {id}")))
            .and_then(map_activity)
    }

    pub async fn list_activities(
        &self,
        subscription_id: i64,
        kind: Option<ActivityKind>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Activity>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    "SELECT * FROM activities
                     WHERE subscription_id = ?1 AND kind = ?2
                     ORDER BY source_created_at DESC LIMIT ?3 OFFSET ?4",
                )
                .bind(subscription_id)
                .bind(kind.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM activities
                     WHERE subscription_id = ?1
                     ORDER BY source_created_at DESC LIMIT ?2 OFFSET ?3",
                )
                .bind(subscription_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(db_err)?;
        rows.into_iter().map(map_activity).collect()
    }

    /// Activities inside a window across a set of subscriptions, oldest
    /// first — the shape the report pipeline consumes.
    pub async fn list_activities_in_window(
        &self,
        subscription_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        let mut all = Vec::new();
        for &sub_id in subscription_ids {
            let rows = sqlx::query(
                "SELECT * FROM activities
                 WHERE subscription_id = ?1
                   AND source_created_at IS NOT NULL
                   AND source_created_at >= ?2 AND source_created_at < ?3
                 ORDER BY source_created_at ASC",
            )
            .bind(sub_id)
            .bind(ts(start))
            .bind(ts(end))
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
            for row in rows {
                all.push(map_activity(row)?);
            }
        }
        all.sort_by_key(|a| a.source_created_at);
        Ok(all)
    }

    pub async fn count_activities(&self, subscription_id: Option<i64>) -> Result<i64> {
        let row = match subscription_id {
            Some(id) => {
                sqlx::query("SELECT COUNT(*) AS n FROM activities WHERE subscription_id = ?1")
                    .bind(id)
                    .fetch_one(self.pool())
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS n FROM activities")
                    .fetch_one(self.pool())
                    .await
            }
        }
        .map_err(db_err)?;
        row.try_get("n").map_err(db_err)
    }

    /// Per-kind counts for a subscription set inside a window.
    pub async fn activity_kind_counts(
        &self,
        subscription_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<ActivityKind, i64>> {
        let mut counts: HashMap<ActivityKind, i64> = HashMap::new();
        for &sub_id in subscription_ids {
            let rows = sqlx::query(
                "SELECT kind, COUNT(*) AS n FROM activities
                 WHERE subscription_id = ?1
                   AND source_created_at IS NOT NULL
                   AND source_created_at >= ?2 AND source_created_at < ?3
                 GROUP BY kind",
            )
            .bind(sub_id)
            .bind(ts(start))
            .bind(ts(end))
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
            for row in rows {
                let kind = ActivityKind::parse(&row.try_get::<String, _>("kind").map_err(db_err)?)?;
                let n: i64 = row.try_get("n").map_err(db_err)?;
                *counts.entry(kind).or_default() += n;
            }
        }
        Ok(counts)
    }

    /// Retention sweep used by the hourly cleanup job.
    pub async fn delete_activities_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query(
            "DELETE FROM activities WHERE source_created_at IS NOT NULL AND source_created_at < ?1",
        )
        .bind(ts(cutoff))
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected())
    }
}

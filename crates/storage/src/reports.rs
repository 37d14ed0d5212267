//! Report accessors. Terminal rows (`completed`/`failed`) are immutable:
//! every mutation is guarded by a status predicate in SQL, so a racing
//! writer cannot resurrect a finished report.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use sentinel_common::types::{Report, ReportFormat, ReportKind, ReportStats, ReportStatus};
use sentinel_common::{Result, SentinelError};

use crate::store::{db_err, from_json, parse_ts, parse_ts_opt, to_json, ts, SqliteStore};

#[derive(Debug, Clone)]
pub struct NewReport {
    pub owner_user_id: i64,
    pub subscription_ids: Vec<i64>,
    pub title: String,
    pub kind: ReportKind,
    pub format: ReportFormat,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

fn map_report(row: SqliteRow) -> Result<Report> {
    Ok(Report {
        id: row.try_get("id").map_err(db_err)?,
        owner_user_id: row.try_get("owner_user_id").map_err(db_err)?,
        subscription_ids: from_json(&row.try_get::<String, _>("subscription_ids").map_err(db_err)?),
        title: row.try_get("title").map_err(db_err)?,
        kind: ReportKind::parse(&row.try_get::<String, _>("kind").map_err(db_err)?)?,
        status: ReportStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        format: ReportFormat::parse(&row.try_get::<String, _>("format").map_err(db_err)?)?,
        period_start: parse_ts(&row.try_get::<String, _>("period_start").map_err(db_err)?)?,
        period_end: parse_ts(&row.try_get::<String, _>("period_end").map_err(db_err)?)?,
        summary: row.try_get("summary").map_err(db_err)?,
        body: row.try_get("body").map_err(db_err)?,
        ai_analysis: row.try_get("ai_analysis").map_err(db_err)?,
        stats: ReportStats {
            repos: row.try_get("stat_repos").map_err(db_err)?,
            activities: row.try_get("stat_activities").map_err(db_err)?,
            commits: row.try_get("stat_commits").map_err(db_err)?,
            issues: row.try_get("stat_issues").map_err(db_err)?,
            pull_requests: row.try_get("stat_pull_requests").map_err(db_err)?,
            releases: row.try_get("stat_releases").map_err(db_err)?,
        },
        error: row.try_get("error").map_err(db_err)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at").map_err(db_err)?)?,
        generated_at: parse_ts_opt(row.try_get("generated_at").map_err(db_err)?)?,
    })
}

impl SqliteStore {
    pub async fn create_report(&self, report: NewReport) -> Result<Report> {
        let now = ts(Utc::now());
        let done = sqlx::query(
            "INSERT INTO reports
                (owner_user_id, subscription_ids, title, kind, status, format,
                 period_start, period_end, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?8)",
        )
        .bind(report.owner_user_id)
        .bind(to_json(&report.subscription_ids)?)
        .bind(&report.title)
        .bind(report.kind.as_str())
        .bind(report.format.as_str())
        .bind(ts(report.period_start))
        .bind(ts(report.period_end))
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        self.get_report(done.last_insert_rowid()).await
    }

    pub async fn get_report(&self, id: i64) -> Result<Report> {
        sqlx::query("SELECT * FROM reports WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?
            .ok_or_else(|| SentinelError::NotFound(format!("report {id}")))
            .and_then(map_report)
    }

    pub async fn list_reports(
        &self,
        owner_user_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Report>> {
        let rows = match owner_user_id {
            Some(owner) => {
                sqlx::query(
                    "SELECT * FROM reports WHERE owner_user_id = ?1
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )
                .bind(owner)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query("SELECT * FROM reports ORDER BY created_at DESC LIMIT ?1 OFFSET ?2")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(self.pool())
                    .await
            }
        }
        .map_err(db_err)?;
        rows.into_iter().map(map_report).collect()
    }

    pub async fn count_reports(&self, owner_user_id: Option<i64>) -> Result<i64> {
        let row = match owner_user_id {
            Some(owner) => {
                sqlx::query("SELECT COUNT(*) AS n FROM reports WHERE owner_user_id = ?1")
                    .bind(owner)
                    .fetch_one(self.pool())
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS n FROM reports")
                    .fetch_one(self.pool())
                    .await
            }
        }
        .map_err(db_err)?;
        row.try_get("n").map_err(db_err)
    }

    /// pending → generating. Fails on terminal or already-generating rows.
    pub async fn mark_report_generating(&self, id: i64) -> Result<Report> {
        self.guarded_report_update(
            id,
            sqlx::query(
                "UPDATE reports SET status = 'generating', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
            )
            .bind(id)
            .bind(ts(Utc::now())),
        )
        .await
    }

    pub async fn complete_report(
        &self,
        id: i64,
        summary: &str,
        body: &str,
        ai_analysis: &str,
        stats: ReportStats,
    ) -> Result<Report> {
        let now = ts(Utc::now());
        self.guarded_report_update(
            id,
            sqlx::query(
                "UPDATE reports SET
                    status = 'completed', summary = ?2, body = ?3, ai_analysis = ?4,
                    stat_repos = ?5, stat_activities = ?6, stat_commits = ?7,
                    stat_issues = ?8, stat_pull_requests = ?9, stat_releases = ?10,
                    generated_at = ?11, updated_at = ?11
                 WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
            )
            .bind(id)
            .bind(summary)
            .bind(body)
            .bind(ai_analysis)
            .bind(stats.repos)
            .bind(stats.activities)
            .bind(stats.commits)
            .bind(stats.issues)
            .bind(stats.pull_requests)
            .bind(stats.releases)
            .bind(&now),
        )
        .await
    }

    pub async fn fail_report(&self, id: i64, error: &str) -> Result<Report> {
        self.guarded_report_update(
            id,
            sqlx::query(
                "UPDATE reports SET status = 'failed', error = ?2, updated_at = ?3
                 WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
            )
            .bind(id)
            .bind(error)
            .bind(ts(Utc::now())),
        )
        .await
    }

    pub async fn delete_report(&self, id: i64) -> Result<()> {
        let done = sqlx::query("DELETE FROM reports WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(SentinelError::NotFound(format!("report {id}")));
        }
        Ok(())
    }

    async fn guarded_report_update<'q>(
        &self,
        id: i64,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> Result<Report> {
        let done = query.execute(self.pool()).await.map_err(db_err)?;
        if done.rows_affected() == 0 {
            // Distinguish "absent" from "terminal, refused"
            let existing = self.get_report(id).await?;
            return Err(SentinelError::Conflict(format!(
                "report {id} is {} and cannot change",
                existing.status.as_str()
            )));
        }
        self.get_report(id).await
    }
}

//! Task execution bookkeeping for scheduler runs.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use sentinel_common::types::{TaskExecution, TaskStatus};
use sentinel_common::{Result, SentinelError};

use crate::store::{db_err, parse_ts, parse_ts_opt, SqliteStore};

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskCounters {
    pub success: i64,
    pub errors: i64,
    pub processed: i64,
}

fn map_task(row: SqliteRow) -> Result<TaskExecution> {
    let details: Option<String> = row.try_get("details").map_err(db_err)?;
    Ok(TaskExecution {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        kind: row.try_get("kind").map_err(db_err)?,
        status: TaskStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        started_at: parse_ts(&row.try_get::<String, _>("started_at").map_err(db_err)?)?,
        finished_at: parse_ts_opt(row.try_get("finished_at").map_err(db_err)?)?,
        duration_secs: row.try_get("duration_secs").map_err(db_err)?,
        success_count: row.try_get("success_count").map_err(db_err)?,
        error_count: row.try_get("error_count").map_err(db_err)?,
        processed_count: row.try_get("processed_count").map_err(db_err)?,
        error: row.try_get("error").map_err(db_err)?,
        details: details.and_then(|raw| serde_json::from_str(&raw).ok()),
    })
}

impl SqliteStore {
    pub async fn start_task_execution(&self, name: &str, kind: &str) -> Result<TaskExecution> {
        let done = sqlx::query(
            "INSERT INTO task_executions (name, kind, status, started_at)
             VALUES (?1, ?2, 'running', ?3)",
        )
        .bind(name)
        .bind(kind)
        .bind(crate::store::ts(Utc::now()))
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        self.get_task_execution(done.last_insert_rowid()).await
    }

    pub async fn get_task_execution(&self, id: i64) -> Result<TaskExecution> {
        sqlx::query("SELECT * FROM task_executions WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?
            .ok_or_else(|| SentinelError::NotFound(format!("task execution {id}")))
            .and_then(map_task)
    }

    pub async fn finish_task_execution(
        &self,
        id: i64,
        status: TaskStatus,
        counters: TaskCounters,
        error: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<TaskExecution> {
        let task = self.get_task_execution(id).await?;
        let now = Utc::now();
        let duration = (now - task.started_at).num_seconds().max(0);

        sqlx::query(
            "UPDATE task_executions SET
                status = ?2, finished_at = ?3, duration_secs = ?4,
                success_count = ?5, error_count = ?6, processed_count = ?7,
                error = ?8, details = ?9
             WHERE id = ?1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(crate::store::ts(now))
        .bind(duration)
        .bind(counters.success)
        .bind(counters.errors)
        .bind(counters.processed)
        .bind(error)
        .bind(details.map(|d| d.to_string()))
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        self.get_task_execution(id).await
    }

    pub async fn list_task_executions(&self, limit: i64) -> Result<Vec<TaskExecution>> {
        sqlx::query("SELECT * FROM task_executions ORDER BY started_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(map_task)
            .collect()
    }

    /// Count of `running` rows for a task name. Property: at most one.
    pub async fn count_running_tasks(&self, name: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM task_executions WHERE name = ?1 AND status = 'running'",
        )
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        row.try_get("n").map_err(db_err)
    }

    /// Retention sweep for finished runs, used by the hourly cleanup job.
    pub async fn delete_task_executions_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query(
            "DELETE FROM task_executions WHERE status != 'running' AND started_at < ?1",
        )
        .bind(crate::store::ts(cutoff))
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(done.rows_affected())
    }
}

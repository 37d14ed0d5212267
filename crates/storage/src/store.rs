//! SQLite-backed store shared by every pipeline component.
//!
//! All timestamps are persisted as fixed-width UTC strings so that SQL
//! comparisons and ordering agree with chronological order.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use sentinel_common::{Result, SentinelError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    handle TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    display_name TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    api_token TEXT UNIQUE,
    preferences TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    repo_ref TEXT NOT NULL,
    repo_description TEXT,
    repo_url TEXT,
    repo_language TEXT,
    repo_stars INTEGER NOT NULL DEFAULT 0,
    repo_forks INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    cadence TEXT NOT NULL DEFAULT 'daily',
    watches TEXT NOT NULL DEFAULT '{}',
    filters TEXT NOT NULL DEFAULT '{}',
    delivery TEXT NOT NULL DEFAULT '{}',
    last_sync_at TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(owner_user_id, repo_ref)
);
CREATE INDEX IF NOT EXISTS idx_subscription_owner_status
    ON subscriptions(owner_user_id, status);

CREATE TABLE IF NOT EXISTS activities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscription_id INTEGER NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    author_login TEXT NOT NULL DEFAULT '',
    author_name TEXT,
    author_avatar_url TEXT,
    labels TEXT NOT NULL DEFAULT '[]',
    assignees TEXT NOT NULL DEFAULT '[]',
    state TEXT,
    extras TEXT NOT NULL DEFAULT '{}',
    source_created_at TEXT,
    source_updated_at TEXT,
    ingested_at TEXT NOT NULL,
    UNIQUE(subscription_id, kind, external_id)
);
CREATE INDEX IF NOT EXISTS idx_activity_sub_created
    ON activities(subscription_id, source_created_at DESC);

CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    subscription_ids TEXT NOT NULL DEFAULT '[]',
    title TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    format TEXT NOT NULL DEFAULT 'html',
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    summary TEXT,
    body TEXT,
    ai_analysis TEXT,
    stat_repos INTEGER NOT NULL DEFAULT 0,
    stat_activities INTEGER NOT NULL DEFAULT 0,
    stat_commits INTEGER NOT NULL DEFAULT 0,
    stat_issues INTEGER NOT NULL DEFAULT 0,
    stat_pull_requests INTEGER NOT NULL DEFAULT 0,
    stat_releases INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    generated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_report_owner_created
    ON reports(owner_user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS task_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    duration_secs INTEGER,
    success_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    processed_count INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    details TEXT
);
"#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| SentinelError::Database(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database exists per connection, so it must be pinned
        // to a single pooled connection that never gets recycled.
        let in_memory = database_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 10 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await
            .map_err(|e| SentinelError::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    /// In-memory store for tests and the `collect` one-shot.
    pub async fn in_memory() -> Result<Self> {
        let store = Self::connect("sqlite::memory:").await?;
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        tracing::info!("database schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn db_err(err: sqlx::Error) -> SentinelError {
    SentinelError::Database(err.to_string())
}

/// True when a write failed on a UNIQUE constraint, so callers can map it to
/// the conflict taxonomy instead of a 500.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

/// Fixed-width UTC encoding; lexicographic order equals chronological order.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub(crate) fn ts_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SentinelError::Database(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(&s)).transpose()
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

//! Entity types shared across the workspace.
//!
//! Storage keeps every timestamp in UTC; humanized rendering goes through
//! [`crate::time::format_display`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, SentinelError};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub handle: String,
    pub email: String,
    pub display_name: Option<String>,
    pub active: bool,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub email_enabled: bool,
    pub chat_enabled: bool,
    pub webhook_enabled: bool,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "paused" => Ok(SubscriptionStatus::Paused),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            other => Err(SentinelError::InvalidInput(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            "monthly" => Ok(Cadence::Monthly),
            other => Err(SentinelError::InvalidInput(format!(
                "unknown cadence: {other}"
            ))),
        }
    }
}

/// Which upstream event kinds a subscription watches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSet {
    pub commits: bool,
    pub issues: bool,
    pub pull_requests: bool,
    pub releases: bool,
    pub discussions: bool,
}

impl Default for WatchSet {
    fn default() -> Self {
        Self {
            commits: true,
            issues: true,
            pull_requests: true,
            releases: true,
            discussions: false,
        }
    }
}

impl WatchSet {
    /// Watched kinds the collector knows how to fetch, in fetch order.
    pub fn kinds(&self) -> Vec<ActivityKind> {
        let mut kinds = Vec::new();
        if self.commits {
            kinds.push(ActivityKind::Commit);
        }
        if self.issues {
            kinds.push(ActivityKind::Issue);
        }
        if self.pull_requests {
            kinds.push(ActivityKind::PullRequest);
        }
        if self.releases {
            kinds.push(ActivityKind::Release);
        }
        kinds
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionFilters {
    pub exclude_authors: Vec<String>,
    pub include_labels: Vec<String>,
    pub exclude_labels: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub email_enabled: bool,
    pub chat_enabled: bool,
    pub webhook_enabled: bool,
    pub emails: Vec<String>,
    pub chat_hooks: Vec<String>,
    pub webhook_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub owner_user_id: i64,
    /// "owner/name"
    pub repo_ref: String,
    pub repo_description: Option<String>,
    pub repo_url: Option<String>,
    pub repo_language: Option<String>,
    pub repo_stars: i64,
    pub repo_forks: i64,
    pub status: SubscriptionStatus,
    pub cadence: Cadence,
    pub watches: WatchSet,
    pub filters: SubscriptionFilters,
    pub delivery: DeliveryConfig,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// `owner/name`, both segments non-empty and slash-free.
pub fn validate_repo_ref(repo_ref: &str) -> Result<(&str, &str)> {
    let mut parts = repo_ref.splitn(2, '/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(name))
            if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((owner, name))
        }
        _ => Err(SentinelError::InvalidInput(format!(
            "repository reference must be owner/name: {repo_ref:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Commit,
    Issue,
    PullRequest,
    Release,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Commit => "commit",
            ActivityKind::Issue => "issue",
            ActivityKind::PullRequest => "pull_request",
            ActivityKind::Release => "release",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "commit" => Ok(ActivityKind::Commit),
            "issue" => Ok(ActivityKind::Issue),
            "pull_request" => Ok(ActivityKind::PullRequest),
            "release" => Ok(ActivityKind::Release),
            other => Err(SentinelError::InvalidInput(format!(
                "unknown activity kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityAuthor {
    pub login: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// A normalized upstream event as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub subscription_id: i64,
    pub kind: ActivityKind,
    /// Unique per (subscription, kind): commit sha, issue/PR number, release id.
    pub external_id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub author: ActivityAuthor,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub state: Option<String>,
    /// Kind-specific leftovers kept as opaque JSON.
    pub extras: serde_json::Value,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
}

/// Candidate produced by normalization, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct ActivityDraft {
    pub subscription_id: i64,
    pub kind: ActivityKind,
    pub external_id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub author: ActivityAuthor,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub state: Option<String>,
    pub extras: serde_json::Value,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
}

pub const TITLE_MAX: usize = 500;
pub const BODY_MAX: usize = 1000;

/// Truncate on a char boundary.
pub fn clamp_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Daily => "daily",
            ReportKind::Weekly => "weekly",
            ReportKind::Monthly => "monthly",
            ReportKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(ReportKind::Daily),
            "weekly" => Ok(ReportKind::Weekly),
            "monthly" => Ok(ReportKind::Monthly),
            "custom" => Ok(ReportKind::Custom),
            other => Err(SentinelError::InvalidInput(format!(
                "unknown report kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "generating" => Ok(ReportStatus::Generating),
            "completed" => Ok(ReportStatus::Completed),
            "failed" => Ok(ReportStatus::Failed),
            other => Err(SentinelError::InvalidInput(format!(
                "unknown report status: {other}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Markdown,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Markdown => "markdown",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "html" => Ok(ReportFormat::Html),
            "markdown" => Ok(ReportFormat::Markdown),
            other => Err(SentinelError::InvalidInput(format!(
                "unknown report format: {other}"
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Markdown => "md",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportStats {
    pub repos: i64,
    pub activities: i64,
    pub commits: i64,
    pub issues: i64,
    pub pull_requests: i64,
    pub releases: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub owner_user_id: i64,
    pub subscription_ids: Vec<i64>,
    pub title: String,
    pub kind: ReportKind,
    pub status: ReportStatus,
    pub format: ReportFormat,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub ai_analysis: Option<String>,
    pub stats: ReportStats,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub generated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Task executions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(SentinelError::InvalidInput(format!(
                "unknown task status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub success_count: i64,
    pub error_count: i64,
    pub processed_count: i64,
    pub error: Option<String>,
    pub details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Notification rules (in-memory, persisted opaquely by callers)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Activity,
    Threshold,
    Schedule,
    AiInsight,
}

/// Every populated condition must match; empty lists are wildcards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConditions {
    pub event_kinds: Vec<String>,
    pub repos: Vec<String>,
    pub authors: Vec<String>,
    pub keywords: Vec<String>,
    pub thresholds: HashMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleActions {
    pub realtime: bool,
    pub email: bool,
    pub external_channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: String,
    pub owner_user_id: i64,
    pub kind: RuleKind,
    pub conditions: RuleConditions,
    pub actions: RuleActions,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_ref_validation() {
        assert!(validate_repo_ref("acme/widget").is_ok());
        assert!(validate_repo_ref("acme").is_err());
        assert!(validate_repo_ref("/widget").is_err());
        assert!(validate_repo_ref("acme/").is_err());
        assert!(validate_repo_ref("a/b/c").is_err());
        assert!(validate_repo_ref("").is_err());
    }

    #[test]
    fn watch_set_kinds_in_fetch_order() {
        let watches = WatchSet {
            commits: true,
            issues: true,
            pull_requests: false,
            releases: false,
            discussions: false,
        };
        assert_eq!(
            watches.kinds(),
            vec![ActivityKind::Commit, ActivityKind::Issue]
        );
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        let text = "héllo wörld";
        assert_eq!(clamp_text(text, 5), "héllo");
        assert_eq!(clamp_text("short", 500), "short");
    }

    #[test]
    fn terminal_report_states() {
        assert!(ReportStatus::Completed.is_terminal());
        assert!(ReportStatus::Failed.is_terminal());
        assert!(!ReportStatus::Generating.is_terminal());
        assert!(!ReportStatus::Pending.is_terminal());
    }
}

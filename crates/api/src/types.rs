//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

use sentinel_common::types::{
    DeliveryConfig, SubscriptionFilters, UserPreferences, WatchSet,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub service: String,
    pub version: String,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub handle: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user: sentinel_common::types::User,
    /// Returned exactly once, at creation time.
    pub api_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
}

#[derive(Debug, Serialize)]
pub struct UserCountResponse {
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub repo_ref: String,
    #[serde(default = "default_cadence")]
    pub cadence: String,
    #[serde(default)]
    pub watches: Option<WatchSet>,
    #[serde(default)]
    pub filters: Option<SubscriptionFilters>,
    #[serde(default)]
    pub delivery: Option<DeliveryConfig>,
}

fn default_cadence() -> String {
    "daily".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateSubscriptionRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cadence: Option<String>,
    #[serde(default)]
    pub watches: Option<WatchSet>,
    #[serde(default)]
    pub filters: Option<SubscriptionFilters>,
    #[serde(default)]
    pub delivery: Option<DeliveryConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityListQuery {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub task_execution_id: i64,
    pub job_key: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
    pub subscription_id: i64,
    #[serde(default = "default_report_type")]
    pub report_type: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_report_type() -> String {
    "daily".to_string()
}

fn default_format() -> String {
    "html".to_string()
}

#[derive(Debug, Serialize)]
pub struct GenerateReportResponse {
    pub report_id: i64,
    pub task_id: String,
    pub task_execution_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardOverview {
    pub users: i64,
    pub active_users: i64,
    pub subscriptions: usize,
    pub activities: i64,
    pub reports: i64,
    pub realtime: sentinel_realtime::HubStats,
    pub recent_tasks: Vec<sentinel_common::types::TaskExecution>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    #[serde(default)]
    pub token: String,
}

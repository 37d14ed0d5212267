//! Process-level service container. Everything is constructed once at
//! startup and handed to handlers through axum state; there is no ambient
//! lookup.

use std::sync::Arc;

use tokio::sync::RwLock;

use sentinel_collector::Collector;
use sentinel_common::{EventBus, SentinelConfig};
use sentinel_github::PlatformApi;
use sentinel_llm::LlmAdapter;
use sentinel_realtime::Hub;
use sentinel_reports::ReportOrchestrator;
use sentinel_scheduler::Scheduler;
use sentinel_storage::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<SentinelConfig>>,
    pub store: SqliteStore,
    pub events: EventBus,
    pub hub: Arc<Hub>,
    pub platform: Arc<dyn PlatformApi>,
    pub collector: Arc<Collector>,
    pub scheduler: Scheduler,
    pub orchestrator: Arc<ReportOrchestrator>,
    pub llm: Arc<LlmAdapter>,
}

//! Transactional store over SQLite: users, subscriptions, activities,
//! reports and task executions, with the ingestion pipeline's idempotent
//! upsert and watermark contracts.

mod activities;
mod reports;
mod store;
mod subscriptions;
mod tasks;
mod users;

pub use activities::UpsertOutcome;
pub use reports::NewReport;
pub use store::SqliteStore;
pub use subscriptions::{NewSubscription, SubscriptionPatch};
pub use tasks::TaskCounters;
pub use users::NewUser;

pub mod dashboard;
pub mod llm;
pub mod reports;
pub mod settings;
pub mod subscriptions;
pub mod users;
pub mod websocket;

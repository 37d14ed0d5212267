//! HTTP/WS adapter: a thin axum surface over the services, bearer-token
//! auth, and taxonomy-mapped error responses.

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

pub use server::{router, serve};
pub use state::AppState;

//! Shared foundation for the sentinel workspace: configuration, error
//! taxonomy, entity types, the internal event bus, and time utilities.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod time;
pub mod types;

pub use config::{redact, SentinelConfig};
pub use error::{Result, SentinelError};
pub use events::{EventBus, SentinelEvent};
pub use types::*;

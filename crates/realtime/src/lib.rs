//! Realtime hub: long-lived socket sessions keyed by user, channel-based
//! broadcast, and the progress stream for long-running tasks.

pub mod hub;
pub mod messages;
pub mod socket;

pub use hub::{personal_channel, repository_channel, Hub, HubStats, SESSION_QUEUE};
pub use messages::{parse_client_message, ClientMessage, ParsedClientMessage, ServerMessage};
pub use socket::serve_socket;

//! Provider-agnostic language-model adapter with a deterministic fallback
//! and turn-bounded per-user chat memory.

pub mod adapter;
pub mod provider;

pub use adapter::{fallback_summary, fallback_trends, EnrichmentContext, LlmAdapter, CHAT_WINDOW};
pub use provider::{ChatTurn, CompletionProvider, CompletionRequest, OpenAiProvider, Role};

//! Report pipeline: staged generation with progress reporting,
//! cancellation, enrichment and deterministic rendering.

pub mod orchestrator;
pub mod render;

pub use orchestrator::{compute_period, GenerateRequest, PreparedReport, ReportOrchestrator};
pub use render::{render_html, render_markdown, RenderInput};

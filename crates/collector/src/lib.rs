//! Ingestion pipeline: windowed pulls from the platform client,
//! normalization, idempotent persistence, watermark upkeep and event
//! emission.

pub mod collector;
pub mod normalize;

pub use collector::{CollectionResult, Collector, SweepSummary, DEFAULT_FANOUT};

// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod enrich;
pub mod ingest;
pub mod metrics;
pub mod stats;
pub mod store;

// ---- Re-exports for stable public API ----
// Router assembly: `media_pulse_analyzer::api::create_router` or `media_pulse_analyzer::create_router`
pub use crate::api::create_router;
pub use crate::config::AppConfig;
pub use crate::ingest::{build_connectors, run_ingestion_cycle, IngestSummary};
pub use crate::store::{SharedStore, TablesClient};

//! Media Pulse Analyzer — Binary Entrypoint
//! Boots the Axum HTTP server and the background ingestion task, wiring
//! routes, shared state, and the Prometheus exporter.
//!
//! See `README.md` for quickstart and configuration.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use media_pulse_analyzer::api;
use media_pulse_analyzer::config::AppConfig;
use media_pulse_analyzer::enrich::build_analyzer;
use media_pulse_analyzer::ingest::{build_connectors, scheduler};
use media_pulse_analyzer::metrics::Metrics;
use media_pulse_analyzer::store::{SharedStore, TablesClient};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env();
    let metrics = Metrics::init();

    let store: SharedStore = Arc::new(TablesClient::new(cfg.tables.clone()));
    let analyzer = build_analyzer(&cfg);

    let connectors = Arc::new(build_connectors(&cfg, analyzer.clone()));
    scheduler::spawn_ingest_task(
        scheduler::IngestSchedulerCfg {
            interval_secs: cfg.ingest_interval_secs,
        },
        store.clone(),
        connectors,
        cfg.habr_fallback.clone(),
    );

    let router = api::create_router(store, analyzer).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, "media pulse analyzer listening");
    axum::serve(listener, router).await?;

    Ok(())
}

//! Runs exactly one ingestion cycle and exits. Useful for cron-driven
//! deployments and for smoke-testing credentials.

use std::sync::Arc;

use media_pulse_analyzer::config::AppConfig;
use media_pulse_analyzer::enrich::build_analyzer;
use media_pulse_analyzer::ingest::{build_connectors, run_ingestion_cycle};
use media_pulse_analyzer::store::{SharedStore, TablesClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = AppConfig::from_env();
    let store: SharedStore = Arc::new(TablesClient::new(cfg.tables.clone()));
    let analyzer = build_analyzer(&cfg);
    let connectors = build_connectors(&cfg, analyzer);

    let summary = run_ingestion_cycle(store.as_ref(), &connectors, &cfg.habr_fallback).await?;
    println!("ingest-once done: {summary}");

    Ok(())
}

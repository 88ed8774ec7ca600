// src/ingest/mod.rs
pub mod channels;
pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use anyhow::Result;
use futures::future::join_all;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::enrich::SharedAnalyzer;
use crate::ingest::channels::{resolve_channels, total_targets};
use crate::ingest::providers::habr::HabrConnector;
use crate::ingest::providers::rutube::RutubeConnector;
use crate::ingest::providers::telegram::TelegramConnector;
use crate::ingest::providers::vk::VkConnector;
use crate::ingest::providers::youtube::YouTubeConnector;
use crate::ingest::types::{CanonicalPost, Source, SourceConnector};
use crate::store::RecordStore;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_posts_total",
            "Fresh posts fetched per source, after dedup and filtering."
        );
        describe_counter!(
            "ingest_target_errors_total",
            "Targets skipped because of fetch/parse errors."
        );
        describe_counter!(
            "ingest_connector_errors_total",
            "Whole-connector failures absorbed by the orchestrator."
        );
        describe_counter!("ingest_appended_total", "Posts persisted to the store.");
        describe_counter!("ingest_runs_total", "Ingestion cycles started.");
        describe_counter!("enrich_requests_total", "Model calls attempted.");
        describe_counter!(
            "enrich_failures_total",
            "Model calls that ended in the error placeholder."
        );
        describe_histogram!("ingest_fetch_ms", "Per-connector fetch time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when ingestion last ran.");
    });
}

/// The five platform connectors in their canonical order.
pub fn build_connectors(cfg: &AppConfig, analyzer: SharedAnalyzer) -> Vec<Box<dyn SourceConnector>> {
    vec![
        Box::new(TelegramConnector::new(analyzer.clone())),
        Box::new(VkConnector::new(cfg.vk_access_token.clone(), analyzer.clone())),
        Box::new(YouTubeConnector::new(
            cfg.youtube_api_key.clone(),
            analyzer.clone(),
        )),
        Box::new(RutubeConnector::new(analyzer.clone())),
        Box::new(HabrConnector::new(analyzer)),
    ]
}

/// What one cycle did: fresh posts per source and how many were
/// persisted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub fetched: BTreeMap<Source, usize>,
    pub appended: usize,
}

impl IngestSummary {
    pub fn total_fetched(&self) -> usize {
        self.fetched.values().sum()
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (source, count) in &self.fetched {
            write!(f, "{source}={count} ")?;
        }
        write!(
            f,
            "total={} appended={}",
            self.total_fetched(),
            self.appended
        )
    }
}

/// One full ingestion cycle: resolve the monitoring list, load known
/// links, run all connectors, persist whatever came back.
///
/// Connector failures are absorbed (an empty contribution plus a warn);
/// only a failed append surfaces as `Err`, because at that point fetched
/// posts would be silently lost.
pub async fn run_ingestion_cycle(
    store: &dyn RecordStore,
    connectors: &[Box<dyn SourceConnector>],
    habr_fallback: &[String],
) -> Result<IngestSummary> {
    ensure_metrics_described();
    counter!("ingest_runs_total").increment(1);

    let (channel_map, existing) = tokio::join!(
        resolve_channels(store, habr_fallback),
        store.existing_links()
    );
    if total_targets(&channel_map) == 0 {
        warn!("monitoring list resolved to nothing, cycle skipped");
        return Ok(IngestSummary::default());
    }
    info!(known_links = existing.len(), "ingestion cycle starting");

    let fetches = connectors.iter().map(|connector| {
        let targets = channel_map
            .get(&connector.source())
            .cloned()
            .unwrap_or_default();
        let existing = &existing;
        async move {
            let started = Instant::now();
            let result = connector.fetch(existing, &targets).await;
            histogram!("ingest_fetch_ms").record(started.elapsed().as_millis() as f64);
            match result {
                Ok(posts) => (connector.source(), posts),
                Err(e) => {
                    warn!(source = %connector.source(), error = ?e, "connector error");
                    counter!("ingest_connector_errors_total").increment(1);
                    (connector.source(), Vec::new())
                }
            }
        }
    });
    let results = join_all(fetches).await;

    let mut summary = IngestSummary::default();
    let mut batch: Vec<CanonicalPost> = Vec::new();
    for (source, mut posts) in results {
        counter!("ingest_posts_total", "source" => source.as_str())
            .increment(posts.len() as u64);
        summary.fetched.insert(source, posts.len());
        batch.append(&mut posts);
    }
    info!(%summary, "connectors finished");

    if batch.is_empty() {
        info!("no fresh posts this cycle");
    } else {
        summary.appended = store.append_posts(&batch).await?;
        counter!("ingest_appended_total").increment(summary.appended as u64);
        info!(appended = summary.appended, "fresh posts persisted");
    }
    gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

    Ok(summary)
}

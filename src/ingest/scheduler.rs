// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::ingest::types::SourceConnector;
use crate::store::SharedStore;

#[derive(Clone, Debug)]
pub struct IngestSchedulerCfg {
    /// `None` or zero means a single run instead of a periodic loop.
    pub interval_secs: Option<u64>,
}

impl IngestSchedulerCfg {
    fn period(&self) -> Option<Duration> {
        match self.interval_secs {
            Some(secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => None,
        }
    }
}

/// Spawns the background ingestion task. Every cycle's outcome is logged
/// here; a failed cycle never tears the task down, the next tick simply
/// tries again.
pub fn spawn_ingest_task(
    cfg: IngestSchedulerCfg,
    store: SharedStore,
    connectors: Arc<Vec<Box<dyn SourceConnector>>>,
    habr_fallback: Vec<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = cfg.period();
        loop {
            match crate::ingest::run_ingestion_cycle(
                store.as_ref(),
                connectors.as_slice(),
                &habr_fallback,
            )
            .await
            {
                Ok(summary) => {
                    info!(target: "ingest", %summary, "ingestion cycle finished");
                }
                Err(e) => {
                    error!(target: "ingest", error = ?e, "ingestion cycle failed");
                }
            }
            match period {
                Some(period) => tokio::time::sleep(period).await,
                None => break,
            }
        }
        info!(target: "ingest", "one-shot ingestion done, scheduler exiting");
    })
}

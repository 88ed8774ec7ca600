// src/config.rs
//! Environment-driven configuration, read once at startup. Missing
//! credentials are not errors: the corresponding connector or the
//! analyzer simply idles and says so in the log.

use tracing::warn;

use crate::enrich::DEFAULT_MODEL;
use crate::ingest::channels::load_habr_fallback;
use crate::store::TablesConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_TABLES_API_URL: &str = "https://tables.mws.ru/fusion/v1/datasheets";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Unset or zero: run ingestion once at startup and stop.
    pub ingest_interval_secs: Option<u64>,
    pub vk_access_token: Option<String>,
    pub youtube_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub habr_fallback: Vec<String>,
    pub tables: TablesConfig,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let tables = TablesConfig {
            api_url: env_or("MWS_API_URL", DEFAULT_TABLES_API_URL),
            token: env_opt("MWS_TOKEN").unwrap_or_default(),
            table_id: env_opt("MWS_TABLE_ID").unwrap_or_default(),
            view_id: env_opt("MWS_VIEW_ID").unwrap_or_default(),
            channels_table_id: env_opt("MWS_CHANNELS_TABLE_ID").unwrap_or_default(),
            channels_view_id: env_opt("MWS_CHANNELS_VIEW_ID").unwrap_or_default(),
        };
        if !tables.is_configured() {
            warn!("tables store credentials missing; reads and appends will fail open");
        }

        Self {
            bind_addr: env_or("APP_BIND", DEFAULT_BIND_ADDR),
            ingest_interval_secs: env_opt("INGEST_INTERVAL_SECS").and_then(|v| v.parse().ok()),
            vk_access_token: env_opt("VK_ACCESS_TOKEN"),
            youtube_api_key: env_opt("YOUTUBE_API_KEY"),
            openrouter_api_key: env_opt("OPENROUTER_API_KEY"),
            openrouter_model: env_or("OPENROUTER_MODEL", DEFAULT_MODEL),
            habr_fallback: load_habr_fallback(),
            tables,
        }
    }
}

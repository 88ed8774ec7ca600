// src/ingest/channels.rs
//! Resolves the monitoring list: which channels/accounts to pull, per
//! platform. The list lives in a channels table in the same store as the
//! posts; rows marked "Смотреть" are active. Identifiers arrive as URLs,
//! @handles or bare slugs and are reduced to the bare form here.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::ingest::types::Source;
use crate::store::{ChannelRow, RecordStore};

/// Targets per platform. Always carries all five keys so connectors can
/// index without checking.
pub type ChannelMap = BTreeMap<Source, Vec<String>>;

pub fn empty_channel_map() -> ChannelMap {
    Source::ALL.iter().map(|s| (*s, Vec::new())).collect()
}

pub fn total_targets(map: &ChannelMap) -> usize {
    map.values().map(Vec::len).sum()
}

/// Strips URL and handle decoration down to the identifier the platform
/// API expects: t.me links and @ for Telegram, vk.com links for VK,
/// youtube.com links for YouTube, channel URLs for Rutube, company page
/// URLs for Habr.
pub fn clean_identifier(source: Source, raw: &str) -> String {
    let raw = raw.trim();
    let cleaned = match source {
        Source::Telegram => raw.replace("https://t.me/", "").replace('@', ""),
        Source::Vk => raw
            .replace("https://vk.com/", "")
            .replace("https://m.vk.com/", ""),
        Source::YouTube => raw
            .replace("https://www.youtube.com/", "")
            .replace("https://youtube.com/", ""),
        Source::Rutube => raw
            .replace("https://rutube.ru/channel/", "")
            .replace('/', ""),
        Source::Habr => {
            if raw.contains("habr.com") {
                raw.split("/companies/")
                    .nth(1)
                    .or_else(|| raw.split("/company/").nth(1))
                    .and_then(|tail| tail.split('/').next())
                    .unwrap_or("")
                    .to_string()
            } else {
                raw.to_string()
            }
        }
    };
    cleaned.trim().to_string()
}

/// Groups watch-marked rows by platform, cleaning identifiers along the
/// way. Rows with an unknown platform label or an identifier that cleans
/// down to nothing are skipped.
pub fn group_channel_rows(rows: Vec<ChannelRow>) -> ChannelMap {
    let mut map = empty_channel_map();
    for row in rows {
        if !row.watch {
            continue;
        }
        let Some(source) = Source::from_store_name(&row.source) else {
            warn!(label = %row.source, "channel row with unknown platform, skipping");
            continue;
        };
        let id = clean_identifier(source, &row.name);
        if id.is_empty() {
            continue;
        }
        map.entry(source).or_default().push(id);
    }
    map
}

/// Loads the channel table and groups it. Fail-open: when the store is
/// unreachable the run proceeds with an empty list, except Habr, which
/// falls back to the static company list so scraping never fully stops.
/// The same fallback applies when the table simply has no Habr rows.
pub async fn resolve_channels(store: &dyn RecordStore, habr_fallback: &[String]) -> ChannelMap {
    let mut map = match store.list_channel_rows().await {
        Ok(rows) => group_channel_rows(rows),
        Err(e) => {
            error!(error = ?e, "could not load the monitoring list, falling back to defaults");
            empty_channel_map()
        }
    };
    if map.get(&Source::Habr).map_or(true, Vec::is_empty) && !habr_fallback.is_empty() {
        map.insert(Source::Habr, habr_fallback.to_vec());
    }
    info!(
        telegram = map[&Source::Telegram].len(),
        vk = map[&Source::Vk].len(),
        youtube = map[&Source::YouTube].len(),
        rutube = map[&Source::Rutube].len(),
        habr = map[&Source::Habr].len(),
        "monitoring list resolved"
    );
    map
}

const HABR_COMPANIES_ENV: &str = "HABR_TARGET_COMPANIES";
const HABR_COMPANIES_FILE: &str = "config/habr_companies.toml";
const HABR_COMPANIES_DEFAULT: [&str; 3] = ["mts_ai", "telegram", "vk"];

#[derive(serde::Deserialize)]
struct HabrCompaniesFile {
    companies: Vec<String>,
}

fn parse_companies_toml(raw: &str) -> Result<Vec<String>> {
    let parsed: HabrCompaniesFile =
        toml::from_str(raw).context("invalid habr companies TOML")?;
    Ok(parsed
        .companies
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}

/// Static Habr fallback list: comma-separated env var first, then the
/// optional TOML file, then the built-in default.
pub fn load_habr_fallback() -> Vec<String> {
    if let Ok(raw) = std::env::var(HABR_COMPANIES_ENV) {
        let companies: Vec<String> = raw
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if !companies.is_empty() {
            return companies;
        }
    }

    let path = Path::new(HABR_COMPANIES_FILE);
    if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(raw) => match parse_companies_toml(&raw) {
                Ok(companies) if !companies.is_empty() => return companies,
                Ok(_) => {}
                Err(e) => warn!(error = ?e, file = HABR_COMPANIES_FILE, "ignoring bad companies file"),
            },
            Err(e) => warn!(error = ?e, file = HABR_COMPANIES_FILE, "could not read companies file"),
        }
    }

    HABR_COMPANIES_DEFAULT.iter().map(|c| c.to_string()).collect()
}

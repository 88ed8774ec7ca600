// tests/ingest_channels.rs
//
// Channel-configuration resolution against the in-memory store:
// grouping, identifier cleanup, the static Habr fallback and the
// fail-open posture when the store is down.

use media_pulse_analyzer::ingest::channels::{resolve_channels, total_targets};
use media_pulse_analyzer::ingest::types::Source;
use media_pulse_analyzer::store::{ChannelRow, MemoryStore};

fn row(source: &str, name: &str, watch: bool) -> ChannelRow {
    ChannelRow {
        source: source.to_string(),
        name: name.to_string(),
        watch,
    }
}

#[tokio::test]
async fn groups_rows_and_strips_platform_prefixes() {
    let store = MemoryStore::with_channel_rows(vec![
        row("Telegram", "https://t.me/mychannel", true),
        row("Telegram", "@second", true),
        row("VK", "https://vk.com/mts", true),
        row("Rutube", "https://rutube.ru/channel/12345/", true),
        row("Habr", "https://habr.com/ru/companies/mts_ai/articles/", true),
        row("VK", "paused_group", false),
        row("MySpace", "nobody", true),
    ]);

    let map = resolve_channels(&store, &[]).await;

    assert_eq!(
        map.get(&Source::Telegram),
        Some(&vec!["mychannel".to_string(), "second".to_string()])
    );
    assert_eq!(map.get(&Source::Vk), Some(&vec!["mts".to_string()]));
    assert_eq!(map.get(&Source::Rutube), Some(&vec!["12345".to_string()]));
    assert_eq!(map.get(&Source::Habr), Some(&vec!["mts_ai".to_string()]));
    assert_eq!(total_targets(&map), 5, "paused and unknown rows dropped");
}

#[tokio::test]
async fn habr_falls_back_to_static_companies_when_unconfigured() {
    let store = MemoryStore::with_channel_rows(vec![row("Telegram", "@chan", true)]);
    let fallback = vec!["mts_ai".to_string(), "vk".to_string()];

    let map = resolve_channels(&store, &fallback).await;

    assert_eq!(map.get(&Source::Habr), Some(&fallback));
    assert_eq!(map.get(&Source::Telegram), Some(&vec!["chan".to_string()]));
}

#[tokio::test]
async fn configured_habr_rows_win_over_fallback() {
    let store = MemoryStore::with_channel_rows(vec![row("Habr", "ozon", true)]);
    let fallback = vec!["mts_ai".to_string()];

    let map = resolve_channels(&store, &fallback).await;

    assert_eq!(map.get(&Source::Habr), Some(&vec!["ozon".to_string()]));
}

#[tokio::test]
async fn store_outage_degrades_to_fallback_only_mapping() {
    let store = MemoryStore::failing_reads();
    let fallback = vec!["mts_ai".to_string()];

    let map = resolve_channels(&store, &fallback).await;

    assert_eq!(map.get(&Source::Habr), Some(&fallback));
    assert_eq!(total_targets(&map), 1, "every other source resolves empty");
}

// tests/ingest_pipeline.rs
//
// End-to-end ingestion cycles against the in-memory store: fresh posts
// are appended, known links are skipped on the next run, connector
// failures stay contained, a failed append surfaces.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use media_pulse_analyzer::ingest::types::{admit, CanonicalPost, LinkSet, Source, SourceConnector};
use media_pulse_analyzer::ingest::run_ingestion_cycle;
use media_pulse_analyzer::store::{ChannelRow, MemoryStore};

/// Connector emitting a fixed item list, honoring the shared admission
/// gate the way every real connector does.
struct FixedConnector {
    source: Source,
    items: Vec<(&'static str, &'static str)>, // (permalink, body)
    calls: Arc<AtomicUsize>,
}

impl FixedConnector {
    fn new(source: Source, items: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            source,
            items,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SourceConnector for FixedConnector {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(&self, existing: &LinkSet, _targets: &[String]) -> Result<Vec<CanonicalPost>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let posts = self
            .items
            .iter()
            .filter(|(link, body)| admit(existing, link, body))
            .map(|(link, body)| CanonicalPost {
                title: "пост".to_string(),
                body: body.to_string(),
                published: "2024-01-15".to_string(),
                views: 10,
                likes: 1,
                shares: 0,
                comments: 0,
                source: self.source,
                link: link.to_string(),
                sentiment: Default::default(),
                summary: "Авто-саммари".to_string(),
            })
            .collect();
        Ok(posts)
    }
}

struct BrokenConnector;

#[async_trait]
impl SourceConnector for BrokenConnector {
    fn source(&self) -> Source {
        Source::Habr
    }

    async fn fetch(&self, _existing: &LinkSet, _targets: &[String]) -> Result<Vec<CanonicalPost>> {
        anyhow::bail!("simulated connector outage")
    }
}

fn telegram_channel_row() -> ChannelRow {
    ChannelRow {
        source: "Telegram".to_string(),
        name: "@chan".to_string(),
        watch: true,
    }
}

#[tokio::test]
async fn cycle_appends_fresh_posts_and_absorbs_connector_failure() {
    let store = MemoryStore::with_channel_rows(vec![telegram_channel_row()]);
    let connectors: Vec<Box<dyn SourceConnector>> = vec![
        Box::new(FixedConnector::new(
            Source::Telegram,
            vec![
                ("https://t.me/chan/1", "Первый пост канала"),
                ("https://t.me/chan/2", "Второй пост канала"),
            ],
        )),
        Box::new(BrokenConnector),
    ];

    let summary = run_ingestion_cycle(&store, &connectors, &[])
        .await
        .expect("cycle");

    assert_eq!(summary.fetched.get(&Source::Telegram), Some(&2));
    assert_eq!(summary.fetched.get(&Source::Habr), Some(&0));
    assert_eq!(summary.appended, 2);

    let appended = store.appended.lock().expect("appended");
    assert_eq!(appended.len(), 2);
    let links = store.links.lock().expect("links");
    assert!(links.contains("https://t.me/chan/1"));
    assert!(links.contains("https://t.me/chan/2"));
}

#[tokio::test]
async fn second_cycle_is_idempotent() {
    let store = MemoryStore::with_channel_rows(vec![telegram_channel_row()]);
    let connectors: Vec<Box<dyn SourceConnector>> = vec![Box::new(FixedConnector::new(
        Source::Telegram,
        vec![("https://t.me/chan/7", "Пост появляется один раз")],
    ))];

    let first = run_ingestion_cycle(&store, &connectors, &[])
        .await
        .expect("first cycle");
    assert_eq!(first.appended, 1);

    let second = run_ingestion_cycle(&store, &connectors, &[])
        .await
        .expect("second cycle");
    assert_eq!(second.total_fetched(), 0, "known link must be skipped");
    assert_eq!(second.appended, 0);
    assert_eq!(store.appended.lock().expect("appended").len(), 1);
}

#[tokio::test]
async fn empty_monitoring_list_skips_connectors_entirely() {
    let store = MemoryStore::new();
    let connector = FixedConnector::new(
        Source::Telegram,
        vec![("https://t.me/chan/1", "Никогда не будет получен")],
    );
    let calls = connector.calls.clone();
    let connectors: Vec<Box<dyn SourceConnector>> = vec![Box::new(connector)];

    let summary = run_ingestion_cycle(&store, &connectors, &[])
        .await
        .expect("cycle");

    assert_eq!(summary.total_fetched(), 0);
    assert_eq!(summary.appended, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no targets, no fetches");
}

#[tokio::test]
async fn failed_append_surfaces_as_cycle_error() {
    let store = MemoryStore {
        fail_append: true,
        ..MemoryStore::default()
    };
    *store.channel_rows.lock().expect("channel_rows") = vec![telegram_channel_row()];

    let connectors: Vec<Box<dyn SourceConnector>> = vec![Box::new(FixedConnector::new(
        Source::Telegram,
        vec![("https://t.me/chan/9", "Пост, который не сохранится")],
    ))];

    let result = run_ingestion_cycle(&store, &connectors, &[]).await;
    assert!(result.is_err(), "append failure must not be swallowed");
}

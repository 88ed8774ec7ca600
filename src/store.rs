// src/store.rs
//! Persistence behind the pipeline: a spreadsheet-style tables service
//! holding one table of posts and one table of monitored channels.
//! Everything goes through the [`RecordStore`] trait so the pipeline and
//! the HTTP layer can be exercised against an in-memory double.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::ingest::types::{CanonicalPost, LinkSet};

/// Column names of the posts table and the channels table. The store is
/// addressed by field name ("fieldKey=name"), so these strings are the
/// wire contract.
pub mod fields {
    pub const TITLE: &str = "Название";
    pub const BODY: &str = "Текст поста";
    pub const DATE: &str = "Дата";
    pub const VIEWS: &str = "Просмотры";
    pub const LIKES: &str = "Лайки";
    pub const SHARES: &str = "Репосты";
    pub const COMMENTS: &str = "Комментарии";
    pub const SOURCE: &str = "Источник";
    pub const LINK: &str = "Ссылка";
    pub const SENTIMENT: &str = "Тональность";
    pub const SUMMARY: &str = "AI Саммари";

    pub const CH_ACTIVITY: &str = "Тип активности";
    pub const CH_SOURCE: &str = "Источник";
    pub const CH_NAME: &str = "Имя канала";
    /// Activity value marking a channel row as actively monitored.
    pub const ACTIVITY_WATCH: &str = "Смотреть";
}

/// A post as read back from the store. Field values are whatever the
/// table holds, so `source` and `sentiment` stay open-world strings here;
/// missing cells get neutral defaults.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoredPost {
    pub title: String,
    pub body: String,
    pub date: String,
    pub views: u64,
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
    pub source: String,
    pub link: String,
    pub sentiment: String,
    pub summary: String,
}

impl StoredPost {
    pub fn from_fields(fields: &Map<String, Value>) -> StoredPost {
        StoredPost {
            title: str_field(fields, self::fields::TITLE),
            body: str_field(fields, self::fields::BODY),
            date: str_field(fields, self::fields::DATE),
            views: num_field(fields, self::fields::VIEWS),
            likes: num_field(fields, self::fields::LIKES),
            shares: num_field(fields, self::fields::SHARES),
            comments: num_field(fields, self::fields::COMMENTS),
            source: str_field_or(fields, self::fields::SOURCE, "Unknown"),
            link: str_field(fields, self::fields::LINK),
            sentiment: str_field_or(fields, self::fields::SENTIMENT, "Neutral"),
            summary: str_field(fields, self::fields::SUMMARY),
        }
    }

    /// Title with the placeholder applied, for displays and reports.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Без названия"
        } else {
            &self.title
        }
    }

    /// Field map in store column order, for raw-record API responses.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(fields::TITLE.into(), Value::String(self.title.clone()));
        m.insert(fields::BODY.into(), Value::String(self.body.clone()));
        m.insert(fields::DATE.into(), Value::String(self.date.clone()));
        m.insert(fields::VIEWS.into(), Value::from(self.views));
        m.insert(fields::LIKES.into(), Value::from(self.likes));
        m.insert(fields::SHARES.into(), Value::from(self.shares));
        m.insert(fields::COMMENTS.into(), Value::from(self.comments));
        m.insert(fields::SOURCE.into(), Value::String(self.source.clone()));
        m.insert(fields::LINK.into(), Value::String(self.link.clone()));
        m.insert(
            fields::SENTIMENT.into(),
            Value::String(self.sentiment.clone()),
        );
        m.insert(fields::SUMMARY.into(), Value::String(self.summary.clone()));
        m
    }
}

fn str_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn str_field_or(fields: &Map<String, Value>, key: &str, default: &str) -> String {
    let v = str_field(fields, key);
    if v.is_empty() {
        default.to_string()
    } else {
        v
    }
}

fn num_field(fields: &Map<String, Value>, key: &str) -> u64 {
    match fields.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        // counters occasionally come back as strings
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

impl CanonicalPost {
    /// Field map for the append payload, keyed by column name.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(fields::TITLE.into(), Value::String(self.title.clone()));
        m.insert(fields::BODY.into(), Value::String(self.body.clone()));
        m.insert(fields::DATE.into(), Value::String(self.published.clone()));
        m.insert(fields::VIEWS.into(), Value::from(self.views));
        m.insert(fields::LIKES.into(), Value::from(self.likes));
        m.insert(fields::SHARES.into(), Value::from(self.shares));
        m.insert(fields::COMMENTS.into(), Value::from(self.comments));
        m.insert(
            fields::SOURCE.into(),
            Value::String(self.source.as_str().to_string()),
        );
        m.insert(fields::LINK.into(), Value::String(self.link.clone()));
        m.insert(
            fields::SENTIMENT.into(),
            Value::String(self.sentiment.as_str().to_string()),
        );
        m.insert(fields::SUMMARY.into(), Value::String(self.summary.clone()));
        m
    }
}

/// One row of the channels table, already reduced to what the resolver
/// needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub source: String,
    pub name: String,
    pub watch: bool,
}

/// Store operations the pipeline and the API depend on.
///
/// `existing_links` is deliberately infallible: an unreachable store
/// must not stop ingestion, so the implementation absorbs errors and
/// hands back an empty set. Append failures, by contrast, surface as
/// `Err` because silently dropping fetched posts would be worse.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn existing_links(&self) -> LinkSet;
    async fn list_posts(&self) -> Result<Vec<StoredPost>>;
    async fn append_posts(&self, posts: &[CanonicalPost]) -> Result<usize>;
    async fn list_channel_rows(&self) -> Result<Vec<ChannelRow>>;
}

pub type SharedStore = Arc<dyn RecordStore>;

/// Connection settings for the hosted tables service.
#[derive(Debug, Clone, Default)]
pub struct TablesConfig {
    pub api_url: String,
    pub token: String,
    pub table_id: String,
    pub view_id: String,
    pub channels_table_id: String,
    pub channels_view_id: String,
}

impl TablesConfig {
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && !self.table_id.is_empty()
    }
}

const STORE_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_SIZE: u32 = 1000;

/// HTTP client for the tables service REST API.
pub struct TablesClient {
    http: reqwest::Client,
    cfg: TablesConfig,
}

impl TablesClient {
    pub fn new(cfg: TablesConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(STORE_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { http, cfg }
    }

    fn records_url(&self, table_id: &str) -> String {
        format!("{}/{}/records", self.cfg.api_url.trim_end_matches('/'), table_id)
    }

    async fn get_records(
        &self,
        table_id: &str,
        view_id: &str,
        only_field: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>> {
        let mut req = self
            .http
            .get(self.records_url(table_id))
            .bearer_auth(&self.cfg.token)
            .query(&[
                ("viewId", view_id),
                ("fieldKey", "name"),
                ("pageSize", &PAGE_SIZE.to_string()),
            ]);
        if let Some(field) = only_field {
            req = req.query(&[("fields", field)]);
        }

        let resp = req
            .send()
            .await
            .context("tables request failed")?
            .error_for_status()
            .context("tables request rejected")?;
        let envelope: RecordsEnvelope = resp
            .json()
            .await
            .context("tables response is not the expected JSON shape")?;
        Ok(envelope
            .data
            .map(|d| d.records.into_iter().map(|r| r.fields).collect())
            .unwrap_or_default())
    }
}

#[derive(serde::Deserialize)]
struct RecordsEnvelope {
    data: Option<RecordsData>,
}

#[derive(serde::Deserialize)]
struct RecordsData {
    #[serde(default)]
    records: Vec<RawRecord>,
}

#[derive(serde::Deserialize)]
struct RawRecord {
    #[serde(default)]
    fields: Map<String, Value>,
}

#[async_trait::async_trait]
impl RecordStore for TablesClient {
    async fn existing_links(&self) -> LinkSet {
        match self
            .get_records(&self.cfg.table_id, &self.cfg.view_id, Some(fields::LINK))
            .await
        {
            Ok(records) => records
                .iter()
                .filter_map(|f| f.get(fields::LINK).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Err(e) => {
                warn!(error = ?e, "could not load existing links, deduplicating against an empty set");
                LinkSet::new()
            }
        }
    }

    async fn list_posts(&self) -> Result<Vec<StoredPost>> {
        let records = self
            .get_records(&self.cfg.table_id, &self.cfg.view_id, None)
            .await?;
        Ok(records.iter().map(StoredPost::from_fields).collect())
    }

    async fn append_posts(&self, posts: &[CanonicalPost]) -> Result<usize> {
        if posts.is_empty() {
            return Ok(0);
        }
        let records: Vec<Value> = posts
            .iter()
            .map(|p| serde_json::json!({ "fields": p.to_fields() }))
            .collect();
        let payload = serde_json::json!({ "records": records, "fieldKey": "name" });

        self.http
            .post(self.records_url(&self.cfg.table_id))
            .bearer_auth(&self.cfg.token)
            .query(&[("viewId", self.cfg.view_id.as_str()), ("fieldKey", "name")])
            .json(&payload)
            .send()
            .await
            .context("tables append failed")?
            .error_for_status()
            .context("tables append rejected")?;

        info!(count = posts.len(), "appended records to the tables store");
        Ok(posts.len())
    }

    async fn list_channel_rows(&self) -> Result<Vec<ChannelRow>> {
        let records = self
            .get_records(
                &self.cfg.channels_table_id,
                &self.cfg.channels_view_id,
                None,
            )
            .await?;
        Ok(records
            .iter()
            .map(|f| ChannelRow {
                source: str_field(f, fields::CH_SOURCE),
                name: str_field(f, fields::CH_NAME).trim().to_string(),
                watch: str_field(f, fields::CH_ACTIVITY) == fields::ACTIVITY_WATCH,
            })
            .collect())
    }
}

// --- Test helper: in-memory store double ---

/// In-memory [`RecordStore`] used by unit and integration tests. The
/// `fail_*` switches simulate an unreachable backend.
#[derive(Default)]
pub struct MemoryStore {
    pub posts: std::sync::Mutex<Vec<StoredPost>>,
    pub links: std::sync::Mutex<LinkSet>,
    pub channel_rows: std::sync::Mutex<Vec<ChannelRow>>,
    pub appended: std::sync::Mutex<Vec<CanonicalPost>>,
    pub fail_reads: bool,
    pub fail_append: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_rows(rows: Vec<ChannelRow>) -> Self {
        let store = Self::default();
        *store.channel_rows.lock().expect("channel_rows mutex") = rows;
        store
    }

    pub fn with_posts(posts: Vec<StoredPost>) -> Self {
        let store = Self::default();
        *store.links.lock().expect("links mutex") =
            posts.iter().map(|p| p.link.clone()).collect();
        *store.posts.lock().expect("posts mutex") = posts;
        store
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn existing_links(&self) -> LinkSet {
        if self.fail_reads {
            return LinkSet::new();
        }
        self.links.lock().expect("links mutex").clone()
    }

    async fn list_posts(&self) -> Result<Vec<StoredPost>> {
        if self.fail_reads {
            anyhow::bail!("memory store: reads disabled");
        }
        Ok(self.posts.lock().expect("posts mutex").clone())
    }

    async fn append_posts(&self, posts: &[CanonicalPost]) -> Result<usize> {
        if self.fail_append {
            anyhow::bail!("memory store: append disabled");
        }
        let mut links = self.links.lock().expect("links mutex");
        let mut stored = self.posts.lock().expect("posts mutex");
        for p in posts {
            links.insert(p.link.clone());
            stored.push(StoredPost::from_fields(&p.to_fields()));
        }
        self.appended
            .lock()
            .expect("appended mutex")
            .extend(posts.iter().cloned());
        Ok(posts.len())
    }

    async fn list_channel_rows(&self) -> Result<Vec<ChannelRow>> {
        if self.fail_reads {
            anyhow::bail!("memory store: reads disabled");
        }
        Ok(self.channel_rows.lock().expect("channel_rows mutex").clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{Sentiment, Source};

    fn sample_post() -> CanonicalPost {
        CanonicalPost {
            title: "Заголовок".into(),
            body: "Текст поста целиком".into(),
            published: "2024-01-15".into(),
            views: 100,
            likes: 5,
            shares: 2,
            comments: 1,
            source: Source::Telegram,
            link: "https://t.me/chan/1".into(),
            sentiment: Sentiment::Positive,
            summary: "Короткое саммари".into(),
        }
    }

    #[test]
    fn canonical_post_maps_to_named_columns() {
        let fields = sample_post().to_fields();
        assert_eq!(
            fields.get("Название").and_then(Value::as_str),
            Some("Заголовок")
        );
        assert_eq!(fields.get("Просмотры").and_then(Value::as_u64), Some(100));
        assert_eq!(
            fields.get("Источник").and_then(Value::as_str),
            Some("Telegram")
        );
        assert_eq!(
            fields.get("Тональность").and_then(Value::as_str),
            Some("Positive")
        );
        assert_eq!(fields.len(), 11);
    }

    #[test]
    fn stored_post_survives_the_column_mapping() {
        let post = sample_post();
        let stored = StoredPost::from_fields(&post.to_fields());
        assert_eq!(stored.title, post.title);
        assert_eq!(stored.date, post.published);
        assert_eq!(stored.views, 100);
        assert_eq!(stored.source, "Telegram");
        assert_eq!(stored.sentiment, "Positive");
        assert_eq!(stored.link, post.link);
    }

    #[test]
    fn missing_cells_get_neutral_defaults() {
        let stored = StoredPost::from_fields(&Map::new());
        assert_eq!(stored.title, "");
        assert_eq!(stored.display_title(), "Без названия");
        assert_eq!(stored.views, 0);
        assert_eq!(stored.source, "Unknown");
        assert_eq!(stored.sentiment, "Neutral");
    }

    #[test]
    fn numeric_cells_accept_string_counters() {
        let mut fields = Map::new();
        fields.insert("Просмотры".into(), Value::String("250".into()));
        fields.insert("Лайки".into(), Value::String("oops".into()));
        let stored = StoredPost::from_fields(&fields);
        assert_eq!(stored.views, 250);
        assert_eq!(stored.likes, 0);
    }

    #[tokio::test]
    async fn memory_store_tracks_links_on_append() {
        let store = MemoryStore::new();
        let n = store.append_posts(&[sample_post()]).await.unwrap();
        assert_eq!(n, 1);
        assert!(store.existing_links().await.contains("https://t.me/chan/1"));
        assert_eq!(store.list_posts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_reads_store_is_fail_open_for_links_only() {
        let store = MemoryStore::failing_reads();
        assert!(store.existing_links().await.is_empty());
        assert!(store.list_posts().await.is_err());
        assert!(store.list_channel_rows().await.is_err());
    }
}

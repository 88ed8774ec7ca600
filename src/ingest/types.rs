// src/ingest/types.rs
use std::collections::HashSet;
use std::fmt;

use anyhow::Result;

/// Platforms the pipeline knows how to pull content from.
///
/// The variant order is the order connectors run in and the order
/// per-source counters are reported in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Source {
    Telegram,
    Vk,
    YouTube,
    Rutube,
    Habr,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Telegram,
        Source::Vk,
        Source::YouTube,
        Source::Rutube,
        Source::Habr,
    ];

    /// Display name, also the exact string stored in the "Источник" column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Telegram => "Telegram",
            Source::Vk => "VK",
            Source::YouTube => "YouTube",
            Source::Rutube => "Rutube",
            Source::Habr => "Habr",
        }
    }

    /// Parses the store's source column back into a variant.
    /// Unknown labels yield `None`; rows with them are ignored by the
    /// channel resolver rather than treated as an error.
    pub fn from_store_name(name: &str) -> Option<Source> {
        match name.trim() {
            "Telegram" => Some(Source::Telegram),
            "VK" => Some(Source::Vk),
            "YouTube" => Some(Source::YouTube),
            "Rutube" => Some(Source::Rutube),
            "Habr" => Some(Source::Habr),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict labels produced by the analyzer. Anything the model returns
/// outside these three collapses to `Neutral`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
)]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
        }
    }

    /// Lenient parse: trims, accepts any case, defaults to `Neutral`.
    pub fn parse(label: &str) -> Sentiment {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum meaningful body length; shorter items are dropped before
/// enrichment and never reach the store.
pub const MIN_BODY_CHARS: usize = 5;

/// One post in the canonical cross-platform shape, ready for persistence.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CanonicalPost {
    pub title: String,
    pub body: String,
    /// Publication day, always "YYYY-MM-DD".
    pub published: String,
    pub views: u64,
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
    pub source: Source,
    /// Canonical permalink; doubles as the dedup key.
    pub link: String,
    pub sentiment: Sentiment,
    pub summary: String,
}

/// Permalinks already present in the store, used to skip known posts.
pub type LinkSet = HashSet<String>;

/// Returns true when an item should survive the dedup + minimum-length
/// gate. Every connector routes candidates through this before
/// enrichment, which is what makes back-to-back runs idempotent.
pub fn admit(existing: &LinkSet, link: &str, body: &str) -> bool {
    !existing.contains(link) && body.chars().count() >= MIN_BODY_CHARS
}

/// A single platform connector. Implementations fetch a bounded number of
/// recent items per target, skip anything already in `existing`, enrich
/// the rest, and return canonical posts.
///
/// A failing target inside `fetch` must not abort the whole call; only a
/// failure that prevents the connector from doing anything at all should
/// surface as `Err`, and even that is absorbed by the orchestrator.
#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    fn source(&self) -> Source;
    async fn fetch(&self, existing: &LinkSet, targets: &[String]) -> Result<Vec<CanonicalPost>>;
}

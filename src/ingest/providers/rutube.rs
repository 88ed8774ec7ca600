// src/ingest/providers/rutube.rs
//! Rutube connector: the public person API, no credentials. Targets may
//! arrive as numeric channel ids or as channel/user page URLs.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::enrich::SharedAnalyzer;
use crate::ingest::normalize::{day_from_partial, ellipsize};
use crate::ingest::providers::{browser_client, collect_targets, ITEMS_PER_TARGET};
use crate::ingest::types::{admit, CanonicalPost, LinkSet, Source, SourceConnector};

pub struct RutubeConnector {
    http: reqwest::Client,
    analyzer: SharedAnalyzer,
}

impl RutubeConnector {
    pub fn new(analyzer: SharedAnalyzer) -> Self {
        Self {
            http: browser_client(),
            analyzer,
        }
    }

    async fn fetch_person(
        &self,
        identifier: String,
        existing: &LinkSet,
    ) -> Result<Vec<CanonicalPost>> {
        let id = extract_rutube_id(&identifier);
        if id.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("https://rutube.ru/api/video/person/{id}/");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("rutube request failed")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(channel = %id, "rutube channel not found (404), check the id");
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            bail!("rutube api status {}", resp.status());
        }
        let feed: PersonFeed = resp.json().await.context("rutube response is not JSON")?;

        let mut posts = Vec::new();
        for video in feed.results.into_iter().take(ITEMS_PER_TARGET) {
            let link = format!("https://rutube.ru/video/{}/", video.id);
            let title = video.title.unwrap_or_default();
            let body = match video.description.filter(|d| !d.is_empty()) {
                Some(description) => description,
                None => title.clone(),
            };
            if !admit(existing, &link, &body) {
                debug!(%link, "skipping known or too-short video");
                continue;
            }
            let enrichment = self.analyzer.analyze(&body).await;
            posts.push(CanonicalPost {
                title: if title.is_empty() {
                    "Без названия".to_string()
                } else {
                    ellipsize(&title, 50)
                },
                body,
                published: day_from_partial(video.created_ts.as_deref().unwrap_or("")),
                views: video.hits.unwrap_or(0),
                // the feed carries no reaction or comment counters
                likes: 0,
                shares: 0,
                comments: 0,
                source: Source::Rutube,
                link,
                sentiment: enrichment.sentiment,
                summary: enrichment.summary,
            });
        }
        Ok(posts)
    }
}

#[async_trait::async_trait]
impl SourceConnector for RutubeConnector {
    fn source(&self) -> Source {
        Source::Rutube
    }

    async fn fetch(&self, existing: &LinkSet, targets: &[String]) -> Result<Vec<CanonicalPost>> {
        Ok(collect_targets(Source::Rutube, targets, |identifier| {
            self.fetch_person(identifier, existing)
        })
        .await)
    }
}

/// Reduces a channel reference to the bare person id: handles
/// `/channel/<id>/` and `/u/<name>/` URLs, passes bare ids through.
pub(crate) fn extract_rutube_id(raw: &str) -> String {
    let mut id = raw;
    if raw.contains("rutube.ru") {
        if let Some(tail) = raw.split("/channel/").nth(1) {
            id = tail.split('/').next().unwrap_or("");
        } else if let Some(tail) = raw.split("/u/").nth(1) {
            id = tail.split('/').next().unwrap_or("");
        }
    }
    id.trim().to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct PersonFeed {
    #[serde(default)]
    pub results: Vec<PersonVideo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PersonVideo {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_ts: Option<String>,
    pub hits: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_references_reduce_to_ids() {
        assert_eq!(extract_rutube_id("12345"), "12345");
        assert_eq!(extract_rutube_id("https://rutube.ru/channel/12345/"), "12345");
        assert_eq!(
            extract_rutube_id("https://rutube.ru/channel/98765/videos/"),
            "98765"
        );
        assert_eq!(extract_rutube_id("https://rutube.ru/u/mts/"), "mts");
        assert_eq!(extract_rutube_id("  12345  "), "12345");
        assert_eq!(extract_rutube_id(""), "");
    }

    #[test]
    fn person_feed_parses_with_sparse_fields() {
        let raw = r#"{
            "results": [
                {
                    "id": "aa11bb22",
                    "title": "Как устроен биллинг",
                    "description": "Разбор архитектуры биллинга",
                    "created_ts": "2024-01-15T09:30:00",
                    "hits": 4200
                },
                {"id": "cc33dd44", "title": "Шортс"}
            ]
        }"#;
        let feed: PersonFeed = serde_json::from_str(raw).unwrap();
        assert_eq!(feed.results.len(), 2);
        assert_eq!(feed.results[0].hits, Some(4200));
        assert_eq!(
            feed.results[0].created_ts.as_deref(),
            Some("2024-01-15T09:30:00")
        );
        assert!(feed.results[1].description.is_none());
        assert!(feed.results[1].hits.is_none());
    }

    #[test]
    fn empty_feed_parses() {
        let feed: PersonFeed = serde_json::from_str("{}").unwrap();
        assert!(feed.results.is_empty());
    }
}

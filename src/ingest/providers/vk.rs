// src/ingest/providers/vk.rs
//! VK connector: official `wall.get` JSON API, one call per community.
//! Needs a service access token; without one the connector is a no-op.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::enrich::SharedAnalyzer;
use crate::ingest::normalize::{clean_text, day_from_unix, ellipsize};
use crate::ingest::providers::{api_client, collect_targets, ITEMS_PER_TARGET};
use crate::ingest::types::{admit, CanonicalPost, LinkSet, Source, SourceConnector};

const API_URL: &str = "https://api.vk.com/method/wall.get";
const API_VERSION: &str = "5.199";

pub struct VkConnector {
    http: reqwest::Client,
    analyzer: SharedAnalyzer,
    access_token: Option<String>,
}

impl VkConnector {
    pub fn new(access_token: Option<String>, analyzer: SharedAnalyzer) -> Self {
        Self {
            http: api_client(),
            analyzer,
            access_token,
        }
    }

    async fn fetch_wall(
        &self,
        domain: String,
        token: &str,
        existing: &LinkSet,
    ) -> Result<Vec<CanonicalPost>> {
        let count = ITEMS_PER_TARGET.to_string();
        let envelope: WallEnvelope = self
            .http
            .get(API_URL)
            .query(&[
                ("domain", domain.as_str()),
                ("count", count.as_str()),
                ("access_token", token),
                ("v", API_VERSION),
            ])
            .send()
            .await
            .context("vk request failed")?
            .error_for_status()
            .context("vk request rejected")?
            .json()
            .await
            .context("vk response is not JSON")?;

        if let Some(err) = envelope.error {
            bail!("vk api error {}: {}", err.error_code, err.error_msg);
        }
        let items = envelope.response.map(|r| r.items).unwrap_or_default();

        let mut posts = Vec::new();
        for item in items {
            let link = wall_permalink(item.owner_id, item.id);
            let body = item.text;
            if !admit(existing, &link, &body) {
                debug!(%link, "skipping known or too-short wall post");
                continue;
            }
            let enrichment = self.analyzer.analyze(&body).await;
            posts.push(CanonicalPost {
                title: ellipsize(&clean_text(&body), 50),
                body,
                published: day_from_unix(item.date),
                views: item.views.unwrap_or_default().count,
                likes: item.likes.unwrap_or_default().count,
                shares: item.reposts.unwrap_or_default().count,
                comments: 0,
                source: Source::Vk,
                link,
                sentiment: enrichment.sentiment,
                summary: enrichment.summary,
            });
        }
        Ok(posts)
    }
}

#[async_trait::async_trait]
impl SourceConnector for VkConnector {
    fn source(&self) -> Source {
        Source::Vk
    }

    async fn fetch(&self, existing: &LinkSet, targets: &[String]) -> Result<Vec<CanonicalPost>> {
        let Some(token) = self.access_token.as_deref() else {
            debug!("no vk token configured, connector idle");
            return Ok(Vec::new());
        };
        Ok(collect_targets(Source::Vk, targets, |domain| {
            self.fetch_wall(domain, token, existing)
        })
        .await)
    }
}

/// Canonical permalink of a wall post; negative owner ids (communities)
/// keep their sign.
pub(crate) fn wall_permalink(owner_id: i64, post_id: i64) -> String {
    format!("https://vk.com/wall{owner_id}_{post_id}")
}

#[derive(Debug, Deserialize)]
pub(crate) struct WallEnvelope {
    pub response: Option<WallPayload>,
    pub error: Option<VkApiError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WallPayload {
    #[serde(default)]
    pub items: Vec<WallPost>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WallPost {
    pub id: i64,
    pub owner_id: i64,
    pub date: i64,
    #[serde(default)]
    pub text: String,
    pub views: Option<Counter>,
    pub likes: Option<Counter>,
    pub reposts: Option<Counter>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Counter {
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VkApiError {
    pub error_code: i64,
    pub error_msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALL_JSON: &str = r#"{
        "response": {
            "count": 2,
            "items": [
                {
                    "id": 77, "owner_id": -123, "date": 1705312800,
                    "text": "Запустили новый тариф",
                    "views": {"count": 900},
                    "likes": {"count": 31},
                    "reposts": {"count": 4}
                },
                {
                    "id": 78, "owner_id": -123, "date": 1705312900,
                    "text": "Пост без счётчиков"
                }
            ]
        }
    }"#;

    #[test]
    fn wall_payload_parses_with_missing_counters() {
        let envelope: WallEnvelope = serde_json::from_str(WALL_JSON).unwrap();
        assert!(envelope.error.is_none());
        let items = envelope.response.unwrap().items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].views.as_ref().unwrap().count, 900);
        assert_eq!(items[1].text, "Пост без счётчиков");
        assert!(items[1].views.is_none());
        assert_eq!(items[1].views.as_ref().map(|c| c.count).unwrap_or(0), 0);
    }

    #[test]
    fn error_envelope_parses() {
        let envelope: WallEnvelope = serde_json::from_str(
            r#"{"error": {"error_code": 5, "error_msg": "User authorization failed"}}"#,
        )
        .unwrap();
        let err = envelope.error.unwrap();
        assert_eq!(err.error_code, 5);
        assert!(envelope.response.is_none());
    }

    #[test]
    fn permalinks_keep_the_owner_sign() {
        assert_eq!(wall_permalink(-123, 77), "https://vk.com/wall-123_77");
        assert_eq!(wall_permalink(42, 1), "https://vk.com/wall42_1");
    }
}

// src/ingest/providers/youtube.rs
//! YouTube connector: Data API v3, two-step per channel (newest videos
//! via search, then per-video statistics). Targets are handles or raw
//! "UC..." channel ids; handles get resolved once per run and cached for
//! the duration of that run only.

use std::collections::HashMap;

use anyhow::{Context, Result};
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::enrich::SharedAnalyzer;
use crate::ingest::normalize::{day_from_partial, parse_metric};
use crate::ingest::providers::{api_client, ITEMS_PER_TARGET};
use crate::ingest::types::{admit, CanonicalPost, LinkSet, Source, SourceConnector};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

pub struct YouTubeConnector {
    http: reqwest::Client,
    analyzer: SharedAnalyzer,
    api_key: Option<String>,
}

impl YouTubeConnector {
    pub fn new(api_key: Option<String>, analyzer: SharedAnalyzer) -> Self {
        Self {
            http: api_client(),
            analyzer,
            api_key,
        }
    }

    /// Raw "UC..." ids pass through; anything else is looked up as a
    /// handle. `Ok(None)` means the lookup came back empty, which only
    /// skips this target.
    async fn resolve_channel_id(&self, key: &str, target: &str) -> Result<Option<String>> {
        if target.starts_with("UC") {
            return Ok(Some(target.to_string()));
        }
        let handle = normalize_handle(target);
        let envelope: ChannelsEnvelope = self
            .http
            .get(format!("{API_BASE}/channels"))
            .query(&[("part", "id"), ("forHandle", handle.as_str()), ("key", key)])
            .send()
            .await
            .context("youtube channels request failed")?
            .error_for_status()
            .context("youtube channels request rejected")?
            .json()
            .await
            .context("youtube channels response is not JSON")?;
        Ok(envelope.items.into_iter().next().map(|c| c.id))
    }

    async fn fetch_channel_videos(
        &self,
        key: &str,
        channel_id: &str,
        existing: &LinkSet,
    ) -> Result<Vec<CanonicalPost>> {
        let max_results = ITEMS_PER_TARGET.to_string();
        let envelope: SearchEnvelope = self
            .http
            .get(format!("{API_BASE}/search"))
            .query(&[
                ("part", "snippet"),
                ("channelId", channel_id),
                ("maxResults", max_results.as_str()),
                ("order", "date"),
                ("type", "video"),
                ("key", key),
            ])
            .send()
            .await
            .context("youtube search request failed")?
            .error_for_status()
            .context("youtube search request rejected")?
            .json()
            .await
            .context("youtube search response is not JSON")?;

        let mut posts = Vec::new();
        for item in envelope.items {
            let Some(video_id) = item.id.video_id else {
                continue;
            };
            let link = format!("https://www.youtube.com/watch?v={video_id}");
            if !admit(existing, &link, &item.snippet.description) {
                debug!(%link, "skipping known video or one without a description");
                continue;
            }

            let stats = self.fetch_video_stats(key, &video_id).await?;
            // sentiment is judged on the title; descriptions are mostly
            // boilerplate and links
            let enrichment = self.analyzer.analyze(&item.snippet.title).await;
            posts.push(CanonicalPost {
                title: item.snippet.title,
                body: item.snippet.description,
                published: day_from_partial(&item.snippet.published_at),
                views: stats.view_count.as_deref().map(parse_metric).unwrap_or(0),
                likes: stats.like_count.as_deref().map(parse_metric).unwrap_or(0),
                shares: 0,
                comments: stats
                    .comment_count
                    .as_deref()
                    .map(parse_metric)
                    .unwrap_or(0),
                source: Source::YouTube,
                link,
                sentiment: enrichment.sentiment,
                summary: enrichment.summary,
            });
        }
        Ok(posts)
    }

    async fn fetch_video_stats(&self, key: &str, video_id: &str) -> Result<VideoStatistics> {
        let envelope: VideosEnvelope = self
            .http
            .get(format!("{API_BASE}/videos"))
            .query(&[("part", "statistics"), ("id", video_id), ("key", key)])
            .send()
            .await
            .context("youtube videos request failed")?
            .error_for_status()
            .context("youtube videos request rejected")?
            .json()
            .await
            .context("youtube videos response is not JSON")?;
        Ok(envelope
            .items
            .into_iter()
            .next()
            .map(|v| v.statistics)
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl SourceConnector for YouTubeConnector {
    fn source(&self) -> Source {
        Source::YouTube
    }

    async fn fetch(&self, existing: &LinkSet, targets: &[String]) -> Result<Vec<CanonicalPost>> {
        let Some(key) = self.api_key.as_deref() else {
            debug!("no youtube api key configured, connector idle");
            return Ok(Vec::new());
        };

        // handle -> channel id, valid for this run only
        let mut resolved: HashMap<String, String> = HashMap::new();
        let mut out = Vec::new();
        for target in targets {
            let channel_id = match resolved.get(target) {
                Some(id) => Some(id.clone()),
                None => match self.resolve_channel_id(key, target).await {
                    Ok(Some(id)) => {
                        resolved.insert(target.clone(), id.clone());
                        Some(id)
                    }
                    Ok(None) => {
                        warn!(target = %target, "youtube channel not found, skipping");
                        None
                    }
                    Err(e) => {
                        warn!(target = %target, error = ?e, "youtube channel lookup failed, skipping");
                        counter!("ingest_target_errors_total").increment(1);
                        None
                    }
                },
            };
            let Some(channel_id) = channel_id else {
                continue;
            };
            match self.fetch_channel_videos(key, &channel_id, existing).await {
                Ok(mut posts) => out.append(&mut posts),
                Err(e) => {
                    warn!(target = %target, error = ?e, "target failed, skipping");
                    counter!("ingest_target_errors_total").increment(1);
                }
            }
        }
        Ok(out)
    }
}

/// Handles need their '@'; bare slugs from the monitoring table get one.
pub(crate) fn normalize_handle(target: &str) -> String {
    if target.starts_with('@') {
        target.to_string()
    } else {
        format!("@{target}")
    }
}

#[derive(Debug, Deserialize)]
struct ChannelsEnvelope {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchEnvelope {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    pub id: SearchId,
    pub snippet: Snippet,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Snippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "publishedAt", default)]
    pub published_at: String,
}

#[derive(Debug, Deserialize)]
struct VideosEnvelope {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    statistics: VideoStatistics,
}

/// The API returns counters as strings; absent ones count as zero.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct VideoStatistics {
    #[serde(rename = "viewCount")]
    pub view_count: Option<String>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<String>,
    #[serde(rename = "commentCount")]
    pub comment_count: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_get_their_at_sign_once() {
        assert_eq!(normalize_handle("mts"), "@mts");
        assert_eq!(normalize_handle("@mts"), "@mts");
    }

    #[test]
    fn search_envelope_parses_and_tolerates_missing_video_ids() {
        let raw = r#"{
            "items": [
                {
                    "id": {"kind": "youtube#video", "videoId": "abc123xyz"},
                    "snippet": {
                        "title": "Обзор тарифов",
                        "description": "Подробный разбор новых тарифов оператора",
                        "publishedAt": "2024-01-15T08:00:00Z"
                    }
                },
                {
                    "id": {"kind": "youtube#playlist"},
                    "snippet": {"title": "плейлист", "description": "", "publishedAt": ""}
                }
            ]
        }"#;
        let envelope: SearchEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.items.len(), 2);
        assert_eq!(envelope.items[0].id.video_id.as_deref(), Some("abc123xyz"));
        assert_eq!(envelope.items[0].snippet.title, "Обзор тарифов");
        assert!(envelope.items[1].id.video_id.is_none());
    }

    #[test]
    fn statistics_are_string_counters() {
        let raw = r#"{"viewCount": "1024", "likeCount": "55", "commentCount": "7"}"#;
        let stats: VideoStatistics = serde_json::from_str(raw).unwrap();
        assert_eq!(stats.view_count.as_deref().map(parse_metric), Some(1024));
        assert_eq!(stats.like_count.as_deref().map(parse_metric), Some(55));

        let empty: VideoStatistics = serde_json::from_str("{}").unwrap();
        assert!(empty.view_count.is_none());
    }
}

// src/ingest/providers/telegram.rs
//! Telegram connector. Channels are read through the public
//! `t.me/s/<channel>` preview page, which carries the last couple dozen
//! posts with text, view counters, reactions and permalinks; no bot
//! token or MTProto session required.

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::debug;

use crate::enrich::SharedAnalyzer;
use crate::ingest::normalize::{clean_text, day_from_rfc3339, ellipsize, parse_metric, today_day};
use crate::ingest::providers::{browser_client, collect_targets, ITEMS_PER_TARGET};
use crate::ingest::types::{admit, CanonicalPost, LinkSet, Source, SourceConnector};

pub struct TelegramConnector {
    http: reqwest::Client,
    analyzer: SharedAnalyzer,
}

impl TelegramConnector {
    pub fn new(analyzer: SharedAnalyzer) -> Self {
        Self {
            http: browser_client(),
            analyzer,
        }
    }

    async fn fetch_channel(
        &self,
        channel: String,
        existing: &LinkSet,
    ) -> Result<Vec<CanonicalPost>> {
        let url = format!("https://t.me/s/{channel}");
        let html = self
            .http
            .get(&url)
            .send()
            .await
            .context("telegram preview request failed")?
            .error_for_status()
            .context("telegram preview rejected")?
            .text()
            .await
            .context("telegram preview body unreadable")?;

        let messages = parse_channel_preview(&html);
        // the page lists oldest first; the tail is the fresh part
        let recent_from = messages.len().saturating_sub(ITEMS_PER_TARGET);

        let mut posts = Vec::new();
        for msg in &messages[recent_from..] {
            let link = format!("https://t.me/{}", msg.post);
            if !admit(existing, &link, &msg.text) {
                debug!(%link, "skipping known or too-short message");
                continue;
            }
            let enrichment = self.analyzer.analyze(&msg.text).await;
            posts.push(CanonicalPost {
                title: ellipsize(&msg.text, 50),
                body: msg.text.clone(),
                published: msg.published.clone(),
                views: msg.views,
                likes: msg.reactions,
                shares: 0,
                comments: 0,
                source: Source::Telegram,
                link,
                sentiment: enrichment.sentiment,
                summary: enrichment.summary,
            });
        }
        Ok(posts)
    }
}

#[async_trait::async_trait]
impl SourceConnector for TelegramConnector {
    fn source(&self) -> Source {
        Source::Telegram
    }

    async fn fetch(&self, existing: &LinkSet, targets: &[String]) -> Result<Vec<CanonicalPost>> {
        Ok(collect_targets(Source::Telegram, targets, |channel| {
            self.fetch_channel(channel, existing)
        })
        .await)
    }
}

/// One message bubble as extracted from the preview page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreviewMessage {
    /// "channel/id" from the bubble's data-post attribute.
    pub post: String,
    pub text: String,
    /// "YYYY-MM-DD"; today when the bubble has no parseable timestamp.
    pub published: String,
    pub views: u64,
    /// Sum over all reaction counters on the bubble.
    pub reactions: u64,
}

/// Extracts message bubbles from a `t.me/s/<channel>` page. Bubbles
/// without a permalink or without any text (service messages, bare
/// media) are dropped.
pub(crate) fn parse_channel_preview(html: &str) -> Vec<PreviewMessage> {
    let doc = Html::parse_document(html);
    let message_sel = Selector::parse("div.tgme_widget_message").unwrap();
    let text_sel = Selector::parse(".tgme_widget_message_text").unwrap();
    let views_sel = Selector::parse(".tgme_widget_message_views").unwrap();
    let time_sel = Selector::parse("time[datetime]").unwrap();
    let reaction_sel =
        Selector::parse(".tgme_widget_message_reactions .tgme_reaction_count").unwrap();

    let mut messages = Vec::new();
    for bubble in doc.select(&message_sel) {
        let Some(post) = bubble.value().attr("data-post") else {
            continue;
        };
        let text = match bubble.select(&text_sel).next() {
            Some(el) => clean_text(&el.text().collect::<Vec<_>>().join(" ")),
            None => continue,
        };
        if text.is_empty() {
            continue;
        }

        let views = bubble
            .select(&views_sel)
            .next()
            .map(|el| parse_metric(&el.text().collect::<Vec<_>>().join(" ")))
            .unwrap_or(0);
        let published = bubble
            .select(&time_sel)
            .next()
            .and_then(|el| el.value().attr("datetime"))
            .and_then(day_from_rfc3339)
            .unwrap_or_else(today_day);
        let reactions = bubble
            .select(&reaction_sel)
            .map(|el| parse_metric(&el.text().collect::<Vec<_>>().join(" ")))
            .sum();

        messages.push(PreviewMessage {
            post: post.to_string(),
            text,
            published,
            views,
            reactions,
        });
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREVIEW_PAGE: &str = r#"
        <html><body>
        <div class="tgme_widget_message" data-post="mts_news/101">
            <div class="tgme_widget_message_text">Первый пост про &laquo;запуск&raquo;
            нового сервиса</div>
            <div class="tgme_widget_message_reactions">
                <span class="tgme_reaction_count">25</span>
                <span class="tgme_reaction_count">1.5K</span>
            </div>
            <span class="tgme_widget_message_views">10.2K</span>
            <a class="tgme_widget_message_date" href="https://t.me/mts_news/101">
                <time datetime="2024-01-15T12:34:56+00:00"></time>
            </a>
        </div>
        <div class="tgme_widget_message" data-post="mts_news/102">
            <div class="tgme_widget_message_service">channel photo updated</div>
        </div>
        <div class="tgme_widget_message" data-post="mts_news/103">
            <div class="tgme_widget_message_text">Второй пост</div>
            <span class="tgme_widget_message_views">512</span>
        </div>
        </body></html>
    "#;

    #[test]
    fn preview_bubbles_become_messages() {
        let messages = parse_channel_preview(PREVIEW_PAGE);
        assert_eq!(messages.len(), 2);

        let first = &messages[0];
        assert_eq!(first.post, "mts_news/101");
        assert_eq!(first.text, "Первый пост про «запуск» нового сервиса");
        assert_eq!(first.views, 10_200);
        assert_eq!(first.reactions, 1_525);
        assert_eq!(first.published, "2024-01-15");

        let second = &messages[1];
        assert_eq!(second.post, "mts_news/103");
        assert_eq!(second.views, 512);
        assert_eq!(second.reactions, 0);
        // no timestamp in the bubble falls back to today
        assert_eq!(second.published.len(), 10);
    }

    #[test]
    fn empty_page_parses_to_nothing() {
        assert!(parse_channel_preview("<html><body></body></html>").is_empty());
        assert!(parse_channel_preview("").is_empty());
    }
}

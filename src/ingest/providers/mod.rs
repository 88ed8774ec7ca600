// src/ingest/providers/mod.rs
//! One connector per platform. Each pulls a handful of recent items per
//! monitored target, runs them through the dedup/length gate and the
//! analyzer, and hands back canonical posts.

pub mod habr;
pub mod rutube;
pub mod telegram;
pub mod vk;
pub mod youtube;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use metrics::counter;
use tracing::warn;

use crate::ingest::types::{CanonicalPost, Source};

/// How many recent items each connector takes per target.
pub const ITEMS_PER_TARGET: usize = 5;

/// Desktop browser identity for endpoints that reject anonymous clients
/// (Telegram previews, Rutube, Habr).
pub(crate) const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Plain API client (VK, YouTube).
pub(crate) fn api_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(4))
        .timeout(FETCH_TIMEOUT)
        .build()
        .expect("reqwest client")
}

/// Browser-imitating client for scraped pages.
pub(crate) fn browser_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(BROWSER_UA)
        .connect_timeout(Duration::from_secs(4))
        .timeout(FETCH_TIMEOUT)
        .build()
        .expect("reqwest client")
}

/// Runs `fetch_one` for every target, collecting whatever succeeds. A
/// failing target is logged and skipped so one dead channel never costs
/// the rest of the batch.
pub(crate) async fn collect_targets<F, Fut>(
    source: Source,
    targets: &[String],
    fetch_one: F,
) -> Vec<CanonicalPost>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Vec<CanonicalPost>>>,
{
    let mut out = Vec::new();
    for target in targets {
        match fetch_one(target.clone()).await {
            Ok(mut posts) => out.append(&mut posts),
            Err(e) => {
                warn!(source = %source, target = %target, error = ?e, "target failed, skipping");
                counter!("ingest_target_errors_total").increment(1);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Sentiment;

    fn post(link: &str) -> CanonicalPost {
        CanonicalPost {
            title: "t".into(),
            body: "body text".into(),
            published: "2024-01-15".into(),
            views: 0,
            likes: 0,
            shares: 0,
            comments: 0,
            source: Source::Telegram,
            link: link.into(),
            sentiment: Sentiment::Neutral,
            summary: String::new(),
        }
    }

    #[tokio::test]
    async fn one_bad_target_does_not_sink_the_batch() {
        let targets = vec!["a".to_string(), "broken".to_string(), "c".to_string()];
        let posts = collect_targets(Source::Telegram, &targets, |t| async move {
            if t == "broken" {
                anyhow::bail!("boom");
            }
            Ok(vec![post(&format!("https://t.me/{t}/1"))])
        })
        .await;
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].link, "https://t.me/a/1");
        assert_eq!(posts[1].link, "https://t.me/c/1");
    }

    #[tokio::test]
    async fn no_targets_means_no_work() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = AtomicUsize::new(0);
        let posts = collect_targets(Source::Vk, &[], |_t| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Vec::new()) }
        })
        .await;
        assert!(posts.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

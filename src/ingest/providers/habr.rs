// src/ingest/providers/habr.rs
//! Habr connector: two-stage scrape. The company articles listing gives
//! links; each new article page is then fetched for full text and its
//! counters. Everything rides on the page's tm-* class names.

use anyhow::{bail, Context, Result};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::enrich::SharedAnalyzer;
use crate::ingest::normalize::{
    clean_text, day_from_partial, ellipsize, parse_metric, today_day, truncate_chars,
};
use crate::ingest::providers::{collect_targets, BROWSER_UA, ITEMS_PER_TARGET};
use crate::ingest::types::{CanonicalPost, LinkSet, Source, SourceConnector, MIN_BODY_CHARS};

/// Titles longer than this do not fit the store column comfortably.
const TITLE_CAP: usize = 100;
/// Stored body cap; articles can be arbitrarily long.
const BODY_CAP: usize = 2000;

pub struct HabrConnector {
    http: reqwest::Client,
    analyzer: SharedAnalyzer,
}

impl HabrConnector {
    pub fn new(analyzer: SharedAnalyzer) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .connect_timeout(std::time::Duration::from_secs(4))
            .timeout(std::time::Duration::from_secs(10))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT_LANGUAGE,
                    reqwest::header::HeaderValue::from_static(
                        "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7",
                    ),
                );
                headers
            })
            .build()
            .expect("reqwest client");
        Self { http, analyzer }
    }

    async fn fetch_company(
        &self,
        company: String,
        existing: &LinkSet,
    ) -> Result<Vec<CanonicalPost>> {
        let company = clean_company(&company);
        if company.is_empty() {
            return Ok(Vec::new());
        }

        let listing_url = format!("https://habr.com/ru/companies/{company}/articles/");
        let resp = self
            .http
            .get(&listing_url)
            .send()
            .await
            .context("habr listing request failed")?;
        if !resp.status().is_success() {
            bail!("habr listing status {} for {}", resp.status(), company);
        }
        let listing_html = resp.text().await.context("habr listing body unreadable")?;
        let links = parse_article_links(&listing_html);

        let mut posts = Vec::new();
        for link in links {
            if existing.contains(&link) {
                debug!(%link, "skipping known article");
                continue;
            }
            info!(%link, "processing habr article");

            let article = match self.fetch_article(&link).await {
                Ok(article) => article,
                Err(e) => {
                    warn!(%link, error = ?e, "could not read article, skipping");
                    continue;
                }
            };
            if article.body.chars().count() < MIN_BODY_CHARS {
                debug!(%link, "article body too short, skipping");
                continue;
            }

            let enrichment = self.analyzer.analyze(&article.body).await;
            posts.push(CanonicalPost {
                title: truncate_chars(&article.title, TITLE_CAP),
                body: ellipsize(&article.body, BODY_CAP),
                published: article.date,
                views: article.views,
                likes: article.likes,
                // habr does not publish share counts
                shares: 0,
                comments: article.comments,
                source: Source::Habr,
                link,
                sentiment: enrichment.sentiment,
                summary: enrichment.summary,
            });
        }
        Ok(posts)
    }

    async fn fetch_article(&self, url: &str) -> Result<ArticleData> {
        let html = self
            .http
            .get(url)
            .send()
            .await
            .context("habr article request failed")?
            .error_for_status()
            .context("habr article rejected")?
            .text()
            .await
            .context("habr article body unreadable")?;
        Ok(parse_article(&html))
    }
}

#[async_trait::async_trait]
impl SourceConnector for HabrConnector {
    fn source(&self) -> Source {
        Source::Habr
    }

    async fn fetch(&self, existing: &LinkSet, targets: &[String]) -> Result<Vec<CanonicalPost>> {
        Ok(collect_targets(Source::Habr, targets, |company| {
            self.fetch_company(company, existing)
        })
        .await)
    }
}

/// Company slugs sometimes arrive as full page URLs; reduce to the slug.
pub(crate) fn clean_company(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("habr.com") {
        raw.split("/companies/")
            .nth(1)
            .and_then(|tail| tail.split('/').next())
            .unwrap_or("")
            .to_string()
    } else {
        raw.to_string()
    }
}

/// Article links from a company listing page, capped at
/// [`ITEMS_PER_TARGET`] and made absolute.
pub(crate) fn parse_article_links(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let item_sel = Selector::parse("article.tm-articles-list__item").unwrap();
    let link_sel = Selector::parse("h2.tm-title a").unwrap();

    let mut links = Vec::new();
    for item in doc.select(&item_sel) {
        let Some(href) = item
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let link = if href.starts_with('/') {
            format!("https://habr.com{href}")
        } else {
            href.to_string()
        };
        links.push(link);
        if links.len() == ITEMS_PER_TARGET {
            break;
        }
    }
    links
}

/// Everything extracted from one article page. All fields degrade
/// instead of failing: placeholder title, empty body, today's date,
/// zeroed counters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArticleData {
    pub title: String,
    pub body: String,
    pub date: String,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

pub(crate) fn parse_article(html: &str) -> ArticleData {
    let doc = Html::parse_document(html);
    let title_sel = Selector::parse("h1.tm-title").unwrap();
    let body_sel = Selector::parse("#post-content-body").unwrap();
    let body_fallback_sel = Selector::parse("div.tm-article-body").unwrap();
    let time_sel = Selector::parse("time[datetime]").unwrap();
    let votes_sel = Selector::parse("span.tm-votes-meter__value").unwrap();
    let counter_sel = Selector::parse("span.tm-icon-counter__value").unwrap();
    let comments_sel = Selector::parse("span.tm-article-comments-counter-link__value").unwrap();

    let title = doc
        .select(&title_sel)
        .next()
        .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Без названия".to_string());

    let body = doc
        .select(&body_sel)
        .next()
        .or_else(|| doc.select(&body_fallback_sel).next())
        .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default();

    let date = doc
        .select(&time_sel)
        .next()
        .and_then(|el| el.value().attr("datetime"))
        .map(day_from_partial)
        .unwrap_or_else(today_day);

    let likes = doc
        .select(&votes_sel)
        .next()
        .map(|el| parse_metric(&el.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or(0);

    let counters: Vec<u64> = doc
        .select(&counter_sel)
        .map(|el| parse_metric(&el.text().collect::<Vec<_>>().join(" ")))
        .collect();
    let views = largest_counter(&counters);

    let comments = doc
        .select(&comments_sel)
        .next()
        .map(|el| parse_metric(&el.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or(0);

    ArticleData {
        title,
        body,
        date,
        views,
        likes,
        comments,
    }
}

/// View-count heuristic: the article header mixes several icon counters
/// without distinguishing classes, and views is reliably the largest of
/// them. Swap this out if the markup ever starts labelling the counters.
pub(crate) fn largest_counter(values: &[u64]) -> u64 {
    values.iter().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r#"
        <html><body>
        <article class="tm-articles-list__item">
            <h2 class="tm-title"><a href="/ru/companies/mts_ai/articles/111/">Статья один</a></h2>
        </article>
        <article class="tm-articles-list__item">
            <h2 class="tm-title"><span>без ссылки</span></h2>
        </article>
        <article class="tm-articles-list__item">
            <h2 class="tm-title"><a href="https://habr.com/ru/companies/mts_ai/articles/222/">Статья два</a></h2>
        </article>
        </body></html>
    "#;

    const ARTICLE_PAGE: &str = r#"
        <html><body>
        <h1 class="tm-title">Как мы ускорили биллинг</h1>
        <time datetime="2024-01-15T08:00:00.000Z">15 янв</time>
        <div id="post-content-body">Первый абзац.
            Второй абзац со &laquo;скобками&raquo;.</div>
        <span class="tm-votes-meter__value">+42</span>
        <span class="tm-icon-counter__value">12</span>
        <span class="tm-icon-counter__value">1.5k</span>
        <span class="tm-article-comments-counter-link__value">17</span>
        </body></html>
    "#;

    #[test]
    fn listing_links_are_absolute_and_capped() {
        let links = parse_article_links(LISTING_PAGE);
        assert_eq!(
            links,
            vec![
                "https://habr.com/ru/companies/mts_ai/articles/111/".to_string(),
                "https://habr.com/ru/companies/mts_ai/articles/222/".to_string(),
            ]
        );
    }

    #[test]
    fn article_page_yields_full_data() {
        let article = parse_article(ARTICLE_PAGE);
        assert_eq!(article.title, "Как мы ускорили биллинг");
        assert_eq!(article.body, "Первый абзац. Второй абзац со «скобками».");
        assert_eq!(article.date, "2024-01-15");
        assert_eq!(article.likes, 42);
        assert_eq!(article.views, 1500);
        assert_eq!(article.comments, 17);
    }

    #[test]
    fn bare_page_degrades_to_defaults() {
        let article = parse_article("<html><body><p>ничего</p></body></html>");
        assert_eq!(article.title, "Без названия");
        assert_eq!(article.body, "");
        assert_eq!(article.date.len(), 10);
        assert_eq!(article.views, 0);
        assert_eq!(article.likes, 0);
        assert_eq!(article.comments, 0);
    }

    #[test]
    fn fallback_body_selector_is_used() {
        let html = r#"<div class="tm-article-body">запасной текст</div>"#;
        assert_eq!(parse_article(html).body, "запасной текст");
    }

    #[test]
    fn company_slugs_survive_url_cleanup() {
        assert_eq!(clean_company("mts_ai"), "mts_ai");
        assert_eq!(
            clean_company("https://habr.com/ru/companies/mts_ai/articles/"),
            "mts_ai"
        );
        assert_eq!(clean_company("  ozon  "), "ozon");
    }

    #[test]
    fn views_heuristic_takes_the_largest_counter() {
        assert_eq!(largest_counter(&[12, 1500, 3]), 1500);
        assert_eq!(largest_counter(&[]), 0);
    }
}

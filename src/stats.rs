// src/stats.rs
//! Read-only aggregation over stored posts. Pure functions over
//! `&[StoredPost]` so every report is trivially testable; the HTTP layer
//! only serializes what comes out of here.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::store::StoredPost;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Per-label post counts. Serialized with capitalized keys because that
/// is how the labels are stored and how the dashboard expects them.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    #[serde(rename = "Positive")]
    pub positive: usize,
    #[serde(rename = "Negative")]
    pub negative: usize,
    #[serde(rename = "Neutral")]
    pub neutral: usize,
}

impl SentimentCounts {
    /// Counts only the three known labels; returns whether the label was
    /// one of them.
    fn bump(&mut self, label: &str) -> bool {
        match label {
            "Positive" => self.positive += 1,
            "Negative" => self.negative += 1,
            "Neutral" => self.neutral += 1,
            _ => return false,
        }
        true
    }

    /// First label with the highest count, scanning Positive, Negative,
    /// Neutral in that order.
    pub fn dominant(&self) -> &'static str {
        let mut best = ("Positive", self.positive);
        if self.negative > best.1 {
            best = ("Negative", self.negative);
        }
        if self.neutral > best.1 {
            best = ("Neutral", self.neutral);
        }
        best.0
    }
}

/// Compact digest feeding the chat answer's context block.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsDigest {
    pub total_posts: usize,
    pub total_views: u64,
    pub top_likes_title: String,
    pub top_likes: u64,
    pub top_views_title: String,
    pub top_views: u64,
}

impl AnalyticsDigest {
    pub fn compute(posts: &[StoredPost]) -> Self {
        let mut digest = AnalyticsDigest {
            total_posts: posts.len(),
            total_views: 0,
            top_likes_title: "Без названия".to_string(),
            top_likes: 0,
            top_views_title: "Без названия".to_string(),
            top_views: 0,
        };
        let mut first = true;
        for post in posts {
            digest.total_views += post.views;
            if first || post.likes > digest.top_likes {
                digest.top_likes = post.likes;
                digest.top_likes_title = post.display_title().to_string();
            }
            if first || post.views > digest.top_views {
                digest.top_views = post.views;
                digest.top_views_title = post.display_title().to_string();
            }
            first = false;
        }
        digest
    }
}

// --- Overview ---

#[derive(Debug, Serialize)]
pub struct Overview {
    pub summary: OverviewSummary,
    pub sources: BTreeMap<String, SourceTotals>,
    pub sentiments: SentimentCounts,
    pub content_effectiveness: Effectiveness,
}

#[derive(Debug, Serialize)]
pub struct OverviewSummary {
    pub total_posts: usize,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_comments: u64,
    pub average_views: f64,
    pub average_likes: f64,
    pub engagement_rate: f64,
}

#[derive(Debug, Default, Serialize)]
pub struct SourceTotals {
    pub count: usize,
    pub views: u64,
    pub likes: u64,
}

#[derive(Debug, Serialize)]
pub struct Effectiveness {
    pub most_engaging_source: String,
    pub positive_content_ratio: f64,
    pub top_performing_metric: String,
}

/// Whole-dataset snapshot; `None` when there is nothing to aggregate.
pub fn overview(posts: &[StoredPost]) -> Option<Overview> {
    if posts.is_empty() {
        return None;
    }

    let total_posts = posts.len();
    let mut sources: BTreeMap<String, SourceTotals> = BTreeMap::new();
    let mut sentiments = SentimentCounts::default();
    let (mut total_views, mut total_likes, mut total_comments) = (0u64, 0u64, 0u64);

    for post in posts {
        let entry = sources.entry(post.source.clone()).or_default();
        entry.count += 1;
        entry.views += post.views;
        entry.likes += post.likes;
        sentiments.bump(&post.sentiment);
        total_views += post.views;
        total_likes += post.likes;
        total_comments += post.comments;
    }

    let average_views = total_views as f64 / total_posts as f64;
    let average_likes = total_likes as f64 / total_posts as f64;
    let engagement_rate = if total_views > 0 {
        total_likes as f64 / total_views as f64 * 100.0
    } else {
        0.0
    };

    let most_engaging_source = sources
        .iter()
        .fold(None::<(&String, u64)>, |best, (name, totals)| match best {
            Some((_, likes)) if totals.likes <= likes => best,
            _ => Some((name, totals.likes)),
        })
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| "N/A".to_string());

    Some(Overview {
        summary: OverviewSummary {
            total_posts,
            total_views,
            total_likes,
            total_comments,
            average_views: round2(average_views),
            average_likes: round2(average_likes),
            engagement_rate: round2(engagement_rate),
        },
        sources,
        content_effectiveness: Effectiveness {
            most_engaging_source,
            positive_content_ratio: round2(sentiments.positive as f64 / total_posts as f64 * 100.0),
            top_performing_metric: if total_views > total_likes {
                "Просмотры".to_string()
            } else {
                "Лайки".to_string()
            },
        },
        sentiments,
    })
}

// --- Sentiment report ---

#[derive(Debug, Serialize)]
pub struct SentimentReport {
    pub overall: SentimentOverall,
    pub by_source: BTreeMap<String, SourceSentiment>,
    pub engagement_by_sentiment: SentimentEngagement,
    pub insights: SentimentInsights,
}

#[derive(Debug, Serialize)]
pub struct SentimentOverall {
    pub counts: SentimentCounts,
    /// Empty map when there are no posts to take percentages of.
    pub percentages: BTreeMap<String, f64>,
    pub dominant_sentiment: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SourceSentiment {
    #[serde(flatten)]
    pub counts: SentimentCounts,
    pub total: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct SentimentEngagement {
    #[serde(rename = "Positive")]
    pub positive: u64,
    #[serde(rename = "Negative")]
    pub negative: u64,
    #[serde(rename = "Neutral")]
    pub neutral: u64,
}

#[derive(Debug, Serialize)]
pub struct SentimentInsights {
    pub total_analyzed: usize,
    pub most_positive_source: String,
    pub engagement_trend: String,
}

pub fn sentiment_report(posts: &[StoredPost]) -> SentimentReport {
    let mut counts = SentimentCounts::default();
    let mut by_source: BTreeMap<String, SourceSentiment> = BTreeMap::new();
    let mut engagement = SentimentEngagement::default();

    for post in posts {
        counts.bump(&post.sentiment);

        let entry = by_source.entry(post.source.clone()).or_default();
        if entry.counts.bump(&post.sentiment) {
            entry.total += 1;
        }

        let weight = post.views + post.likes;
        match post.sentiment.as_str() {
            "Positive" => engagement.positive += weight,
            "Negative" => engagement.negative += weight,
            "Neutral" => engagement.neutral += weight,
            _ => {}
        }
    }

    let total = posts.len();
    let mut percentages = BTreeMap::new();
    if total > 0 {
        for (label, count) in [
            ("Positive", counts.positive),
            ("Negative", counts.negative),
            ("Neutral", counts.neutral),
        ] {
            percentages.insert(label.to_string(), round2(count as f64 / total as f64 * 100.0));
        }
    }

    let most_positive_source = by_source
        .iter()
        .fold(None::<(&String, usize)>, |best, (name, s)| match best {
            Some((_, n)) if s.counts.positive <= n => best,
            _ => Some((name, s.counts.positive)),
        })
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| "N/A".to_string());

    SentimentReport {
        overall: SentimentOverall {
            dominant_sentiment: counts.dominant().to_string(),
            counts,
            percentages,
        },
        by_source,
        insights: SentimentInsights {
            total_analyzed: total,
            most_positive_source,
            engagement_trend: if engagement.positive > engagement.negative {
                "Positive".to_string()
            } else {
                "Neutral".to_string()
            },
        },
        engagement_by_sentiment: engagement,
    }
}

// --- Top content ---

/// Sortable metrics, addressed by their column names in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopMetric {
    Views,
    Likes,
    Shares,
    Comments,
}

impl TopMetric {
    pub const VALID_NAMES: [&'static str; 4] = ["Просмотры", "Лайки", "Репосты", "Комментарии"];

    pub fn parse(name: &str) -> Option<TopMetric> {
        match name {
            "Просмотры" => Some(TopMetric::Views),
            "Лайки" => Some(TopMetric::Likes),
            "Репосты" => Some(TopMetric::Shares),
            "Комментарии" => Some(TopMetric::Comments),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TopMetric::Views => "Просмотры",
            TopMetric::Likes => "Лайки",
            TopMetric::Shares => "Репосты",
            TopMetric::Comments => "Комментарии",
        }
    }

    fn value(&self, post: &StoredPost) -> u64 {
        match self {
            TopMetric::Views => post.views,
            TopMetric::Likes => post.likes,
            TopMetric::Shares => post.shares,
            TopMetric::Comments => post.comments,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TopContent {
    pub metric: String,
    pub source_filter: Option<String>,
    pub top_content: Vec<TopEntry>,
}

#[derive(Debug, Serialize)]
pub struct TopEntry {
    pub rank: usize,
    pub title: String,
    pub source: String,
    pub metric_value: u64,
    pub sentiment: String,
    pub date: String,
    pub link: String,
    pub ai_summary: String,
}

pub fn top_content(
    posts: &[StoredPost],
    metric: TopMetric,
    limit: usize,
    source_filter: Option<&str>,
) -> TopContent {
    let mut selected: Vec<&StoredPost> = posts
        .iter()
        .filter(|p| source_filter.map_or(true, |s| p.source == s))
        .collect();
    // stable sort: equal values keep their stored order
    selected.sort_by(|a, b| metric.value(b).cmp(&metric.value(a)));

    let top = selected
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(idx, p)| TopEntry {
            rank: idx + 1,
            title: p.display_title().to_string(),
            source: p.source.clone(),
            metric_value: metric.value(p),
            sentiment: p.sentiment.clone(),
            date: p.date.clone(),
            link: p.link.clone(),
            ai_summary: p.summary.clone(),
        })
        .collect();

    TopContent {
        metric: metric.as_str().to_string(),
        source_filter: source_filter.map(String::from),
        top_content: top,
    }
}

// --- Per-source performance ---

#[derive(Debug, Serialize)]
pub struct SourcePerformance {
    pub sources: BTreeMap<String, SourceStats>,
    pub comparison: Comparison,
}

#[derive(Debug, Default, Serialize)]
pub struct SourceStats {
    pub posts_count: usize,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_comments: u64,
    pub sentiments: SentimentCounts,
    pub posts: Vec<PostBrief>,
    pub average_views: f64,
    pub average_likes: f64,
    pub engagement_rate: f64,
    pub positive_ratio: f64,
}

#[derive(Debug, Serialize)]
pub struct PostBrief {
    pub title: String,
    pub views: u64,
    pub likes: u64,
    pub sentiment: String,
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct Comparison {
    pub best_engagement: String,
    pub most_active: String,
    pub most_positive: String,
}

pub fn source_performance(posts: &[StoredPost]) -> SourcePerformance {
    let mut sources: BTreeMap<String, SourceStats> = BTreeMap::new();

    for post in posts {
        let entry = sources.entry(post.source.clone()).or_default();
        entry.posts_count += 1;
        entry.total_views += post.views;
        entry.total_likes += post.likes;
        entry.total_comments += post.comments;
        entry.sentiments.bump(&post.sentiment);
        entry.posts.push(PostBrief {
            title: post.title.clone(),
            views: post.views,
            likes: post.likes,
            sentiment: post.sentiment.clone(),
            date: post.date.clone(),
        });
    }

    for stats in sources.values_mut() {
        let count = stats.posts_count as f64;
        stats.average_views = round2(stats.total_views as f64 / count);
        stats.average_likes = round2(stats.total_likes as f64 / count);
        stats.engagement_rate = if stats.total_views > 0 {
            round2(stats.total_likes as f64 / stats.total_views as f64 * 100.0)
        } else {
            0.0
        };
        stats.positive_ratio = round2(stats.sentiments.positive as f64 / count * 100.0);
    }

    fn pick<F: Fn(&SourceStats) -> f64>(
        sources: &BTreeMap<String, SourceStats>,
        key: F,
    ) -> String {
        sources
            .iter()
            .fold(None::<(&String, f64)>, |best, (name, s)| match best {
                Some((_, v)) if key(s) <= v => best,
                _ => Some((name, key(s))),
            })
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "N/A".to_string())
    }

    let comparison = Comparison {
        best_engagement: pick(&sources, |s| s.engagement_rate),
        most_active: pick(&sources, |s| s.posts_count as f64),
        most_positive: pick(&sources, |s| s.positive_ratio),
    };

    SourcePerformance {
        sources,
        comparison,
    }
}

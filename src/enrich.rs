// src/enrich.rs
//! LLM enrichment: sentiment + one-sentence summary per post, and the
//! data-grounded chat answer. The pipeline never fails because of this
//! module; every remote problem collapses into a placeholder verdict.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::ingest::normalize::truncate_chars;
use crate::ingest::types::Sentiment;
use crate::stats::AnalyticsDigest;
use crate::store::StoredPost;

pub const AUTO_SUMMARY_PLACEHOLDER: &str = "Авто-саммари";
pub const ANALYSIS_ERROR_PLACEHOLDER: &str = "Ошибка анализа";
pub const NO_DATA_ANSWER: &str = "У меня пока нет данных для анализа.";

/// Inputs shorter than this are not worth a model call.
const MIN_ANALYZE_CHARS: usize = 5;
/// Hard cap on text sent per enrichment request.
const ANALYZE_INPUT_CAP: usize = 800;
/// How many recent posts the chat answer gets as context.
const ANSWER_CONTEXT_POSTS: usize = 20;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct:free";

const ANALYZE_TIMEOUT: Duration = Duration::from_secs(10);
const ANSWER_TIMEOUT: Duration = Duration::from_secs(30);

/// Verdict attached to every canonical post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub sentiment: Sentiment,
    pub summary: String,
}

impl Enrichment {
    /// Placeholder used when no model call was made (no key, text too
    /// short).
    pub fn auto() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            summary: AUTO_SUMMARY_PLACEHOLDER.to_string(),
        }
    }

    /// Placeholder used when a model call was attempted and failed.
    pub fn failed() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            summary: ANALYSIS_ERROR_PLACEHOLDER.to_string(),
        }
    }
}

/// Analyzer the connectors and the chat endpoint talk to.
///
/// `analyze` is infallible: whatever happens, the caller gets a usable
/// verdict. `answer` returns `None` on failure so the caller can build
/// its own degraded reply.
#[async_trait::async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Enrichment;
    async fn answer(&self, prompt: &str) -> Option<String>;
    fn name(&self) -> &'static str;
}

pub type SharedAnalyzer = Arc<dyn TextAnalyzer>;

/// Builds the analyzer from config: the real OpenRouter client when a
/// key is present, the disabled stand-in otherwise.
pub fn build_analyzer(cfg: &AppConfig) -> SharedAnalyzer {
    match cfg.openrouter_api_key.as_deref() {
        Some(key) if !key.is_empty() => Arc::new(OpenRouterAnalyzer::new(
            key.to_string(),
            cfg.openrouter_model.clone(),
        )),
        _ => {
            info!("no OpenRouter key configured, enrichment disabled");
            Arc::new(DisabledAnalyzer)
        }
    }
}

fn json_object_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    // greedy across newlines: first '{' to last '}'
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

/// Pulls the first-to-last-brace JSON object out of a model reply that
/// may be wrapped in prose or code fences.
pub fn extract_json_object(reply: &str) -> Option<&str> {
    json_object_re().find(reply).map(|m| m.as_str())
}

#[derive(Deserialize)]
struct LlmVerdict {
    sentiment: Option<String>,
    summary: Option<String>,
}

/// Parses a raw model reply into an enrichment. `None` means the reply
/// carried no usable JSON object.
pub fn enrichment_from_reply(reply: &str) -> Option<Enrichment> {
    let object = extract_json_object(reply)?;
    let verdict: LlmVerdict = serde_json::from_str(object).ok()?;
    Some(Enrichment {
        sentiment: Sentiment::parse(verdict.sentiment.as_deref().unwrap_or("")),
        summary: verdict.summary.unwrap_or_default(),
    })
}

/// OpenRouter-backed analyzer (chat completions API).
pub struct OpenRouterAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenRouterAnalyzer {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("media-pulse-analyzer/0.1 (+github.com/mediapulse/media-pulse-analyzer)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(ANALYZE_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
        }
    }

    /// One chat-completions round trip; `None` on any transport, status,
    /// or shape problem.
    async fn chat(&self, prompt: &str, timeout: Duration) -> Option<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };

        counter!("enrich_requests_total").increment(1);
        let resp = self
            .http
            .post(OPENROUTER_URL)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://github.com/mediapulse/media-pulse-analyzer")
            .header("X-Title", "media-pulse-analyzer")
            .timeout(timeout)
            .json(&req)
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "openrouter rejected the request");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        body.choices.into_iter().next().map(|c| c.message.content)
    }
}

#[async_trait::async_trait]
impl TextAnalyzer for OpenRouterAnalyzer {
    async fn analyze(&self, text: &str) -> Enrichment {
        if self.api_key.is_empty() || text.chars().count() < MIN_ANALYZE_CHARS {
            return Enrichment::auto();
        }
        let prompt = format!(
            "Проанализируй текст. 1. Тональность (Positive/Negative/Neutral). 2. Саммари (1 предложение).\nТекст: {}\nВерни JSON: {{\"sentiment\": \"...\", \"summary\": \"...\"}}",
            truncate_chars(text, ANALYZE_INPUT_CAP)
        );
        match self.chat(&prompt, ANALYZE_TIMEOUT).await {
            Some(reply) => enrichment_from_reply(&reply).unwrap_or_else(|| {
                debug!(reply_len = reply.chars().count(), "model reply carried no JSON verdict");
                counter!("enrich_failures_total").increment(1);
                Enrichment::failed()
            }),
            None => {
                counter!("enrich_failures_total").increment(1);
                Enrichment::failed()
            }
        }
    }

    async fn answer(&self, prompt: &str) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }
        self.chat(prompt, ANSWER_TIMEOUT).await
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

/// Stand-in when no key is configured: never touches the network.
pub struct DisabledAnalyzer;

#[async_trait::async_trait]
impl TextAnalyzer for DisabledAnalyzer {
    async fn analyze(&self, _text: &str) -> Enrichment {
        Enrichment::auto()
    }
    async fn answer(&self, _prompt: &str) -> Option<String> {
        None
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

// --- Test helper: deterministic analyzer double ---

/// Fixed-output analyzer for tests.
#[derive(Clone)]
pub struct MockAnalyzer {
    pub fixed: Enrichment,
    pub reply: Option<String>,
}

impl MockAnalyzer {
    pub fn new(sentiment: Sentiment, summary: &str) -> Self {
        Self {
            fixed: Enrichment {
                sentiment,
                summary: summary.to_string(),
            },
            reply: None,
        }
    }
}

#[async_trait::async_trait]
impl TextAnalyzer for MockAnalyzer {
    async fn analyze(&self, _text: &str) -> Enrichment {
        self.fixed.clone()
    }
    async fn answer(&self, _prompt: &str) -> Option<String> {
        self.reply.clone()
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Answers a free-form question about collected posts, grounding the
/// model in aggregate stats plus the most recent entries. Falls back to
/// a canned line naming the top post when the model is unreachable.
pub async fn smart_answer(
    analyzer: &dyn TextAnalyzer,
    posts: &[StoredPost],
    question: &str,
) -> String {
    if posts.is_empty() {
        return NO_DATA_ANSWER.to_string();
    }

    let digest = AnalyticsDigest::compute(posts);
    let mut context = String::new();
    context.push_str("ВАЖНАЯ СТАТИСТИКА:\n");
    context.push_str(&format!("- Всего постов: {}\n", digest.total_posts));
    context.push_str(&format!("- Суммарные просмотры: {}\n", digest.total_views));
    context.push_str(&format!(
        "- Самый залайканный пост: \"{}\" ({} лайков)\n",
        digest.top_likes_title, digest.top_likes
    ));
    context.push_str(&format!(
        "- Самый просматриваемый пост: \"{}\" ({} просмотров)\n",
        digest.top_views_title, digest.top_views
    ));
    context.push_str("\nПОСЛЕДНИЕ ПУБЛИКАЦИИ:\n");
    for post in posts.iter().rev().take(ANSWER_CONTEXT_POSTS) {
        context.push_str(&format!(
            "- [{}] {} | Лайков: {} | Тон: {}\n",
            post.source,
            truncate_chars(post.display_title(), 50),
            post.likes,
            post.sentiment
        ));
    }

    let prompt = format!(
        "Ты аналитик данных. Отвечай на вопрос, опираясь только на статистику и список публикаций ниже.\n\n{}\nВОПРОС ПОЛЬЗОВАТЕЛЯ: {}",
        context, question
    );

    match analyzer.answer(&prompt).await {
        Some(reply) => reply,
        None => format!(
            "Нейросеть временно недоступна, но я знаю, что топ по лайкам: {}",
            digest.top_likes_title
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_embedded_json_object() {
        let reply = "Вот результат:\n```json\n{\"sentiment\": \"Positive\", \"summary\": \"Ок\"}\n```";
        let obj = extract_json_object(reply).unwrap();
        assert!(obj.starts_with('{') && obj.ends_with('}'));
        let e = enrichment_from_reply(reply).unwrap();
        assert_eq!(e.sentiment, Sentiment::Positive);
        assert_eq!(e.summary, "Ок");
    }

    #[test]
    fn missing_keys_default_instead_of_failing() {
        let e = enrichment_from_reply("{\"summary\": \"только саммари\"}").unwrap();
        assert_eq!(e.sentiment, Sentiment::Neutral);
        assert_eq!(e.summary, "только саммари");

        let e = enrichment_from_reply("{}").unwrap();
        assert_eq!(e.sentiment, Sentiment::Neutral);
        assert_eq!(e.summary, "");
    }

    #[test]
    fn prose_without_json_yields_none() {
        assert!(enrichment_from_reply("Не могу помочь с этим.").is_none());
        assert!(enrichment_from_reply("").is_none());
    }

    #[test]
    fn unknown_sentiment_label_collapses_to_neutral() {
        let e = enrichment_from_reply("{\"sentiment\": \"mixed\", \"summary\": \"x\"}").unwrap();
        assert_eq!(e.sentiment, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn empty_key_short_circuits_without_network() {
        let analyzer = OpenRouterAnalyzer::new(String::new(), DEFAULT_MODEL.to_string());
        let e = analyzer.analyze("длинный осмысленный текст для анализа").await;
        assert_eq!(e, Enrichment::auto());
        assert_eq!(analyzer.answer("вопрос").await, None);
    }

    #[tokio::test]
    async fn short_text_gets_the_auto_placeholder() {
        let analyzer = OpenRouterAnalyzer::new("key".to_string(), DEFAULT_MODEL.to_string());
        assert_eq!(analyzer.analyze("ok").await, Enrichment::auto());
    }

    #[tokio::test]
    async fn disabled_analyzer_is_inert() {
        let analyzer = DisabledAnalyzer;
        assert_eq!(analyzer.analyze("что угодно").await, Enrichment::auto());
        assert_eq!(analyzer.answer("вопрос").await, None);
        assert_eq!(analyzer.name(), "disabled");
    }
}

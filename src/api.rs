use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::enrich::{smart_answer, SharedAnalyzer};
use crate::stats::{self, TopMetric};
use crate::store::{fields, SharedStore, StoredPost};

#[derive(Clone)]
pub struct AppState {
    store: SharedStore,
    analyzer: SharedAnalyzer,
}

pub fn create_router(store: SharedStore, analyzer: SharedAnalyzer) -> Router {
    let state = AppState { store, analyzer };

    Router::new()
        .route("/api/info", get(system_info))
        .route("/api/data", get(all_data))
        .route("/api/stats/overview", get(overview_stats))
        .route("/api/analytics/sentiment", get(sentiment_analytics))
        .route("/api/top/content", get(top_content))
        .route("/api/sources/performance", get(sources_performance))
        .route("/api/health", get(health_check))
        .route("/api/export/csv", get(export_csv))
        .route("/chat", post(chat_api))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Store reads on the query side fail open the same way ingestion reads
/// do: an unreachable store serves as an empty dataset.
async fn load_posts(state: &AppState) -> Vec<StoredPost> {
    match state.store.list_posts().await {
        Ok(posts) => posts,
        Err(err) => {
            warn!(error = %err, "store read failed, serving empty dataset");
            Vec::new()
        }
    }
}

async fn system_info(State(state): State<AppState>) -> Json<Value> {
    let total = load_posts(&state).await.len();
    Json(json!({
        "project": "Media Pulse Analyzer",
        "description": "Умная система анализа контента из социальных сетей с AI-аналитикой",
        "version": "1.0",
        "features": [
            "Автоматический сбор данных из соцсетей",
            "AI-анализ тональности контента",
            "Генерация саммари через LLM",
            "Визуализация эффективности контента"
        ],
        "data_sources": [
            {
                "name": "Telegram",
                "status": "active",
                "collected_data": [
                    "Текст постов", "Просмотры", "Лайки", "Реакции",
                    "Дата публикации", "Тональность", "AI-саммари"
                ]
            },
            {
                "name": "VK",
                "status": "active",
                "collected_data": [
                    "Посты", "Просмотры", "Лайки", "Репосты",
                    "Дата публикации", "Тональность", "AI-анализ"
                ]
            },
            {
                "name": "YouTube",
                "status": "active",
                "collected_data": [
                    "Название видео", "Просмотры", "Лайки", "Комментарии",
                    "Дата публикации", "Тональность", "AI-саммари"
                ]
            },
            {
                "name": "Rutube",
                "status": "active",
                "collected_data": [
                    "Название видео", "Описание", "Просмотры",
                    "Дата публикации", "Тональность", "AI-саммари"
                ]
            },
            {
                "name": "Habr",
                "status": "active",
                "collected_data": [
                    "Технические статьи", "Просмотры", "Лайки", "Комментарии",
                    "Дата публикации", "Тональность", "AI-анализ"
                ]
            }
        ],
        "ai_capabilities": [
            "Анализ тональности (Positive/Negative/Neutral)",
            "Автоматическое саммари контента",
            "Ответы на вопросы о контенте",
            "Анализ эффективности публикаций"
        ],
        "total_records": total
    }))
}

#[derive(serde::Deserialize)]
struct DataQuery {
    #[serde(default = "default_data_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    sentiment: Option<String>,
}

fn default_data_limit() -> usize {
    100
}

async fn all_data(State(state): State<AppState>, Query(q): Query<DataQuery>) -> Json<Value> {
    let posts = load_posts(&state).await;

    let filtered: Vec<&StoredPost> = posts
        .iter()
        .filter(|p| q.source.as_deref().map_or(true, |s| p.source == s))
        .filter(|p| q.sentiment.as_deref().map_or(true, |s| p.sentiment == s))
        .collect();

    let total = filtered.len();
    let page: Vec<Value> = filtered
        .into_iter()
        .skip(q.offset)
        .take(q.limit)
        .enumerate()
        .map(|(idx, p)| {
            json!({
                "id": format!("{}_{}", p.source, idx + q.offset),
                "fields": Value::Object(p.to_fields()),
                "metadata": {
                    "text_length": p.body.chars().count(),
                    "has_ai_summary": !p.summary.is_empty(),
                },
            })
        })
        .collect();

    Json(json!({
        "total": total,
        "limit": q.limit,
        "offset": q.offset,
        "filters": {
            "source": q.source,
            "sentiment": q.sentiment,
        },
        "data": page,
    }))
}

async fn overview_stats(State(state): State<AppState>) -> Response {
    let posts = load_posts(&state).await;
    match stats::overview(&posts) {
        Some(overview) => Json(overview).into_response(),
        None => Json(json!({"message": "Нет данных для анализа"})).into_response(),
    }
}

async fn sentiment_analytics(State(state): State<AppState>) -> Response {
    let posts = load_posts(&state).await;
    Json(stats::sentiment_report(&posts)).into_response()
}

#[derive(serde::Deserialize)]
struct TopQuery {
    #[serde(default = "default_top_metric")]
    metric: String,
    #[serde(default = "default_top_limit")]
    limit: usize,
    #[serde(default)]
    source: Option<String>,
}

fn default_top_metric() -> String {
    "Просмотры".to_string()
}

fn default_top_limit() -> usize {
    10
}

async fn top_content(State(state): State<AppState>, Query(q): Query<TopQuery>) -> Response {
    let Some(metric) = TopMetric::parse(&q.metric) else {
        let detail = format!(
            "Недопустимая метрика. Допустимые значения: {}",
            TopMetric::VALID_NAMES.join(", ")
        );
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": detail}))).into_response();
    };

    let posts = load_posts(&state).await;
    Json(stats::top_content(
        &posts,
        metric,
        q.limit,
        q.source.as_deref(),
    ))
    .into_response()
}

async fn sources_performance(State(state): State<AppState>) -> Response {
    let posts = load_posts(&state).await;
    Json(stats::source_performance(&posts)).into_response()
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    match state.store.list_posts().await {
        Ok(posts) => {
            let sources: std::collections::BTreeSet<&str> =
                posts.iter().map(|p| p.source.as_str()).collect();
            Json(json!({
                "status": "healthy",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "data_available": !posts.is_empty(),
                "total_records": posts.len(),
                "sources_available": sources,
            }))
        }
        Err(err) => Json(json!({
            "status": "unhealthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "error": err.to_string(),
        })),
    }
}

#[derive(serde::Deserialize)]
struct ExportQuery {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    sentiment: Option<String>,
}

async fn export_csv(State(state): State<AppState>, Query(q): Query<ExportQuery>) -> Response {
    let posts = load_posts(&state).await;
    let selected: Vec<&StoredPost> = posts
        .iter()
        .filter(|p| q.source.as_deref().map_or(true, |s| p.source == s))
        .filter(|p| q.sentiment.as_deref().map_or(true, |s| p.sentiment == s))
        .collect();

    if selected.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Нет данных для экспорта"})),
        )
            .into_response();
    }

    let body = render_csv(&selected);
    let filename = format!(
        "content_analysis_{}.csv",
        chrono::Utc::now().format("%Y%m%d_%H%M")
    );
    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={filename}"),
        ),
    ];
    (headers, body).into_response()
}

fn render_csv(posts: &[&StoredPost]) -> String {
    let mut out = String::new();
    out.push_str(&[
        fields::TITLE,
        fields::BODY,
        fields::DATE,
        fields::VIEWS,
        fields::LIKES,
        fields::SHARES,
        fields::COMMENTS,
        fields::SOURCE,
        fields::LINK,
        fields::SENTIMENT,
        fields::SUMMARY,
    ]
    .join(","));
    out.push_str("\r\n");

    for p in posts {
        let row = [
            csv_field(&p.title),
            csv_field(&p.body),
            csv_field(&p.date),
            p.views.to_string(),
            p.likes.to_string(),
            p.shares.to_string(),
            p.comments.to_string(),
            csv_field(&p.source),
            csv_field(&p.link),
            csv_field(&p.sentiment),
            csv_field(&p.summary),
        ]
        .join(",");
        out.push_str(&row);
        out.push_str("\r\n");
    }
    out
}

/// Quote a CSV value when it carries a separator, quote or line break;
/// inner quotes are doubled.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[derive(serde::Deserialize)]
struct ChatRequest {
    question: String,
}

#[derive(serde::Serialize)]
struct ChatResponse {
    answer: String,
}

async fn chat_api(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let posts = load_posts(&state).await;
    let answer = smart_answer(state.analyzer.as_ref(), &posts, &req.question).await;
    Json(ChatResponse { answer })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_field_quotes_only_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn csv_renders_header_and_rows() {
        let post = StoredPost {
            title: "Заголовок".to_string(),
            body: "текст, с запятой".to_string(),
            date: "2024-01-15".to_string(),
            views: 120,
            likes: 5,
            shares: 1,
            comments: 2,
            source: "Habr".to_string(),
            link: "https://habr.com/ru/articles/1/".to_string(),
            sentiment: "Positive".to_string(),
            summary: String::new(),
        };
        let csv = render_csv(&[&post]);
        let mut lines = csv.split("\r\n");
        assert!(lines.next().is_some_and(|h| h.starts_with("Название,")));
        let row = lines.next().unwrap_or_default();
        assert!(row.contains("\"текст, с запятой\""));
        assert!(row.contains("120"));
    }
}

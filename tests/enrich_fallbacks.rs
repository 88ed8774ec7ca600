// tests/enrich_fallbacks.rs
//
// The question-answering entry point must always come back with prose:
// a canned no-data line, the model's reply when one arrives, and a
// locally computed top-post line when the model is unreachable.

use media_pulse_analyzer::enrich::{
    smart_answer, DisabledAnalyzer, MockAnalyzer, NO_DATA_ANSWER,
};
use media_pulse_analyzer::ingest::types::Sentiment;
use media_pulse_analyzer::store::StoredPost;

fn post(title: &str, views: u64, likes: u64) -> StoredPost {
    StoredPost {
        title: title.to_string(),
        body: "текст".to_string(),
        date: "2024-01-15".to_string(),
        views,
        likes,
        shares: 0,
        comments: 0,
        source: "Telegram".to_string(),
        link: format!("https://t.me/chan/{likes}"),
        sentiment: "Neutral".to_string(),
        summary: String::new(),
    }
}

#[tokio::test]
async fn no_posts_short_circuits_to_canned_answer() {
    let analyzer = MockAnalyzer::new(Sentiment::Neutral, "не должно использоваться");
    let answer = smart_answer(&analyzer, &[], "Что нового?").await;
    assert_eq!(answer, NO_DATA_ANSWER);
}

#[tokio::test]
async fn model_reply_is_passed_through() {
    let mut analyzer = MockAnalyzer::new(Sentiment::Neutral, "");
    analyzer.reply = Some("Лучше всего заходят короткие посты.".to_string());

    let posts = vec![post("Пост А", 100, 5), post("Пост Б", 50, 9)];
    let answer = smart_answer(&analyzer, &posts, "Какие посты заходят?").await;
    assert_eq!(answer, "Лучше всего заходят короткие посты.");
}

#[tokio::test]
async fn unreachable_model_falls_back_to_top_liked_post() {
    let posts = vec![
        post("Обычный пост", 500, 2),
        post("Хит недели", 100, 42),
    ];
    let answer = smart_answer(&DisabledAnalyzer, &posts, "Что популярно?").await;
    assert!(
        answer.contains("Хит недели"),
        "fallback must name the top-liked post, got: {answer}"
    );
    assert!(!answer.is_empty());
}

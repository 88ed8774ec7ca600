// src/ingest/normalize.rs
//! Tolerant parsing helpers shared by all connectors: human-formatted
//! metric tokens, assorted timestamp shapes, and scraped-text cleanup.
//! Nothing in here returns an error; malformed input degrades to a
//! neutral value (0, today, empty string).

use once_cell::sync::OnceCell;
use regex::Regex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn ws_collapse_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Decodes HTML entities and collapses whitespace runs (including
/// newlines) into single spaces.
pub fn clean_text(input: &str) -> String {
    let decoded = html_escape::decode_html_entities(input);
    ws_collapse_re().replace_all(decoded.trim(), " ").to_string()
}

/// Parses display counters like "120", "1.5K", "2,3k", "1m", "+7" into a
/// count. Suffix `k` multiplies by 1 000, `m` by 1 000 000; a comma is
/// accepted as the decimal separator. Anything unparseable is 0.
pub fn parse_metric(raw: &str) -> u64 {
    let token = raw.trim().replace('+', "").replace(',', ".");
    if token.is_empty() {
        return 0;
    }
    let lower = token.to_ascii_lowercase();
    if let Some(num) = lower.strip_suffix('k') {
        return num
            .trim()
            .parse::<f64>()
            .map(|v| (v * 1_000.0) as u64)
            .unwrap_or(0);
    }
    if let Some(num) = lower.strip_suffix('m') {
        return num
            .trim()
            .parse::<f64>()
            .map(|v| (v * 1_000_000.0) as u64)
            .unwrap_or(0);
    }
    lower.parse::<f64>().map(|v| v as u64).unwrap_or(0)
}

/// Today's date in the canonical "YYYY-MM-DD" form (UTC).
pub fn today_day() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Unix seconds to "YYYY-MM-DD"; out-of-range values fall back to today.
pub fn day_from_unix(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(today_day)
}

/// Strict RFC 3339 parse (as found in `datetime` attributes), reduced to
/// the day. Returns `None` when the timestamp does not parse.
pub fn day_from_rfc3339(ts: &str) -> Option<String> {
    OffsetDateTime::parse(ts, &Rfc3339).ok().map(|dt| {
        let date = dt.to_offset(time::UtcOffset::UTC).date();
        format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    })
}

/// Best-effort day from a loosely ISO-shaped timestamp ("2024-01-15",
/// "2024-01-15T10:00:00Z", with or without offset). Takes the date part
/// before any 'T'; anything that does not look like a full day falls
/// back to today.
pub fn day_from_partial(ts: &str) -> String {
    let head = ts.split('T').next().unwrap_or("").trim();
    let day: String = head.chars().take(10).collect();
    if day.chars().count() == 10 && day.chars().filter(|c| *c == '-').count() == 2 {
        day
    } else {
        today_day()
    }
}

/// First `max` characters of `s`, no marker appended.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Truncates to `max` characters and appends "..." only when something
/// was actually cut off.
pub fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", truncate_chars(s, max))
    }
}

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_TITLE_CHARS: usize = 100;
const DEFAULT_TITLE: &str = "Chat Entry";

static SPEAKER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(User:|Assistant:|ChatGPT:|AI:)\s*").expect("valid speaker regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChat {
    pub title: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub content: String,
}

/// Derives the page title from the first line and resolves the page date,
/// falling back to `today` when no usable date was supplied.
pub fn parse_chat(content: &str, date: Option<&str>, today: NaiveDate) -> ParsedChat {
    let first_line = content.trim().split('\n').next().unwrap_or_default();
    let truncated: String = first_line.chars().take(MAX_TITLE_CHARS).collect();
    let title = SPEAKER_PREFIX.replace(&truncated, "").trim_end().to_string();

    let resolved = date
        .filter(|raw| !raw.trim().is_empty())
        .and_then(parse_iso_date)
        .unwrap_or(today);

    ParsedChat {
        title: if title.is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            title
        },
        date: resolved.format("%Y-%m-%d").to_string(),
        content: content.to_string(),
    }
}

/// Accepts plain dates, RFC 3339 timestamps (including a trailing `Z`) and
/// naive `T`/space separated date-times.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|timestamp| timestamp.date())
}

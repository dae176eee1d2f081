use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

const MIN_YEAR: i32 = 1990;
const MAX_YEAR: i32 = 2100;

const MONTHS: &str = r"(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?";

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("valid regex"));

static TEXT_DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(?:19|20)\d{2}-\d{1,2}-\d{1,2}(?:[T ]\d{2}:\d{2}(?::\d{2})?)?\b".to_string(),
        r"\b(?:19|20)\d{2}/\d{1,2}/\d{1,2}\b".to_string(),
        r"\b\d{1,2}\.\d{1,2}\.(?:19|20)\d{2}\b".to_string(),
        format!(r"(?i)\b{}\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+(?:19|20)\d{{2}}\b", MONTHS),
        format!(r"(?i)\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?{}\s+(?:19|20)\d{{2}}\b", MONTHS),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static URL_FULL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/|-|_)((?:19|20)\d{2})[/-](\d{1,2})[/-](\d{1,2})(?:/|-|_|\.|$)").expect("valid regex")
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S %z"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%b. %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d %b. %Y",
    "%d of %B %Y",
    "%A, %B %d, %Y",
    "%a, %d %b %Y",
];

/// Normalize a date string to `YYYY-MM-DD`. Unparseable input yields `None`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let cleaned = ORDINAL_SUFFIX.replace_all(raw.trim(), "$1");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return None;
    }

    parse_date(&cleaned)
        .filter(|d| (MIN_YEAR..=MAX_YEAR).contains(&d.year()))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.date_naive());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.date_naive());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    // "2024-03-15T10:00:00 GMT" and similar: trust a leading ISO date
    let prefix: String = value.chars().take(10).collect();
    if prefix.len() == 10 && value.len() > 10 {
        if let Ok(date) = NaiveDate::parse_from_str(&prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }

    None
}

/// Full date embedded in the URL path, e.g. `/2024/03/15/slug` or `/news-2024-03-15`.
/// Year-and-month paths such as `/2024/07/slug` yield nothing.
pub fn date_from_url(url: &Url) -> Option<String> {
    let caps = URL_FULL_DATE.captures(url.path())?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
        .filter(|d| (MIN_YEAR..=MAX_YEAR).contains(&d.year()))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// First date-shaped substring of `text` that normalizes cleanly.
pub fn find_date_in_text(text: &str) -> Option<String> {
    let mut matches: Vec<(usize, &str)> = TEXT_DATE_PATTERNS
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.as_str())))
        .collect();
    matches.sort_by_key(|(start, _)| *start);

    matches.into_iter().find_map(|(_, candidate)| normalize_date(candidate))
}

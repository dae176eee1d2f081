use chrono::Utc;
use rand::Rng;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;
use url::Url;

use crate::error::ScrapeError;

pub const DEFAULT_MAX_ARTICLES_PER_URL: usize = 50;
pub const DEFAULT_DELAY_RANGE: (f64, f64) = (2.0, 5.0);
/// Longest politeness delay a request may ask for.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Body of `POST /scrape`, as received on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub base_urls: Vec<String>,
    #[serde(default)]
    pub max_articles_per_url: Option<i64>,
    #[serde(default)]
    pub delay_range: Option<(f64, f64)>,
}

impl ScrapeRequest {
    pub fn new(base_urls: Vec<String>) -> Self {
        Self {
            base_urls,
            max_articles_per_url: None,
            delay_range: None,
        }
    }

    /// Check the request structurally. A rejected request starts no jobs.
    pub fn validate(&self) -> Result<ValidatedRequest, ScrapeError> {
        if self.base_urls.is_empty() {
            return Err(ScrapeError::Validation(
                "base_urls must contain at least one URL".to_string(),
            ));
        }

        let mut base_urls = Vec::with_capacity(self.base_urls.len());
        for raw in &self.base_urls {
            base_urls.push(parse_absolute_url(raw)?);
        }

        let max_articles_per_url = match self.max_articles_per_url {
            None => DEFAULT_MAX_ARTICLES_PER_URL,
            Some(n) if n > 0 => n as usize,
            Some(n) => {
                return Err(ScrapeError::Validation(format!(
                    "max_articles_per_url must be positive, got {}",
                    n
                )));
            }
        };

        let (min, max) = self.delay_range.unwrap_or(DEFAULT_DELAY_RANGE);
        let delay_range = DelayRange::new(min, max)?;

        Ok(ValidatedRequest {
            base_urls,
            max_articles_per_url,
            delay_range,
        })
    }
}

/// A request that passed validation. Immutable once accepted.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    base_urls: Vec<Url>,
    max_articles_per_url: usize,
    delay_range: DelayRange,
}

impl ValidatedRequest {
    pub fn base_urls(&self) -> &[Url] {
        &self.base_urls
    }

    pub fn max_articles_per_url(&self) -> usize {
        self.max_articles_per_url
    }

    pub fn delay_range(&self) -> DelayRange {
        self.delay_range
    }
}

fn parse_absolute_url(raw: &str) -> Result<Url, ScrapeError> {
    let url = Url::parse(raw.trim()).map_err(|e| ScrapeError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ScrapeError::InvalidUrl {
            url: raw.to_string(),
            reason: "only absolute http(s) URLs are supported".to_string(),
        }),
    }
}

/// Inclusive `[min, max]` window the rate limiter samples from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    min_secs: f64,
    max_secs: f64,
}

impl DelayRange {
    pub fn new(min_secs: f64, max_secs: f64) -> Result<Self, ScrapeError> {
        if !min_secs.is_finite() || !max_secs.is_finite() {
            return Err(ScrapeError::Validation(
                "delay_range bounds must be finite numbers".to_string(),
            ));
        }
        if min_secs < 0.0 {
            return Err(ScrapeError::Validation(format!(
                "delay_range minimum must not be negative, got {}",
                min_secs
            )));
        }
        if Duration::try_from_secs_f64(max_secs).is_err() || max_secs > MAX_DELAY_SECS {
            return Err(ScrapeError::Validation(format!(
                "delay_range maximum must be at most {} seconds, got {}",
                MAX_DELAY_SECS, max_secs
            )));
        }
        if min_secs > max_secs {
            return Err(ScrapeError::Validation(format!(
                "delay_range is inverted: [{}, {}]",
                min_secs, max_secs
            )));
        }
        Ok(Self { min_secs, max_secs })
    }

    pub fn min_secs(&self) -> f64 {
        self.min_secs
    }

    pub fn max_secs(&self) -> f64 {
        self.max_secs
    }

    /// Draw a delay uniformly from the window, bounds included.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = if self.max_secs > self.min_secs {
            rng.random_range(self.min_secs..=self.max_secs)
        } else {
            self.min_secs
        };
        Duration::from_secs_f64(secs)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_secs: DEFAULT_DELAY_RANGE.0,
            max_secs: DEFAULT_DELAY_RANGE.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: Option<String>,
    pub date: Option<String>,
    pub content: String,
    pub image: Option<String>,
    pub url: String,
}

/// Outcome for one base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerUrlResult {
    pub base_url: String,
    pub articles: Vec<Article>,
    /// Candidates attempted, bounded by `max_articles_per_url`.
    pub total_articles_found: usize,
    pub successfully_processed: usize,
    /// Candidates discovered on the index page before bounding.
    pub candidates_discovered: usize,
    pub reached_reveal_bound: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PerUrlResult {
    pub fn empty(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            articles: Vec::new(),
            total_articles_found: 0,
            successfully_processed: 0,
            candidates_discovered: 0,
            reached_reveal_bound: false,
            error: None,
        }
    }

    pub fn failed(base_url: impl Into<String>, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(base_url)
        }
    }

    pub fn record_success(&mut self, article: Article) {
        self.articles.push(article);
        self.successfully_processed += 1;
    }
}

/// Per-URL results keyed `scrapeResult1..N` in input order.
#[derive(Debug, Clone, Default)]
pub struct ResultMap(pub Vec<PerUrlResult>);

impl ResultMap {
    pub fn key_for(index: usize) -> String {
        format!("scrapeResult{}", index + 1)
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&PerUrlResult> {
        let index: usize = key.strip_prefix("scrapeResult")?.parse().ok()?;
        self.0.get(index.checked_sub(1)?)
    }
}

impl Serialize for ResultMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (index, result) in self.0.iter().enumerate() {
            map.serialize_entry(&Self::key_for(index), result)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResultMap>,
    pub timestamp: String,
    pub total_urls_processed: usize,
    pub total_articles_found: usize,
}

impl ScrapeResponse {
    pub fn completed(results: Vec<PerUrlResult>) -> Self {
        let total_urls_processed = results.len();
        let total_articles_found = results.iter().map(|r| r.total_articles_found).sum();
        let successfully_processed: usize = results.iter().map(|r| r.successfully_processed).sum();

        Self {
            success: true,
            message: format!(
                "Scraped {} URL(s): {} article(s) found, {} processed successfully",
                total_urls_processed, total_articles_found, successfully_processed
            ),
            data: Some(ResultMap(results)),
            timestamp: Utc::now().to_rfc3339(),
            total_urls_processed,
            total_articles_found,
        }
    }

    pub fn rejected(error: &ScrapeError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: None,
            timestamp: Utc::now().to_rfc3339(),
            total_urls_processed: 0,
            total_articles_found: 0,
        }
    }
}

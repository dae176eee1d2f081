// Article Harvester Library
//
// Extracts structured articles from JavaScript-rendered news and blog index
// pages: reveal lazily loaded links, extract each article with fallback
// heuristics, and stay polite with per-domain delays and bounded retries.

pub mod api;
pub mod auto_selectors;
pub mod browser;
pub mod candidates;
pub mod config;
pub mod dates;
pub mod error;
pub mod extractor;
pub mod job;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod revealer;
pub mod scraper;
pub mod structure_analyzer;
pub mod utils;

// Re-export main types for convenience
pub use browser::{BrowserEngine, PageHandle, RevealAffordance};
pub use config::ServiceConfig;
pub use error::ScrapeError;
pub use extractor::ArticleExtractor;
pub use models::{Article, PerUrlResult, ScrapeRequest, ScrapeResponse};
pub use retry::{RetryPolicy, with_retry};
pub use revealer::{ContentRevealer, RevealOptions};
pub use scraper::WebScraper;
pub use utils::{USER_AGENTS, get_random_user_agent};

#[cfg(feature = "browser")]
pub mod chromium;
#[cfg(test)]
pub mod fake;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{BrowserSettings, EngineKind};
use crate::error::{Result, ScrapeError};

/// Result of a completed navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    pub final_url: String,
    /// HTTP status of the main document, when the engine can observe it.
    pub status: Option<u16>,
}

impl NavigationOutcome {
    /// Turn a client-error status into a terminal error and a server-error
    /// status into a retryable one.
    pub fn ensure_success(&self, requested: &str) -> Result<()> {
        match self.status {
            Some(status) if status >= 400 => Err(ScrapeError::HttpStatus {
                url: requested.to_string(),
                status,
            }),
            _ => Ok(()),
        }
    }
}

/// A "reveal more content" matcher, tried in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RevealAffordance {
    /// Clickable element (button, link, role=button) whose visible label
    /// matches, case-insensitively.
    Text(String),
    /// Structural CSS selector, e.g. `.load-more` or `a[rel='next']`.
    Css(String),
}

/// Whether a visible label matches a text affordance: equal, or the label
/// followed by a short decoration such as "Next page" or "Load more ›".
pub fn label_matches(visible: &str, label: &str) -> bool {
    let visible = visible.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let label = label.trim().to_lowercase();
    if label.is_empty() {
        return false;
    }
    visible == label
        || (visible.starts_with(&label) && visible.chars().count() <= label.chars().count() + 6)
}

/// One page/tab, owned by a single job for its whole run.
///
/// Every method re-queries the live document, so elements detached by a
/// previous click never leak across calls.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str) -> Result<NavigationOutcome>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String>;

    async fn scroll_height(&self) -> Result<u64>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Click the first visible, enabled element matching the affordances.
    /// Returns a label of what was clicked, or `None` when nothing matched.
    async fn click_reveal(&self, affordances: &[RevealAffordance]) -> Result<Option<String>>;

    /// Release the page. Called once, on every exit path of a job.
    async fn close(&self);
}

/// Source of pages. Shared by every job of a batch.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Acquire the underlying capability (launch or connect). Failing here is
    /// the only failure that aborts a whole batch.
    async fn ensure_ready(&self) -> Result<()>;

    async fn open_page(&self) -> Result<Box<dyn PageHandle>>;

    fn name(&self) -> &'static str;
}

/// Build the engine selected by configuration.
pub fn engine_from_settings(settings: &BrowserSettings) -> anyhow::Result<Arc<dyn BrowserEngine>> {
    match settings.engine {
        #[cfg(feature = "browser")]
        EngineKind::Chromium => Ok(Arc::new(chromium::ChromiumEngine::new(settings.clone()))),
        #[cfg(not(feature = "browser"))]
        EngineKind::Chromium => anyhow::bail!(
            "Chromium support not compiled. Rebuild with: cargo build --features browser"
        ),
        EngineKind::Http => Ok(Arc::new(http::HttpEngine::new(settings)?)),
    }
}

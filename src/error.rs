use thiserror::Error;

/// Failures raised while acquiring and extracting articles.
///
/// Every variant is classified as retryable or terminal by
/// [`ScrapeError::is_retryable`]; the retry controller only repeats an
/// operation whose last error was retryable.
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    /// The request itself is malformed. Nothing was started.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The page failed to load or render (transport error, renderer crash).
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {seconds}s while {action}")]
    Timeout { action: String, seconds: u64 },

    #[error("{url} answered with HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// A bot wall, CAPTCHA or other interstitial replaced the real document.
    #[error("{url} is blocked: {reason}")]
    Blocked { url: String, reason: String },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The browser-automation capability could not be started or acquired.
    #[error("browser capability unavailable: {0}")]
    Capability(String),

    /// The per-job wall-clock budget ran out.
    #[error("job deadline exceeded while {0}")]
    DeadlineExceeded(String),
}

impl ScrapeError {
    pub fn navigation(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(action: impl Into<String>, duration: std::time::Duration) -> Self {
        Self::Timeout {
            action: action.into(),
            seconds: duration.as_secs(),
        }
    }

    /// Whether another attempt at the same unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Navigation { .. } | Self::Timeout { .. } | Self::ElementNotFound(_) => true,
            Self::HttpStatus { status, .. } => {
                matches!(status, 408 | 425 | 429) || (500..600).contains(status)
            }
            Self::Validation(_)
            | Self::InvalidUrl { .. }
            | Self::Blocked { .. }
            | Self::Extraction(_)
            | Self::Capability(_)
            | Self::DeadlineExceeded(_) => false,
        }
    }

    /// Only capability failures escalate beyond a single base URL.
    pub fn is_fatal_to_batch(&self) -> bool {
        matches!(self, Self::Capability(_))
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};
use url::Url;

use crate::browser::{BrowserEngine, PageHandle};
use crate::config::ServiceConfig;
use crate::error::{Result, ScrapeError};
use crate::extractor::ArticleExtractor;
use crate::models::{Article, PerUrlResult, ValidatedRequest};
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryPolicy, with_retry};
use crate::revealer::{ContentRevealer, RevealOutcome};

/// Everything the jobs of one batch share. Built per request, so rate-limit
/// state never leaks between requests.
pub struct ScrapeContext {
    pub limiter: RateLimiter,
    pub retry: RetryPolicy,
    pub revealer: ContentRevealer,
    pub extractor: ArticleExtractor,
    pub navigation_timeout: Duration,
    pub job_timeout: Duration,
    pub require_content: bool,
    pub max_articles_per_url: usize,
}

impl ScrapeContext {
    pub fn new(config: &ServiceConfig, request: &ValidatedRequest) -> Self {
        Self {
            limiter: RateLimiter::new(request.delay_range())
                .with_quota(config.scraping.max_navigations_per_minute),
            retry: config.retry.clone(),
            revealer: ContentRevealer::new(config.reveal.clone(), config.selectors.reveal.clone()),
            extractor: ArticleExtractor::new(&config.selectors, config.scraping.min_content_chars),
            navigation_timeout: config.browser.navigation_timeout(),
            job_timeout: config.scraping.job_timeout(),
            require_content: config.scraping.require_content,
            max_articles_per_url: request.max_articles_per_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Revealing,
    Extracting(usize),
    Aggregated,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Revealing => write!(f, "revealing"),
            JobState::Extracting(i) => write!(f, "extracting #{}", i),
            JobState::Aggregated => write!(f, "aggregated"),
            JobState::Done => write!(f, "done"),
        }
    }
}

/// One base URL. Owns its page from open to close.
pub struct SiteJob {
    ctx: Arc<ScrapeContext>,
    base_url: Url,
}

impl SiteJob {
    pub fn new(ctx: Arc<ScrapeContext>, base_url: Url) -> Self {
        Self { ctx, base_url }
    }

    /// Run to completion. Never fails: every error ends up in the result.
    pub async fn run(self, engine: Arc<dyn BrowserEngine>) -> PerUrlResult {
        let started = std::time::Instant::now();
        self.transition(JobState::Pending);

        let page = match engine.open_page().await {
            Ok(page) => page,
            Err(e) => {
                log::error!("❌ {}: could not open a page: {}", self.base_url, e);
                return PerUrlResult::failed(self.base_url.as_str(), e);
            }
        };

        let deadline = Instant::now() + self.ctx.job_timeout;
        let result = self.drive(page.as_ref(), deadline).await;
        page.close().await;
        self.transition(JobState::Done);

        log::info!(
            "✅ {}: {}/{} articles in {:.1}s",
            self.base_url,
            result.successfully_processed,
            result.total_articles_found,
            started.elapsed().as_secs_f64()
        );
        result
    }

    async fn drive(&self, page: &dyn PageHandle, deadline: Instant) -> PerUrlResult {
        let base = self.base_url.as_str();

        self.transition(JobState::Revealing);
        let label = format!("reveal {}", base);
        let revealed = match timeout_at(
            deadline,
            with_retry(&self.ctx.retry, &label, |_| self.load_and_reveal(page)),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                log::error!("❌ {}: index failed: {}", base, e);
                return PerUrlResult::failed(base, e);
            }
            Err(_) => {
                let e = ScrapeError::DeadlineExceeded("revealing the index page".into());
                log::error!("❌ {}: {}", base, e);
                return PerUrlResult::failed(base, e);
            }
        };

        let mut result = PerUrlResult::empty(base);
        result.candidates_discovered = revealed.candidates.len();
        result.reached_reveal_bound = revealed.reached_bound;

        let selected: Vec<Url> = revealed
            .candidates
            .into_iter()
            .take(self.ctx.max_articles_per_url)
            .map(|c| c.url)
            .collect();
        result.total_articles_found = selected.len();
        log::info!(
            "🔍 {}: {} candidates, extracting {}",
            base,
            result.candidates_discovered,
            selected.len()
        );

        for (index, url) in selected.iter().enumerate() {
            self.transition(JobState::Extracting(index + 1));
            let label = format!("extract {}", url);

            match timeout_at(
                deadline,
                with_retry(&self.ctx.retry, &label, |_| self.fetch_article(page, url)),
            )
            .await
            {
                Ok(Ok(article)) if self.ctx.require_content && article.content.is_empty() => {
                    log::warn!("⚠️  {}: no content extracted, skipping", url);
                }
                Ok(Ok(article)) => result.record_success(article),
                Ok(Err(e)) => log::warn!("⚠️  {}: skipped: {}", url, e),
                Err(_) => {
                    log::warn!(
                        "⏱️  {}: job deadline reached after {} of {} articles",
                        base,
                        index,
                        selected.len()
                    );
                    break;
                }
            }
        }

        self.transition(JobState::Aggregated);
        result
    }

    async fn load_and_reveal(&self, page: &dyn PageHandle) -> Result<RevealOutcome> {
        self.navigate(page, &self.base_url).await?;
        let html = page.content().await?;
        self.ctx.extractor.check_document(&html, &self.base_url)?;
        self.ctx.revealer.reveal(page, &self.base_url).await
    }

    async fn fetch_article(&self, page: &dyn PageHandle, url: &Url) -> Result<Article> {
        self.navigate(page, url).await?;
        let html = page.content().await?;
        self.ctx.extractor.check_document(&html, url)?;
        Ok(self.ctx.extractor.extract(&html, url))
    }

    /// Rate-limited, time-bounded navigation with status classification.
    async fn navigate(&self, page: &dyn PageHandle, url: &Url) -> Result<()> {
        self.ctx.limiter.wait(&RateLimiter::target_key(url)).await;

        let limit = self.ctx.navigation_timeout;
        let outcome = timeout(limit, page.goto(url.as_str()))
            .await
            .map_err(|_| ScrapeError::timeout(format!("loading {}", url), limit))??;

        if outcome.final_url != url.as_str() {
            log::debug!("{} redirected to {}", url, outcome.final_url);
        }
        outcome.ensure_success(url.as_str())
    }

    fn transition(&self, state: JobState) {
        log::debug!("{}: {}", self.base_url, state);
    }
}

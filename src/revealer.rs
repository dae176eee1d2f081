use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::browser::{PageHandle, RevealAffordance};
use crate::candidates::{ArticleCandidate, CandidateSet};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealOptions {
    pub max_iterations: u32,
    /// Consecutive unchanged passes that end the loop early.
    pub stable_rounds: u32,
    /// Pause after each scroll for lazy content to render.
    pub settle_ms: u64,
    /// Pause after a successful click.
    pub click_settle_ms: u64,
}

impl Default for RevealOptions {
    fn default() -> Self {
        Self {
            max_iterations: 12,
            stable_rounds: 2,
            settle_ms: 1500,
            click_settle_ms: 2000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevealOutcome {
    pub candidates: Vec<ArticleCandidate>,
    /// The loop stopped at `max_iterations` while the page was still growing.
    pub reached_bound: bool,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    height: u64,
    candidates: usize,
}

pub struct ContentRevealer {
    options: RevealOptions,
    affordances: Vec<RevealAffordance>,
}

impl ContentRevealer {
    pub fn new(options: RevealOptions, affordances: Vec<RevealAffordance>) -> Self {
        Self {
            options,
            affordances,
        }
    }

    /// Reveal as much of the already loaded page as the bounds allow and
    /// return every candidate seen along the way, in discovery order.
    pub async fn reveal(&self, page: &dyn PageHandle, base: &Url) -> Result<RevealOutcome> {
        let mut candidates = CandidateSet::new(base.clone());
        candidates.absorb(&page.content().await?);

        let mut last = Fingerprint {
            height: page.scroll_height().await?,
            candidates: candidates.len(),
        };
        let mut stable = 0;

        for iteration in 1..=self.options.max_iterations {
            page.scroll_to_bottom().await?;
            tokio::time::sleep(Duration::from_millis(self.options.settle_ms)).await;

            match page.click_reveal(&self.affordances).await {
                Ok(Some(label)) => {
                    log::debug!("{}: clicked '{}' (pass {})", base, label, iteration);
                    tokio::time::sleep(Duration::from_millis(self.options.click_settle_ms)).await;
                }
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    log::warn!("{}: reveal click skipped: {}", base, e);
                }
                Err(e) => return Err(e),
            }

            let added = candidates.absorb(&page.content().await?);
            let current = Fingerprint {
                height: page.scroll_height().await?,
                candidates: candidates.len(),
            };
            log::debug!(
                "{}: pass {} height={} candidates={} (+{})",
                base,
                iteration,
                current.height,
                current.candidates,
                added
            );

            if current == last {
                stable += 1;
                if stable >= self.options.stable_rounds {
                    return Ok(RevealOutcome {
                        candidates: candidates.into_vec(),
                        reached_bound: false,
                        iterations: iteration,
                    });
                }
            } else {
                stable = 0;
                last = current;
            }
        }

        log::info!(
            "{}: reveal stopped at {} passes with {} candidates",
            base,
            self.options.max_iterations,
            candidates.len()
        );
        Ok(RevealOutcome {
            candidates: candidates.into_vec(),
            reached_bound: true,
            iterations: self.options.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto_selectors::AutoSelectors;
    use crate::browser::fake::{FakeDocument, FakeEngine, IndexSpec};
    use crate::browser::BrowserEngine;

    const INDEX: &str = "https://news.test/latest";

    fn revealer() -> ContentRevealer {
        ContentRevealer::new(RevealOptions::default(), AutoSelectors::default().reveal)
    }

    async fn reveal(spec: IndexSpec, revealer: &ContentRevealer) -> RevealOutcome {
        let engine = FakeEngine::new().with_document(INDEX, FakeDocument::Index(spec));
        let page = engine.open_page().await.unwrap();
        page.goto(INDEX).await.unwrap();
        revealer.reveal(page.as_ref(), &Url::parse(INDEX).unwrap()).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_reveals_everything() {
        let spec = IndexSpec {
            per_click: 5,
            total: Some(15),
            ..IndexSpec::new("https://news.test/news/story-", 5)
        };
        let outcome = reveal(spec, &revealer()).await;

        assert_eq!(outcome.candidates.len(), 15);
        assert!(!outcome.reached_bound);
        assert_eq!(outcome.candidates[0].url.as_str(), "https://news.test/news/story-1");
        assert_eq!(outcome.candidates[14].url.as_str(), "https://news.test/news/story-15");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_load_more_terminates() {
        let spec = IndexSpec {
            stuck_button: true,
            ..IndexSpec::new("https://news.test/news/story-", 3)
        };
        let outcome = reveal(spec, &revealer()).await;

        assert_eq!(outcome.candidates.len(), 3);
        assert!(!outcome.reached_bound);
        assert_eq!(outcome.iterations, RevealOptions::default().stable_rounds);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infinite_page_stops_at_bound() {
        let spec = IndexSpec {
            per_scroll: 2,
            total: None,
            ..IndexSpec::new("https://news.test/news/story-", 4)
        };
        let options = RevealOptions {
            max_iterations: 5,
            ..RevealOptions::default()
        };
        let revealer = ContentRevealer::new(options, Vec::new());
        let outcome = reveal(spec, &revealer).await;

        assert!(outcome.reached_bound);
        assert_eq!(outcome.iterations, 5);
        assert_eq!(outcome.candidates.len(), 4 + 2 * 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_clicks_do_not_abort_reveal() {
        let spec = IndexSpec {
            per_scroll: 3,
            per_click: 3,
            total: Some(9),
            click_fails: true,
            ..IndexSpec::new("https://news.test/news/story-", 3)
        };
        let outcome = reveal(spec, &revealer()).await;

        assert_eq!(outcome.candidates.len(), 9);
        assert!(!outcome.reached_bound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_article_links_are_ignored() {
        let outcome = reveal(IndexSpec::new("https://news.test/news/story-", 2), &revealer()).await;

        assert!(outcome.candidates.iter().all(|c| !c.url.path().starts_with("/about")));
        assert_eq!(outcome.candidates.len(), 2);
    }
}

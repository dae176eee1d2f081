use futures::stream::{self, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use crate::browser::BrowserEngine;
use crate::config::ServiceConfig;
use crate::error::ScrapeError;
use crate::job::{ScrapeContext, SiteJob};
use crate::models::{PerUrlResult, ScrapeRequest, ScrapeResponse};

/// Batch coordinator: fans base URLs out to a bounded pool of jobs and
/// assembles their results in input order.
pub struct WebScraper {
    engine: Arc<dyn BrowserEngine>,
    config: Arc<ServiceConfig>,
}

impl WebScraper {
    pub fn new(engine: Arc<dyn BrowserEngine>, config: ServiceConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Scrape every base URL of `request`.
    ///
    /// Only an invalid request or an unavailable browser fail the whole call;
    /// anything that goes wrong inside one base URL stays in its result.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, ScrapeError> {
        let request = request.validate()?;
        self.engine.ensure_ready().await?;

        let batch_id = Uuid::new_v4();
        let concurrency = self.config.scraping.concurrency.max(1);
        let delay = request.delay_range();
        log::info!(
            "🚀 Batch {}: {} URL(s) via {}, up to {} articles each, {:.1}-{:.1}s delays, {} in parallel",
            batch_id,
            request.base_urls().len(),
            self.engine.name(),
            request.max_articles_per_url(),
            delay.min_secs(),
            delay.max_secs(),
            concurrency
        );

        let ctx = Arc::new(ScrapeContext::new(&self.config, &request));
        let jobs = request.base_urls().iter().cloned().enumerate().map(|(index, url)| {
            let job = SiteJob::new(ctx.clone(), url.clone());
            let engine = self.engine.clone();
            async move {
                let result = match tokio::spawn(job.run(engine)).await {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!("❌ Job for {} crashed: {}", url, e);
                        PerUrlResult::failed(url.as_str(), format!("job crashed: {}", e))
                    }
                };
                (index, result)
            }
        });

        let mut results: Vec<(usize, PerUrlResult)> =
            stream::iter(jobs).buffer_unordered(concurrency).collect().await;
        results.sort_by_key(|(index, _)| *index);

        let response = ScrapeResponse::completed(results.into_iter().map(|(_, r)| r).collect());
        log::info!("🏁 Batch {}: {}", batch_id, response.message);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeDocument, FakeEngine, IndexSpec};
    use crate::models::ResultMap;

    fn scraper(engine: &FakeEngine) -> WebScraper {
        WebScraper::new(Arc::new(engine.clone()), ServiceConfig::default())
    }

    fn fast_request(urls: &[&str]) -> ScrapeRequest {
        ScrapeRequest {
            delay_range: Some((0.0, 0.5)),
            ..ScrapeRequest::new(urls.iter().map(|u| u.to_string()).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_articles_per_url_bounds_extraction() {
        let engine = FakeEngine::new().with_site(
            "https://example.test/a",
            IndexSpec::new("https://example.test/news/story-", 3),
            3,
        );
        let request: ScrapeRequest = serde_json::from_str(
            r#"{"base_urls":["https://example.test/a"], "max_articles_per_url":1}"#,
        )
        .unwrap();

        let response = scraper(&engine).scrape(&request).await.unwrap();
        let result = response.data.as_ref().unwrap().get("scrapeResult1").unwrap();

        assert!(response.success);
        assert_eq!(result.articles.len(), 1);
        assert_eq!(result.total_articles_found, 1);
        assert!(result.candidates_discovered >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_url_does_not_block_others() {
        let engine = FakeEngine::new()
            .with_site(
                "https://one.test/latest",
                IndexSpec::new("https://one.test/news/story-", 2),
                2,
            )
            .with_site(
                "https://three.test/blog",
                IndexSpec::new("https://three.test/blog/post-", 2),
                2,
            );
        let request = fast_request(&[
            "https://one.test/latest",
            "https://unreachable.test/",
            "https://three.test/blog",
        ]);

        let response = scraper(&engine).scrape(&request).await.unwrap();
        let data = response.data.as_ref().unwrap();

        assert!(response.success);
        assert_eq!(data.0.len(), 3);
        assert_eq!(response.total_urls_processed, 3);
        assert_eq!(data.0[0].base_url, "https://one.test/latest");
        assert_eq!(data.0[1].base_url, "https://unreachable.test/");
        assert_eq!(data.0[2].base_url, "https://three.test/blog");

        assert_eq!(data.0[0].articles.len(), 2);
        assert!(data.0[1].articles.is_empty());
        assert!(data.0[1].error.is_some());
        assert_eq!(data.0[2].articles.len(), 2);
        assert_eq!(response.total_articles_found, 4);
        assert_eq!(engine.pages_opened(), engine.pages_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_job_does_not_take_down_siblings() {
        let engine = FakeEngine::new()
            .with_site("https://one.test/", IndexSpec::new("https://one.test/news/story-", 2), 2)
            .with_document("https://crash.test/", FakeDocument::Panic)
            .with_site("https://three.test/", IndexSpec::new("https://three.test/news/story-", 2), 2);
        let request = fast_request(&["https://one.test/", "https://crash.test/", "https://three.test/"]);

        let response = scraper(&engine).scrape(&request).await.unwrap();
        let data = response.data.as_ref().unwrap();

        assert!(response.success);
        assert_eq!(data.0.len(), 3);
        assert_eq!(data.0[0].successfully_processed, 2);
        assert_eq!(data.0[2].successfully_processed, 2);

        let crashed = &data.0[1];
        assert_eq!(crashed.base_url, "https://crash.test/");
        assert_eq!(crashed.successfully_processed, 0);
        assert!(crashed.articles.is_empty());
        assert!(crashed.error.as_deref().unwrap().contains("job crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_pages_never_exceed_concurrency() {
        let hosts = ["a", "b", "c", "d", "e"];
        let mut engine = FakeEngine::new();
        for host in hosts {
            engine = engine.with_site(
                &format!("https://{}.test/", host),
                IndexSpec::new(&format!("https://{}.test/news/story-", host), 1),
                1,
            );
        }
        let mut config = ServiceConfig::default();
        config.scraping.concurrency = 2;
        let urls: Vec<String> = hosts.iter().map(|h| format!("https://{}.test/", h)).collect();
        let request = fast_request(&urls.iter().map(String::as_str).collect::<Vec<_>>());

        let response = WebScraper::new(Arc::new(engine.clone()), config)
            .scrape(&request)
            .await
            .unwrap();

        assert_eq!(response.total_urls_processed, 5);
        assert_eq!(response.total_articles_found, 5);
        assert_eq!(engine.pages_opened(), 5);
        assert!(engine.peak_open_pages() >= 1);
        assert!(engine.peak_open_pages() <= 2, "peak was {}", engine.peak_open_pages());
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_invariants_hold() {
        let engine = FakeEngine::new()
            .with_site("https://a.test/", IndexSpec::new("https://a.test/news/item-", 6), 4)
            .with_site("https://b.test/", IndexSpec::new("https://b.test/news/item-", 2), 2);
        let request = ScrapeRequest {
            max_articles_per_url: Some(5),
            ..fast_request(&["https://a.test/", "https://b.test/"])
        };

        let response = scraper(&engine).scrape(&request).await.unwrap();
        let data = response.data.unwrap();

        for result in &data.0 {
            assert!(result.successfully_processed <= result.total_articles_found);
            assert!(result.total_articles_found <= 5);
            assert_eq!(result.articles.len(), result.successfully_processed);
        }
        // a.test: 5 attempted, items 5 is missing from the fake
        assert_eq!(data.0[0].total_articles_found, 5);
        assert_eq!(data.0[0].successfully_processed, 4);
        assert_eq!(
            response.total_articles_found,
            data.0.iter().map(|r| r.total_articles_found).sum::<usize>()
        );
    }

    #[tokio::test]
    async fn test_invalid_request_starts_nothing() {
        let engine = FakeEngine::new();
        let scraper = scraper(&engine);

        let empty = ScrapeRequest::new(Vec::new());
        assert!(matches!(scraper.scrape(&empty).await, Err(ScrapeError::Validation(_))));

        let relative = ScrapeRequest::new(vec!["/news".into()]);
        assert!(matches!(scraper.scrape(&relative).await, Err(ScrapeError::InvalidUrl { .. })));

        let inverted = ScrapeRequest {
            delay_range: Some((5.0, 2.0)),
            ..ScrapeRequest::new(vec!["https://a.test/".into()])
        };
        assert!(scraper.scrape(&inverted).await.is_err());
        assert_eq!(engine.pages_opened(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_browser_fails_the_batch() {
        let engine = FakeEngine::unavailable();
        let request = ScrapeRequest::new(vec!["https://a.test/".into()]);

        let err = scraper(&engine).scrape(&request).await.unwrap_err();
        assert!(err.is_fatal_to_batch());
        assert_eq!(engine.pages_opened(), 0);

        let body = serde_json::to_value(ScrapeResponse::rejected(&err)).unwrap();
        assert_eq!(body["success"], false);
        assert!(body.get("data").is_none());
        assert_eq!(ResultMap::key_for(0), "scrapeResult1");
    }
}

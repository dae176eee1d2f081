use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use super::{BrowserEngine, NavigationOutcome, PageHandle, RevealAffordance, label_matches};
use crate::config::BrowserSettings;
use crate::error::{Result, ScrapeError};
use crate::utils::get_random_user_agent;

pub struct HttpEngine {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpEngine {
    pub fn new(settings: &BrowserSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.navigation_timeout())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            timeout: settings.navigation_timeout(),
        })
    }
}

#[async_trait]
impl BrowserEngine for HttpEngine {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn open_page(&self) -> Result<Box<dyn PageHandle>> {
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            timeout: self.timeout,
            state: Mutex::new(PageState::default()),
        }))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Default)]
struct PageState {
    url: Option<Url>,
    html: String,
    visited: HashSet<String>,
}

pub struct HttpPage {
    client: reqwest::Client,
    timeout: Duration,
    state: Mutex<PageState>,
}

impl HttpPage {
    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch(&self, url: &Url) -> Result<NavigationOutcome> {
        let user_agent = get_random_user_agent();

        let response = self
            .client
            .get(url.as_str())
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| self.classify(url, e))?;

        let mut state = self.state();
        state.visited.insert(url.to_string());
        state.visited.insert(final_url.to_string());
        state.url = Some(final_url.clone());
        state.html = html;

        Ok(NavigationOutcome {
            final_url: final_url.to_string(),
            status: Some(status),
        })
    }

    fn classify(&self, url: &Url, error: reqwest::Error) -> ScrapeError {
        if error.is_timeout() {
            ScrapeError::timeout(format!("fetching {}", url), self.timeout)
        } else {
            ScrapeError::navigation(url.as_str(), error)
        }
    }
}

#[async_trait]
impl PageHandle for HttpPage {
    async fn goto(&self, url: &str) -> Result<NavigationOutcome> {
        let url = Url::parse(url).map_err(|e| ScrapeError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.fetch(&url).await
    }

    async fn content(&self) -> Result<String> {
        Ok(self.state().html.clone())
    }

    async fn scroll_height(&self) -> Result<u64> {
        Ok(self.state().html.len() as u64)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        Ok(())
    }

    async fn click_reveal(&self, affordances: &[RevealAffordance]) -> Result<Option<String>> {
        let next = {
            let state = self.state();
            let Some(current) = &state.url else {
                return Ok(None);
            };
            find_next_page(&state.html, current, affordances, &state.visited)
        };

        let Some((url, label)) = next else {
            return Ok(None);
        };
        log::debug!("Following next page {} ({})", url, label);
        self.fetch(&url).await?;
        Ok(Some(label))
    }

    async fn close(&self) {
        let mut state = self.state();
        state.html.clear();
        state.visited.clear();
    }
}

/// First same-host, unvisited link matching an affordance, in affordance order.
fn find_next_page(
    html: &str,
    current: &Url,
    affordances: &[RevealAffordance],
    visited: &HashSet<String>,
) -> Option<(Url, String)> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").ok()?;

    let resolve = |href: &str| -> Option<Url> {
        let mut url = current.join(href.trim()).ok()?;
        url.set_fragment(None);
        let same_host = url.host_str() == current.host_str();
        (same_host && url != *current && !visited.contains(url.as_str())).then_some(url)
    };

    for affordance in affordances {
        match affordance {
            RevealAffordance::Text(label) => {
                let found = document.select(&anchors).find_map(|a| {
                    let text: String = a.text().collect();
                    if !label_matches(&text, label) {
                        return None;
                    }
                    a.value().attr("href").and_then(resolve)
                });
                if let Some(url) = found {
                    return Some((url, label.clone()));
                }
            }
            RevealAffordance::Css(css) => {
                let Ok(selector) = Selector::parse(css) else {
                    continue;
                };
                let found = document.select(&selector).find_map(|element| {
                    element
                        .value()
                        .attr("href")
                        .or_else(|| {
                            element
                                .select(&anchors)
                                .next()
                                .and_then(|a| a.value().attr("href"))
                        })
                        .and_then(resolve)
                });
                if let Some(url) = found {
                    return Some((url, css.clone()));
                }
            }
        }
    }

    None
}

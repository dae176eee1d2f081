use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use super::{BrowserEngine, NavigationOutcome, PageHandle, RevealAffordance};
use crate::error::{Result, ScrapeError};

/// A JS-driven index page that reveals links as it is scrolled or clicked.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Links are `{link_prefix}{n}` for n = 1, 2, ...
    pub link_prefix: String,
    pub initial: usize,
    pub per_scroll: usize,
    pub per_click: usize,
    /// `None` never runs out.
    pub total: Option<usize>,
    /// A load-more button that is always present but does nothing.
    pub stuck_button: bool,
    /// Every click fails as if the button detached mid-click.
    pub click_fails: bool,
}

impl IndexSpec {
    pub fn new(link_prefix: &str, initial: usize) -> Self {
        Self {
            link_prefix: link_prefix.to_string(),
            initial,
            per_scroll: 0,
            per_click: 0,
            total: Some(initial),
            stuck_button: false,
            click_fails: false,
        }
    }

    fn cap(&self, revealed: usize) -> usize {
        self.total.map_or(revealed, |total| revealed.min(total))
    }

    fn button_visible(&self, revealed: usize) -> bool {
        self.stuck_button
            || (self.per_click > 0 && self.total.is_none_or(|total| revealed < total))
    }

    fn render(&self, revealed: usize) -> String {
        let mut html = String::from("<html><head><title>Latest news</title></head><body><h1>Latest</h1><ul>");
        for n in 1..=revealed {
            html.push_str(&format!(
                r#"<li><a href="{}{}">Story number {}</a></li>"#,
                self.link_prefix, n, n
            ));
        }
        html.push_str("</ul><a href=\"/about\">About us</a>");
        if self.button_visible(revealed) {
            html.push_str(r#"<button class="load-more">Load more</button>"#);
        }
        html.push_str("</body></html>");
        html
    }
}

#[derive(Debug, Clone)]
pub enum FakeDocument {
    Static { status: u16, html: String },
    Index(IndexSpec),
    /// Fails with a retryable navigation error `failures` times, then serves `html`.
    Flaky { failures: u32, html: String },
    Unreachable,
    /// Navigating here panics, as if the renderer crashed under the job.
    Panic,
}

#[derive(Default)]
struct FakeInner {
    documents: HashMap<String, FakeDocument>,
    attempts: Mutex<HashMap<String, u32>>,
    navigations: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_now: AtomicUsize,
    peak_open: AtomicUsize,
    unavailable: bool,
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    inner: Arc<FakeInner>,
}

fn key(url: &str) -> String {
    Url::parse(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string())
}

/// Minimal article page with a title, a date and some body text.
pub fn article_html(title: &str, date: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title>
        <meta property="article:published_time" content="{date}T09:00:00Z"></head>
        <body><article><h1>{title}</h1>
        <div class="article-body"><p>{title} opening paragraph with enough words to count as real article text for extraction.</p>
        <p>A second paragraph adds detail so the body comfortably passes the minimum length.</p></div>
        </article></body></html>"#
    )
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose capability check always fails.
    pub fn unavailable() -> Self {
        Self {
            inner: Arc::new(FakeInner {
                unavailable: true,
                ..FakeInner::default()
            }),
        }
    }

    pub fn with_document(mut self, url: &str, document: FakeDocument) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("configure the fake before sharing it")
            .documents
            .insert(key(url), document);
        self
    }

    pub fn with_html(self, url: &str, html: impl Into<String>) -> Self {
        self.with_document(
            url,
            FakeDocument::Static {
                status: 200,
                html: html.into(),
            },
        )
    }

    /// Index at `index_url` plus an article page for each of its first `count` links.
    pub fn with_site(mut self, index_url: &str, spec: IndexSpec, count: usize) -> Self {
        for n in 1..=count {
            let url = format!("{}{}", spec.link_prefix, n);
            self = self.with_html(&url, article_html(&format!("Story {}", n), "2024-05-01"));
        }
        self.with_document(index_url, FakeDocument::Index(spec))
    }

    pub fn navigations(&self) -> Vec<String> {
        self.inner.navigations.lock().unwrap().clone()
    }

    pub fn navigations_to(&self, url: &str) -> usize {
        let wanted = key(url);
        self.navigations().iter().filter(|u| **u == wanted).count()
    }

    pub fn pages_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Most pages that were open at the same time.
    pub fn peak_open_pages(&self) -> usize {
        self.inner.peak_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn ensure_ready(&self) -> Result<()> {
        if self.inner.unavailable {
            return Err(ScrapeError::Capability("fake browser unavailable".into()));
        }
        Ok(())
    }

    async fn open_page(&self) -> Result<Box<dyn PageHandle>> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        let open = self.inner.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            inner: self.inner.clone(),
            state: Mutex::new(PageState::default()),
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
struct PageState {
    document: Option<FakeDocument>,
    revealed: usize,
}

pub struct FakePage {
    inner: Arc<FakeInner>,
    state: Mutex<PageState>,
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<NavigationOutcome> {
        let url = key(url);
        self.inner.navigations.lock().unwrap().push(url.clone());

        let document = self.inner.documents.get(&url).cloned();
        if matches!(document, Some(FakeDocument::Panic)) {
            panic!("renderer crashed while loading {}", url);
        }
        let mut state = self.state.lock().unwrap();
        state.document = None;

        let status = match &document {
            None | Some(FakeDocument::Unreachable) | Some(FakeDocument::Panic) => {
                return Err(ScrapeError::navigation(&url, "net::ERR_NAME_NOT_RESOLVED"));
            }
            Some(FakeDocument::Flaky { failures, .. }) => {
                let mut attempts = self.inner.attempts.lock().unwrap();
                let seen = attempts.entry(url.clone()).or_insert(0);
                *seen += 1;
                if *seen <= *failures {
                    return Err(ScrapeError::navigation(&url, "net::ERR_CONNECTION_RESET"));
                }
                200
            }
            Some(FakeDocument::Static { status, .. }) => *status,
            Some(FakeDocument::Index(spec)) => {
                state.revealed = spec.cap(spec.initial);
                200
            }
        };

        state.document = document;
        Ok(NavigationOutcome {
            final_url: url,
            status: Some(status),
        })
    }

    async fn content(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        Ok(match &state.document {
            Some(FakeDocument::Static { html, .. }) | Some(FakeDocument::Flaky { html, .. }) => html.clone(),
            Some(FakeDocument::Index(spec)) => spec.render(state.revealed),
            _ => "<html></html>".to_string(),
        })
    }

    async fn scroll_height(&self) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(match &state.document {
            Some(FakeDocument::Index(_)) => 1000 + state.revealed as u64 * 100,
            Some(FakeDocument::Static { html, .. }) => html.len() as u64,
            _ => 0,
        })
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(FakeDocument::Index(spec)) = &state.document {
            let revealed = spec.cap(state.revealed + spec.per_scroll);
            state.revealed = revealed;
        }
        Ok(())
    }

    async fn click_reveal(&self, affordances: &[RevealAffordance]) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        let Some(FakeDocument::Index(spec)) = &state.document else {
            return Ok(None);
        };
        if affordances.is_empty() || !spec.button_visible(state.revealed) {
            return Ok(None);
        }
        if spec.click_fails {
            return Err(ScrapeError::ElementNotFound("load more button detached".into()));
        }

        let revealed = spec.cap(state.revealed + spec.per_click);
        state.revealed = revealed;
        Ok(Some("Load more".to_string()))
    }

    async fn close(&self) {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

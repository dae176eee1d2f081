use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use super::{BrowserEngine, NavigationOutcome, PageHandle, RevealAffordance};
use crate::config::BrowserSettings;
use crate::error::{Result, ScrapeError};
use crate::utils::get_random_user_agent;

/// Requests dropped when `block_resources` is on.
const BLOCKED_RESOURCES: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg", "*.ico", "*.webp", "*.css", "*.woff", "*.woff2",
    "*.ttf",
];

const STATUS_SCRIPT: &str = r#"
(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    return entry && entry.responseStatus ? entry.responseStatus : 0;
})()
"#;

const HEIGHT_SCRIPT: &str = r#"
Math.max(
    document.body ? document.body.scrollHeight : 0,
    document.documentElement ? document.documentElement.scrollHeight : 0
)
"#;

const SCROLL_SCRIPT: &str = r#"
(() => {
    window.scrollTo(0, Math.max(
        document.body ? document.body.scrollHeight : 0,
        document.documentElement ? document.documentElement.scrollHeight : 0
    ));
    return true;
})()
"#;

/// Clicks the first visible, enabled match. Elements are re-queried on every
/// call, so nodes detached by an earlier click are never reused.
const CLICK_SCRIPT: &str = r#"
((affordances) => {
    const norm = (t) => (t || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const matches = (text, label) => {
        const v = norm(text);
        const l = norm(label);
        return l.length > 0 && (v === l || (v.startsWith(l) && v.length <= l.length + 6));
    };
    const usable = (el) => {
        if (!el.isConnected || el.disabled || el.getAttribute('aria-disabled') === 'true') return false;
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
    };
    const clickable = 'button, a, [role="button"], input[type="button"], input[type="submit"]';

    for (const affordance of affordances) {
        let found = null;
        if (affordance.kind === 'text') {
            found = Array.from(document.querySelectorAll(clickable))
                .find((el) => usable(el) && matches(el.innerText || el.value, affordance.value));
        } else {
            try {
                found = Array.from(document.querySelectorAll(affordance.value)).find(usable);
            } catch (e) {
                found = null;
            }
        }
        if (found) {
            found.scrollIntoView({ block: 'center' });
            found.click();
            return affordance.value;
        }
    }
    return '';
})(__AFFORDANCES__)
"#;

pub struct ChromiumEngine {
    settings: BrowserSettings,
    browser: AsyncMutex<Option<Arc<Browser>>>,
}

impl ChromiumEngine {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            browser: AsyncMutex::new(None),
        }
    }

    async fn launch(&self) -> anyhow::Result<Browser> {
        log::info!("🌐 Launching Chrome (headless={})", self.settings.headless);

        let mut builder = BrowserConfig::builder().window_size(1920, 1080);
        if let Some(path) = &self.settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if !self.settings.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &self.settings.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn connect_remote(&self, url: &str) -> anyhow::Result<Browser> {
        log::info!("🌐 Connecting to remote browser at {}", url);

        let http_url = url.replace("ws://", "http://").replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let version: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .context("Failed to reach remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = version
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .context("Failed to connect to remote browser")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn browser(&self) -> Result<Arc<Browser>> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        let browser = match &self.settings.remote_url {
            Some(url) => self.connect_remote(url).await,
            None => self.launch().await,
        }
        .map_err(|e| ScrapeError::Capability(format!("{:#}", e)))?;

        let browser = Arc::new(browser);
        *slot = Some(browser.clone());
        Ok(browser)
    }

    async fn prepare(&self, page: &Page) -> std::result::Result<(), chromiumoxide::error::CdpError> {
        page.execute(SetUserAgentOverrideParams::new(get_random_user_agent().to_string()))
            .await?;

        if self.settings.block_resources {
            page.execute(EnableParams::default()).await?;
            let patterns: Vec<String> = BLOCKED_RESOURCES.iter().map(|p| p.to_string()).collect();
            page.execute(SetBlockedUrLsParams::new(patterns)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn ensure_ready(&self) -> Result<()> {
        self.browser().await.map(|_| ())
    }

    async fn open_page(&self) -> Result<Box<dyn PageHandle>> {
        let browser = self.browser().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::navigation("about:blank", e))?;

        if let Err(e) = self.prepare(&page).await {
            let _ = page.close().await;
            return Err(ScrapeError::navigation("about:blank", e));
        }

        Ok(Box::new(ChromiumPage {
            page,
            current_url: Mutex::new(String::from("about:blank")),
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

pub struct ChromiumPage {
    page: Page,
    current_url: Mutex<String>,
    closed: AtomicBool,
}

impl ChromiumPage {
    fn current_url(&self) -> String {
        self.current_url
            .lock()
            .map(|url| url.clone())
            .unwrap_or_default()
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let url = self.current_url();
        self.page
            .evaluate(script.to_string())
            .await
            .map_err(|e| ScrapeError::navigation(&url, e))?
            .into_value()
            .map_err(|e| ScrapeError::navigation(&url, format!("unexpected script result: {}", e)))
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<NavigationOutcome> {
        if let Ok(mut current) = self.current_url.lock() {
            *current = url.to_string();
        }

        self.page
            .goto(url)
            .await
            .map_err(|e| ScrapeError::navigation(url, e))?;

        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());
        let status: u16 = self.eval(STATUS_SCRIPT).await.unwrap_or(0);

        Ok(NavigationOutcome {
            final_url,
            status: (status > 0).then_some(status),
        })
    }

    async fn content(&self) -> Result<String> {
        let url = self.current_url();
        self.page
            .content()
            .await
            .map_err(|e| ScrapeError::navigation(&url, e))
    }

    async fn scroll_height(&self) -> Result<u64> {
        self.eval(HEIGHT_SCRIPT).await
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.eval::<bool>(SCROLL_SCRIPT).await.map(|_| ())
    }

    async fn click_reveal(&self, affordances: &[RevealAffordance]) -> Result<Option<String>> {
        if affordances.is_empty() {
            return Ok(None);
        }
        let json = serde_json::to_string(affordances)
            .map_err(|e| ScrapeError::ElementNotFound(format!("unusable affordances: {}", e)))?;
        let script = CLICK_SCRIPT.replace("__AFFORDANCES__", &json);

        let clicked: String = self
            .eval(&script)
            .await
            .map_err(|e| ScrapeError::ElementNotFound(e.to_string()))?;
        Ok((!clicked.is_empty()).then_some(clicked))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.page.clone().close().await {
            log::debug!("Closing page failed: {}", e);
        }
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Job cancelled before it could close the page itself
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let page = self.page.clone();
            handle.spawn(async move {
                let _ = page.close().await;
            });
        }
    }
}

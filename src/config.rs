use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auto_selectors::AutoSelectors;
use crate::retry::RetryPolicy;
use crate::revealer::RevealOptions;

/// Service configuration. Every field has a default, so an empty TOML file
/// (or no file at all) is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub browser: BrowserSettings,
    pub reveal: RevealOptions,
    pub retry: RetryPolicy,
    pub scraping: ScrapingSettings,
    pub selectors: AutoSelectors,
}

impl ServiceConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` when given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Headless Chrome over the DevTools protocol.
    #[default]
    Chromium,
    /// Plain HTTP fetches, no JavaScript.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub engine: EngineKind,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    /// DevTools endpoint of an already running browser, e.g. `http://localhost:9222`.
    pub remote_url: Option<String>,
    pub navigation_timeout_secs: u64,
    /// Skip images, fonts and stylesheets while rendering.
    pub block_resources: bool,
    pub chrome_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            headless: true,
            chrome_executable: None,
            remote_url: None,
            navigation_timeout_secs: 30,
            block_resources: true,
            chrome_args: Vec::new(),
        }
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingSettings {
    /// Base URLs scraped in parallel, one page each.
    pub concurrency: usize,
    /// Wall-clock budget for one base URL, reveal and extraction included.
    pub job_timeout_secs: u64,
    /// Count an article with empty content as a failure.
    pub require_content: bool,
    /// Hard cap on navigations per domain per minute, on top of the random spacing.
    pub max_navigations_per_minute: Option<u32>,
    /// Shortest container text accepted by the primary content strategy.
    pub min_content_chars: usize,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            job_timeout_secs: 300,
            require_content: false,
            max_navigations_per_minute: None,
            min_content_chars: 100,
        }
    }
}

impl ScrapingSettings {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ServiceConfig::from_toml_str("").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.browser.engine, EngineKind::Chromium);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.scraping.concurrency, 3);
        assert!(!config.scraping.require_content);
    }

    #[test]
    fn test_partial_config_from_toml() {
        let raw = r#"
            [server]
            port = 9000

            [browser]
            engine = "http"
            navigation_timeout_secs = 10

            [reveal]
            max_iterations = 4

            [retry]
            max_attempts = 5

            [scraping]
            concurrency = 8
            max_navigations_per_minute = 30
        "#;

        let config = ServiceConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.browser.engine, EngineKind::Http);
        assert_eq!(config.browser.navigation_timeout(), Duration::from_secs(10));
        assert_eq!(config.reveal.max_iterations, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.scraping.concurrency, 8);
        assert_eq!(config.scraping.max_navigations_per_minute, Some(30));
    }

    #[test]
    fn test_unknown_engine_is_rejected() {
        assert!(ServiceConfig::from_toml_str("[browser]\nengine = \"netscape\"").is_err());
    }
}

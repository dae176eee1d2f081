use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::browser::RevealAffordance;

/// Ordered selector lists for every fallback chain. Earlier entries win.
///
/// All lists can be overridden from the `[selectors]` config section; invalid
/// selectors are skipped with a warning rather than failing the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSelectors {
    /// Containers that hold a single article, scored to pick the region.
    pub article_regions: Vec<String>,
    pub title_headings: Vec<String>,
    pub title_meta: Vec<String>,
    pub date_meta: Vec<String>,
    pub date_elements: Vec<String>,
    pub content_containers: Vec<String>,
    pub image_meta: Vec<String>,
    /// Elements never counted as article text or imagery.
    pub boilerplate: Vec<String>,
    pub reveal: Vec<RevealAffordance>,
}

impl Default for AutoSelectors {
    fn default() -> Self {
        Self {
            article_regions: strings(&[
                "article",
                "[role='article']",
                "[itemtype*='Article']",
                "main",
                "[role='main']",
                ".post",
                ".article",
                ".entry",
                ".story",
            ]),
            title_headings: strings(&[
                "h1",
                ".headline",
                ".article-title",
                ".entry-title",
                ".post-title",
                "[itemprop='headline']",
            ]),
            title_meta: strings(&[
                "meta[property='og:title']",
                "meta[name='twitter:title']",
            ]),
            date_meta: strings(&[
                "meta[property='article:published_time']",
                "meta[property='og:published_time']",
                "meta[itemprop='datePublished']",
                "meta[name='pubdate']",
                "meta[name='publishdate']",
                "meta[name='date']",
                "meta[name='DC.date.issued']",
                "meta[property='article:modified_time']",
            ]),
            date_elements: strings(&[
                "time[datetime]",
                "[itemprop='datePublished']",
                "time",
                ".date",
                ".published",
                ".post-date",
                ".article-date",
                ".timestamp",
            ]),
            content_containers: strings(&[
                "[itemprop='articleBody']",
                ".article-body",
                ".article-content",
                ".post-content",
                ".entry-content",
                ".story-body",
                "article",
                "[role='main']",
                "main",
                ".content",
            ]),
            image_meta: strings(&[
                "meta[property='og:image']",
                "meta[property='og:image:url']",
                "meta[name='twitter:image']",
            ]),
            boilerplate: strings(&[
                "script",
                "style",
                "noscript",
                "template",
                "svg",
                "iframe",
                "form",
                "nav",
                "header",
                "footer",
                "aside",
                ".sidebar",
                ".menu",
                ".navigation",
                ".comments",
                "#comments",
                ".ads",
                ".advertisement",
                ".share",
                ".social",
                ".related",
                ".newsletter",
                "[aria-hidden='true']",
            ]),
            reveal: vec![
                RevealAffordance::Text("load more".into()),
                RevealAffordance::Text("show more".into()),
                RevealAffordance::Text("view more".into()),
                RevealAffordance::Text("see more".into()),
                RevealAffordance::Text("more articles".into()),
                RevealAffordance::Text("more stories".into()),
                RevealAffordance::Css(".load-more".into()),
                RevealAffordance::Css(".show-more".into()),
                RevealAffordance::Css("[data-load-more]".into()),
                RevealAffordance::Css("[data-show-more]".into()),
                RevealAffordance::Css(".more-button".into()),
                RevealAffordance::Css(".load-button".into()),
                RevealAffordance::Text("older posts".into()),
                RevealAffordance::Text("older entries".into()),
                RevealAffordance::Css(".pagination .next".into()),
                RevealAffordance::Css("a[rel='next']".into()),
                RevealAffordance::Css(".next-page".into()),
                RevealAffordance::Text("next".into()),
            ],
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Parsed form of [`AutoSelectors`], built once per extractor.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub article_regions: Vec<Selector>,
    pub title_headings: Vec<Selector>,
    pub title_meta: Vec<Selector>,
    pub date_meta: Vec<Selector>,
    pub date_elements: Vec<Selector>,
    pub content_containers: Vec<Selector>,
    pub image_meta: Vec<Selector>,
    pub boilerplate: Vec<Selector>,
}

impl AutoSelectors {
    pub fn compile(&self) -> CompiledSelectors {
        CompiledSelectors {
            article_regions: compile_list(&self.article_regions),
            title_headings: compile_list(&self.title_headings),
            title_meta: compile_list(&self.title_meta),
            date_meta: compile_list(&self.date_meta),
            date_elements: compile_list(&self.date_elements),
            content_containers: compile_list(&self.content_containers),
            image_meta: compile_list(&self.image_meta),
            boilerplate: compile_list(&self.boilerplate),
        }
    }
}

fn compile_list(selectors: &[String]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(selector) => Some(selector),
            Err(e) => {
                log::warn!("Ignoring invalid selector '{}': {}", s, e);
                None
            }
        })
        .collect()
}

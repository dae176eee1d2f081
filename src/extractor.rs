use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::auto_selectors::{AutoSelectors, CompiledSelectors};
use crate::candidates::normalize_url;
use crate::dates::{date_from_url, find_date_in_text, normalize_date};
use crate::error::ScrapeError;
use crate::models::Article;
use crate::structure_analyzer::StructureAnalyzer;
use crate::utils::{normalize_lines, normalize_whitespace};

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol",
    "blockquote", "pre", "figure", "figcaption", "table", "tr", "br", "hr", "dd", "dt",
];

const IMAGE_NOISE: &[&str] = &[
    "logo", "icon", "avatar", "sprite", "pixel", "spacer", "badge", "placeholder", "blank.gif",
];

/// Phrases that identify bot walls and interstitials rather than content.
const BLOCK_MARKERS: &[&str] = &[
    "just a moment...",
    "attention required! | cloudflare",
    "access denied",
    "verify you are human",
    "are you a robot",
    "please complete the security check",
    "enable javascript and cookies to continue",
    "request unsuccessful. incapsula",
    "pardon our interruption",
];

/// Challenge widgets embedded by bot walls.
const CHALLENGE_WIDGETS: &str = ".g-recaptcha, .h-captcha, .cf-challenge, #cf-challenge-running, \
    #challenge-form, iframe[src*='recaptcha'], iframe[src*='hcaptcha'], \
    iframe[src*='challenges.cloudflare.com']";

/// Body phrases only count on pages this short that have no article region.
const INTERSTITIAL_CHARS: usize = 500;

/// Characters of text around the heading searched for a date.
const NEAR_HEADING_CHARS: usize = 600;

type Strategy = for<'a> fn(&ArticleExtractor, &DocumentView<'a>) -> Option<String>;

const TITLE_CHAIN: &[(&str, Strategy)] = &[
    ("region heading", ArticleExtractor::title_from_heading),
    ("meta title", ArticleExtractor::title_from_meta),
    ("document title", ArticleExtractor::title_from_title_tag),
];

const DATE_CHAIN: &[(&str, Strategy)] = &[
    ("metadata", ArticleExtractor::date_from_meta),
    ("time element", ArticleExtractor::date_from_time_element),
    ("url path", ArticleExtractor::date_from_url_path),
    ("text near heading", ArticleExtractor::date_near_heading),
];

const CONTENT_CHAIN: &[(&str, Strategy)] = &[
    ("largest container", ArticleExtractor::content_from_container),
    ("region paragraphs", ArticleExtractor::content_from_paragraphs),
];

const IMAGE_CHAIN: &[(&str, Strategy)] = &[
    ("meta image", ArticleExtractor::image_from_meta),
    ("region image", ArticleExtractor::image_from_region),
];

/// A parsed snapshot plus the region believed to hold the article.
pub struct DocumentView<'a> {
    document: &'a Html,
    region: ElementRef<'a>,
    url: &'a Url,
}

pub struct ArticleExtractor {
    selectors: CompiledSelectors,
    analyzer: StructureAnalyzer,
    min_image_px: u32,
    body: Option<Selector>,
    title_tag: Option<Selector>,
    paragraphs: Option<Selector>,
    images: Option<Selector>,
    challenge: Option<Selector>,
}

impl Default for ArticleExtractor {
    fn default() -> Self {
        Self::new(&AutoSelectors::default(), 100)
    }
}

impl ArticleExtractor {
    pub fn new(selectors: &AutoSelectors, min_content_chars: usize) -> Self {
        Self {
            selectors: selectors.compile(),
            analyzer: StructureAnalyzer::with_min_content_length(min_content_chars),
            min_image_px: 100,
            body: Selector::parse("body").ok(),
            title_tag: Selector::parse("title").ok(),
            paragraphs: Selector::parse("p").ok(),
            images: Selector::parse("img").ok(),
            challenge: Selector::parse(CHALLENGE_WIDGETS).ok(),
        }
    }

    /// Build an [`Article`] from a rendered snapshot of `candidate_url`.
    ///
    /// Never fails: a field whose whole chain comes up empty is left absent
    /// (or empty, for content). The URL is always present.
    pub fn extract(&self, html: &str, candidate_url: &Url) -> Article {
        let document = Html::parse_document(html);
        let view = DocumentView {
            document: &document,
            region: self.article_region(&document),
            url: candidate_url,
        };

        Article {
            title: self.run_chain("title", TITLE_CHAIN, &view),
            date: self.run_chain("date", DATE_CHAIN, &view),
            content: self
                .run_chain("content", CONTENT_CHAIN, &view)
                .or_else(|| self.short_container_text(&view))
                .unwrap_or_default(),
            image: self.run_chain("image", IMAGE_CHAIN, &view),
            url: normalize_url(candidate_url).to_string(),
        }
    }

    /// Reject snapshots that are not real documents: empty responses and
    /// bot walls / interstitials. Both are terminal for the unit of work.
    pub fn check_document(&self, html: &str, url: &Url) -> Result<(), ScrapeError> {
        if html.trim().is_empty() {
            return Err(ScrapeError::Extraction(format!("{} returned an empty document", url)));
        }

        let document = Html::parse_document(html);
        let title = self
            .title_tag
            .as_ref()
            .and_then(|s| document.select(s).next())
            .map(|t| normalize_whitespace(&t.text().collect::<String>()).to_lowercase())
            .unwrap_or_default();

        if let Some(marker) = BLOCK_MARKERS.iter().find(|m| title.contains(*m)) {
            return Err(ScrapeError::Blocked {
                url: url.to_string(),
                reason: format!("interstitial title '{}'", marker),
            });
        }

        // Real articles may mention captchas or quote "access denied"
        let has_headline = self
            .selectors
            .title_headings
            .iter()
            .any(|s| document.select(s).next().is_some());
        let has_article = has_headline
            && self
                .analyzer
                .best_region(document.root_element(), &self.selectors.article_regions)
                .is_some();
        if has_article {
            return Ok(());
        }

        if self.challenge.as_ref().is_some_and(|s| document.select(s).next().is_some()) {
            return Err(ScrapeError::Blocked {
                url: url.to_string(),
                reason: "challenge widget".to_string(),
            });
        }

        let body_text = self
            .body
            .as_ref()
            .and_then(|s| document.select(s).next())
            .map(|b| normalize_whitespace(&b.text().collect::<String>()).to_lowercase())
            .unwrap_or_default();

        if body_text.chars().count() < INTERSTITIAL_CHARS {
            if let Some(marker) = BLOCK_MARKERS.iter().find(|m| body_text.contains(*m)) {
                return Err(ScrapeError::Blocked {
                    url: url.to_string(),
                    reason: format!("interstitial text '{}'", marker),
                });
            }
        }

        Ok(())
    }

    fn run_chain(&self, field: &str, chain: &[(&str, Strategy)], view: &DocumentView<'_>) -> Option<String> {
        for (name, strategy) in chain {
            if let Some(value) = strategy(self, view) {
                log::trace!("{} for {} taken from {}", field, view.url, name);
                return Some(value);
            }
        }
        log::trace!("no {} found for {}", field, view.url);
        None
    }

    fn article_region<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        self.analyzer
            .best_region(document.root_element(), &self.selectors.article_regions)
            .or_else(|| self.body.as_ref().and_then(|s| document.select(s).next()))
            .unwrap_or_else(|| document.root_element())
    }

    // Title

    fn title_from_heading(&self, view: &DocumentView<'_>) -> Option<String> {
        self.first_heading(view)
            .map(|h| normalize_whitespace(&h.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    }

    fn title_from_meta(&self, view: &DocumentView<'_>) -> Option<String> {
        first_meta_content(view.document, &self.selectors.title_meta)
    }

    fn title_from_title_tag(&self, view: &DocumentView<'_>) -> Option<String> {
        let selector = self.title_tag.as_ref()?;
        view.document
            .select(selector)
            .map(|t| normalize_whitespace(&t.text().collect::<String>()))
            .find(|t| !t.is_empty())
    }

    fn first_heading<'a>(&self, view: &DocumentView<'a>) -> Option<ElementRef<'a>> {
        self.selectors.title_headings.iter().find_map(|selector| {
            view.region
                .select(selector)
                .find(|h| !h.text().collect::<String>().trim().is_empty())
        })
    }

    // Date

    fn date_from_meta(&self, view: &DocumentView<'_>) -> Option<String> {
        self.selectors.date_meta.iter().find_map(|selector| {
            view.document
                .select(selector)
                .filter_map(|m| m.value().attr("content"))
                .find_map(normalize_date)
        })
    }

    fn date_from_time_element(&self, view: &DocumentView<'_>) -> Option<String> {
        let parse = |element: ElementRef<'_>| {
            ["datetime", "content", "data-date"]
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .find_map(normalize_date)
                .or_else(|| find_date_in_text(&element.text().collect::<String>()))
        };

        self.selectors.date_elements.iter().find_map(|selector| {
            view.region
                .select(selector)
                .find_map(parse)
                .or_else(|| view.document.select(selector).find_map(parse))
        })
    }

    fn date_from_url_path(&self, view: &DocumentView<'_>) -> Option<String> {
        date_from_url(view.url)
    }

    fn date_near_heading(&self, view: &DocumentView<'_>) -> Option<String> {
        let scope = self
            .first_heading(view)
            .and_then(|h| h.parent())
            .and_then(ElementRef::wrap)
            .unwrap_or(view.region);

        let text = normalize_whitespace(&scope.text().collect::<String>());
        let near: String = text.chars().take(NEAR_HEADING_CHARS).collect();
        find_date_in_text(&near)
    }

    // Content

    /// Earlier (more specific) container selectors win; among the matches of
    /// one selector the largest link-discounted text block is taken.
    fn content_from_container(&self, view: &DocumentView<'_>) -> Option<String> {
        self.selectors.content_containers.iter().find_map(|selector| {
            let mut best: Option<(String, f64)> = None;

            for container in view.document.select(selector) {
                let text = self.block_text(container);
                if text.is_empty() {
                    continue;
                }
                let stats = self.analyzer.calculate_stats(container);
                let weight = text.len() as f64 * (1.0 - stats.link_density.min(1.0) * 0.5);
                if best.as_ref().is_none_or(|(_, w)| weight > *w) {
                    best = Some((text, weight));
                }
            }

            best.map(|(text, _)| text)
                .filter(|text| text.chars().count() >= self.analyzer.min_content_length())
        })
    }

    fn content_from_paragraphs(&self, view: &DocumentView<'_>) -> Option<String> {
        let selector = self.paragraphs.as_ref()?;
        let text = view
            .region
            .select(selector)
            .filter(|p| !self.inside_boilerplate(*p, view.region))
            .map(|p| normalize_whitespace(&p.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        (!text.is_empty()).then_some(text)
    }

    /// Last resort: whatever cleaned text the region has, however short.
    fn short_container_text(&self, view: &DocumentView<'_>) -> Option<String> {
        let text = self.block_text(view.region);
        (!text.is_empty()).then_some(text)
    }

    /// Boilerplate-free text of `element`, one line per block element.
    fn block_text(&self, element: ElementRef<'_>) -> String {
        let mut raw = String::new();
        self.collect_text(element, &mut raw);
        normalize_lines(&raw)
    }

    fn collect_text(&self, element: ElementRef<'_>, out: &mut String) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => {
                    let Some(child_ref) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_boilerplate(child_ref) {
                        continue;
                    }
                    let is_block = BLOCK_TAGS.contains(&el.name());
                    if is_block {
                        out.push('\n');
                    }
                    self.collect_text(child_ref, out);
                    if is_block {
                        out.push('\n');
                    }
                }
                _ => {}
            }
        }
    }

    fn is_boilerplate(&self, element: ElementRef<'_>) -> bool {
        self.selectors.boilerplate.iter().any(|s| s.matches(&element))
    }

    fn inside_boilerplate(&self, element: ElementRef<'_>, stop_at: ElementRef<'_>) -> bool {
        if self.is_boilerplate(element) {
            return true;
        }
        for ancestor in element.ancestors() {
            if ancestor.id() == stop_at.id() {
                break;
            }
            if let Some(ancestor) = ElementRef::wrap(ancestor) {
                if self.is_boilerplate(ancestor) {
                    return true;
                }
            }
        }
        false
    }

    // Image

    fn image_from_meta(&self, view: &DocumentView<'_>) -> Option<String> {
        first_meta_content(view.document, &self.selectors.image_meta)
            .and_then(|src| resolve(view.url, &src))
    }

    fn image_from_region(&self, view: &DocumentView<'_>) -> Option<String> {
        let selector = self.images.as_ref()?;
        view.region
            .select(selector)
            .filter(|img| !self.inside_boilerplate(*img, view.region))
            .find_map(|img| self.plausible_image_src(img))
            .and_then(|src| resolve(view.url, &src))
    }

    fn plausible_image_src(&self, img: ElementRef<'_>) -> Option<String> {
        let attrs = img.value();

        if attrs.attr("hidden").is_some() || attrs.attr("aria-hidden") == Some("true") {
            return None;
        }
        if let Some(style) = attrs.attr("style") {
            let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
            if style.contains("display:none") || style.contains("visibility:hidden") {
                return None;
            }
        }

        for dimension in ["width", "height"] {
            if let Some(px) = attrs.attr(dimension).and_then(parse_pixels) {
                if px < self.min_image_px {
                    return None;
                }
            }
        }

        let src = ["src", "data-src", "data-lazy-src", "data-original"]
            .iter()
            .filter_map(|a| attrs.attr(a))
            .map(str::trim)
            .find(|s| !s.is_empty() && !s.starts_with("data:"))
            .or_else(|| {
                attrs
                    .attr("srcset")
                    .and_then(|set| set.split(',').next())
                    .and_then(|first| first.split_whitespace().next())
            })?;

        let lower = src.to_lowercase();
        if IMAGE_NOISE.iter().any(|noise| lower.contains(noise)) {
            return None;
        }

        Some(src.to_string())
    }
}

fn first_meta_content(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        document
            .select(selector)
            .filter_map(|m| m.value().attr("content"))
            .map(normalize_whitespace)
            .find(|c| !c.is_empty())
    })
}

fn parse_pixels(value: &str) -> Option<u32> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

fn resolve(base: &Url, src: &str) -> Option<String> {
    base.join(src.trim()).ok().map(|u| u.to_string())
}

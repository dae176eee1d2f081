use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// A discovered link believed to point at an article. Consumed once by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub url: Url,
}

static EXCLUDES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/search",
        r"/log-?in",
        r"/sign-?(up|in)",
        r"/register",
        r"/contact",
        r"/about",
        r"/privacy",
        r"/terms",
        r"/cookie",
        r"/legal",
        r"/sitemap",
        r"/feed",
        r"/rss",
        r"/tags?/",
        r"/category/",
        r"/categories/",
        r"/author/",
        r"/user/",
        r"/admin",
        r"/page/\d+",
        r"[?&](page|p)=\d+",
        r"\.(css|js|json|xml|pdf|docx?|xlsx?|zip|gz|jpe?g|png|gif|svg|webp|mp[34])$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static STRONG_SIGNALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/(article|articles|post|posts|news|blog|story|stories|read|view|details|full)/[^/]+",
        r"/(19|20)\d{2}/\d{1,2}/",
        r"/(19|20)\d{2}/[^/]+",
        r"-(19|20)\d{2}-\d{2}(-\d{2})?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static MEDIUM_SIGNALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\.html?$",
        r"/[^/]+/[^/]+",
        r"/[^/]{10,}",
        r"/(entry|item|content)/",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

const CONTENT_KEYWORDS: &[&str] = &[
    "breaking",
    "exclusive",
    "report",
    "analysis",
    "interview",
    "feature",
    "opinion",
    "editorial",
    "review",
    "update",
    "announcement",
    "launch",
    "release",
    "study",
    "research",
];

/// Canonical form used for deduplication: fragment dropped, trailing slash
/// dropped from non-root paths.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(path.trim_end_matches('/'));
    }
    normalized
}

fn host_key(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// Heuristic: does `candidate` look like an article on the same site as `base`?
pub fn is_likely_article_url(candidate: &Url, base: &Url) -> bool {
    if !matches!(candidate.scheme(), "http" | "https") {
        return false;
    }
    if host_key(candidate).is_none() || host_key(candidate) != host_key(base) {
        return false;
    }
    if normalize_url(candidate) == normalize_url(base) {
        return false;
    }

    let path = candidate.path().to_lowercase();
    let lower = match candidate.query() {
        Some(query) => format!("{}?{}", path, query.to_lowercase()),
        None => path.clone(),
    };

    if EXCLUDES.iter().any(|re| re.is_match(&lower)) {
        return false;
    }
    if candidate.query_pairs().count() > 3 {
        return false;
    }
    if STRONG_SIGNALS.iter().any(|re| re.is_match(&path)) {
        return true;
    }

    let has_keyword = CONTENT_KEYWORDS.iter().any(|k| lower.contains(k));
    let segments = path.split('/').filter(|s| !s.is_empty()).count();
    if segments < 2 && !has_keyword {
        return false;
    }

    has_keyword || MEDIUM_SIGNALS.iter().any(|re| re.is_match(&path))
}

/// Ordered, deduplicated set of candidates accumulated across reveal passes.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    base: Url,
    seen: HashSet<String>,
    candidates: Vec<ArticleCandidate>,
    anchors: Option<Selector>,
}

impl CandidateSet {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            seen: HashSet::new(),
            candidates: Vec::new(),
            anchors: Selector::parse("a[href]").ok(),
        }
    }

    /// Add every new candidate linked from `html`, in document order.
    /// Returns how many were new.
    pub fn absorb(&mut self, html: &str) -> usize {
        let Some(anchors) = &self.anchors else {
            return 0;
        };
        let document = Html::parse_document(html);
        let before = self.candidates.len();

        for element in document.select(anchors) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') {
                continue;
            }
            let Ok(absolute) = self.base.join(href) else {
                continue;
            };
            if !is_likely_article_url(&absolute, &self.base) {
                continue;
            }

            let normalized = normalize_url(&absolute);
            if self.seen.insert(normalized.to_string()) {
                self.candidates.push(ArticleCandidate { url: normalized });
            }
        }

        self.candidates.len() - before
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn into_vec(self) -> Vec<ArticleCandidate> {
        self.candidates
    }
}

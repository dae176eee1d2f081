use scraper::{ElementRef, Selector};

/// Text and link statistics of one DOM subtree.
#[derive(Debug, Clone, Default)]
pub struct SectionStats {
    pub text_length: usize,
    pub link_count: usize,
    pub paragraph_count: usize,
    pub density_score: f64,
    pub link_density: f64,
    pub element_count: usize,
}

/// Scores candidate containers to decide which one holds the article.
pub struct StructureAnalyzer {
    min_content_length: usize,
    anchors: Option<Selector>,
    paragraphs: Option<Selector>,
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::with_min_content_length(200)
    }
}

impl StructureAnalyzer {
    pub fn with_min_content_length(min_content_length: usize) -> Self {
        Self {
            min_content_length,
            anchors: Selector::parse("a").ok(),
            paragraphs: Selector::parse("p").ok(),
        }
    }

    pub fn min_content_length(&self) -> usize {
        self.min_content_length
    }

    pub fn calculate_stats(&self, element: ElementRef) -> SectionStats {
        let text: String = element.text().collect();
        let text_length = text.trim().len();

        let link_count = count(element, &self.anchors);
        let paragraph_count = count(element, &self.paragraphs);
        let element_count = element.descendants().count();

        // Text per node, saturating at 1.0
        let density_score = if element_count > 0 {
            (text_length as f64 / element_count as f64).min(1.0)
        } else {
            0.0
        };

        // Roughly one link per 50 characters of text counts as fully linky
        let link_density = if text_length > 0 {
            (link_count as f64 * 50.0) / text_length as f64
        } else {
            1.0
        };

        SectionStats {
            text_length,
            link_count,
            paragraph_count,
            density_score,
            link_density,
            element_count,
        }
    }

    /// Article-likeness in `[0, 1]`.
    pub fn article_score(&self, stats: &SectionStats) -> f64 {
        let mut score = 0.0;
        score += stats.density_score * 0.3;
        score += (1.0 - stats.link_density.min(1.0)) * 0.3;
        score += (stats.paragraph_count.min(10) as f64 / 10.0) * 0.2;
        score += (stats.text_length.min(5000) as f64 / 5000.0) * 0.2;
        score.clamp(0.0, 1.0)
    }

    /// Best-scoring element among everything `selectors` match under `scope`.
    ///
    /// Ties keep the earlier selector, then the earlier element in document
    /// order, so the choice is stable for identical input.
    pub fn best_region<'a>(&self, scope: ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
        let mut best: Option<(ElementRef<'a>, f64)> = None;

        for selector in selectors {
            for element in scope.select(selector) {
                let stats = self.calculate_stats(element);
                if stats.text_length == 0 {
                    continue;
                }
                let score = self.article_score(&stats);
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((element, score));
                }
            }
        }

        best.map(|(element, _)| element)
    }
}

fn count(element: ElementRef, selector: &Option<Selector>) -> usize {
    selector
        .as_ref()
        .map(|s| element.select(s).count())
        .unwrap_or(0)
}

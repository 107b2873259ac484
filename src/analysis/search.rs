//! Text search over a layout payload

use crate::viewer::ExtractionRegion;

use super::{LayoutAnalysis, TextElement};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Line,
    Word,
}

/// A line or word containing the search term
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub page: usize,
    pub kind: ElementKind,
    /// Position among the page's lines or words
    pub index: usize,
    pub text: String,
    pub region: ExtractionRegion,
}

/// Case-insensitive substring search, lines before words, pages in order.
///
/// Elements whose polygon cannot be drawn are not reported.
#[must_use]
pub fn search(layout: &LayoutAnalysis, term: &str) -> Vec<SearchHit> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return vec![];
    }

    let mut hits = vec![];
    for (&page, page_layout) in &layout.pages {
        collect(page, ElementKind::Line, &page_layout.lines, &needle, &mut hits);
        collect(page, ElementKind::Word, &page_layout.words, &needle, &mut hits);
    }
    hits
}

fn collect(
    page: usize,
    kind: ElementKind,
    elements: &[TextElement],
    needle: &str,
    hits: &mut Vec<SearchHit>,
) {
    for (index, element) in elements.iter().enumerate() {
        if !element.text.to_lowercase().contains(needle) {
            continue;
        }
        if let Ok(region) = ExtractionRegion::new(page, element.polygon.clone()) {
            hits.push(SearchHit {
                page,
                kind,
                index,
                text: element.text.clone(),
                region,
            });
        }
    }
}

//! Analysis payloads produced by the extraction backend
//!
//! Two shapes arrive: the field result (`documents[].fields`) and the layout
//! result (per-page lines, words and images). Field names, content and
//! confidence pass through untouched; only the regions are interpreted.

mod search;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::viewer::geometry::POINTS_PER_INCH;
use crate::viewer::{Annotation, ExtractionRegion, HighlightStyle, PaperPage};

pub use search::{ElementKind, SearchHit, search};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("malformed analysis payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload has neither documents nor a page layout")]
    UnknownShape,
}

/// Field extraction result
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub documents: Vec<AnalyzedDocument>,
    #[serde(default)]
    pub pages: Vec<PageInfo>,
}

/// Size of one analysed page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(alias = "page_number")]
    pub page_number: usize,
    pub width: f64,
    pub height: f64,
    /// `"inch"` or `"pixel"`
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub angle: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedDocument {
    #[serde(default, alias = "doc_type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Fields in payload order
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
}

/// One recognised field
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, alias = "bounding_regions")]
    pub bounding_regions: Vec<ExtractionRegion>,
    /// Everything else (typed value, spans), kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Field {
    /// Regions that can be drawn; malformed ones are logged and skipped
    #[must_use]
    pub fn valid_regions(&self) -> Vec<ExtractionRegion> {
        self.bounding_regions
            .iter()
            .filter(|region| match region.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping region on page {}: {e}", region.page_number);
                    false
                }
            })
            .cloned()
            .collect()
    }
}

impl AnalysisResult {
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(json)?)
    }

    /// First field called `name` across all documents
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.documents.iter().find_map(|doc| doc.fields.get(name))
    }

    /// `(name, field)` for every field of every document
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.documents
            .iter()
            .flat_map(|doc| doc.fields.iter().map(|(name, field)| (name.as_str(), field)))
    }

    /// Every drawable field region, for the "show all" view
    #[must_use]
    pub fn annotations(&self, style: HighlightStyle) -> Vec<Annotation> {
        self.fields()
            .flat_map(|(_, field)| field.valid_regions())
            .map(|region| Annotation::new(region, style))
            .collect()
    }

    /// Paper pages matching the analysed page sizes, when sizes are in inches
    #[must_use]
    pub fn paper_pages(&self) -> Option<Vec<PaperPage>> {
        if self.pages.is_empty() {
            return None;
        }
        let mut pages = self.pages.clone();
        pages.sort_by_key(|p| p.page_number);

        pages
            .iter()
            .map(|info| {
                let inches = info.unit.as_deref().is_none_or(|u| u == "inch");
                inches.then(|| PaperPage {
                    width: info.width * POINTS_PER_INCH,
                    height: info.height * POINTS_PER_INCH,
                    ..PaperPage::letter()
                })
            })
            .collect()
    }
}

/// Per-page layout result
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayoutAnalysis {
    /// Keyed by 1-based page number
    #[serde(default)]
    pub pages: BTreeMap<usize, PageLayout>,
    #[serde(default)]
    pub extracted_images: Vec<ExtractedImage>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    #[serde(default)]
    pub lines: Vec<TextElement>,
    #[serde(default)]
    pub words: Vec<TextElement>,
    #[serde(default)]
    pub images: Vec<PageImage>,
}

/// A line or word with its polygon in inches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default)]
    pub polygon: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageImage {
    #[serde(default)]
    pub bounding_box: Vec<f64>,
    pub image_index: usize,
    #[serde(default)]
    pub description: Option<String>,
}

/// Entry of the document-wide image list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub page_number: usize,
    #[serde(default)]
    pub description: Option<String>,
}

/// Flat backend shape: `{"lines": [{page, line_index, text, polygon}], "words": [...]}`
#[derive(Deserialize)]
struct FlatLayout {
    #[serde(default)]
    lines: Vec<FlatElement>,
    #[serde(default)]
    words: Vec<FlatElement>,
}

#[derive(Deserialize)]
struct FlatElement {
    page: usize,
    text: String,
    #[serde(default)]
    polygon: Vec<f64>,
}

impl FlatLayout {
    fn into_pages(self) -> LayoutAnalysis {
        let mut layout = LayoutAnalysis::default();
        for line in self.lines {
            layout.pages.entry(line.page).or_default().lines.push(TextElement {
                text: line.text,
                polygon: line.polygon,
            });
        }
        for word in self.words {
            layout.pages.entry(word.page).or_default().words.push(TextElement {
                text: word.text,
                polygon: word.polygon,
            });
        }
        layout
    }
}

/// Element counts over a whole layout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutSummary {
    pub pages: usize,
    pub lines: usize,
    pub words: usize,
    pub images: usize,
}

impl LayoutAnalysis {
    /// Parse either the per-page or the flat layout shape
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let value: Value = serde_json::from_str(json)?;
        let Some(object) = value.as_object() else {
            return Err(AnalysisError::UnknownShape);
        };

        if object.contains_key("pages") {
            Ok(serde_json::from_value(value)?)
        } else if object.contains_key("lines") || object.contains_key("words") {
            let flat: FlatLayout = serde_json::from_value(value)?;
            Ok(flat.into_pages())
        } else {
            Err(AnalysisError::UnknownShape)
        }
    }

    #[must_use]
    pub fn page(&self, page: usize) -> Option<&PageLayout> {
        self.pages.get(&page)
    }

    /// Lines and words in the text style, images in the image style
    #[must_use]
    pub fn annotations(&self) -> Vec<Annotation> {
        let mut out = vec![];
        for (&page, layout) in &self.pages {
            let text = layout
                .lines
                .iter()
                .chain(&layout.words)
                .map(|element| (&element.polygon, HighlightStyle::TEXT));
            let images = layout
                .images
                .iter()
                .map(|image| (&image.bounding_box, HighlightStyle::IMAGE));

            for (polygon, style) in text.chain(images) {
                match ExtractionRegion::new(page, polygon.clone()) {
                    Ok(region) => out.push(Annotation::new(region, style)),
                    Err(e) => warn!("Skipping layout element on page {page}: {e}"),
                }
            }
        }
        out
    }

    /// Region of entry `index` of the image list
    #[must_use]
    pub fn image_region(&self, index: usize) -> Option<ExtractionRegion> {
        let page = self.extracted_images.get(index)?.page_number;
        let image = self
            .page(page)?
            .images
            .iter()
            .find(|img| img.image_index == index)?;
        ExtractionRegion::new(page, image.bounding_box.clone()).ok()
    }

    /// Region of the `index`th line or word on `page`
    #[must_use]
    pub fn element_region(
        &self,
        page: usize,
        kind: ElementKind,
        index: usize,
    ) -> Option<ExtractionRegion> {
        let layout = self.page(page)?;
        let elements = match kind {
            ElementKind::Line => &layout.lines,
            ElementKind::Word => &layout.words,
        };
        let element = elements.get(index)?;
        ExtractionRegion::new(page, element.polygon.clone()).ok()
    }

    #[must_use]
    pub fn summary(&self) -> LayoutSummary {
        self.pages.values().fold(
            LayoutSummary {
                pages: self.pages.len(),
                ..LayoutSummary::default()
            },
            |acc, page| LayoutSummary {
                lines: acc.lines + page.lines.len(),
                words: acc.words + page.words.len(),
                images: acc.images + page.images.len(),
                ..acc
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE: &str = r#"{
        "documents": [{
            "docType": "invoice",
            "confidence": 1.0,
            "fields": {
                "InvoiceDate": {
                    "content": "30 januari 2025",
                    "confidence": 0.806,
                    "boundingRegions": [{"pageNumber": 1, "polygon": [6.6034, 0.6427, 7.3387, 0.6391, 7.3393, 0.7609, 6.604, 0.7644]}]
                },
                "InvoiceTotal": {
                    "content": "£ 24,32",
                    "confidence": 0.771,
                    "boundingRegions": [{"pageNumber": 1, "polygon": [6.8308, 2.0152, 7.3401, 2.02, 7.3387, 2.1777, 6.8294, 2.1729]}]
                },
                "VendorName": {
                    "type": "string",
                    "value": "Uber",
                    "content": "Uber",
                    "confidence": 0.568,
                    "bounding_regions": [{"page_number": 1, "polygon": [0.9024, 0.541, 1.5077, 0.5443, 1.5077, 0.8051, 0.9012, 0.7995]}],
                    "spans": [{"offset": 0, "length": 4}]
                }
            }
        }]
    }"#;

    #[test]
    fn parses_fields_in_payload_order() {
        let result = AnalysisResult::from_json(INVOICE).unwrap();
        let names: Vec<&str> = result.fields().map(|(name, _)| name).collect();
        assert_eq!(names, ["InvoiceDate", "InvoiceTotal", "VendorName"]);

        let doc = &result.documents[0];
        assert_eq!(doc.doc_type.as_deref(), Some("invoice"));
    }

    #[test]
    fn snake_case_fields_keep_unknown_keys() {
        let result = AnalysisResult::from_json(INVOICE).unwrap();
        let vendor = result.field("VendorName").unwrap();

        assert_eq!(vendor.field_type.as_deref(), Some("string"));
        assert_eq!(vendor.bounding_regions.len(), 1);
        assert_eq!(vendor.bounding_regions[0].page_number, 1);
        assert_eq!(vendor.extra.get("value"), Some(&Value::from("Uber")));
        assert!(vendor.extra.contains_key("spans"));
    }

    #[test]
    fn malformed_regions_are_not_annotated() {
        let json = r#"{"documents": [{"fields": {
            "Good": {"boundingRegions": [{"pageNumber": 2, "polygon": [0,0,1,0,1,1,0,1]}]},
            "Bad": {"boundingRegions": [{"pageNumber": 1, "polygon": [1, 2, 3]}]}
        }}]}"#;
        let result = AnalysisResult::from_json(json).unwrap();
        let annotations = result.annotations(HighlightStyle::SELECTION);

        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].region.page_number, 2);
    }

    #[test]
    fn page_sizes_become_paper() {
        let json = r#"{"pages": [
            {"page_number": 2, "width": 8.5, "height": 11, "unit": "inch"},
            {"page_number": 1, "width": 11, "height": 8.5, "unit": "inch"}
        ]}"#;
        let result = AnalysisResult::from_json(json).unwrap();
        let pages = result.paper_pages().unwrap();

        assert_eq!((pages[0].width, pages[0].height), (792.0, 612.0));
        assert_eq!((pages[1].width, pages[1].height), (612.0, 792.0));

        let pixels = r#"{"pages": [{"pageNumber": 1, "width": 1700, "height": 2200, "unit": "pixel"}]}"#;
        assert!(AnalysisResult::from_json(pixels).unwrap().paper_pages().is_none());
    }

    const LAYOUT: &str = r#"{
        "pages": {
            "1": {
                "lines": [{"text": "Invoice 42", "polygon": [1,1,3,1,3,1.2,1,1.2]}],
                "words": [{"text": "Invoice", "polygon": [1,1,2,1,2,1.2,1,1.2]},
                          {"text": "42", "polygon": [2.1,1,3,1,3,1.2,2.1,1.2]}],
                "images": []
            },
            "2": {
                "lines": [],
                "words": [{"text": "broken", "polygon": [1, 2]}],
                "images": [{"bounding_box": [1,1,4,1,4,3,1,3], "image_index": 0, "description": "logo"}]
            }
        },
        "extracted_images": [{"page_number": 2, "description": "logo"}]
    }"#;

    #[test]
    fn layout_pages_are_keyed_by_number() {
        let layout = LayoutAnalysis::from_json(LAYOUT).unwrap();
        assert_eq!(layout.page(1).unwrap().words.len(), 2);
        assert_eq!(
            layout.summary(),
            LayoutSummary {
                pages: 2,
                lines: 1,
                words: 3,
                images: 1,
            }
        );
    }

    #[test]
    fn layout_annotations_use_element_styles() {
        let layout = LayoutAnalysis::from_json(LAYOUT).unwrap();
        let annotations = layout.annotations();

        // the broken word on page 2 is skipped
        assert_eq!(annotations.len(), 4);
        let image = annotations.last().unwrap();
        assert_eq!(image.region.page_number, 2);
        assert_eq!(image.style, HighlightStyle::IMAGE);
        assert!(
            annotations[..3]
                .iter()
                .all(|a| a.style == HighlightStyle::TEXT)
        );
    }

    #[test]
    fn image_and_element_lookup() {
        let layout = LayoutAnalysis::from_json(LAYOUT).unwrap();

        let image = layout.image_region(0).unwrap();
        assert_eq!(image.page_number, 2);
        assert!(layout.image_region(1).is_none());

        let word = layout.element_region(1, ElementKind::Word, 1).unwrap();
        assert_eq!(word.polygon[0], 2.1);
        assert!(layout.element_region(2, ElementKind::Word, 0).is_none());
    }

    #[test]
    fn flat_layout_is_grouped_by_page() {
        let json = r#"{
            "lines": [{"page": 2, "line_index": 0, "text": "Total", "polygon": [0,0,1,0,1,1,0,1]}],
            "words": [{"page": 1, "word_index": 0, "text": "Hi", "polygon": [0,0,1,0,1,1,0,1]},
                      {"page": 2, "word_index": 0, "text": "Total", "polygon": [0,0,1,0,1,1,0,1]}]
        }"#;
        let layout = LayoutAnalysis::from_json(json).unwrap();

        assert_eq!(layout.pages.len(), 2);
        assert_eq!(layout.page(2).unwrap().lines[0].text, "Total");
        assert_eq!(layout.page(1).unwrap().words[0].text, "Hi");
    }

    #[test]
    fn unknown_layout_shape_is_rejected() {
        assert!(matches!(
            LayoutAnalysis::from_json(r#"{"documents": []}"#),
            Err(AnalysisError::UnknownShape)
        ));
        assert!(matches!(
            LayoutAnalysis::from_json("[1, 2]"),
            Err(AnalysisError::UnknownShape)
        ));
        assert!(matches!(
            LayoutAnalysis::from_json("{"),
            Err(AnalysisError::Json(_))
        ));
    }
}

//! Page-indexed extraction polygons

use serde::{Deserialize, Serialize};

use super::geometry::{InchBounds, InvalidGeometry, bounding_box, validate_polygon};

/// Where a recognized item was found: a page number and a polygon in
/// inches, top-left origin, as `[x0, y0, x1, y1, ...]`.
///
/// Deserialized as-is from analysis payloads; call [`ExtractionRegion::validate`]
/// before drawing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRegion {
    /// 1-based page number
    #[serde(alias = "page_number", alias = "page")]
    pub page_number: usize,
    #[serde(default)]
    pub polygon: Vec<f64>,
}

impl ExtractionRegion {
    /// Build a region, rejecting malformed polygons
    pub fn new(page_number: usize, polygon: Vec<f64>) -> Result<Self, InvalidGeometry> {
        let region = Self {
            page_number,
            polygon,
        };
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<(), InvalidGeometry> {
        validate_polygon(&self.polygon)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Bounding box in inches
    pub fn bounds(&self) -> Result<InchBounds, InvalidGeometry> {
        bounding_box(&self.polygon)
    }
}

/// First region on `page`, if any
#[must_use]
pub fn region_on_page(regions: &[ExtractionRegion], page: usize) -> Option<&ExtractionRegion> {
    regions.iter().find(|r| r.page_number == page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_camel_and_snake_case_payloads() {
        let camel: ExtractionRegion =
            serde_json::from_str(r#"{"pageNumber": 2, "polygon": [0,0,1,0,1,1,0,1]}"#).unwrap();
        let snake: ExtractionRegion =
            serde_json::from_str(r#"{"page_number": 2, "polygon": [0,0,1,0,1,1,0,1]}"#).unwrap();

        assert_eq!(camel, snake);
        assert!(camel.is_valid());
    }

    #[test]
    fn malformed_polygon_deserializes_but_does_not_validate() {
        let region: ExtractionRegion =
            serde_json::from_str(r#"{"pageNumber": 1, "polygon": [1, 2, 3]}"#).unwrap();
        assert!(!region.is_valid());
        assert!(ExtractionRegion::new(1, vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn finds_first_region_for_page() {
        let regions = vec![
            ExtractionRegion::new(1, vec![0.0; 8]).unwrap(),
            ExtractionRegion::new(3, vec![1.0; 8]).unwrap(),
            ExtractionRegion::new(3, vec![2.0; 8]).unwrap(),
        ];

        assert_eq!(region_on_page(&regions, 3), Some(&regions[1]));
        assert_eq!(region_on_page(&regions, 2), None);
    }
}

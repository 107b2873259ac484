//! Highlight overlays drawn over the rendered page

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use super::geometry::{
    InvalidGeometry, PixelPoint, PixelRect, Viewport, to_overlay_polygon, to_overlay_rect,
};

/// RGBA colour with a fractional alpha, written as `rgba(r, g, b, a)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Alpha as a 0..=255 channel value
    #[must_use]
    pub fn alpha_u8(&self) -> u8 {
        (self.a.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid colour {0:?}, expected rgba(r, g, b, a)")]
pub struct ColorParseError(String);

impl FromStr for Rgba {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let inner = s
            .trim()
            .strip_prefix("rgba(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(err)?;

        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        let [r, g, b, a] = parts.as_slice() else {
            return Err(err());
        };

        let channel = |v: &str| v.parse::<u8>().map_err(|_| err());
        let alpha = a.parse::<f32>().map_err(|_| err())?;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(err());
        }

        Ok(Self::new(channel(*r)?, channel(*g)?, channel(*b)?, alpha))
    }
}

impl TryFrom<String> for Rgba {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        value.to_string()
    }
}

/// How a region is outlined
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightShape {
    /// Axis-aligned box around the polygon
    #[default]
    BoundingBox,
    /// The polygon itself, vertex by vertex
    Outline,
}

/// Fill, border and shape of a highlight
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighlightStyle {
    pub fill: Rgba,
    pub border: Rgba,
    #[serde(default)]
    pub shape: HighlightShape,
}

impl HighlightStyle {
    /// Selected field or search hit
    pub const SELECTION: Self = Self::boxed(
        Rgba::new(255, 255, 0, 0.3),
        Rgba::new(255, 0, 0, 0.7),
    );
    /// Text lines and words of a page
    pub const TEXT: Self = Self::boxed(Rgba::new(0, 0, 255, 0.1), Rgba::new(0, 0, 255, 0.5));
    /// Image regions of a page
    pub const IMAGE: Self = Self::boxed(Rgba::new(0, 128, 0, 0.1), Rgba::new(0, 128, 0, 0.5));
    /// A single image picked from the image list
    pub const IMAGE_FOCUS: Self =
        Self::boxed(Rgba::new(0, 128, 0, 0.2), Rgba::new(0, 128, 0, 0.8));

    const fn boxed(fill: Rgba, border: Rgba) -> Self {
        Self {
            fill,
            border,
            shape: HighlightShape::BoundingBox,
        }
    }

    #[must_use]
    pub const fn with_shape(mut self, shape: HighlightShape) -> Self {
        self.shape = shape;
        self
    }
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self::SELECTION
    }
}

/// Pixel geometry of one overlay
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayGeometry {
    Rect(PixelRect),
    Polygon(Vec<PixelPoint>),
}

impl OverlayGeometry {
    /// Transform an extraction polygon for the given shape
    pub fn from_polygon(
        polygon: &[f64],
        viewport: &Viewport,
        page_height_points: f64,
        shape: HighlightShape,
    ) -> Result<Self, InvalidGeometry> {
        match shape {
            HighlightShape::BoundingBox => {
                to_overlay_rect(polygon, viewport, page_height_points).map(Self::Rect)
            }
            HighlightShape::Outline => {
                to_overlay_polygon(polygon, viewport, page_height_points).map(Self::Polygon)
            }
        }
    }

    /// Axis-aligned bounds
    #[must_use]
    pub fn bounds(&self) -> PixelRect {
        match self {
            Self::Rect(rect) => *rect,
            Self::Polygon(points) => {
                let mut min = PixelPoint::new(f64::INFINITY, f64::INFINITY);
                let mut max = PixelPoint::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
                for p in points {
                    min.x = min.x.min(p.x);
                    min.y = min.y.min(p.y);
                    max.x = max.x.max(p.x);
                    max.y = max.y.max(p.y);
                }
                if points.is_empty() {
                    PixelRect::default()
                } else {
                    PixelRect::from_corners(min, max)
                }
            }
        }
    }
}

/// One drawn highlight
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    /// Page the overlay was drawn for (1-based)
    pub page: usize,
    pub geometry: OverlayGeometry,
    pub style: HighlightStyle,
}

/// Overlays for the active page.
///
/// Never holds overlays for two different pages at once.
#[derive(Debug, Default)]
pub struct OverlayStore {
    page: Option<usize>,
    overlays: Vec<Overlay>,
}

impl OverlayStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every overlay. No-op when already empty.
    pub fn clear(&mut self) {
        if !self.overlays.is_empty() {
            debug!("Clearing {} overlays", self.overlays.len());
        }
        self.overlays.clear();
        self.page = None;
    }

    /// Append one overlay for `page`
    pub fn draw(&mut self, page: usize, geometry: OverlayGeometry, style: HighlightStyle) {
        if self.page.is_some_and(|p| p != page) {
            debug!(
                "Overlay for page {page} replaces overlays of page {:?}",
                self.page
            );
            self.clear();
        }
        self.page = Some(page);
        self.overlays.push(Overlay {
            page,
            geometry,
            style,
        });
    }

    #[must_use]
    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    /// Page the current overlays belong to
    #[must_use]
    pub fn page(&self) -> Option<usize> {
        self.page
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }
}

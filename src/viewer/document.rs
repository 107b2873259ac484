//! Document collaborators: provider, handle, page and the render surface
//!
//! Decoding a real document format is left to implementations of these
//! traits. [`PaperProvider`] ships with the crate and produces blank pages
//! of a given size, optionally with placeholder text runs, which is enough
//! to preview highlights.

use std::sync::{Arc, Mutex};

use serde::Deserialize;

use super::geometry::{PixelRect, Rotation, ViewBox, Viewport};

/// Document failed to decode
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("document has no pages")]
    Empty,

    #[error("cannot decode document: {detail}")]
    Decode { detail: String },
}

impl LoadError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode { detail: msg.into() }
    }
}

/// Page fetch or draw failure reported by a document implementation
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PageFault {
    #[error("page {page} does not exist")]
    Missing { page: usize },

    #[error("{detail}")]
    Generic { detail: String },
}

impl PageFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Turns raw bytes into a paginated document
pub trait DocumentProvider {
    fn load(&self, bytes: &[u8]) -> Result<Arc<dyn DocumentHandle>, LoadError>;
}

/// A decoded, paginated document
pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> usize;

    /// Fetch a fresh page snapshot. `number` is 1-based.
    fn page(&self, number: usize) -> Result<Box<dyn Page>, PageFault>;
}

/// One page of a document
pub trait Page: Send {
    /// 1-based page number
    fn number(&self) -> usize;

    /// Page box in points, bottom-left origin
    fn view_box(&self) -> ViewBox;

    fn rotation(&self) -> Rotation {
        Rotation::None
    }

    fn viewport(&self, scale: f64) -> Viewport {
        Viewport::new(self.view_box(), scale, self.rotation())
    }

    /// Top edge of the page box; the reference for flipping top-left coordinates
    fn height_points(&self) -> f64 {
        self.view_box().y1
    }

    /// Draw onto a surface already sized for `viewport`
    fn draw(&self, surface: &mut Surface, viewport: &Viewport) -> Result<(), PageFault>;

    /// Text layer content, extracted after the draw
    fn text_content(&self) -> Result<Vec<TextRun>, PageFault> {
        Ok(Vec::new())
    }
}

/// A run of text positioned in page points (bottom-left origin, baseline at `y`)
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl TextRun {
    /// Pixel box of the run under `viewport`
    #[must_use]
    pub fn pixel_rect(&self, viewport: &Viewport) -> PixelRect {
        let a = viewport.to_pixel(self.x, self.y);
        let b = viewport.to_pixel(self.x + self.width, self.y + self.height);
        PixelRect::from_corners(a, b)
    }
}

/// The single reusable RGBA render target
#[derive(Clone, Debug, Default)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Surface shared between the scheduler and its render worker
pub type SharedSurface = Arc<Mutex<Surface>>;

impl Surface {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let mut surface = Self::default();
        surface.resize(width, height);
        surface
    }

    /// Resize and wipe to transparent, like resizing a canvas
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize * 4, 0);
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Fill the part of `rect` that lies on the surface
    pub fn fill_rect(&mut self, rect: &PixelRect, rgba: [u8; 4]) {
        let Some(clipped) = rect.clamp_to(f64::from(self.width), f64::from(self.height)) else {
            return;
        };
        let x0 = clipped.left.floor() as usize;
        let y0 = clipped.top.floor() as usize;
        let x1 = (clipped.right().ceil() as usize).min(self.width as usize);
        let y1 = (clipped.bottom().ceil() as usize).min(self.height as usize);
        let stride = self.width as usize * 4;

        for y in y0..y1 {
            let row = &mut self.pixels[y * stride + x0 * 4..y * stride + x1 * 4];
            for px in row.chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
    }
}

const PAPER_RGBA: [u8; 4] = [255, 255, 255, 255];
const INK_RGBA: [u8; 4] = [64, 64, 64, 255];

/// Page description for [`PaperProvider`]
#[derive(Clone, Debug, Deserialize)]
pub struct PaperPage {
    /// Width in points
    pub width: f64,
    /// Height in points
    pub height: f64,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub text: Vec<TextRun>,
}

impl PaperPage {
    /// US Letter, 612 x 792 points
    #[must_use]
    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
            rotation: 0,
            text: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct PaperManifest {
    pages: Vec<PaperPage>,
}

/// Decodes a JSON manifest `{"pages": [{"width": 612, "height": 792}, ...]}`
/// into blank paper pages
#[derive(Clone, Copy, Debug, Default)]
pub struct PaperProvider;

impl DocumentProvider for PaperProvider {
    fn load(&self, bytes: &[u8]) -> Result<Arc<dyn DocumentHandle>, LoadError> {
        let manifest: PaperManifest =
            serde_json::from_slice(bytes).map_err(|e| LoadError::decode(e.to_string()))?;
        let document = PaperDocument::new(manifest.pages)?;
        Ok(Arc::new(document))
    }
}

/// Blank pages with optional placeholder text
#[derive(Clone, Debug)]
pub struct PaperDocument {
    pages: Vec<PaperPage>,
}

impl PaperDocument {
    pub fn new(pages: Vec<PaperPage>) -> Result<Self, LoadError> {
        if pages.is_empty() {
            return Err(LoadError::Empty);
        }
        for (i, page) in pages.iter().enumerate() {
            if !(page.width > 0.0 && page.height > 0.0) {
                return Err(LoadError::decode(format!(
                    "page {} has invalid size {}x{}",
                    i + 1,
                    page.width,
                    page.height
                )));
            }
            if Rotation::from_degrees(page.rotation).is_none() {
                return Err(LoadError::decode(format!(
                    "page {} has invalid rotation {}",
                    i + 1,
                    page.rotation
                )));
            }
        }
        Ok(Self { pages })
    }

    /// `count` letter-size pages, at least one.
    ///
    /// Use [`PaperDocument::new`] to have an empty page list rejected with
    /// [`LoadError::Empty`].
    #[must_use]
    pub fn letter(count: usize) -> Self {
        Self {
            pages: vec![PaperPage::letter(); count.max(1)],
        }
    }
}

impl DocumentHandle for PaperDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, number: usize) -> Result<Box<dyn Page>, PageFault> {
        let paper = number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or(PageFault::Missing { page: number })?;

        Ok(Box::new(PaperSheet {
            number,
            view_box: ViewBox::from_size(paper.width, paper.height),
            rotation: Rotation::from_degrees(paper.rotation).unwrap_or_default(),
            text: paper.text.clone(),
        }))
    }
}

struct PaperSheet {
    number: usize,
    view_box: ViewBox,
    rotation: Rotation,
    text: Vec<TextRun>,
}

impl Page for PaperSheet {
    fn number(&self) -> usize {
        self.number
    }

    fn view_box(&self) -> ViewBox {
        self.view_box
    }

    fn rotation(&self) -> Rotation {
        self.rotation
    }

    fn draw(&self, surface: &mut Surface, viewport: &Viewport) -> Result<(), PageFault> {
        surface.fill(PAPER_RGBA);
        for run in &self.text {
            surface.fill_rect(&run.pixel_rect(viewport), INK_RGBA);
        }
        Ok(())
    }

    fn text_content(&self) -> Result<Vec<TextRun>, PageFault> {
        Ok(self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_wipes_surface() {
        let mut surface = Surface::new(4, 4);
        surface.fill([1, 2, 3, 4]);
        assert_eq!(surface.pixel(3, 3), Some([1, 2, 3, 4]));

        surface.resize(2, 3);
        assert_eq!(surface.pixels().len(), 2 * 3 * 4);
        assert_eq!(surface.pixel(1, 2), Some([0, 0, 0, 0]));
        assert_eq!(surface.pixel(2, 0), None);
    }

    #[test]
    fn fill_rect_is_clipped() {
        let mut surface = Surface::new(10, 10);
        let rect = PixelRect {
            left: 8.0,
            top: -2.0,
            width: 5.0,
            height: 4.0,
        };
        surface.fill_rect(&rect, [9, 9, 9, 255]);

        assert_eq!(surface.pixel(9, 0), Some([9, 9, 9, 255]));
        assert_eq!(surface.pixel(9, 1), Some([9, 9, 9, 255]));
        assert_eq!(surface.pixel(9, 2), Some([0, 0, 0, 0]));
        assert_eq!(surface.pixel(7, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn paper_provider_reads_manifest() {
        let bytes = br#"{"pages": [{"width": 612, "height": 792},
                                   {"width": 792, "height": 612, "rotation": 90}]}"#;
        let doc = PaperProvider.load(bytes).unwrap();
        assert_eq!(doc.page_count(), 2);

        let page = doc.page(2).unwrap();
        assert_eq!(page.rotation(), Rotation::Quarter);
        assert!(doc.page(3).is_err());
        assert!(doc.page(0).is_err());
    }

    #[test]
    fn paper_provider_rejects_bad_input() {
        assert!(matches!(
            PaperProvider.load(br#"{"pages": []}"#),
            Err(LoadError::Empty)
        ));
        assert!(matches!(
            PaperProvider.load(b"not json"),
            Err(LoadError::Decode { .. })
        ));
        assert!(matches!(
            PaperProvider.load(br#"{"pages": [{"width": 10, "height": 10, "rotation": 45}]}"#),
            Err(LoadError::Decode { .. })
        ));
    }

    #[test]
    fn letter_keeps_at_least_one_page() {
        assert_eq!(PaperDocument::letter(0).page_count(), 1);
        assert_eq!(PaperDocument::letter(3).page_count(), 3);
        assert!(matches!(PaperDocument::new(vec![]), Err(LoadError::Empty)));
    }

    #[test]
    fn paper_page_draws_white_and_ink() {
        let doc = PaperDocument::new(vec![PaperPage {
            text: vec![TextRun {
                text: "Total".into(),
                x: 72.0,
                y: 700.0,
                width: 72.0,
                height: 12.0,
            }],
            ..PaperPage::letter()
        }])
        .unwrap();

        let page = doc.page(1).unwrap();
        let viewport = page.viewport(1.0);
        let (w, h) = viewport.pixel_size();
        let mut surface = Surface::new(w, h);
        page.draw(&mut surface, &viewport).unwrap();

        assert_eq!(surface.pixel(0, 0), Some(PAPER_RGBA));
        // baseline at y=700pt is 92px from the top; the run extends 12px up
        assert_eq!(surface.pixel(100, 85), Some(INK_RGBA));
    }
}

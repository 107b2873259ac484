//! Page viewport and extraction-polygon mapping
//!
//! Extraction regions arrive in inches with a top-left origin. Page space is
//! in points with a bottom-left origin, and the rendered surface is in pixels
//! with a top-left origin. Everything here is pure so it can be tested
//! without a render.

/// 1 inch = 72 PDF points
pub const POINTS_PER_INCH: f64 = 72.0;

/// Minimum number of scalars in a polygon (four x/y pairs)
pub const MIN_POLYGON_SCALARS: usize = 8;

/// Polygon that cannot be turned into overlay geometry
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("invalid polygon ({len} coordinates): {reason}")]
pub struct InvalidGeometry {
    pub len: usize,
    pub reason: &'static str,
}

impl InvalidGeometry {
    fn new(len: usize, reason: &'static str) -> Self {
        Self { len, reason }
    }
}

/// A point in surface pixels
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in surface pixels
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// Build a rectangle spanning two corners given in any order
    #[must_use]
    pub fn from_corners(a: PixelPoint, b: PixelPoint) -> Self {
        Self {
            left: a.x.min(b.x),
            top: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    #[must_use]
    pub fn contains(&self, p: PixelPoint) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }

    #[must_use]
    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }

    /// Clip to a `width` x `height` surface. Returns `None` when nothing is left.
    #[must_use]
    pub fn clamp_to(&self, width: f64, height: f64) -> Option<PixelRect> {
        let left = self.left.max(0.0);
        let top = self.top.max(0.0);
        let right = self.right().min(width);
        let bottom = self.bottom().min(height);

        if right <= left || bottom <= top {
            None
        } else {
            Some(PixelRect {
                left,
                top,
                width: right - left,
                height: bottom - top,
            })
        }
    }
}

/// Page rotation, clockwise
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    /// Normalize a rotation in degrees. Only right angles are valid.
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::None),
            90 => Some(Self::Quarter),
            180 => Some(Self::Half),
            270 => Some(Self::ThreeQuarter),
            _ => None,
        }
    }

    #[must_use]
    pub fn degrees(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Quarter => 90,
            Self::Half => 180,
            Self::ThreeQuarter => 270,
        }
    }

    /// Unit rotation matrix entries (a, b, c, d) including the y flip
    fn matrix(self) -> (f64, f64, f64, f64) {
        match self {
            Self::None => (1.0, 0.0, 0.0, -1.0),
            Self::Quarter => (0.0, 1.0, 1.0, 0.0),
            Self::Half => (-1.0, 0.0, 0.0, 1.0),
            Self::ThreeQuarter => (0.0, -1.0, -1.0, 0.0),
        }
    }
}

/// Page box in points, bottom-left origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl ViewBox {
    /// A box anchored at the origin
    #[must_use]
    pub const fn from_size(width: f64, height: f64) -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            x1: width,
            y1: height,
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }
}

/// Mapping from page points to surface pixels at a fixed scale.
///
/// Recomputed for every render; never cached across renders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    scale: f64,
    rotation: Rotation,
    width: f64,
    height: f64,
    /// Affine transform `[a, b, c, d, e, f]`: `px = a*x + c*y + e`, `py = b*x + d*y + f`
    transform: [f64; 6],
}

impl Viewport {
    #[must_use]
    pub fn new(view_box: ViewBox, scale: f64, rotation: Rotation) -> Self {
        let (a, b, c, d) = rotation.matrix();
        let center_x = (view_box.x0 + view_box.x1) / 2.0;
        let center_y = (view_box.y0 + view_box.y1) / 2.0;

        let (offset_x, offset_y, width, height) = if a == 0.0 {
            (
                (center_y - view_box.y0).abs() * scale,
                (center_x - view_box.x0).abs() * scale,
                view_box.height() * scale,
                view_box.width() * scale,
            )
        } else {
            (
                (center_x - view_box.x0).abs() * scale,
                (center_y - view_box.y0).abs() * scale,
                view_box.width() * scale,
                view_box.height() * scale,
            )
        };

        let transform = [
            a * scale,
            b * scale,
            c * scale,
            d * scale,
            offset_x - a * scale * center_x - c * scale * center_y,
            offset_y - b * scale * center_x - d * scale * center_y,
        ];

        Self {
            scale,
            rotation,
            width,
            height,
            transform,
        }
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Width in pixels (fractional)
    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Height in pixels (fractional)
    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Integer surface size; fractional pixels are truncated, minimum 1x1
    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        let w = self.width.floor().max(1.0) as u32;
        let h = self.height.floor().max(1.0) as u32;
        (w, h)
    }

    /// Map a page point (points, bottom-left origin) to surface pixels
    #[must_use]
    pub fn to_pixel(&self, x: f64, y: f64) -> PixelPoint {
        let [a, b, c, d, e, f] = self.transform;
        PixelPoint::new(a * x + c * y + e, b * x + d * y + f)
    }

    /// Inverse of [`Viewport::to_pixel`]
    #[must_use]
    pub fn to_points(&self, p: PixelPoint) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.transform;
        let det = a * d - b * c;
        let dx = p.x - e;
        let dy = p.y - f;
        ((d * dx - c * dy) / det, (a * dy - b * dx) / det)
    }
}

/// Bounding box of a polygon in its native unit (inches)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InchBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Reject polygons that are too short, odd-length or non-finite
pub fn validate_polygon(polygon: &[f64]) -> Result<(), InvalidGeometry> {
    let len = polygon.len();
    if len % 2 != 0 {
        return Err(InvalidGeometry::new(len, "odd number of coordinates"));
    }
    if len < MIN_POLYGON_SCALARS {
        return Err(InvalidGeometry::new(len, "fewer than 4 points"));
    }
    if polygon.iter().any(|v| !v.is_finite()) {
        return Err(InvalidGeometry::new(len, "non-finite coordinate"));
    }
    Ok(())
}

/// Axis-aligned bounding box of `[x0, y0, x1, y1, ...]`
pub fn bounding_box(polygon: &[f64]) -> Result<InchBounds, InvalidGeometry> {
    validate_polygon(polygon)?;

    let mut bounds = InchBounds {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };
    for pair in polygon.chunks_exact(2) {
        bounds.min_x = bounds.min_x.min(pair[0]);
        bounds.max_x = bounds.max_x.max(pair[0]);
        bounds.min_y = bounds.min_y.min(pair[1]);
        bounds.max_y = bounds.max_y.max(pair[1]);
    }
    Ok(bounds)
}

/// Inches (top-left origin) to page points (bottom-left origin)
#[inline]
fn inch_to_page_point(x_in: f64, y_in: f64, page_height_points: f64) -> (f64, f64) {
    (
        x_in * POINTS_PER_INCH,
        page_height_points - y_in * POINTS_PER_INCH,
    )
}

/// Convert an extraction polygon into the pixel rectangle bounding it.
///
/// Unit conversion, then the vertical flip, then the viewport transform.
/// Under the flip the inch-space `min_y` becomes the point-space top edge.
pub fn to_overlay_rect(
    polygon: &[f64],
    viewport: &Viewport,
    page_height_points: f64,
) -> Result<PixelRect, InvalidGeometry> {
    let bounds = bounding_box(polygon)?;

    let (x_lo, y_top) = inch_to_page_point(bounds.min_x, bounds.min_y, page_height_points);
    let (x_hi, y_bottom) = inch_to_page_point(bounds.max_x, bounds.max_y, page_height_points);

    let a = viewport.to_pixel(x_lo, y_top);
    let b = viewport.to_pixel(x_hi, y_bottom);
    Ok(PixelRect::from_corners(a, b))
}

/// Map every vertex of an extraction polygon to surface pixels
pub fn to_overlay_polygon(
    polygon: &[f64],
    viewport: &Viewport,
    page_height_points: f64,
) -> Result<Vec<PixelPoint>, InvalidGeometry> {
    validate_polygon(polygon)?;

    Ok(polygon
        .chunks_exact(2)
        .map(|pair| {
            let (x, y) = inch_to_page_point(pair[0], pair[1], page_height_points);
            viewport.to_pixel(x, y)
        })
        .collect())
}

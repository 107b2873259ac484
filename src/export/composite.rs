use image::RgbaImage;

use super::ExportError;
use crate::viewer::{Overlay, OverlayGeometry, PixelPoint, PixelRect, Rgba, Surface};

/// Copy the surface and paint every overlay on top: fill first, then a
/// one pixel border
pub fn composite(surface: &Surface, overlays: &[Overlay]) -> Result<RgbaImage, ExportError> {
    if surface.width() == 0 || surface.height() == 0 {
        return Err(ExportError::EmptySurface);
    }
    let mut image = RgbaImage::from_raw(surface.width(), surface.height(), surface.pixels().to_vec())
        .ok_or(ExportError::EmptySurface)?;

    for overlay in overlays {
        match &overlay.geometry {
            OverlayGeometry::Rect(rect) => {
                fill_rect(&mut image, rect, overlay.style.fill);
                stroke_rect(&mut image, rect, overlay.style.border);
            }
            OverlayGeometry::Polygon(points) => {
                fill_polygon(&mut image, points, overlay.style.fill);
                stroke_polygon(&mut image, points, overlay.style.border);
            }
        }
    }
    Ok(image)
}

/// Source-over blend of `color` onto `dst`
pub fn blend(dst: &mut image::Rgba<u8>, color: Rgba) {
    let a = color.a.clamp(0.0, 1.0);
    let mix = |src: u8, under: u8| (f32::from(src) * a + f32::from(under) * (1.0 - a)).round() as u8;
    dst.0 = [
        mix(color.r, dst[0]),
        mix(color.g, dst[1]),
        mix(color.b, dst[2]),
        mix(255, dst[3]),
    ];
}

/// Pixel span `[x0, x1) x [y0, y1)` covered by `rect`, if any
fn span(image: &RgbaImage, rect: &PixelRect) -> Option<(u32, u32, u32, u32)> {
    let clipped = rect.clamp_to(f64::from(image.width()), f64::from(image.height()))?;
    let x0 = clipped.left.floor() as u32;
    let y0 = clipped.top.floor() as u32;
    let x1 = (clipped.right().ceil() as u32).min(image.width());
    let y1 = (clipped.bottom().ceil() as u32).min(image.height());
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

fn fill_rect(image: &mut RgbaImage, rect: &PixelRect, color: Rgba) {
    let Some((x0, y0, x1, y1)) = span(image, rect) else {
        return;
    };
    for y in y0..y1 {
        for x in x0..x1 {
            blend(image.get_pixel_mut(x, y), color);
        }
    }
}

fn stroke_rect(image: &mut RgbaImage, rect: &PixelRect, color: Rgba) {
    let Some((x0, y0, x1, y1)) = span(image, rect) else {
        return;
    };
    for x in x0..x1 {
        blend(image.get_pixel_mut(x, y0), color);
        if y1 - 1 > y0 {
            blend(image.get_pixel_mut(x, y1 - 1), color);
        }
    }
    for y in (y0 + 1)..y1.saturating_sub(1) {
        blend(image.get_pixel_mut(x0, y), color);
        if x1 - 1 > x0 {
            blend(image.get_pixel_mut(x1 - 1, y), color);
        }
    }
}

/// Even-odd test at pixel centres
fn fill_polygon(image: &mut RgbaImage, points: &[PixelPoint], color: Rgba) {
    if points.len() < 3 {
        return;
    }
    let bounds = OverlayGeometry::Polygon(points.to_vec()).bounds();
    let Some((x0, y0, x1, y1)) = span(image, &bounds) else {
        return;
    };
    for y in y0..y1 {
        for x in x0..x1 {
            let centre = PixelPoint::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            if inside(points, centre) {
                blend(image.get_pixel_mut(x, y), color);
            }
        }
    }
}

fn inside(points: &[PixelPoint], p: PixelPoint) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (a, b) = (points[i], points[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn stroke_polygon(image: &mut RgbaImage, points: &[PixelPoint], color: Rgba) {
    let (width, height) = (f64::from(image.width()), f64::from(image.height()));
    for (i, &a) in points.iter().enumerate() {
        let Some((a, b)) = clip_segment(a, points[(i + 1) % points.len()], width, height) else {
            continue;
        };
        let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0) as u32;
        let mut last = None;
        for step in 0..=steps {
            let t = f64::from(step) / f64::from(steps);
            let x = (a.x + (b.x - a.x) * t).floor();
            let y = (a.y + (b.y - a.y) * t).floor();
            if !(0.0..width).contains(&x) || !(0.0..height).contains(&y) {
                continue;
            }
            let px = (x as u32, y as u32);
            // blend each pixel once per edge
            if last != Some(px) {
                blend(image.get_pixel_mut(px.0, px.1), color);
                last = Some(px);
            }
        }
    }
}

/// Clip segment `a`-`b` to `[0, width] x [0, height]` (Liang-Barsky)
fn clip_segment(
    a: PixelPoint,
    b: PixelPoint,
    width: f64,
    height: f64,
) -> Option<(PixelPoint, PixelPoint)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [(-dx, a.x), (dx, width - a.x), (-dy, a.y), (dy, height - a.y)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    let at = |t: f64| PixelPoint::new(a.x + dx * t, a.y + dy * t);
    Some((at(t0), at(t1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::HighlightStyle;

    fn white(w: u32, h: u32) -> Surface {
        let mut surface = Surface::new(w, h);
        surface.fill([255, 255, 255, 255]);
        surface
    }

    #[test]
    fn blend_mixes_by_alpha() {
        let mut px = image::Rgba([255, 255, 255, 255]);
        blend(&mut px, Rgba::new(0, 0, 255, 0.5));
        assert_eq!(px.0, [128, 128, 255, 255]);

        let mut px = image::Rgba([10, 20, 30, 255]);
        blend(&mut px, Rgba::new(0, 0, 0, 0.0));
        assert_eq!(px.0, [10, 20, 30, 255]);
    }

    #[test]
    fn rect_has_fill_and_border() {
        let overlay = Overlay {
            page: 1,
            geometry: OverlayGeometry::Rect(PixelRect {
                left: 2.0,
                top: 2.0,
                width: 6.0,
                height: 6.0,
            }),
            style: HighlightStyle::TEXT,
        };
        let image = composite(&white(10, 10), &[overlay]).unwrap();

        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255, 255]);
        let inner = image.get_pixel(5, 5).0;
        let edge = image.get_pixel(2, 5).0;
        // border is drawn over the fill, so it is bluer
        assert!(edge[0] < inner[0]);
        assert_eq!(inner[2], 255);
    }

    #[test]
    fn outline_fills_only_inside_the_polygon() {
        let triangle = vec![
            PixelPoint::new(0.0, 0.0),
            PixelPoint::new(20.0, 0.0),
            PixelPoint::new(0.0, 20.0),
        ];
        let overlay = Overlay {
            page: 1,
            geometry: OverlayGeometry::Polygon(triangle),
            style: HighlightStyle::IMAGE,
        };
        let image = composite(&white(20, 20), &[overlay]).unwrap();

        assert_ne!(image.get_pixel(4, 4).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(16, 16).0, [255, 255, 255, 255]);
    }

    #[test]
    fn off_surface_overlay_is_ignored() {
        let overlay = Overlay {
            page: 1,
            geometry: OverlayGeometry::Rect(PixelRect {
                left: 50.0,
                top: 50.0,
                width: 5.0,
                height: 5.0,
            }),
            style: HighlightStyle::SELECTION,
        };
        let image = composite(&white(10, 10), &[overlay]).unwrap();
        assert!(image.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn huge_outline_edges_are_clipped() {
        let far = 1.0e12;
        let points = [
            PixelPoint::new(-far, 5.0),
            PixelPoint::new(far, 5.0),
            PixelPoint::new(far, far),
            PixelPoint::new(-far, far),
        ];
        let mut image = RgbaImage::from_pixel(10, 10, image::Rgba([255, 255, 255, 255]));
        stroke_polygon(&mut image, &points, Rgba::new(0, 0, 255, 1.0));

        // only the top edge crosses the image
        for x in 0..10 {
            assert_eq!(image.get_pixel(x, 5).0, [0, 0, 255, 255]);
            assert_eq!(image.get_pixel(x, 4).0, [255, 255, 255, 255]);
        }
        assert_eq!(image.get_pixel(5, 8).0, [255, 255, 255, 255]);
    }

    #[test]
    fn segments_outside_the_image_are_dropped() {
        let a = PixelPoint::new(-5.0, -5.0);
        let b = PixelPoint::new(-1.0, 20.0);
        assert_eq!(clip_segment(a, b, 10.0, 10.0), None);

        let (a, b) = clip_segment(
            PixelPoint::new(-10.0, 2.0),
            PixelPoint::new(30.0, 2.0),
            10.0,
            10.0,
        )
        .unwrap();
        assert_eq!((a.x, a.y, b.x, b.y), (0.0, 2.0, 10.0, 2.0));
    }
}

//! Snapshot export: the rendered surface with its overlays, as PNG

mod composite;

use std::path::Path;
use std::sync::PoisonError;

use image::RgbaImage;
use log::info;

use crate::viewer::{Overlay, RenderScheduler, Surface};

pub use composite::{blend, composite};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("nothing has been rendered")]
    EmptySurface,

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

/// Composite the scheduler's surface and overlays
pub fn snapshot(scheduler: &RenderScheduler) -> Result<RgbaImage, ExportError> {
    let surface = scheduler
        .surface()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    composite(&surface, scheduler.overlays().overlays())
}

/// Write the scheduler's current page and overlays to `path`
pub fn save_snapshot(scheduler: &RenderScheduler, path: &Path) -> Result<(), ExportError> {
    let surface = scheduler
        .surface()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    write_png(&surface, scheduler.overlays().overlays(), path)
}

/// Composite `surface` and `overlays` and write the result to `path`
pub fn write_png(surface: &Surface, overlays: &[Overlay], path: &Path) -> Result<(), ExportError> {
    let image = composite(surface, overlays)?;
    image.save_with_format(path, image::ImageFormat::Png)?;
    info!(
        "Wrote {}x{} snapshot with {} overlays to {}",
        image.width(),
        image.height(),
        overlays.len(),
        path.display()
    );
    Ok(())
}

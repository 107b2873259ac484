//! Page rendering and highlight overlays

pub mod document;
pub mod geometry;
pub mod overlay;
pub mod region;
mod replay;
mod request;
mod scheduler;
mod state;
mod worker;

/// Points to pixels factor used when no scale is configured
pub const DEFAULT_RENDER_SCALE: f64 = 1.5;

pub use document::{
    DocumentHandle, DocumentProvider, LoadError, Page, PageFault, PaperDocument, PaperPage,
    PaperProvider, SharedSurface, Surface, TextRun,
};
pub use geometry::{
    InvalidGeometry, PixelPoint, PixelRect, Rotation, ViewBox, Viewport, to_overlay_polygon,
    to_overlay_rect,
};
pub use overlay::{
    HighlightShape, HighlightStyle, Overlay, OverlayGeometry, OverlayStore, Rgba,
};
pub use region::{ExtractionRegion, region_on_page};
pub use replay::{
    Annotation, HighlightDispatch, HighlightError, HighlightIntent, Viewer, ViewerEvent,
};
pub use request::{
    CancelToken, RenderError, RenderOutcome, RenderParams, RenderResult, RenderedPage, RequestId,
};
pub use scheduler::{PageRendered, RenderScheduler, RenderTicket, SchedulerEvent};
pub use state::{Command, Effect, RenderState, TaskOutcome, TaskStatus};

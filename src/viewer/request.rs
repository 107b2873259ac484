//! Render request and response types

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::document::{DocumentHandle, PageFault, TextRun};
use super::geometry::Viewport;

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Parameters for rendering a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
    /// Points to pixels scale factor
    pub scale: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            scale: super::DEFAULT_RENDER_SCALE,
        }
    }
}

/// Advisory cancellation flag shared with the worker
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Request sent to the render worker
pub enum RenderRequest {
    /// Fetch, size, draw and extract text for one page
    Page {
        id: RequestId,
        page: usize,
        params: RenderParams,
        document: Arc<dyn DocumentHandle>,
        cancel: CancelToken,
    },

    /// Shutdown the worker
    Shutdown,
}

impl std::fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Page {
                id, page, params, ..
            } => f
                .debug_struct("Page")
                .field("id", id)
                .field("page", page)
                .field("params", params)
                .finish_non_exhaustive(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Everything known about a page once its render has settled
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedPage {
    /// Page number (1-based)
    pub page: usize,
    /// Viewport the page was drawn with
    pub viewport: Viewport,
    /// Top edge of the page box in points
    pub height_points: f64,
    /// Text layer
    pub text: Vec<TextRun>,
}

/// Response from the render worker
#[derive(Debug)]
pub enum RenderResponse {
    /// Page drawn and text layer extracted
    Page { id: RequestId, rendered: RenderedPage },

    /// Worker noticed the cancel token and stopped
    Cancelled(RequestId),

    /// Page fetch or draw failed
    Error { id: RequestId, error: PageFault },
}

impl RenderResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Page { id, .. } | Self::Cancelled(id) | Self::Error { id, .. } => *id,
        }
    }
}

/// Why a render did not produce a page
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Page(#[from] PageFault),

    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("no document loaded")]
    NoDocument,

    #[error("render worker is gone")]
    WorkerGone,
}

/// How an accepted render request ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The page is on the surface and is now the current page
    Rendered { page: usize },
    /// A newer request replaced this one before it committed
    Superseded { page: usize },
}

pub type RenderResult = Result<RenderOutcome, RenderError>;

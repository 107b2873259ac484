// Export modules for use in tests
pub mod analysis;
pub mod export;
pub mod panic_handler;
pub mod settings;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use analysis::{AnalysisResult, LayoutAnalysis, SearchHit, search};
pub use viewer::{
    ExtractionRegion, HighlightDispatch, HighlightError, HighlightIntent, HighlightStyle,
    RenderOutcome, RenderScheduler, RenderTicket, Viewer, ViewerEvent,
};

//! Highlight replay - draws highlights only onto the page they belong to
//!
//! A highlight for a page that is not on the surface is parked, the page is
//! requested, and the highlight is drawn once that exact render commits.

use std::sync::Arc;

use log::{debug, warn};

use super::document::{DocumentHandle, DocumentProvider, LoadError};
use super::geometry::InvalidGeometry;
use super::overlay::{HighlightStyle, OverlayGeometry, OverlayStore};
use super::region::{ExtractionRegion, region_on_page};
use super::request::RenderError;
use super::scheduler::{PageRendered, RenderScheduler, RenderTicket, SchedulerEvent};

/// Which region of a multi-region field to highlight
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HighlightIntent {
    /// The region on the displayed page
    CurrentPage,
    /// Go to this page, then highlight its region
    Navigate(usize),
}

/// How an activation was handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HighlightDispatch {
    /// Drawn on the settled page
    Drawn,
    /// Waiting for `page` to render
    Deferred { page: usize },
    /// `page` is displayed but has no region of the field
    Missed { page: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum HighlightError {
    #[error(transparent)]
    InvalidGeometry(#[from] InvalidGeometry),

    #[error("field has no region on page {page}")]
    RegionNotOnCurrentPage { page: usize },

    #[error("no page is displayed")]
    NothingDisplayed,

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// What happened since the last poll
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    PageRendered(PageRendered),
    RenderFailed { page: usize, error: RenderError },
    HighlightDrawn { page: usize },
    /// The pending highlight's polygon could not be transformed
    HighlightSkipped { page: usize, error: InvalidGeometry },
    /// The rendered page had no region for the pending highlight
    HighlightMissed { page: usize },
    /// The render worker is gone; no page will render again
    WorkerLost,
}

/// A region drawn on every render of its page
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub region: ExtractionRegion,
    pub style: HighlightStyle,
}

impl Annotation {
    #[must_use]
    pub fn new(region: ExtractionRegion, style: HighlightStyle) -> Self {
        Self { region, style }
    }
}

#[derive(Debug)]
struct PendingHighlight {
    target_page: usize,
    regions: Vec<ExtractionRegion>,
    style: HighlightStyle,
}

/// Scheduler plus highlight replay
pub struct Viewer {
    scheduler: RenderScheduler,
    pending: Option<PendingHighlight>,
    annotations: Vec<Annotation>,
    /// Epoch of the commit the overlays were last drawn for
    painted: Option<u64>,
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new(RenderScheduler::new())
    }
}

impl Viewer {
    #[must_use]
    pub fn new(scheduler: RenderScheduler) -> Self {
        Self {
            scheduler,
            pending: None,
            annotations: Vec::new(),
            painted: None,
        }
    }

    /// Load a document; pending highlights and annotations are dropped
    pub fn load_document(
        &mut self,
        provider: &dyn DocumentProvider,
        bytes: &[u8],
    ) -> Result<RenderTicket, LoadError> {
        self.forget_document();
        self.scheduler.load_document(provider, bytes)
    }

    pub fn set_document(&mut self, document: Arc<dyn DocumentHandle>) -> RenderTicket {
        self.forget_document();
        self.scheduler.set_document(document)
    }

    fn forget_document(&mut self) {
        self.pending = None;
        self.annotations.clear();
        self.painted = None;
    }

    /// Highlight one region, rendering its page first when needed
    pub fn activate(
        &mut self,
        region: &ExtractionRegion,
        style: HighlightStyle,
    ) -> Result<HighlightDispatch, HighlightError> {
        region.validate()?;
        self.scheduler.check_page(region.page_number)?;

        if self.scheduler.settled_page() == Some(region.page_number) {
            self.pending = None;
            self.scheduler.clear_overlays();
            self.draw_annotations(region.page_number);
            self.painted = Some(self.scheduler.state().epoch());
            self.draw_region(region, style)?;
            return Ok(HighlightDispatch::Drawn);
        }

        Ok(self.defer(region.page_number, vec![region.clone()], style))
    }

    /// Highlight a field that may have regions on several pages
    pub fn activate_field(
        &mut self,
        regions: &[ExtractionRegion],
        intent: HighlightIntent,
        style: HighlightStyle,
    ) -> Result<HighlightDispatch, HighlightError> {
        match intent {
            HighlightIntent::CurrentPage => {
                let page = self
                    .scheduler
                    .settled_page()
                    .ok_or(HighlightError::NothingDisplayed)?;
                let region = region_on_page(regions, page)
                    .ok_or(HighlightError::RegionNotOnCurrentPage { page })?;
                self.activate(region, style)
            }
            HighlightIntent::Navigate(page) => {
                self.scheduler.check_page(page)?;
                if self.scheduler.settled_page() == Some(page) {
                    return match region_on_page(regions, page) {
                        Some(region) => self.activate(region, style),
                        None => Ok(HighlightDispatch::Missed { page }),
                    };
                }
                Ok(self.defer(page, regions.to_vec(), style))
            }
        }
    }

    fn defer(
        &mut self,
        page: usize,
        regions: Vec<ExtractionRegion>,
        style: HighlightStyle,
    ) -> HighlightDispatch {
        if let Some(old) = self.pending.replace(PendingHighlight {
            target_page: page,
            regions,
            style,
        }) {
            debug!("Pending highlight for page {} replaced", old.target_page);
        }

        if self.scheduler.target_page() != Some(page) {
            let _ = self.scheduler.request_render(page);
        }
        HighlightDispatch::Deferred { page }
    }

    /// Annotate every page with these regions, redrawing the settled one
    pub fn show_all(&mut self, annotations: Vec<Annotation>) {
        self.annotations = annotations;
        if let Some(page) = self.scheduler.settled_page() {
            self.scheduler.clear_overlays();
            self.draw_annotations(page);
            self.painted = Some(self.scheduler.state().epoch());
        }
    }

    pub fn clear_annotations(&mut self) {
        self.annotations.clear();
        self.scheduler.clear_overlays();
    }

    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Page a parked highlight is waiting for
    #[must_use]
    pub fn pending_page(&self) -> Option<usize> {
        self.pending.as_ref().map(|p| p.target_page)
    }

    /// Process finished renders without blocking
    pub fn poll(&mut self) -> Vec<ViewerEvent> {
        let events = self.scheduler.poll();
        self.replay(events)
    }

    /// Block until every render has settled
    pub fn wait_idle(&mut self) -> Vec<ViewerEvent> {
        let events = self.scheduler.wait_idle();
        self.replay(events)
    }

    fn replay(&mut self, events: Vec<SchedulerEvent>) -> Vec<ViewerEvent> {
        let mut out = vec![];
        for event in events {
            match event {
                SchedulerEvent::Rendered(rendered) => {
                    out.push(ViewerEvent::PageRendered(rendered));
                    self.on_rendered(rendered.page, &mut out);
                }
                SchedulerEvent::Failed { page, error } => {
                    if self.pending_page() == Some(page) {
                        debug!("Dropping highlight for page {page}: render failed");
                        self.pending = None;
                    }
                    out.push(ViewerEvent::RenderFailed { page, error });
                }
                SchedulerEvent::WorkerLost => {
                    if let Some(pending) = self.pending.take() {
                        debug!(
                            "Dropping highlight for page {}: worker lost",
                            pending.target_page
                        );
                    }
                    out.push(ViewerEvent::WorkerLost);
                }
            }
        }
        out
    }

    fn on_rendered(&mut self, page: usize, out: &mut Vec<ViewerEvent>) {
        if self.scheduler.settled_page() != Some(page) {
            return;
        }
        // a commit already painted (or replayed twice) keeps its overlays
        let epoch = self.scheduler.state().epoch();
        if self.painted != Some(epoch) {
            self.scheduler.clear_overlays();
            self.draw_annotations(page);
            self.painted = Some(epoch);
        }

        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.target_page != page {
            debug!(
                "Dropping highlight for page {}: page {page} rendered instead",
                pending.target_page
            );
            return;
        }

        let Some(region) = region_on_page(&pending.regions, page) else {
            warn!("No region on page {page} for the requested highlight");
            out.push(ViewerEvent::HighlightMissed { page });
            return;
        };

        match self.draw_region(region, pending.style) {
            Ok(()) => out.push(ViewerEvent::HighlightDrawn { page }),
            Err(error) => {
                warn!("Skipping highlight on page {page}: {error}");
                out.push(ViewerEvent::HighlightSkipped { page, error });
            }
        }
    }

    fn draw_annotations(&mut self, page: usize) {
        let on_page: Vec<Annotation> = self
            .annotations
            .iter()
            .filter(|a| a.region.page_number == page)
            .cloned()
            .collect();

        for annotation in on_page {
            if let Err(e) = self.draw_region(&annotation.region, annotation.style) {
                warn!("Skipping annotation on page {page}: {e}");
            }
        }
    }

    fn draw_region(
        &mut self,
        region: &ExtractionRegion,
        style: HighlightStyle,
    ) -> Result<(), InvalidGeometry> {
        let Some(rendered) = self.scheduler.rendered() else {
            return Ok(());
        };
        let geometry = OverlayGeometry::from_polygon(
            &region.polygon,
            &rendered.viewport,
            rendered.height_points,
            style.shape,
        )?;
        self.scheduler.paint(region.page_number, geometry, style);
        Ok(())
    }

    #[must_use]
    pub fn overlays(&self) -> &OverlayStore {
        self.scheduler.overlays()
    }

    #[must_use]
    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut RenderScheduler {
        &mut self.scheduler
    }
}

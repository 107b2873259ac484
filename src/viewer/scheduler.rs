//! Render scheduler - owns the worker, the surface and the overlays

use std::collections::HashMap;
use std::sync::Arc;

use flume::{Receiver, Sender, TryRecvError};
use log::{debug, error, info, warn};

use super::document::{DocumentHandle, DocumentProvider, LoadError, PageFault, SharedSurface};
use super::overlay::{HighlightStyle, OverlayGeometry, OverlayStore};
use super::request::{
    CancelToken, RenderError, RenderOutcome, RenderParams, RenderRequest, RenderResponse,
    RenderResult, RenderedPage, RequestId,
};
use super::state::{Command, Effect, RenderState, TaskOutcome};
use super::worker::render_worker;

/// Published after every committed render
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRendered {
    pub page: usize,
    pub page_count: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageRendered {
    fn new(page: usize, page_count: usize) -> Self {
        Self {
            page,
            page_count,
            has_previous: page > 1,
            has_next: page < page_count,
        }
    }
}

/// What happened during a poll
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerEvent {
    Rendered(PageRendered),
    Failed { page: usize, error: RenderError },
    /// The worker thread is gone; in-flight tickets failed with `WorkerGone`
    WorkerLost,
}

/// Handle on one render request.
///
/// Tickets resolve while the scheduler processes responses, so a thread
/// that owns the scheduler should use [`RenderScheduler::wait_for`] rather
/// than blocking on the ticket itself.
#[derive(Debug)]
pub struct RenderTicket {
    id: RequestId,
    page: usize,
    rx: Receiver<RenderResult>,
    resolved: Option<RenderResult>,
}

impl RenderTicket {
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Page this ticket asked for
    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    /// Outcome, if the request has been settled
    pub fn try_outcome(&mut self) -> Option<RenderResult> {
        if self.resolved.is_none() {
            self.resolved = match self.rx.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Err(RenderError::WorkerGone)),
            };
        }
        self.resolved.clone()
    }

    /// Block until the request is settled
    pub fn wait(self) -> RenderResult {
        match self.resolved {
            Some(result) => result,
            None => self.rx.recv().unwrap_or(Err(RenderError::WorkerGone)),
        }
    }

    /// Suspend until the request is settled
    pub async fn wait_async(self) -> RenderResult {
        match self.resolved {
            Some(result) => result,
            None => self
                .rx
                .recv_async()
                .await
                .unwrap_or(Err(RenderError::WorkerGone)),
        }
    }
}

struct TicketSlot {
    page: usize,
    tx: Sender<RenderResult>,
}

/// Serializes page renders onto one shared surface, latest request wins
pub struct RenderScheduler {
    state: RenderState,
    params: RenderParams,
    document: Option<Arc<dyn DocumentHandle>>,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    next_request_id: u64,
    tickets: HashMap<RequestId, TicketSlot>,
    cancel: Option<(RequestId, CancelToken)>,
    surface: SharedSurface,
    overlays: OverlayStore,
    /// Result of the last committed render
    rendered: Option<RenderedPage>,
    /// Worker result waiting for the state machine's verdict
    staged: Option<RenderedPage>,
    listeners: Vec<Sender<PageRendered>>,
    events: Vec<SchedulerEvent>,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScheduler {
    /// Create a scheduler with default render parameters
    #[must_use]
    pub fn new() -> Self {
        Self::with_params(RenderParams::default())
    }

    /// Create a scheduler rendering at a custom scale
    #[must_use]
    pub fn with_params(params: RenderParams) -> Self {
        let surface = SharedSurface::default();
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let worker_surface = Arc::clone(&surface);
        std::thread::spawn(move || {
            render_worker(request_rx, response_tx, worker_surface);
        });

        Self {
            state: RenderState::new(),
            params,
            document: None,
            request_tx,
            response_rx,
            next_request_id: 1,
            tickets: HashMap::new(),
            cancel: None,
            surface,
            overlays: OverlayStore::new(),
            rendered: None,
            staged: None,
            listeners: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Decode `bytes` and make the result the current document.
    ///
    /// On failure the scheduler is left without a document.
    pub fn load_document(
        &mut self,
        provider: &dyn DocumentProvider,
        bytes: &[u8],
    ) -> Result<RenderTicket, LoadError> {
        match provider.load(bytes) {
            Ok(document) => Ok(self.set_document(document)),
            Err(e) => {
                warn!("Failed to load document: {e}");
                self.unload();
                Err(e)
            }
        }
    }

    /// Replace the document and render its first page
    pub fn set_document(&mut self, document: Arc<dyn DocumentHandle>) -> RenderTicket {
        let page_count = document.page_count();
        info!("Document loaded with {page_count} pages");
        self.document = Some(document);
        self.rendered = None;
        self.apply_command(Command::SetDocument { page_count });
        self.request_render(1)
    }

    /// Drop the current document
    pub fn unload(&mut self) {
        self.document = None;
        self.rendered = None;
        self.apply_command(Command::SetDocument { page_count: 0 });
    }

    /// Request a page to be rendered (1-based)
    pub fn request_render(&mut self, page: usize) -> RenderTicket {
        let id = self.next_id();
        let (tx, rx) = flume::bounded(1);
        self.tickets.insert(id, TicketSlot { page, tx });

        debug!("Render {id:?} requested for page {page}");
        self.apply_command(Command::Request { id, page });

        RenderTicket {
            id,
            page,
            rx,
            resolved: None,
        }
    }

    /// Request the page after the latest requested one
    pub fn next_page(&mut self) -> Option<RenderTicket> {
        let target = self.state.target_page()?;
        (target < self.state.page_count).then(|| self.request_render(target + 1))
    }

    /// Request the page before the latest requested one
    pub fn previous_page(&mut self) -> Option<RenderTicket> {
        let target = self.state.target_page()?;
        (target > 1).then(|| self.request_render(target - 1))
    }

    /// Register a listener for committed renders
    pub fn subscribe(&mut self) -> Receiver<PageRendered> {
        let (tx, rx) = flume::unbounded();
        self.listeners.push(tx);
        rx
    }

    /// Process finished work without blocking
    pub fn poll(&mut self) -> Vec<SchedulerEvent> {
        loop {
            match self.response_rx.try_recv() {
                Ok(response) => self.handle_response(response),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.state.is_idle() {
                        self.worker_lost();
                    }
                    break;
                }
            }
        }
        std::mem::take(&mut self.events)
    }

    /// Block until nothing is running or queued
    pub fn wait_idle(&mut self) -> Vec<SchedulerEvent> {
        while !self.state.is_idle() {
            self.step_blocking();
        }
        self.poll()
    }

    /// Block until `ticket` is settled, processing responses meanwhile.
    ///
    /// Events produced along the way are kept for the next [`Self::poll`].
    pub fn wait_for(&mut self, ticket: &mut RenderTicket) -> RenderResult {
        loop {
            if let Some(result) = ticket.try_outcome() {
                return result;
            }
            if self.state.is_idle() {
                return ticket.try_outcome().unwrap_or(Err(RenderError::WorkerGone));
            }
            self.step_blocking();
        }
    }

    fn step_blocking(&mut self) {
        match self.response_rx.recv() {
            Ok(response) => self.handle_response(response),
            Err(_) => self.worker_lost(),
        }
    }

    fn handle_response(&mut self, response: RenderResponse) {
        let id = response.id();
        let outcome = match response {
            RenderResponse::Page { rendered, .. } => {
                self.staged = Some(rendered);
                TaskOutcome::Completed
            }
            RenderResponse::Cancelled(_) => TaskOutcome::Cancelled,
            RenderResponse::Error { error, .. } => TaskOutcome::Failed(error),
        };

        if self.cancel.as_ref().is_some_and(|(active, _)| *active == id) {
            self.cancel = None;
        }
        self.apply_command(Command::Finished { id, outcome });
        self.staged = None;
    }

    fn worker_lost(&mut self) {
        error!("Render worker disconnected");
        self.cancel = None;
        self.apply_command(Command::WorkerLost);
        self.events.push(SchedulerEvent::WorkerLost);
    }

    fn apply_command(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        self.execute_effects(effects);
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ClearOverlays => self.overlays.clear(),

                Effect::Dispatch { id, page } => self.dispatch(id, page),

                Effect::CancelActive(id) => {
                    if let Some((active, token)) = &self.cancel {
                        if *active == id {
                            debug!("Cancelling render {id:?}");
                            token.cancel();
                        }
                    }
                }

                Effect::Supersede(id) => {
                    self.resolve(id, |page| Ok(RenderOutcome::Superseded { page }));
                }

                Effect::Commit { id, page } => {
                    self.rendered = self.staged.take();
                    self.resolve(id, |page| Ok(RenderOutcome::Rendered { page }));

                    let event = PageRendered::new(page, self.state.page_count);
                    debug!("Page {page} committed");
                    self.listeners.retain(|tx| tx.send(event).is_ok());
                    self.events.push(SchedulerEvent::Rendered(event));
                }

                Effect::Fail { id, page, error } => {
                    error!("Rendering page {page} failed: {error}");
                    self.rendered = None;
                    let result = Err(error.clone());
                    self.resolve(id, |_| result);
                    self.events.push(SchedulerEvent::Failed { page, error });
                }

                Effect::Reject { id, error } => {
                    debug!("Render {id:?} rejected: {error}");
                    self.resolve(id, |_| Err(error));
                }
            }
        }
    }

    fn dispatch(&mut self, id: RequestId, page: usize) {
        let Some(document) = self.document.clone() else {
            self.apply_command(Command::Finished {
                id,
                outcome: TaskOutcome::Failed(PageFault::generic("document unloaded")),
            });
            return;
        };

        let cancel = CancelToken::new();
        self.cancel = Some((id, cancel.clone()));

        let request = RenderRequest::Page {
            id,
            page,
            params: self.params,
            document,
            cancel,
        };
        if self.request_tx.send(request).is_err() {
            self.worker_lost();
        }
    }

    fn resolve(&mut self, id: RequestId, result: impl FnOnce(usize) -> RenderResult) {
        if let Some(slot) = self.tickets.remove(&id) {
            // receiver may already be dropped
            let _ = slot.tx.send(result(slot.page));
        }
    }

    /// Validate a page number against the loaded document
    pub fn check_page(&self, page: usize) -> Result<(), RenderError> {
        self.state.check_page(page)
    }

    /// Draw an overlay, but only onto the settled page it belongs to
    pub fn paint(&mut self, page: usize, geometry: OverlayGeometry, style: HighlightStyle) -> bool {
        if self.settled_page() != Some(page) {
            debug!("Not painting overlay for page {page}: page is not on the surface");
            return false;
        }
        self.overlays.draw(page, geometry, style);
        true
    }

    pub fn clear_overlays(&mut self) {
        self.overlays.clear();
    }

    #[must_use]
    pub fn overlays(&self) -> &OverlayStore {
        &self.overlays
    }

    /// Current page, `None` while any render is running or queued
    #[must_use]
    pub fn settled_page(&self) -> Option<usize> {
        self.state.settled_page()
    }

    /// The page the viewer is heading to
    #[must_use]
    pub fn target_page(&self) -> Option<usize> {
        self.state.target_page()
    }

    /// Viewport and text layer of the settled page
    #[must_use]
    pub fn rendered(&self) -> Option<&RenderedPage> {
        let settled = self.settled_page()?;
        self.rendered.as_ref().filter(|r| r.page == settled)
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.page_count
    }

    #[must_use]
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    #[must_use]
    pub fn params(&self) -> RenderParams {
        self.params
    }

    /// The render target. Lock it only while the scheduler is idle.
    #[must_use]
    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    /// Shutdown the worker
    pub fn shutdown(&self) {
        let _ = self.request_tx.send(RenderRequest::Shutdown);
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

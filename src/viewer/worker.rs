//! Render worker - runs in a dedicated thread
//!
//! One worker per scheduler. It processes one request at a time, so at most
//! one draw ever touches the shared surface.

use std::sync::PoisonError;

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::document::{DocumentHandle, PageFault, SharedSurface};
use super::request::{
    CancelToken, RenderParams, RenderRequest, RenderResponse, RenderedPage, RequestId,
};

/// Main worker function
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_worker(
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    surface: SharedSurface,
) {
    for request in requests {
        match request {
            RenderRequest::Page {
                id,
                page,
                params,
                document,
                cancel,
            } => {
                let response =
                    handle_page_request(document.as_ref(), id, page, &params, &cancel, &surface);
                if responses.send(response).is_err() {
                    break;
                }
            }

            RenderRequest::Shutdown => break,
        }
    }
    debug!("Render worker stopped");
}

fn handle_page_request(
    document: &dyn DocumentHandle,
    id: RequestId,
    page_num: usize,
    params: &RenderParams,
    cancel: &CancelToken,
    surface: &SharedSurface,
) -> RenderResponse {
    match render_page(document, page_num, params, cancel, surface) {
        Ok(Some(rendered)) => RenderResponse::Page { id, rendered },
        Ok(None) => {
            debug!("Render {id:?} of page {page_num} cancelled");
            RenderResponse::Cancelled(id)
        }
        Err(error) => RenderResponse::Error { id, error },
    }
}

/// Render a single page onto the shared surface.
///
/// Returns `Ok(None)` when the cancel token was raised between steps. A
/// draw that already started always runs to the end.
pub fn render_page(
    document: &dyn DocumentHandle,
    page_num: usize,
    params: &RenderParams,
    cancel: &CancelToken,
    surface: &SharedSurface,
) -> Result<Option<RenderedPage>, PageFault> {
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let page = document.page(page_num)?;
    let viewport = page.viewport(params.scale);

    if cancel.is_cancelled() {
        return Ok(None);
    }

    {
        let mut surface = surface.lock().unwrap_or_else(PoisonError::into_inner);
        let (width, height) = viewport.pixel_size();
        surface.resize(width, height);
        page.draw(&mut surface, &viewport)?;
    }

    if cancel.is_cancelled() {
        return Ok(None);
    }

    let text = page.text_content().unwrap_or_else(|e| {
        warn!("Text layer for page {page_num} unavailable: {e}");
        Vec::new()
    });

    Ok(Some(RenderedPage {
        page: page_num,
        viewport,
        height_points: page.height_points(),
        text,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::viewer::document::{PaperDocument, Surface};

    fn shared() -> SharedSurface {
        Arc::new(Mutex::new(Surface::default()))
    }

    #[test]
    fn render_sizes_surface_to_viewport() {
        let doc = PaperDocument::letter(2);
        let surface = shared();

        let rendered = render_page(
            &doc,
            2,
            &RenderParams { scale: 1.5 },
            &CancelToken::new(),
            &surface,
        )
        .unwrap()
        .unwrap();

        assert_eq!(rendered.page, 2);
        assert_eq!(rendered.height_points, 792.0);
        let surface = surface.lock().unwrap();
        assert_eq!((surface.width(), surface.height()), (918, 1188));
    }

    #[test]
    fn cancelled_token_skips_work() {
        let doc = PaperDocument::letter(1);
        let surface = shared();
        let token = CancelToken::new();
        token.cancel();

        let result = render_page(&doc, 1, &RenderParams::default(), &token, &surface).unwrap();
        assert!(result.is_none());
        assert_eq!(surface.lock().unwrap().width(), 0);
    }

    #[test]
    fn missing_page_is_an_error() {
        let doc = PaperDocument::letter(1);
        let err = render_page(
            &doc,
            7,
            &RenderParams::default(),
            &CancelToken::new(),
            &shared(),
        )
        .unwrap_err();
        assert_eq!(err, PageFault::Missing { page: 7 });
    }

    #[test]
    fn worker_answers_and_stops_on_shutdown() {
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        let surface = shared();
        let handle = std::thread::spawn(move || render_worker(request_rx, response_tx, surface));

        request_tx
            .send(RenderRequest::Page {
                id: RequestId::new(7),
                page: 1,
                params: RenderParams::default(),
                document: Arc::new(PaperDocument::letter(1)),
                cancel: CancelToken::new(),
            })
            .unwrap();
        request_tx.send(RenderRequest::Shutdown).unwrap();

        let response = response_rx.recv().unwrap();
        assert_eq!(response.id(), RequestId::new(7));
        assert!(matches!(response, RenderResponse::Page { .. }));
        handle.join().unwrap();
    }
}

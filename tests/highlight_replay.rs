use std::sync::Arc;
use std::time::Duration;

use pagelight::export;
use pagelight::test_utils::test_helpers::{ScriptedDocument, page_colour};
use pagelight::viewer::{
    HighlightDispatch, HighlightError, HighlightIntent, HighlightStyle, OverlayGeometry,
    RenderScheduler, Viewer, ViewerEvent,
};
use pagelight::{AnalysisResult, LayoutAnalysis, search};

const STARTED_TIMEOUT: Duration = Duration::from_secs(5);

const SPLIT_FIELD: &str = r#"{
    "documents": [{
        "docType": "contract",
        "fields": {
            "Parties": {
                "content": "Acme and Globex",
                "boundingRegions": [
                    {"pageNumber": 1, "polygon": [1, 1, 4, 1, 4, 1.5, 1, 1.5]},
                    {"pageNumber": 3, "polygon": [1, 9, 5, 9, 5, 9.5, 1, 9.5]}
                ]
            }
        }
    }]
}"#;

const LAYOUT: &str = r#"{
    "lines": [
        {"page": 1, "text": "Invoice 42", "polygon": [1, 1, 3, 1, 3, 1.2, 1, 1.2]},
        {"page": 2, "text": "Total due", "polygon": [1, 5, 3, 5, 3, 5.2, 1, 5.2]}
    ],
    "words": []
}"#;

fn viewer_on(doc: ScriptedDocument) -> Viewer {
    let mut viewer = Viewer::new(RenderScheduler::new());
    let _ = viewer.set_document(Arc::new(doc));
    let _ = viewer.wait_idle();
    viewer
}

#[test]
fn highlight_waits_for_its_page() {
    let mut doc = ScriptedDocument::letter(4);
    let gate = doc.gate(4);
    let started = doc.started();
    let mut viewer = viewer_on(doc);
    assert_eq!(started.recv_timeout(STARTED_TIMEOUT), Ok(1));

    let region = pagelight::ExtractionRegion::new(4, vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 2.0])
        .unwrap();
    let dispatch = viewer.activate(&region, HighlightStyle::SELECTION).unwrap();
    assert_eq!(dispatch, HighlightDispatch::Deferred { page: 4 });

    // page 4 is drawing; nothing may land on page 1 meanwhile
    assert_eq!(started.recv_timeout(STARTED_TIMEOUT), Ok(4));
    assert!(viewer.poll().is_empty());
    assert!(viewer.overlays().is_empty());
    assert_eq!(viewer.scheduler().settled_page(), None);

    gate.open();
    let events = viewer.wait_idle();

    assert!(events.contains(&ViewerEvent::HighlightDrawn { page: 4 }));
    assert_eq!(viewer.overlays().page(), Some(4));
    assert!(viewer.overlays().overlays().iter().all(|o| o.page == 4));
}

#[test]
fn split_field_follows_the_chosen_intent() {
    let result = AnalysisResult::from_json(SPLIT_FIELD).unwrap();
    let regions = result.field("Parties").unwrap().valid_regions();
    assert_eq!(regions.len(), 2);

    let mut viewer = viewer_on(ScriptedDocument::letter(3));
    let _ = viewer.scheduler_mut().request_render(2);
    let _ = viewer.wait_idle();

    let err = viewer
        .activate_field(&regions, HighlightIntent::CurrentPage, HighlightStyle::SELECTION)
        .unwrap_err();
    assert!(matches!(err, HighlightError::RegionNotOnCurrentPage { page: 2 }));

    let dispatch = viewer
        .activate_field(&regions, HighlightIntent::Navigate(3), HighlightStyle::SELECTION)
        .unwrap();
    assert_eq!(dispatch, HighlightDispatch::Deferred { page: 3 });

    let events = viewer.wait_idle();
    assert!(events.contains(&ViewerEvent::HighlightDrawn { page: 3 }));

    // 9in from the top of a 792pt page at 1.5x
    let bounds = viewer.overlays().overlays()[0].geometry.bounds();
    assert!((bounds.top - 9.0 * 108.0).abs() < 1e-6);
    assert!((bounds.width - 4.0 * 108.0).abs() < 1e-6);
}

#[test]
fn failed_page_drops_its_highlight() {
    let mut viewer = viewer_on(ScriptedDocument::letter(3).fail_page(3));
    let region =
        pagelight::ExtractionRegion::new(3, vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 2.0]).unwrap();

    let _ = viewer.activate(&region, HighlightStyle::TEXT).unwrap();
    let events = viewer.wait_idle();

    assert!(
        events
            .iter()
            .any(|e| matches!(e, ViewerEvent::RenderFailed { page: 3, .. }))
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ViewerEvent::HighlightDrawn { .. }))
    );
    assert_eq!(viewer.pending_page(), None);
    assert!(viewer.overlays().is_empty());
    assert_eq!(viewer.scheduler().settled_page(), None);
}

#[test]
fn search_hit_is_highlighted_on_its_page() {
    let layout = LayoutAnalysis::from_json(LAYOUT).unwrap();
    let hits = search(&layout, "total");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].page, 2);

    let mut viewer = viewer_on(ScriptedDocument::letter(2));
    let _ = viewer.activate(&hits[0].region, HighlightStyle::SELECTION).unwrap();
    let events = viewer.wait_idle();

    assert!(events.contains(&ViewerEvent::HighlightDrawn { page: 2 }));
    assert!(matches!(
        viewer.overlays().overlays()[0].geometry,
        OverlayGeometry::Rect(_)
    ));
}

#[test]
fn snapshot_shows_highlight_over_page() {
    let layout = LayoutAnalysis::from_json(LAYOUT).unwrap();
    let hit = search(&layout, "invoice").remove(0);

    let mut viewer = viewer_on(ScriptedDocument::letter(2));
    let dispatch = viewer.activate(&hit.region, HighlightStyle::SELECTION).unwrap();
    assert_eq!(dispatch, HighlightDispatch::Drawn);

    let image = export::snapshot(viewer.scheduler()).unwrap();
    assert_eq!(image.dimensions(), (918, 1188));

    let outside = image.get_pixel(20, 20).0;
    assert_eq!(outside, page_colour(1));

    // inside the "Invoice 42" line: 108..324 x 108..129.6
    let inside = image.get_pixel(200, 118).0;
    assert_ne!(inside, page_colour(1));
    assert!(inside[1] > 0);
}

#[test]
fn new_document_forgets_pending_highlight() {
    let mut first = ScriptedDocument::letter(4);
    let gate = first.gate(4);
    let mut viewer = viewer_on(first);

    let region =
        pagelight::ExtractionRegion::new(4, vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 2.0]).unwrap();
    let _ = viewer.activate(&region, HighlightStyle::SELECTION).unwrap();
    assert_eq!(viewer.pending_page(), Some(4));

    let _ = viewer.set_document(Arc::new(ScriptedDocument::letter(4)));
    assert_eq!(viewer.pending_page(), None);

    gate.open();
    let events = viewer.wait_idle();
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ViewerEvent::HighlightDrawn { .. }))
    );
    assert_eq!(viewer.scheduler().settled_page(), Some(1));
    assert!(viewer.overlays().is_empty());
}

#[test]
fn lost_worker_drops_pending_highlight() {
    let mut viewer = viewer_on(ScriptedDocument::letter(3).panic_page(3));
    let region =
        pagelight::ExtractionRegion::new(3, vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 2.0]).unwrap();

    let dispatch = viewer.activate(&region, HighlightStyle::SELECTION).unwrap();
    assert_eq!(dispatch, HighlightDispatch::Deferred { page: 3 });

    let events = viewer.wait_idle();
    assert!(events.contains(&ViewerEvent::WorkerLost));
    assert_eq!(viewer.pending_page(), None);
    assert!(viewer.overlays().is_empty());
    assert_eq!(viewer.scheduler().settled_page(), None);
}

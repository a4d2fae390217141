use crate::dom::{Document, NodeId, Rect};
use crate::overlay::{ControllerVisual, OverlayRenderer};

/// One in-flight overlay drag. Pointer positions are clamped to the media
/// element's own footprint, so the overlay cannot leave the player area.
#[derive(Debug, Clone, Copy)]
pub struct DragSession {
    pub media: NodeId,
    pub visual: ControllerVisual,
    pub bounds: Rect,
    pub last: (f64, f64),
}

/// At most one drag is live per page. Starting a new one while another is
/// active replaces it; tearing down a controller cancels its drag.
#[derive(Default)]
pub struct DragCoordinator {
    active: Option<DragSession>,
}

impl DragCoordinator {
    pub fn new() -> Self {
        DragCoordinator::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_media(&self) -> Option<NodeId> {
        self.active.as_ref().map(|s| s.media)
    }

    pub fn begin(
        &mut self,
        doc: &Document,
        media: NodeId,
        visual: ControllerVisual,
        pointer: (f64, f64),
    ) {
        if let Some(previous) = &self.active {
            log::debug!("Drag on {} replaces drag on {}", media, previous.media);
        }
        let bounds = doc.media(media).map(|m| m.rect).unwrap_or_default();
        let last = clamp_to(bounds, pointer);
        self.active = Some(DragSession {
            media,
            visual,
            bounds,
            last,
        });
    }

    /// Applies a pointer move to the active session. Returns false when no
    /// drag is live, so callers can let the event fall through to the page.
    pub fn pointer_move(
        &mut self,
        doc: &mut Document,
        renderer: &mut dyn OverlayRenderer,
        pointer: (f64, f64),
    ) -> bool {
        let Some(session) = &mut self.active else {
            return false;
        };
        let (x, y) = clamp_to(session.bounds, pointer);
        renderer.set_position(doc, session.visual, x, y);
        session.last = (x, y);
        true
    }

    pub fn end(&mut self) -> Option<DragSession> {
        self.active.take()
    }

    /// Drops the active session if it belongs to `media`. Controller
    /// teardown routes through here.
    pub fn cancel_for(&mut self, media: NodeId) {
        if self.active.as_ref().is_some_and(|s| s.media == media) {
            self.active = None;
        }
    }
}

fn clamp_to(bounds: Rect, (x, y): (f64, f64)) -> (f64, f64) {
    (
        x.clamp(bounds.x, bounds.x + bounds.width),
        y.clamp(bounds.y, bounds.y + bounds.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{DomRenderer, InsertMethod, InsertionPoint, RenderOptions};

    fn setup() -> (Document, NodeId, ControllerVisual, DomRenderer) {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let media = doc.create_element("video");
        doc.append_child(body, media).unwrap();
        doc.set_media_rect(media, Rect::new(100.0, 50.0, 640.0, 360.0))
            .unwrap();
        let mut renderer = DomRenderer::new();
        let visual = renderer
            .create(
                &mut doc,
                media,
                InsertionPoint {
                    target: body,
                    method: InsertMethod::Before(media),
                },
                &RenderOptions {
                    opacity: 0.3,
                    start_hidden: false,
                    initial_rate: 1.0,
                },
            )
            .unwrap();
        (doc, media, visual, renderer)
    }

    #[test]
    fn test_moves_are_clamped_to_media_footprint() {
        let (mut doc, media, visual, mut renderer) = setup();
        let mut drag = DragCoordinator::new();
        drag.begin(&doc, media, visual, (120.0, 60.0));

        assert!(drag.pointer_move(&mut doc, &mut renderer, (5000.0, -200.0)));
        assert_eq!(
            doc.node(visual.host).attribute("data-position"),
            Some("740,50")
        );
        let session = drag.end().unwrap();
        assert_eq!(session.last, (740.0, 50.0));
    }

    #[test]
    fn test_new_drag_replaces_active_one() {
        let (mut doc, media, visual, mut renderer) = setup();
        let body = doc.body();
        let other = doc.create_element("video");
        doc.append_child(body, other).unwrap();
        let other_visual = renderer
            .create(
                &mut doc,
                other,
                InsertionPoint {
                    target: body,
                    method: InsertMethod::Append,
                },
                &RenderOptions {
                    opacity: 0.3,
                    start_hidden: false,
                    initial_rate: 1.0,
                },
            )
            .unwrap();

        let mut drag = DragCoordinator::new();
        drag.begin(&doc, media, visual, (0.0, 0.0));
        drag.begin(&doc, other, other_visual, (0.0, 0.0));
        assert_eq!(drag.active_media(), Some(other));
    }

    #[test]
    fn test_move_without_session_falls_through() {
        let (mut doc, _media, _visual, mut renderer) = setup();
        let mut drag = DragCoordinator::new();
        assert!(!drag.pointer_move(&mut doc, &mut renderer, (10.0, 10.0)));
    }

    #[test]
    fn test_cancel_only_matching_media() {
        let (doc, media, visual, _renderer) = setup();
        let mut drag = DragCoordinator::new();
        drag.begin(&doc, media, visual, (0.0, 0.0));

        drag.cancel_for(NodeId::new(9999));
        assert!(drag.is_active());
        drag.cancel_for(media);
        assert!(!drag.is_active());
    }
}

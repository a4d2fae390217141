use anyhow::Context;

use crate::dom::{Document, NodeId};
use crate::overlay::controller::{ControllerVisual, OVERLAY_MARKER};

/// Where a strategy wants the overlay wrapper placed, `{target, method}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPoint {
    pub target: NodeId,
    pub method: InsertMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMethod {
    /// Insert under `target`, immediately before this sibling.
    Before(NodeId),
    /// Insert as `target`'s first child.
    FirstChild,
    /// Append as `target`'s last child.
    Append,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub opacity: f64,
    pub start_hidden: bool,
    pub initial_rate: f64,
}

/// The rendering collaborator. Implementations build and tear down the
/// visible overlay; the lifecycle manager owns when that happens.
/// `destroy` must tolerate being called twice for the same visual.
pub trait OverlayRenderer {
    fn create(
        &mut self,
        doc: &mut Document,
        media: NodeId,
        point: InsertionPoint,
        options: &RenderOptions,
    ) -> anyhow::Result<ControllerVisual>;

    fn destroy(&mut self, doc: &mut Document, visual: ControllerVisual) -> anyhow::Result<()>;

    /// Updates the speed readout. Display-only, never fails the caller.
    fn set_rate(&mut self, doc: &mut Document, visual: ControllerVisual, rate: f64);

    /// Shows or hides the overlay without tearing it down.
    fn set_hidden(&mut self, doc: &mut Document, visual: ControllerVisual, hidden: bool);

    /// Moves the overlay wrapper during a drag session.
    fn set_position(&mut self, doc: &mut Document, visual: ControllerVisual, x: f64, y: f64);
}

pub fn format_rate(rate: f64) -> String {
    format!("{:.2}", rate)
}

/// Builds the overlay as real page nodes: a marked wrapper, a shadow root
/// under it, and the indicator plus action buttons inside the shadow. The
/// marker attribute keeps the scanner out of the subtree.
#[derive(Default)]
pub struct DomRenderer;

impl DomRenderer {
    pub fn new() -> Self {
        DomRenderer
    }
}

const BUTTON_ACTIONS: &[&str] = &["rewind", "slower", "faster", "advance", "display"];

impl OverlayRenderer for DomRenderer {
    fn create(
        &mut self,
        doc: &mut Document,
        media: NodeId,
        point: InsertionPoint,
        options: &RenderOptions,
    ) -> anyhow::Result<ControllerVisual> {
        let host = doc.create_element("div");
        doc.set_attribute(host, OVERLAY_MARKER, "true")
            .context("marking overlay wrapper")?;
        doc.set_attribute(host, "class", "speed-overlay")?;
        doc.set_attribute(host, "style", &format!("opacity:{}", options.opacity))?;
        if options.start_hidden {
            doc.set_attribute(host, "hidden", "true")?;
        }

        let shadow = doc.attach_shadow(host).context("overlay shadow root")?;

        let indicator = doc.create_element("span");
        doc.set_attribute(indicator, "class", "speed-indicator")?;
        doc.set_attribute(indicator, "text", &format_rate(options.initial_rate))?;
        doc.append_child(shadow, indicator)?;

        let controls = doc.create_element("span");
        doc.set_attribute(controls, "class", "speed-controls")?;
        doc.append_child(shadow, controls)?;
        for action in BUTTON_ACTIONS {
            let button = doc.create_element("button");
            doc.set_attribute(button, "data-action", action)?;
            doc.append_child(controls, button)?;
        }

        match point.method {
            InsertMethod::Before(reference) => doc
                .insert_before(point.target, host, reference)
                .with_context(|| format!("inserting overlay for media {}", media))?,
            InsertMethod::FirstChild => doc
                .insert_first(point.target, host)
                .with_context(|| format!("inserting overlay for media {}", media))?,
            InsertMethod::Append => doc
                .append_child(point.target, host)
                .with_context(|| format!("inserting overlay for media {}", media))?,
        }

        Ok(ControllerVisual {
            host,
            shadow,
            indicator,
        })
    }

    fn destroy(&mut self, doc: &mut Document, visual: ControllerVisual) -> anyhow::Result<()> {
        // Removing an already-detached wrapper is a no-op, which is what
        // makes double-destroy safe.
        doc.remove(visual.host).context("removing overlay wrapper")?;
        Ok(())
    }

    fn set_rate(&mut self, doc: &mut Document, visual: ControllerVisual, rate: f64) {
        if let Err(e) = doc.set_attribute(visual.indicator, "text", &format_rate(rate)) {
            log::debug!("Indicator update failed: {}", e);
        }
    }

    fn set_hidden(&mut self, doc: &mut Document, visual: ControllerVisual, hidden: bool) {
        let result = if hidden {
            doc.set_attribute(visual.host, "hidden", "true")
        } else {
            doc.remove_attribute(visual.host, "hidden")
        };
        if let Err(e) = result {
            log::debug!("Visibility update failed: {}", e);
        }
    }

    fn set_position(&mut self, doc: &mut Document, visual: ControllerVisual, x: f64, y: f64) {
        if let Err(e) = doc.set_attribute(visual.host, "data-position", &format!("{:.0},{:.0}", x, y))
        {
            log::debug!("Position update failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let media = doc.create_element("video");
        doc.append_child(body, media).unwrap();
        (doc, body, media)
    }

    fn options() -> RenderOptions {
        RenderOptions {
            opacity: 0.3,
            start_hidden: false,
            initial_rate: 1.0,
        }
    }

    #[test]
    fn test_create_inserts_marked_wrapper_before_media() {
        let (mut doc, body, media) = setup();
        let mut renderer = DomRenderer::new();
        let visual = renderer
            .create(
                &mut doc,
                media,
                InsertionPoint {
                    target: body,
                    method: InsertMethod::Before(media),
                },
                &options(),
            )
            .unwrap();

        let children = &doc.node(body).children;
        let host_pos = children.iter().position(|&c| c == visual.host).unwrap();
        let media_pos = children.iter().position(|&c| c == media).unwrap();
        assert!(host_pos < media_pos);
        assert_eq!(doc.node(visual.host).attribute(OVERLAY_MARKER), Some("true"));
        assert_eq!(doc.node(visual.indicator).attribute("text"), Some("1.00"));
    }

    #[test]
    fn test_start_hidden_sets_hidden_attribute() {
        let (mut doc, body, media) = setup();
        let mut renderer = DomRenderer::new();
        let visual = renderer
            .create(
                &mut doc,
                media,
                InsertionPoint {
                    target: body,
                    method: InsertMethod::Append,
                },
                &RenderOptions {
                    start_hidden: true,
                    ..options()
                },
            )
            .unwrap();
        assert_eq!(doc.node(visual.host).attribute("hidden"), Some("true"));

        renderer.set_hidden(&mut doc, visual, false);
        assert_eq!(doc.node(visual.host).attribute("hidden"), None);
    }

    #[test]
    fn test_destroy_twice_is_safe() {
        let (mut doc, body, media) = setup();
        let mut renderer = DomRenderer::new();
        let visual = renderer
            .create(
                &mut doc,
                media,
                InsertionPoint {
                    target: body,
                    method: InsertMethod::Before(media),
                },
                &options(),
            )
            .unwrap();

        renderer.destroy(&mut doc, visual).unwrap();
        assert!(!doc.is_connected(visual.host));
        renderer.destroy(&mut doc, visual).unwrap();
    }

    #[test]
    fn test_set_rate_updates_indicator() {
        let (mut doc, body, media) = setup();
        let mut renderer = DomRenderer::new();
        let visual = renderer
            .create(
                &mut doc,
                media,
                InsertionPoint {
                    target: body,
                    method: InsertMethod::Append,
                },
                &options(),
            )
            .unwrap();
        renderer.set_rate(&mut doc, visual, 1.75);
        assert_eq!(doc.node(visual.indicator).attribute("text"), Some("1.75"));
    }
}

use std::collections::BTreeMap;

use crate::dom::{Document, NodeId};
use crate::sites::TimeRange;

/// Attribute marking the overlay wrapper element in the page tree. The
/// scanner refuses to descend into subtrees carrying it, so the overlay's
/// own markup can never be mistaken for page content.
pub const OVERLAY_MARKER: &str = "data-speed-overlay";

/// The DOM nodes a renderer builds for one controller. Opaque to everything
/// except the renderer itself and event targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerVisual {
    /// Wrapper element inserted into the page tree.
    pub host: NodeId,
    /// The overlay's own shadow root under the wrapper.
    pub shadow: NodeId,
    /// Speed readout element inside the shadow.
    pub indicator: NodeId,
}

/// One live overlay attached to one media element. Created and destroyed
/// only by the lifecycle manager; everything else reads or tweaks display
/// state through the registry.
#[derive(Debug, Clone)]
pub struct Controller {
    /// Stable identifier derived from the media node and creation order,
    /// used in logs and for disambiguating action targets.
    pub id: String,
    pub media: NodeId,
    pub visual: ControllerVisual,
    /// Normalized source origin at attach time, the speed-record key.
    pub origin: String,
    /// User bookmark set by `mark`, recalled by `jump`.
    pub marked_time: Option<f64>,
    pub hidden: bool,
    /// Set when the user toggled visibility explicitly; automatic
    /// visibility reconciliation leaves such controllers alone.
    pub manual: bool,
    /// A blink is showing the controller right now and a re-hide is
    /// scheduled.
    pub blinking: bool,
    /// Suspended controllers are skipped by the dispatcher entirely.
    pub suspended: bool,
    /// Skippable spans for the current source, refreshed when the source
    /// changes.
    pub skip_segments: Vec<TimeRange>,
}

impl Controller {
    pub fn new(media: NodeId, visual: ControllerVisual, origin: String, ordinal: u64) -> Self {
        Controller {
            id: format!("ctl-{}-{}", media.index(), ordinal),
            media,
            visual,
            origin,
            marked_time: None,
            hidden: false,
            manual: false,
            blinking: false,
            suspended: false,
            skip_segments: Vec::new(),
        }
    }
}

/// The authoritative media-to-controller mapping. Keyed by media node so
/// duplicate attachment is structurally impossible; ordered keys keep
/// whole-registry dispatch deterministic.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<NodeId, Controller>,
    next_ordinal: u64,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, media: NodeId) -> bool {
        self.entries.contains_key(&media)
    }

    pub fn get(&self, media: NodeId) -> Option<&Controller> {
        self.entries.get(&media)
    }

    pub fn get_mut(&mut self, media: NodeId) -> Option<&mut Controller> {
        self.entries.get_mut(&media)
    }

    pub fn insert(&mut self, controller: Controller) {
        self.entries.insert(controller.media, controller);
    }

    pub fn remove(&mut self, media: NodeId) -> Option<Controller> {
        self.entries.remove(&media)
    }

    /// Hands out the creation ordinal for the next controller id.
    pub fn take_ordinal(&mut self) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    pub fn iter(&self) -> impl Iterator<Item = &Controller> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Controller> {
        self.entries.values_mut()
    }

    pub fn media_ids(&self) -> Vec<NodeId> {
        self.entries.keys().copied().collect()
    }

    /// Maps an event target anywhere inside an overlay (shadow content,
    /// wrapper, or the wrapper's descendants) back to the owning media
    /// element. This is how a click on one overlay's button is kept from
    /// steering every controller on the page.
    pub fn media_for_event_target(&self, doc: &Document, target: NodeId) -> Option<NodeId> {
        let mut current = Some(target);
        while let Some(id) = current {
            if let Some(controller) = self
                .entries
                .values()
                .find(|c| c.visual.host == id || c.visual.shadow == id)
            {
                return Some(controller.media);
            }
            current = doc.composed_parent(id);
        }
        None
    }
}

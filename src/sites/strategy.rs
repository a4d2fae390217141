use crate::dom::{Document, NodeId};
use crate::overlay::{InsertMethod, InsertionPoint};
use crate::sites::segments::SkipSegmentProvider;

/// A skippable span of playback time, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Per-site behavior overrides. Exactly one strategy is active per
/// document, chosen once at session start. All methods must answer
/// without blocking; the skip-segment lookup is the one capability
/// allowed to consult an external provider, and it degrades to an empty
/// list on failure.
pub trait SiteStrategy {
    fn name(&self) -> &'static str;

    /// Host predicate used by the resolver's ordered lookup.
    fn matches(&self, hostname: &str) -> bool;

    /// Where the overlay wrapper goes for this media element. `parent` is
    /// the scanner-resolved parent, which may differ from the node's own
    /// parent when the node was already detached mid-mutation.
    fn insertion_point(&self, doc: &Document, media: NodeId, parent: NodeId) -> InsertionPoint {
        if doc.node(media).parent == Some(parent) {
            InsertionPoint {
                target: parent,
                method: InsertMethod::Before(media),
            }
        } else {
            InsertionPoint {
                target: parent,
                method: InsertMethod::Append,
            }
        }
    }

    /// Site-specific seek. Returning true means the seek was performed
    /// here and the dispatcher must not also assign the time directly.
    fn handle_seek(&self, _doc: &mut Document, _media: NodeId, _delta: f64) -> bool {
        false
    }

    /// Media this site never wants controlled (inline hover previews,
    /// thumbnail loops).
    fn should_ignore(&self, _doc: &Document, _media: NodeId) -> bool {
        false
    }

    /// Known skippable spans for a source URL, empty when the site has no
    /// provider or the provider fails.
    fn skip_segments(&mut self, _source_url: &str) -> Vec<TimeRange> {
        Vec::new()
    }

    /// Installs the segment provider at resolution time. Sites without a
    /// segment concept drop it.
    fn set_segment_provider(&mut self, _provider: Box<dyn SkipSegmentProvider>) {}
}

/// `youtube.com` matches `www.youtube.com` and `m.youtube.com` but not
/// `notyoutube.com`.
pub fn host_matches(hostname: &str, domain: &str) -> bool {
    hostname == domain || hostname.ends_with(&format!(".{}", domain))
}

/// Walks the media element's ancestors looking for a class-attribute
/// fragment, a recurring need when deciding placement on player frameworks
/// that stack wrapper layers.
pub fn ancestor_with_class(doc: &Document, from: NodeId, fragment: &str) -> Option<NodeId> {
    doc.closest(from, |node| {
        node.attribute("class")
            .is_some_and(|class| class.contains(fragment))
    })
}

use std::collections::HashMap;

/// Index handle into the document arena. Nodes are never freed during a
/// document's lifetime; detaching a subtree only unlinks it, so stale ids
/// stay valid for late-arriving mutation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// The document node itself; one per document, one per iframe content.
    Document,
    Element { tag: String },
    /// Shadow root attached to a host element. Forms its own tree root for
    /// observation purposes.
    ShadowRoot,
    /// Root of an iframe's nested content document.
    ContentDocument,
}

/// Layout footprint of an element, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect { x, y, width, height }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Live playback state of a video/audio element. The engine never owns
/// this; it reads and writes through the document like any other script.
#[derive(Debug, Clone)]
pub struct MediaState {
    /// Resolved current source, if the element has loaded one directly.
    /// `<source>` children are tracked as regular child elements.
    pub source: Option<String>,
    pub playback_rate: f64,
    pub volume: f64,
    pub muted: bool,
    pub paused: bool,
    pub current_time: f64,
    pub duration: f64,
    /// 0 = HAVE_NOTHING .. 4 = HAVE_ENOUGH_DATA.
    pub ready_state: u8,
    pub rect: Rect,
    pub intersecting: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        MediaState {
            source: None,
            playback_rate: 1.0,
            volume: 1.0,
            muted: false,
            paused: true,
            current_time: 0.0,
            duration: 0.0,
            ready_state: 0,
            rect: Rect::new(0.0, 0.0, 640.0, 360.0),
            intersecting: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: HashMap<String, String>,
    /// For elements: the attached shadow root, if any.
    pub shadow_root: Option<NodeId>,
    /// For shadow roots and content documents: the owning element.
    pub host: Option<NodeId>,
    /// For iframe elements: the nested content document root.
    pub content_document: Option<NodeId>,
    /// For iframes/content documents: whether the frame is same-origin.
    /// Cross-origin content is inaccessible.
    pub same_origin: bool,
    pub media: Option<MediaState>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        let media = match &kind {
            NodeKind::Element { tag } if is_media_tag(tag) => Some(MediaState::default()),
            _ => None,
        };
        Node {
            id,
            kind,
            parent: None,
            children: Vec::new(),
            attributes: HashMap::new(),
            shadow_root: None,
            host: None,
            content_document: None,
            same_origin: true,
            media,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }

    pub fn is_video(&self) -> bool {
        self.tag() == Some("video")
    }

    pub fn is_audio(&self) -> bool {
        self.tag() == Some("audio")
    }

    pub fn is_media(&self) -> bool {
        self.media.is_some()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|v| v.as_str())
    }
}

pub fn is_media_tag(tag: &str) -> bool {
    tag == "video" || tag == "audio"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_state_attached_to_media_tags() {
        let video = Node::new(NodeId::new(0), NodeKind::Element { tag: "video".into() });
        let div = Node::new(NodeId::new(1), NodeKind::Element { tag: "div".into() });
        assert!(video.is_media());
        assert!(video.is_video());
        assert!(!div.is_media());
    }

    #[test]
    fn test_default_media_state() {
        let audio = Node::new(NodeId::new(0), NodeKind::Element { tag: "audio".into() });
        let media = audio.media.unwrap();
        assert_eq!(media.playback_rate, 1.0);
        assert!(media.paused);
        assert!(media.source.is_none());
        assert_eq!(media.ready_state, 0);
    }

    #[test]
    fn test_rect_area() {
        assert!(Rect::new(0.0, 0.0, 100.0, 50.0).has_area());
        assert!(!Rect::new(0.0, 0.0, 0.0, 50.0).has_area());
        assert!(!Rect::default().has_area());
    }
}

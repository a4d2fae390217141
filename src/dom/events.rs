use crate::dom::NodeId;

/// One observed DOM change. Targets follow observer semantics: child-list
/// records target the parent the change happened under, attribute records
/// target the changed element. Only the topmost removed/added node of a
/// subtree produces a record.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    ChildList {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    Attributes {
        name: String,
        old_value: Option<String>,
    },
}

impl MutationRecord {
    pub fn added(target: NodeId, nodes: Vec<NodeId>) -> Self {
        MutationRecord {
            target,
            kind: MutationKind::ChildList { added: nodes, removed: Vec::new() },
        }
    }

    pub fn removed(target: NodeId, nodes: Vec<NodeId>) -> Self {
        MutationRecord {
            target,
            kind: MutationKind::ChildList { added: Vec::new(), removed: nodes },
        }
    }

    pub fn attribute(target: NodeId, name: &str, old_value: Option<String>) -> Self {
        MutationRecord {
            target,
            kind: MutationKind::Attributes { name: name.to_string(), old_value },
        }
    }
}

/// Native media element events, delivered document-wide the way a
/// capturing listener on the document sees them.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub target: NodeId,
    pub kind: MediaEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    RateChange { rate: f64 },
    VolumeChange { volume: f64, muted: bool },
    Play,
    Pause,
    /// The element started loading a (new) source.
    LoadStart,
    /// The element's source was detached.
    Emptied,
    TimeUpdate { time: f64 },
    IntersectionChange { intersecting: bool },
}

use thiserror::Error;

use crate::dom::NodeId;

/// Transient tree inconsistencies. Callers in the engine treat these as
/// skippable: log at low severity and continue with the next item.
#[derive(Debug, Error, PartialEq)]
pub enum DomError {
    #[error("node {0} does not exist in this document")]
    UnknownNode(NodeId),

    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    #[error("node {0} already has a shadow root")]
    ShadowRootExists(NodeId),

    #[error("node {0} has no media state")]
    NotMedia(NodeId),

    #[error("cross-origin content document of {0} is not accessible")]
    CrossOrigin(NodeId),

    #[error("node {0} has no content document")]
    NoContentDocument(NodeId),

    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("inserting {0} here would create a cycle")]
    WouldCycle(NodeId),
}

use std::collections::HashSet;

use crate::dom::{Document, NodeId};
use crate::overlay::OVERLAY_MARKER;

/// Shadow-root nesting deeper than this is silently not entered. Missing
/// absurdly nested media beats spinning on a pathological page.
pub const MAX_SHADOW_DEPTH: usize = 10;

/// Snapshot produced by one scan: qualifying media with their resolved
/// parents, plus every shadow root encountered so the watcher can extend
/// its observation scope. One-shot; scan again for a fresh view.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub media: Vec<(NodeId, NodeId)>,
    pub shadow_roots: Vec<NodeId>,
}

/// Depth-first enumeration of qualifying media under `root`, inclusive.
/// Video always qualifies; audio only when enabled. The resolved parent is
/// the node's own parent, or `fallback_parent` when the node is already
/// detached; removal records hand the scanner exactly that shape.
///
/// The walk uses an explicit stack with a visited set, descends into
/// shadow roots (depth-capped) and same-origin iframe documents, and
/// refuses overlay-marked subtrees so our own markup is never scanned.
pub fn scan(
    doc: &Document,
    root: NodeId,
    fallback_parent: Option<NodeId>,
    audio_enabled: bool,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];

    while let Some((id, shadow_depth)) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = doc.try_node(id) else {
            continue;
        };
        if node.attribute(OVERLAY_MARKER).is_some() {
            continue;
        }

        if node.is_video() || (audio_enabled && node.is_audio()) {
            let parent = node.parent.or(fallback_parent);
            match parent {
                Some(parent) => outcome.media.push((id, parent)),
                None => log::debug!("Media {} has no resolvable parent, skipping", id),
            }
        }

        if let Some(shadow) = node.shadow_root {
            if shadow_depth < MAX_SHADOW_DEPTH {
                outcome.shadow_roots.push(shadow);
                stack.push((shadow, shadow_depth + 1));
            }
        }

        if node.content_document.is_some() {
            match doc.content_document(id) {
                Ok(content) => stack.push((content, shadow_depth)),
                Err(e) => log::debug!("Frame {} not scannable: {}", id, e),
            }
        }

        // Reverse push so children come off the stack in document order.
        for &child in node.children.iter().rev() {
            stack.push((child, shadow_depth));
        }
    }

    outcome
}

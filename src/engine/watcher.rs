use std::collections::HashSet;

use crate::dom::{Document, MutationKind, MutationRecord, NodeId};
use crate::engine::scanner::{scan, ScanOutcome};

/// What one processed batch asks the rest of the engine to do. Candidates
/// are exactly that: the lifecycle manager re-validates each one, so a
/// node that moved or died between record and processing is harmless here.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// The document root element itself was replaced; everything must be
    /// reinitialized and the rest of this batch is moot.
    pub reinit: bool,
    pub added: Vec<(NodeId, NodeId)>,
    pub removed: Vec<NodeId>,
    /// Shadow roots discovered while scanning, to be added to the
    /// observation scope.
    pub shadow_roots: Vec<NodeId>,
}

/// Processes mutation record batches into lifecycle candidates. The
/// observation scope itself lives on the document; this type carries only
/// the rescan dedup state.
#[derive(Default)]
pub struct MutationWatcher {
    /// Targets whose visibility flip already triggered a body rescan.
    /// One logical open/close interaction fires a flurry of attribute
    /// records; only the first may rescan or controllers churn.
    rescan_seen: HashSet<NodeId>,
}

impl MutationWatcher {
    pub fn new() -> Self {
        MutationWatcher::default()
    }

    /// Adds a root to the observation scope. Idempotent; the scope only
    /// grows until full reinitialization.
    pub fn observe(&self, doc: &mut Document, root: NodeId) {
        if doc.is_observed(root) {
            return;
        }
        doc.observe_root(root);
        log::debug!("Observing mutations under {}", root);
    }

    /// Forgets interaction dedup state. Part of full reinitialization.
    pub fn reset(&mut self) {
        self.rescan_seen.clear();
    }

    /// Folds a record batch, in delivery order, into one outcome.
    pub fn process_batch(
        &mut self,
        doc: &Document,
        records: &[MutationRecord],
        audio_enabled: bool,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for record in records {
            match &record.kind {
                MutationKind::ChildList { added, removed } => {
                    for &node in added {
                        if node == doc.document_element() {
                            log::info!("Document element replaced, full reinitialization");
                            outcome.reinit = true;
                            return outcome;
                        }
                        let found = scan(doc, node, Some(record.target), audio_enabled);
                        absorb_additions(&mut outcome, found);
                    }
                    for &node in removed {
                        let found = scan(doc, node, Some(record.target), audio_enabled);
                        outcome.removed.extend(found.media.iter().map(|&(m, _)| m));
                    }
                }
                MutationKind::Attributes { name, .. } => {
                    if !self.is_visibility_signal(doc, record.target, name) {
                        continue;
                    }
                    if !self.rescan_seen.insert(record.target) {
                        log::debug!("Rescan for {} already done this interaction", record.target);
                        continue;
                    }
                    let found = scan(doc, doc.body(), None, audio_enabled);
                    absorb_additions(&mut outcome, found);
                }
            }
        }
        outcome
    }

    /// Attribute changes that mean "something just became visible": an
    /// aria-hidden flip landing on "false", or any state change on a
    /// player custom element.
    fn is_visibility_signal(&self, doc: &Document, target: NodeId, name: &str) -> bool {
        let Some(node) = doc.try_node(target) else {
            return false;
        };
        if name == "aria-hidden" {
            return node.attribute("aria-hidden") == Some("false");
        }
        node.tag()
            .is_some_and(|tag| tag.contains('-') && tag.ends_with("-player"))
    }
}

fn absorb_additions(outcome: &mut BatchOutcome, found: ScanOutcome) {
    outcome.added.extend(found.media);
    outcome.shadow_roots.extend(found.shadow_roots);
}

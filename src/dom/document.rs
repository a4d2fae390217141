use std::collections::HashSet;

use crate::dom::error::DomError;
use crate::dom::events::{MediaEvent, MediaEventKind, MutationRecord};
use crate::dom::node::{Node, NodeId, NodeKind, Rect};

/// An in-memory document tree. Page scripts (scenarios, tests) mutate it;
/// every mutation is journaled as a `MutationRecord` routed to whichever
/// observed tree root the change happened under, and media state changes
/// queue native-style `MediaEvent`s the way a capturing document listener
/// would see them.
///
/// Node ids are minted by this arena and never freed. Removing a subtree
/// only unlinks it, so any `NodeId` obtained from a `Document` stays
/// indexable for that document's whole lifetime.
pub struct Document {
    nodes: Vec<Node>,
    url: String,
    document_node: NodeId,
    observed_roots: HashSet<NodeId>,
    records: Vec<MutationRecord>,
    media_events: Vec<MediaEvent>,
}

impl Document {
    pub fn new(url: &str) -> Self {
        let mut doc = Document {
            nodes: Vec::new(),
            url: url.to_string(),
            document_node: NodeId::new(0),
            observed_roots: HashSet::new(),
            records: Vec::new(),
            media_events: Vec::new(),
        };
        let document_node = doc.alloc(NodeKind::Document);
        doc.document_node = document_node;
        let html = doc.alloc(NodeKind::Element { tag: "html".into() });
        let body = doc.alloc(NodeKind::Element { tag: "body".into() });
        doc.link(document_node, html);
        doc.link(html, body);
        doc
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn document_node(&self) -> NodeId {
        self.document_node
    }

    /// The root element (`<html>`). After a document rewrite this is the
    /// replacement element.
    pub fn document_element(&self) -> NodeId {
        *self
            .node(self.document_node)
            .children
            .first()
            .unwrap_or(&self.document_node)
    }

    pub fn body(&self) -> NodeId {
        let html = self.document_element();
        self.node(html)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).tag() == Some("body"))
            .unwrap_or(html)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn try_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ---- Tree construction ----------------------------------------------

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element { tag: tag.to_string() })
    }

    /// Appends `child` to `parent`, detaching it from any previous parent
    /// first. A reparent therefore journals a removal record at the old
    /// parent followed by an addition record at the new one.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insertable(parent, child)?;
        self.detach_internal(child);
        self.nodes[parent.index()].children.push(child);
        self.nodes[child.index()].parent = Some(parent);
        self.journal(MutationRecord::added(parent, vec![child]));
        Ok(())
    }

    /// Inserts `child` immediately before `reference` under `parent`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError> {
        if child == reference {
            return Ok(());
        }
        self.check_insertable(parent, child)?;
        self.node(parent)
            .children
            .iter()
            .position(|&c| c == reference)
            .ok_or(DomError::NotAChild { parent, child: reference })?;
        self.detach_internal(child);
        // Look the reference up again: detaching may have shifted siblings
        // when reparenting within the same parent.
        let position = self
            .node(parent)
            .children
            .iter()
            .position(|&c| c == reference)
            .unwrap_or(self.node(parent).children.len());
        self.nodes[parent.index()].children.insert(position, child);
        self.nodes[child.index()].parent = Some(parent);
        self.journal(MutationRecord::added(parent, vec![child]));
        Ok(())
    }

    /// Inserts `child` as the first child of `parent`.
    pub fn insert_first(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        match self.node(parent).children.first().copied() {
            Some(reference) if reference == child => Ok(()),
            Some(reference) => self.insert_before(parent, child, reference),
            None => self.append_child(parent, child),
        }
    }

    /// Removes `node` from its parent. The subtree stays intact but
    /// detached; the removal record targets the old parent while the
    /// removed node's own parent pointer is already cleared, which is
    /// exactly what mutation processing downstream has to cope with.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.exists(node)?;
        let Some(parent) = self.node(node).parent else {
            return Ok(()); // already detached
        };
        self.detach_internal(node);
        self.journal(MutationRecord::removed(parent, vec![node]));
        Ok(())
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.exists(node)?;
        if !self.node(node).is_element() {
            return Err(DomError::NotAnElement(node));
        }
        let old = self.nodes[node.index()]
            .attributes
            .insert(name.to_string(), value.to_string());
        if old.as_deref() == Some(value) {
            return Ok(());
        }
        self.journal(MutationRecord::attribute(node, name, old));
        // The src attribute of a media element starts a load, like the
        // property assignment path.
        if name == "src" && self.node(node).is_media() {
            self.load_source(node, Some(value.to_string()));
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), DomError> {
        self.exists(node)?;
        let Some(old) = self.nodes[node.index()].attributes.remove(name) else {
            return Ok(());
        };
        self.journal(MutationRecord::attribute(node, name, Some(old)));
        if name == "src" && self.node(node).is_media() {
            self.load_source(node, None);
        }
        Ok(())
    }

    pub fn attach_shadow(&mut self, host: NodeId) -> Result<NodeId, DomError> {
        self.exists(host)?;
        if !self.node(host).is_element() {
            return Err(DomError::NotAnElement(host));
        }
        if self.node(host).shadow_root.is_some() {
            return Err(DomError::ShadowRootExists(host));
        }
        let shadow = self.alloc(NodeKind::ShadowRoot);
        self.nodes[shadow.index()].host = Some(host);
        self.nodes[host.index()].shadow_root = Some(shadow);
        Ok(shadow)
    }

    /// Gives an iframe element a nested content document and returns its
    /// root. Cross-origin frames are constructed the same way; access is
    /// denied at read time.
    pub fn attach_content_document(
        &mut self,
        iframe: NodeId,
        same_origin: bool,
    ) -> Result<NodeId, DomError> {
        self.exists(iframe)?;
        if self.node(iframe).tag() != Some("iframe") {
            return Err(DomError::NotAnElement(iframe));
        }
        let content = self.alloc(NodeKind::ContentDocument);
        self.nodes[content.index()].host = Some(iframe);
        self.nodes[content.index()].same_origin = same_origin;
        self.nodes[iframe.index()].content_document = Some(content);
        self.nodes[iframe.index()].same_origin = same_origin;
        Ok(content)
    }

    /// Same-origin access check, the one place cross-origin denial
    /// surfaces.
    pub fn content_document(&self, iframe: NodeId) -> Result<NodeId, DomError> {
        let node = self.try_node(iframe).ok_or(DomError::UnknownNode(iframe))?;
        let content = node.content_document.ok_or(DomError::NoContentDocument(iframe))?;
        if !node.same_origin {
            return Err(DomError::CrossOrigin(iframe));
        }
        Ok(content)
    }

    /// Replaces the document element wholesale, the shape produced by
    /// `document.open()`/`document.write()` rewrites. Returns the new root
    /// element. The old subtree is left detached.
    pub fn replace_document_element(&mut self) -> NodeId {
        let old = self.document_element();
        let document_node = self.document_node;
        self.nodes[old.index()].parent = None;
        self.nodes[document_node.index()].children.clear();
        let html = self.alloc(NodeKind::Element { tag: "html".into() });
        let body = self.alloc(NodeKind::Element { tag: "body".into() });
        self.nodes[html.index()].parent = Some(document_node);
        self.nodes[document_node.index()].children.push(html);
        self.nodes[body.index()].parent = Some(html);
        self.nodes[html.index()].children.push(body);
        self.journal(MutationRecord {
            target: document_node,
            kind: crate::dom::events::MutationKind::ChildList {
                added: vec![html],
                removed: vec![old],
            },
        });
        html
    }

    // ---- Tree queries ----------------------------------------------------

    /// Root of the tree `id` currently belongs to, without crossing shadow
    /// or frame boundaries. Observer scoping works on these roots.
    pub fn tree_root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            current = parent;
        }
        current
    }

    /// Parent in the composed tree: the regular parent, or the host when
    /// climbing out of a shadow root or a content document.
    pub fn composed_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        node.parent.or(node.host)
    }

    /// Whether `id` reaches the document node through the composed tree.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.document_node {
                return true;
            }
            match self.composed_parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Nearest composed ancestor (inclusive) satisfying `predicate`.
    pub fn closest<F>(&self, id: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        let mut current = Some(id);
        while let Some(c) = current {
            if predicate(self.node(c)) {
                return Some(c);
            }
            current = self.composed_parent(c);
        }
        None
    }

    // ---- Media state ----------------------------------------------------

    pub fn media(&self, id: NodeId) -> Result<&crate::dom::MediaState, DomError> {
        self.try_node(id)
            .ok_or(DomError::UnknownNode(id))?
            .media
            .as_ref()
            .ok_or(DomError::NotMedia(id))
    }

    /// Whether the element currently has any source: a loaded source URL or
    /// a `<source>` child carrying a non-empty `src`.
    pub fn has_media_source(&self, id: NodeId) -> bool {
        let Some(node) = self.try_node(id) else { return false };
        let Some(media) = &node.media else { return false };
        if media.source.as_deref().is_some_and(|s| !s.is_empty()) {
            return true;
        }
        node.children.iter().any(|&c| {
            let child = self.node(c);
            child.tag() == Some("source")
                && child.attribute("src").is_some_and(|s| !s.is_empty())
        })
    }

    /// The URL speed records are keyed under: the loaded source, else the
    /// first `<source>` child's src.
    pub fn media_source_url(&self, id: NodeId) -> Option<String> {
        let node = self.try_node(id)?;
        if let Some(source) = node.media.as_ref()?.source.clone() {
            return Some(source);
        }
        node.children
            .iter()
            .map(|&c| self.node(c))
            .find(|child| child.tag() == Some("source"))
            .and_then(|child| child.attribute("src").map(str::to_string))
    }

    pub fn set_media_source(&mut self, id: NodeId, source: Option<String>) -> Result<(), DomError> {
        self.media(id)?;
        self.load_source(id, source);
        Ok(())
    }

    pub fn set_media_duration(&mut self, id: NodeId, duration: f64) -> Result<(), DomError> {
        self.media(id)?;
        self.media_mut(id).duration = duration.max(0.0);
        Ok(())
    }

    pub fn set_playback_rate(&mut self, id: NodeId, rate: f64) -> Result<(), DomError> {
        self.media(id)?;
        let old = self.media_mut(id).playback_rate;
        if (old - rate).abs() < f64::EPSILON {
            return Ok(());
        }
        self.media_mut(id).playback_rate = rate;
        self.media_events.push(MediaEvent {
            target: id,
            kind: MediaEventKind::RateChange { rate },
        });
        Ok(())
    }

    pub fn set_volume(&mut self, id: NodeId, volume: f64) -> Result<(), DomError> {
        self.media(id)?;
        let volume = volume.clamp(0.0, 1.0);
        let media = self.media_mut(id);
        if (media.volume - volume).abs() < f64::EPSILON {
            return Ok(());
        }
        media.volume = volume;
        let muted = media.muted;
        self.media_events.push(MediaEvent {
            target: id,
            kind: MediaEventKind::VolumeChange { volume, muted },
        });
        Ok(())
    }

    pub fn set_muted(&mut self, id: NodeId, muted: bool) -> Result<(), DomError> {
        self.media(id)?;
        let media = self.media_mut(id);
        if media.muted == muted {
            return Ok(());
        }
        media.muted = muted;
        let volume = media.volume;
        self.media_events.push(MediaEvent {
            target: id,
            kind: MediaEventKind::VolumeChange { volume, muted },
        });
        Ok(())
    }

    pub fn play(&mut self, id: NodeId) -> Result<(), DomError> {
        self.media(id)?;
        if self.media_mut(id).paused {
            self.media_mut(id).paused = false;
            self.media_events.push(MediaEvent { target: id, kind: MediaEventKind::Play });
        }
        Ok(())
    }

    pub fn pause(&mut self, id: NodeId) -> Result<(), DomError> {
        self.media(id)?;
        if !self.media_mut(id).paused {
            self.media_mut(id).paused = true;
            self.media_events.push(MediaEvent { target: id, kind: MediaEventKind::Pause });
        }
        Ok(())
    }

    pub fn set_current_time(&mut self, id: NodeId, time: f64) -> Result<(), DomError> {
        self.media(id)?;
        let duration = self.media_mut(id).duration;
        let clamped = if duration > 0.0 { time.clamp(0.0, duration) } else { time.max(0.0) };
        self.media_mut(id).current_time = clamped;
        self.media_events.push(MediaEvent {
            target: id,
            kind: MediaEventKind::TimeUpdate { time: clamped },
        });
        Ok(())
    }

    /// Advances every playing media element by `ms` of wall time, scaled by
    /// its playback rate. Scenario clocks call this alongside the engine's
    /// own time advancement.
    pub fn advance_playback(&mut self, ms: u64) {
        let ids: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.media.as_ref().is_some_and(|m| !m.paused))
            .map(|n| n.id)
            .collect();
        for id in ids {
            let media = self.media_mut(id);
            let step = ms as f64 / 1000.0 * media.playback_rate;
            let duration = media.duration;
            let next = if duration > 0.0 {
                (media.current_time + step).min(duration)
            } else {
                media.current_time + step
            };
            media.current_time = next;
            self.media_events.push(MediaEvent {
                target: id,
                kind: MediaEventKind::TimeUpdate { time: next },
            });
        }
    }

    pub fn set_media_rect(&mut self, id: NodeId, rect: Rect) -> Result<(), DomError> {
        self.media(id)?;
        let before = self.media_visible(id);
        self.media_mut(id).rect = rect;
        self.emit_visibility_if_changed(id, before);
        Ok(())
    }

    pub fn set_intersecting(&mut self, id: NodeId, intersecting: bool) -> Result<(), DomError> {
        self.media(id)?;
        let before = self.media_visible(id);
        self.media_mut(id).intersecting = intersecting;
        self.emit_visibility_if_changed(id, before);
        Ok(())
    }

    /// Effective viewport visibility: intersecting and laid out with area.
    pub fn media_visible(&self, id: NodeId) -> bool {
        self.try_node(id)
            .and_then(|n| n.media.as_ref())
            .is_some_and(|m| m.intersecting && m.rect.has_area())
    }

    // ---- Observation -----------------------------------------------------

    /// Registers delivery interest for the tree rooted at `root`.
    /// Mutations under unobserved roots are not journaled, matching
    /// observer semantics where no observer means no record.
    pub fn observe_root(&mut self, root: NodeId) {
        self.observed_roots.insert(root);
    }

    pub fn is_observed(&self, root: NodeId) -> bool {
        self.observed_roots.contains(&root)
    }

    pub fn clear_observers(&mut self) {
        self.observed_roots.clear();
        self.records.clear();
    }

    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn has_pending_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn take_media_events(&mut self) -> Vec<MediaEvent> {
        std::mem::take(&mut self.media_events)
    }

    // ---- Internals -------------------------------------------------------

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(id, kind));
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.push(child);
        self.nodes[child.index()].parent = Some(parent);
    }

    fn exists(&self, id: NodeId) -> Result<(), DomError> {
        self.try_node(id).map(|_| ()).ok_or(DomError::UnknownNode(id))
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.exists(parent)?;
        self.exists(child)?;
        if parent == child {
            return Err(DomError::WouldCycle(child));
        }
        // Walking plain parents is enough: shadow/content subtrees cannot
        // contain their own host.
        let mut current = Some(parent);
        while let Some(c) = current {
            if c == child {
                return Err(DomError::WouldCycle(child));
            }
            current = self.node(c).parent;
        }
        Ok(())
    }

    fn detach_internal(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&c| c != node);
        }
    }

    fn journal(&mut self, record: MutationRecord) {
        let root = self.tree_root(record.target);
        if self.observed_roots.contains(&root) {
            self.records.push(record);
        }
    }

    /// Callers validate with `media()` first.
    fn media_mut(&mut self, id: NodeId) -> &mut crate::dom::MediaState {
        self.nodes[id.index()].media.as_mut().unwrap()
    }

    fn load_source(&mut self, id: NodeId, source: Option<String>) {
        let media = self.media_mut(id);
        match source {
            Some(url) if !url.is_empty() => {
                media.source = Some(url);
                media.ready_state = 4;
                self.media_events.push(MediaEvent { target: id, kind: MediaEventKind::LoadStart });
            }
            _ => {
                media.source = None;
                media.ready_state = 0;
                media.paused = true;
                self.media_events.push(MediaEvent { target: id, kind: MediaEventKind::Emptied });
            }
        }
    }

    fn emit_visibility_if_changed(&mut self, id: NodeId, before: bool) {
        let after = self.media_visible(id);
        if before != after {
            self.media_events.push(MediaEvent {
                target: id,
                kind: MediaEventKind::IntersectionChange { intersecting: after },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::events::MutationKind;

    fn observed_doc() -> Document {
        let mut doc = Document::new("https://example.com/watch");
        let root = doc.document_node();
        doc.observe_root(root);
        doc
    }

    #[test]
    fn test_new_document_structure() {
        let doc = Document::new("https://example.com/");
        let html = doc.document_element();
        assert_eq!(doc.node(html).tag(), Some("html"));
        assert_eq!(doc.node(doc.body()).tag(), Some("body"));
        assert!(doc.is_connected(doc.body()));
    }

    #[test]
    fn test_append_generates_record_for_observed_root() {
        let mut doc = observed_doc();
        let body = doc.body();
        let video = doc.create_element("video");
        doc.append_child(body, video).unwrap();
        let records = doc.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, body);
        match &records[0].kind {
            MutationKind::ChildList { added, removed } => {
                assert_eq!(added, &vec![video]);
                assert!(removed.is_empty());
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_unobserved_root_generates_no_records() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let video = doc.create_element("video");
        doc.append_child(body, video).unwrap();
        assert!(doc.take_records().is_empty());
    }

    #[test]
    fn test_removal_record_targets_old_parent() {
        let mut doc = observed_doc();
        let body = doc.body();
        let div = doc.create_element("div");
        doc.append_child(body, div).unwrap();
        doc.take_records();

        doc.remove(div).unwrap();
        let records = doc.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, body);
        assert!(doc.node(div).parent.is_none());
        assert!(!doc.is_connected(div));
    }

    #[test]
    fn test_reparent_produces_removal_then_addition() {
        let mut doc = observed_doc();
        let body = doc.body();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        let video = doc.create_element("video");
        doc.append_child(body, a).unwrap();
        doc.append_child(body, b).unwrap();
        doc.append_child(a, video).unwrap();
        doc.take_records();

        doc.append_child(b, video).unwrap();
        let records = doc.take_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], MutationRecord::removed(a, vec![video]));
        assert_eq!(records[1], MutationRecord::added(b, vec![video]));
        assert!(doc.is_connected(video));
    }

    #[test]
    fn test_shadow_root_scopes_records() {
        let mut doc = observed_doc();
        let body = doc.body();
        let host = doc.create_element("div");
        doc.append_child(body, host).unwrap();
        let shadow = doc.attach_shadow(host).unwrap();
        doc.take_records();

        // Not yet observed: the mutation under the shadow root is invisible.
        let video = doc.create_element("video");
        doc.append_child(shadow, video).unwrap();
        assert!(doc.take_records().is_empty());

        doc.observe_root(shadow);
        let video2 = doc.create_element("video");
        doc.append_child(shadow, video2).unwrap();
        let records = doc.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, shadow);

        // Shadow content is connected through the host.
        assert!(doc.is_connected(video));
        assert_eq!(doc.tree_root(video), shadow);
    }

    #[test]
    fn test_cross_origin_iframe_denied() {
        let mut doc = observed_doc();
        let body = doc.body();
        let frame = doc.create_element("iframe");
        doc.append_child(body, frame).unwrap();
        doc.attach_content_document(frame, false).unwrap();
        assert_eq!(doc.content_document(frame), Err(DomError::CrossOrigin(frame)));

        let frame2 = doc.create_element("iframe");
        doc.append_child(body, frame2).unwrap();
        let content = doc.attach_content_document(frame2, true).unwrap();
        assert_eq!(doc.content_document(frame2), Ok(content));
        assert!(doc.is_connected(content));
    }

    #[test]
    fn test_replace_document_element_signals_rewrite() {
        let mut doc = observed_doc();
        let old_html = doc.document_element();
        let old_body = doc.body();
        let video = doc.create_element("video");
        doc.append_child(old_body, video).unwrap();
        doc.take_records();

        let new_html = doc.replace_document_element();
        assert_ne!(new_html, old_html);
        assert_eq!(doc.document_element(), new_html);
        assert!(!doc.is_connected(video));

        let records = doc.take_records();
        assert_eq!(records.len(), 1);
        match &records[0].kind {
            MutationKind::ChildList { added, removed } => {
                assert_eq!(added, &vec![new_html]);
                assert_eq!(removed, &vec![old_html]);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_src_attribute_loads_media() {
        let mut doc = observed_doc();
        let body = doc.body();
        let video = doc.create_element("video");
        doc.append_child(body, video).unwrap();
        assert!(!doc.has_media_source(video));

        doc.set_attribute(video, "src", "https://cdn.example.com/a.mp4").unwrap();
        assert!(doc.has_media_source(video));
        assert_eq!(doc.media(video).unwrap().ready_state, 4);
        let events = doc.take_media_events();
        assert!(events.iter().any(|e| e.kind == MediaEventKind::LoadStart));

        doc.remove_attribute(video, "src").unwrap();
        assert!(!doc.has_media_source(video));
        let events = doc.take_media_events();
        assert!(events.iter().any(|e| e.kind == MediaEventKind::Emptied));
    }

    #[test]
    fn test_source_child_counts_as_source() {
        let mut doc = observed_doc();
        let body = doc.body();
        let video = doc.create_element("video");
        let source = doc.create_element("source");
        doc.append_child(body, video).unwrap();
        doc.append_child(video, source).unwrap();
        assert!(!doc.has_media_source(video));
        doc.set_attribute(source, "src", "https://cdn.example.com/b.webm").unwrap();
        assert!(doc.has_media_source(video));
        assert_eq!(
            doc.media_source_url(video).as_deref(),
            Some("https://cdn.example.com/b.webm")
        );
    }

    #[test]
    fn test_rate_change_fires_only_on_change() {
        let mut doc = observed_doc();
        let body = doc.body();
        let video = doc.create_element("video");
        doc.append_child(body, video).unwrap();
        doc.take_media_events();

        doc.set_playback_rate(video, 1.0).unwrap();
        assert!(doc.take_media_events().is_empty());

        doc.set_playback_rate(video, 1.5).unwrap();
        let events = doc.take_media_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MediaEventKind::RateChange { rate: 1.5 });
    }

    #[test]
    fn test_visibility_combines_intersection_and_layout() {
        let mut doc = observed_doc();
        let body = doc.body();
        let video = doc.create_element("video");
        doc.append_child(body, video).unwrap();
        assert!(doc.media_visible(video));

        doc.set_intersecting(video, false).unwrap();
        assert!(!doc.media_visible(video));
        let events = doc.take_media_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MediaEventKind::IntersectionChange { intersecting: false });

        doc.set_intersecting(video, true).unwrap();
        doc.set_media_rect(video, Rect::new(0.0, 0.0, 0.0, 0.0)).unwrap();
        assert!(!doc.media_visible(video));
    }

    #[test]
    fn test_advance_playback_moves_playing_media() {
        let mut doc = observed_doc();
        let body = doc.body();
        let video = doc.create_element("video");
        doc.append_child(body, video).unwrap();
        doc.set_media_duration(video, 60.0).unwrap();
        doc.set_playback_rate(video, 2.0).unwrap();
        doc.play(video).unwrap();
        doc.take_media_events();

        doc.advance_playback(1500);
        assert!((doc.media(video).unwrap().current_time - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut doc = observed_doc();
        let body = doc.body();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(body, outer).unwrap();
        doc.append_child(outer, inner).unwrap();
        assert_eq!(doc.append_child(inner, outer), Err(DomError::WouldCycle(outer)));
    }

    #[test]
    fn test_closest_crosses_shadow_boundary() {
        let mut doc = observed_doc();
        let body = doc.body();
        let host = doc.create_element("my-player");
        doc.append_child(body, host).unwrap();
        let shadow = doc.attach_shadow(host).unwrap();
        let button = doc.create_element("button");
        doc.append_child(shadow, button).unwrap();

        let found = doc.closest(button, |n| n.tag() == Some("my-player"));
        assert_eq!(found, Some(host));
    }
}

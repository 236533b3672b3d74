//! Live document model.
//!
//! An arena of element and text nodes. Node ids are never reused, so a block's
//! id stays a valid identity for as long as the document lives. Child-list
//! mutations are reported to at most one observer.
pub mod html;
pub mod markdown;

use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors raised by document mutations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document already has a mutation observer")]
    AlreadyObserved,

    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    #[error("node {0} has no parent")]
    Detached(NodeId),

    #[error("node {reference} is not a child of {parent}")]
    NotAChild { parent: NodeId, reference: NodeId },

    #[error("node {0} cannot be moved inside itself")]
    Cycle(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The raw `class` attribute, empty when absent.
    pub fn class_name(&self) -> &str {
        self.attr("class").unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_name().split_whitespace().any(|c| c == class)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationEvent {
    /// The element whose child list changed.
    pub target: NodeId,
}

pub type MutationReceiver = mpsc::UnboundedReceiver<MutationEvent>;

/// Source format of a document on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Html,
    Markdown,
}

impl DocumentFormat {
    /// `.md`/`.markdown` files are Markdown, everything else is treated as HTML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("md" | "markdown") => DocumentFormat::Markdown,
            _ => DocumentFormat::Html,
        }
    }
}

pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    observer: Option<mpsc::UnboundedSender<MutationEvent>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes.len())
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl Document {
    /// An empty `<html><body></body></html>` document.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            observer: None,
        };
        let root = doc.alloc(NodeData::Element(Element::new("html")));
        let body = doc.alloc(NodeData::Element(Element::new("body")));
        doc.link(root, body);
        doc.root = root;
        doc.body = body;
        doc
    }

    pub fn parse(source: &str, format: DocumentFormat) -> Self {
        match format {
            DocumentFormat::Html => Self::parse_html(source),
            DocumentFormat::Markdown => Self::parse_markdown(source),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Register the document's single mutation observer.
    pub fn observe(&mut self) -> Result<MutationReceiver, DocumentError> {
        if self.observer.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(DocumentError::AlreadyObserved);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        Ok(rx)
    }

    fn notify(&self, target: NodeId) {
        if let Some(tx) = &self.observer {
            if tx.send(MutationEvent { target }).is_err() {
                debug!("mutation observer dropped, event for {target} discarded");
            }
        }
    }

    // ── Construction ─────────────────────────────────────────────────

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Attach without notifying; used while building a tree.
    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(NodeData::Element(Element::new(name)))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    /// Create an element with attributes and append it to `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId, DocumentError> {
        let mut element = Element::new(name);
        for (k, v) in attrs {
            element.set_attr(k, v);
        }
        let id = self.alloc(NodeData::Element(element));
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Create a text node and append it to `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId, DocumentError> {
        let id = self.create_text(text);
        self.append_child(parent, id)?;
        Ok(id)
    }

    // ── Mutation ─────────────────────────────────────────────────────

    fn ensure_element(&self, id: NodeId) -> Result<(), DocumentError> {
        match self.nodes[id.0].data {
            NodeData::Element(_) => Ok(()),
            NodeData::Text(_) => Err(DocumentError::NotAnElement(id)),
        }
    }

    fn ensure_not_ancestor(&self, node: NodeId, parent: NodeId) -> Result<(), DocumentError> {
        let mut current = Some(parent);
        while let Some(id) = current {
            if id == node {
                return Err(DocumentError::Cycle(node));
            }
            current = self.nodes[id.0].parent;
        }
        Ok(())
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DocumentError> {
        self.ensure_element(parent)?;
        self.ensure_not_ancestor(child, parent)?;
        self.detach(child);
        self.link(parent, child);
        self.notify(parent);
        Ok(())
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DocumentError> {
        self.ensure_element(parent)?;
        self.ensure_not_ancestor(child, parent)?;
        if self.nodes[reference.0].parent != Some(parent) {
            return Err(DocumentError::NotAChild { parent, reference });
        }
        self.detach(child);
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == reference)
            .ok_or(DocumentError::NotAChild { parent, reference })?;
        self.nodes[parent.0].children.insert(pos, child);
        self.nodes[child.0].parent = Some(parent);
        self.notify(parent);
        Ok(())
    }

    /// Move `node` into a new `name` element placed where `node` was.
    pub fn wrap(&mut self, node: NodeId, name: &str) -> Result<NodeId, DocumentError> {
        let parent = self.parent(node).ok_or(DocumentError::Detached(node))?;
        let wrapper = self.create_element(name);
        self.insert_before(parent, wrapper, node)?;
        self.append_child(wrapper, node)?;
        Ok(wrapper)
    }

    /// Attribute changes are not child-list mutations and are not reported.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DocumentError> {
        match &mut self.nodes[node.0].data {
            NodeData::Element(element) => {
                element.set_attr(name, value);
                Ok(())
            }
            NodeData::Text(_) => Err(DocumentError::NotAnElement(node)),
        }
    }

    // ── Navigation ───────────────────────────────────────────────────

    pub fn data(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.0].data
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(Element::name)
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.attr(name))
    }

    pub fn class_name(&self, node: NodeId) -> &str {
        self.element(node).map(Element::class_name).unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node).is_some_and(|e| e.has_class(class))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = &self.nodes[parent.0].children;
        let pos = siblings.iter().position(|&c| c == node)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|&s| self.element(s).is_some())
    }

    /// Preceding element siblings, nearest first.
    pub fn preceding_element_siblings(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.previous_element_sibling(node), move |&s| {
            self.previous_element_sibling(s)
        })
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element(_) => {
                for &child in &self.nodes[node.0].children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Descendants of `node` in document order, `node` excluded.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Every element named `name` in document order.
    pub fn elements_by_tag(&self, name: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.tag_name(id) == Some(name))
            .collect()
    }

    pub fn first_descendant_by_tag(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(node)
            .into_iter()
            .find(|&id| self.tag_name(id) == Some(name))
    }

    /// Nearest inclusive ancestor element satisfying `pred`.
    pub fn closest(&self, node: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.element(id).is_some_and(&pred) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Bring the live body in line with a fresh parse of the same source.
    ///
    /// Transcripts grow at the end, so everything up to the first top-level
    /// node whose text changed is kept. When that node is the last live one
    /// and an element of the same kind, the reconciliation continues inside
    /// it, so a growing list gets new items and keeps its id. A changed
    /// `<pre>` is never patched in place: it is replaced by a fresh copy, which
    /// a later scan sees as a new block. A snapshot with fewer top-level
    /// children cannot be reconciled and is ignored. Returns the number of
    /// subtrees copied in.
    pub fn graft_snapshot(&mut self, snapshot: &Document) -> usize {
        let live = self.children(self.body).len();
        let fresh = snapshot.children(snapshot.body).len();
        if fresh < live {
            warn!("snapshot has {fresh} top-level nodes, live document has {live}; skipping");
            return 0;
        }
        self.reconcile(self.body, snapshot, snapshot.body)
    }

    fn reconcile(&mut self, parent: NodeId, snapshot: &Document, fresh_parent: NodeId) -> usize {
        let live = self.children(parent).to_vec();
        let fresh = snapshot.children(fresh_parent);
        let first_changed = live
            .iter()
            .zip(fresh)
            .position(|(&l, &f)| self.text_content(l) != snapshot.text_content(f))
            .unwrap_or(live.len());

        let mut grafted = 0;
        let mut from = first_changed;
        if first_changed + 1 == live.len()
            && self.extends_in_place(live[first_changed], snapshot, fresh[first_changed])
        {
            grafted += self.reconcile(live[first_changed], snapshot, fresh[first_changed]);
            from += 1;
        }

        for &stale in &live[from..] {
            self.detach(stale);
        }
        for &node in &fresh[from..] {
            let copy = self.copy_subtree(snapshot, node);
            self.link(parent, copy);
            grafted += 1;
        }
        if from < fresh.len() || from < live.len() {
            self.notify(parent);
        }
        grafted
    }

    fn extends_in_place(&self, live: NodeId, snapshot: &Document, fresh: NodeId) -> bool {
        match (self.element(live), snapshot.element(fresh)) {
            (Some(l), Some(f)) => {
                l.name() == f.name()
                    && l.name() != "pre"
                    && snapshot.children(fresh).len() >= self.children(live).len()
            }
            _ => false,
        }
    }

    fn copy_subtree(&mut self, source: &Document, node: NodeId) -> NodeId {
        let copy = self.alloc(source.data(node).clone());
        for &child in source.children(node) {
            let child_copy = self.copy_subtree(source, child);
            self.link(copy, child_copy);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let body = doc.body();
        let heading = doc.append_element(body, "h2", &[]).unwrap();
        doc.append_text(heading, "utils.rs").unwrap();
        let pre = doc
            .append_element(body, "pre", &[("class", "language-rust")])
            .unwrap();
        let code = doc.append_element(pre, "code", &[]).unwrap();
        doc.append_text(code, "fn helper() {}").unwrap();
        (doc, heading, pre)
    }

    #[test]
    fn test_navigation() {
        let (doc, heading, pre) = sample();
        assert_eq!(doc.previous_element_sibling(pre), Some(heading));
        assert_eq!(doc.previous_element_sibling(heading), None);
        assert_eq!(doc.text_content(pre), "fn helper() {}");
        assert_eq!(doc.elements_by_tag("pre"), vec![pre]);
        assert!(doc.has_class(pre, "language-rust"));
        let code = doc.first_descendant_by_tag(pre, "code").unwrap();
        assert_eq!(doc.closest(code, |e| e.name() == "pre"), Some(pre));
    }

    #[test]
    fn test_text_nodes_are_not_element_siblings() {
        let mut doc = Document::new();
        let body = doc.body();
        let p = doc.append_element(body, "p", &[]).unwrap();
        doc.append_text(body, "\n  ").unwrap();
        let pre = doc.append_element(body, "pre", &[]).unwrap();
        assert_eq!(doc.previous_element_sibling(pre), Some(p));
        assert_eq!(doc.preceding_element_siblings(pre).count(), 1);
    }

    #[test]
    fn test_wrap_keeps_position() {
        let (mut doc, heading, pre) = sample();
        let body = doc.body();
        let wrapper = doc.wrap(pre, "div").unwrap();
        assert_eq!(doc.children(body), &[heading, wrapper]);
        assert_eq!(doc.parent(pre), Some(wrapper));
        assert_eq!(doc.previous_element_sibling(pre), None);
        assert_eq!(doc.previous_element_sibling(wrapper), Some(heading));
    }

    #[test]
    fn test_mutations_notify_single_observer() {
        let (mut doc, _, pre) = sample();
        let mut rx = doc.observe().unwrap();
        assert_eq!(doc.observe().unwrap_err(), DocumentError::AlreadyObserved);

        doc.set_attr(pre, "title", "x.rs").unwrap();
        assert!(rx.try_recv().is_err(), "attributes are not reported");

        let body = doc.body();
        doc.append_element(body, "p", &[]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), MutationEvent { target: body });
    }

    #[test]
    fn test_reject_cycles_and_text_parents() {
        let (mut doc, heading, pre) = sample();
        let code = doc.first_descendant_by_tag(pre, "code").unwrap();
        assert_eq!(
            doc.append_child(code, pre).unwrap_err(),
            DocumentError::Cycle(pre)
        );
        let text = doc.children(heading)[0];
        assert_eq!(
            doc.append_child(text, pre).unwrap_err(),
            DocumentError::NotAnElement(text)
        );
    }

    #[test]
    fn test_graft_snapshot_appends_new_nodes() {
        let mut live = Document::parse_html("<p>one</p>");
        let mut rx = live.observe().unwrap();
        let snapshot = Document::parse_html("<p>one</p><p>two</p><pre>x</pre>");

        assert_eq!(live.graft_snapshot(&snapshot), 2);
        assert_eq!(live.elements_by_tag("pre").len(), 1);
        assert!(rx.try_recv().is_ok());

        let shorter = Document::parse_html("<p>one</p>");
        assert_eq!(live.graft_snapshot(&shorter), 0);
    }

    #[test]
    fn test_graft_snapshot_follows_growth_inside_the_last_node() {
        let mut live = Document::parse_html("<p>one</p><ul><li>a</li></ul>");
        let list = live.elements_by_tag("ul")[0];
        let first_item = live.elements_by_tag("li")[0];
        let mut rx = live.observe().unwrap();

        let snapshot = Document::parse_html("<p>one</p><ul><li>a</li><li>b</li></ul>");
        assert_eq!(live.graft_snapshot(&snapshot), 1);
        assert_eq!(live.elements_by_tag("ul"), vec![list]);
        assert_eq!(live.elements_by_tag("li")[0], first_item);
        assert_eq!(live.text_content(list), "ab");
        assert_eq!(rx.try_recv().unwrap().target, list);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_graft_snapshot_replaces_a_growing_block() {
        let mut live = Document::parse_html("<p>intro</p><pre>fn main() {</pre>");
        let partial = live.elements_by_tag("pre")[0];

        let snapshot = Document::parse_html("<p>intro</p><pre>fn main() {}</pre>");
        assert_eq!(live.graft_snapshot(&snapshot), 1);
        let blocks = live.elements_by_tag("pre");
        assert_eq!(blocks.len(), 1);
        assert_ne!(blocks[0], partial);
        assert_eq!(live.parent(partial), None);
        assert_eq!(live.text_content(blocks[0]), "fn main() {}");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("chat.md")),
            DocumentFormat::Markdown
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("chat.HTML")),
            DocumentFormat::Html
        );
    }
}

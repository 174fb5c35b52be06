#![forbid(unsafe_code)]

//! Arena-backed document tree.
//!
//! The [`Document`] owns every node it ever created. Nodes are addressed by
//! [`NodeId`] and are never freed: detaching a node only unlinks it from its
//! parent, so a detached subtree can be re-inserted later (which is exactly
//! what content relocation does).
//!
//! # Invariants
//!
//! 1. A node has at most one parent, and appears exactly once in that parent's
//!    child list.
//! 2. Inserting a node that already has a parent *moves* it; nothing is ever
//!    copied.
//! 3. A node can never become its own ancestor (checked on insertion).
//! 4. Queries (`query_*`) only see nodes connected to the document root.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unknown node | `NodeId` from another document | `DomError::UnknownNode` |
//! | Hierarchy violation | Inserting an ancestor into its descendant | `DomError::HierarchyRequest` |
//! | Attribute on text | Element-only operation on a text node | `DomError::NotAnElement` |
//! | Stale reference | `insert_before` with a non-child reference | `DomError::NotAChild` |

use std::fmt;

use ahash::AHashMap;

use crate::error::DomError;

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Element payload: tag, ordered class list, and attributes.
///
/// The `class` attribute is not stored in `attrs`; it is derived from
/// `classes` so class-list mutations and attribute reads always agree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementData {
    tag: String,
    classes: Vec<String>,
    attrs: AHashMap<String, String>,
}

impl ElementData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Lowercase tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Class list in insertion order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// An HTML-like document: `#document > html > (head, body)`.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    document_element: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document with an empty `<head>` and `<body>`.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            document_element: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
        };
        let html = doc.push_node(Some(doc.root), NodeKind::Element(ElementData::new("html")));
        let head = doc.push_node(Some(html), NodeKind::Element(ElementData::new("head")));
        let body = doc.push_node(Some(html), NodeKind::Element(ElementData::new("body")));
        doc.document_element = html;
        doc.head = head;
        doc.body = body;
        doc
    }

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match self.nodes.get_mut(id.0) {
            Some(Node {
                kind: NodeKind::Element(el),
                ..
            }) => Ok(el),
            Some(_) => Err(DomError::NotAnElement(id)),
            None => Err(DomError::UnknownNode(id)),
        }
    }

    // --- Well-known nodes ---

    /// The `#document` node.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<html>` element.
    #[inline]
    pub fn document_element(&self) -> NodeId {
        self.document_element
    }

    /// The `<head>` element.
    #[inline]
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// The `<body>` element.
    #[inline]
    pub fn body(&self) -> NodeId {
        self.body
    }

    // --- Construction ---

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(None, NodeKind::Element(ElementData::new(tag)))
    }

    /// Create a detached element carrying a single class.
    pub fn create_element_with_class(&mut self, tag: &str, class: &str) -> NodeId {
        let mut data = ElementData::new(tag);
        data.classes.push(class.to_owned());
        self.push_node(None, NodeKind::Element(data))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push_node(None, NodeKind::Text(text.into()))
    }

    /// Append a `<style>` element to `<head>` with one rule per
    /// `(selector, declarations)` pair.
    pub fn create_style(&mut self, rules: &[(&str, &str)]) -> Result<NodeId, DomError> {
        let content: String = rules
            .iter()
            .map(|(selector, value)| format!(" {selector} {{ {value} }} "))
            .collect();
        let style = self.create_element("style");
        let text = self.create_text(content);
        self.append_child(style, text)?;
        self.append_child(self.head, style)?;
        Ok(style)
    }

    // --- Tree structure ---

    /// Node kind, if the id belongs to this document.
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    /// Element payload, if `id` is an element.
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.kind(id)? {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Text(_)))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(ElementData::tag)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    /// First child that is an element (text children are skipped).
    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|child| self.is_element(*child))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Walk from `id` up through its ancestors, stopping before the
    /// `#document` node. The starting node is yielded first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.nodes.get(id.0).map(|_| id),
        }
    }

    /// Whether `node` is `ancestor` or lies beneath it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Whether `id` is reachable from the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(self.root, id)
    }

    /// Append `child` as the last child of `parent`, moving it from any
    /// previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference` (or at the end when
    /// `reference` is `None`), moving it from any previous parent.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        let parent_node = self.node(parent)?;
        if matches!(parent_node.kind, NodeKind::Text(_)) {
            return Err(DomError::NotAnElement(parent));
        }
        if matches!(self.node(child)?.kind, NodeKind::Document) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        if self.contains(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        if let Some(reference) = reference {
            if reference == child {
                // Inserting a node before itself leaves the tree unchanged.
                return Ok(());
            }
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild { parent, child: reference });
            }
        }

        self.detach(child)?;

        let children = &mut self.nodes[parent.0].children;
        let pos = reference
            .and_then(|r| children.iter().position(|c| *c == r))
            .unwrap_or(children.len());
        children.insert(pos, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Unlink `id` from its parent. Detaching a detached node is a no-op.
    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.nodes[parent.0].children.retain(|c| *c != id);
        self.nodes[id.0].parent = None;
        Ok(())
    }

    // --- Attributes ---

    /// Read an attribute. `class` is synthesized from the class list.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        let el = self.element(id)?;
        if name == "class" {
            return (!el.classes.is_empty()).then(|| el.classes.join(" "));
        }
        el.attrs.get(name).cloned()
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|el| {
            if name == "class" {
                !el.classes.is_empty()
            } else {
                el.attrs.contains_key(name)
            }
        })
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        if name == "class" {
            el.classes = value.split_whitespace().map(str::to_owned).collect();
        } else {
            el.attrs.insert(name.to_owned(), value.to_owned());
        }
        Ok(())
    }

    /// Remove an attribute. Removing an absent attribute is a no-op.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        if name == "class" {
            el.classes.clear();
        } else {
            el.attrs.remove(name);
        }
        Ok(())
    }

    // --- Class list ---

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .is_some_and(|el| el.classes.iter().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        if !el.classes.iter().any(|c| c == class) {
            el.classes.push(class.to_owned());
        }
        Ok(())
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        self.element_mut(id)?.classes.retain(|c| c != class);
        Ok(())
    }

    /// Add `class` when `enabled`, remove it otherwise.
    pub fn toggle_class(&mut self, id: NodeId, class: &str, enabled: bool) -> Result<(), DomError> {
        if enabled {
            self.add_class(id, class)
        } else {
            self.remove_class(id, class)
        }
    }

    // --- Text ---

    /// Concatenated text of `id` and its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => text.clone(),
            Some(_) => self
                .children(id)
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
            None => String::new(),
        }
    }

    // --- Queries ---

    /// Connected elements in document order.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: self.children(id).iter().rev().copied().collect(),
        }
    }

    /// First connected element carrying `name` (and, when given, exactly
    /// `value`), in document order. Equivalent to `[name]` / `[name="value"]`.
    pub fn query_attr(&self, name: &str, value: Option<&str>) -> Option<NodeId> {
        self.query_attr_all(name, value).next()
    }

    pub fn query_attr_all<'a>(
        &'a self,
        name: &'a str,
        value: Option<&'a str>,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.descendants(self.root).filter(move |id| match value {
            Some(expected) => self.attribute(*id, name).as_deref() == Some(expected),
            None => self.has_attribute(*id, name),
        })
    }

    /// First connected element with `class`. Equivalent to `.class`.
    pub fn query_class(&self, class: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .find(|id| self.has_class(*id, class))
    }
}

/// Iterator returned by [`Document::ancestors`].
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        if matches!(self.doc.kind(current), Some(NodeKind::Document)) {
            self.next = None;
            return None;
        }
        self.next = self.doc.parent(current);
        Some(current)
    }
}

/// Pre-order iterator over descendant elements, returned by
/// [`Document::descendants`].
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some(id) = self.stack.pop() {
            self.stack
                .extend(self.doc.children(id).iter().rev().copied());
            if self.doc.is_element(id) {
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(doc: &mut Document, id: &str) -> (NodeId, NodeId) {
        let container = doc.create_element("div");
        doc.set_attribute(container, "data-ak-modal", id).unwrap();
        let content = doc.create_element("div");
        doc.append_child(container, content).unwrap();
        doc.append_child(doc.body(), container).unwrap();
        (container, content)
    }

    #[test]
    fn new_document_has_head_and_body() {
        let doc = Document::new();
        assert_eq!(doc.tag_name(doc.document_element()), Some("html"));
        assert_eq!(doc.parent(doc.head()), Some(doc.document_element()));
        assert_eq!(doc.parent(doc.body()), Some(doc.document_element()));
        assert_eq!(doc.children(doc.root()), &[doc.document_element()]);
    }

    #[test]
    fn append_moves_instead_of_copying() {
        let mut doc = Document::new();
        let (a, content) = container(&mut doc, "a");
        let (b, _) = container(&mut doc, "b");

        doc.append_child(b, content).unwrap();

        assert_eq!(doc.parent(content), Some(b));
        assert!(doc.children(a).is_empty());
        assert_eq!(doc.children(b).iter().filter(|c| **c == content).count(), 1);
    }

    #[test]
    fn insert_before_keeps_sibling_order() {
        let mut doc = Document::new();
        let parent = doc.create_element("ul");
        let first = doc.create_element("li");
        let last = doc.create_element("li");
        doc.append_child(parent, last).unwrap();
        doc.insert_before(parent, first, Some(last)).unwrap();

        assert_eq!(doc.children(parent), &[first, last]);
        assert_eq!(doc.next_sibling(first), Some(last));
        assert_eq!(doc.next_sibling(last), None);
    }

    #[test]
    fn insert_before_rejects_foreign_reference() {
        let mut doc = Document::new();
        let parent = doc.create_element("div");
        let child = doc.create_element("span");
        let stranger = doc.create_element("p");

        let err = doc.insert_before(parent, child, Some(stranger)).unwrap_err();
        assert_eq!(
            err,
            DomError::NotAChild {
                parent,
                child: stranger
            }
        );
    }

    #[test]
    fn cannot_insert_ancestor_into_descendant() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();

        let err = doc.append_child(inner, outer).unwrap_err();
        assert_eq!(err, DomError::HierarchyRequest { parent: inner, child: outer });
        assert_eq!(doc.parent(inner), Some(outer));
    }

    #[test]
    fn ancestors_stop_before_document_node() {
        let mut doc = Document::new();
        let (container, content) = container(&mut doc, "x");
        let chain: Vec<_> = doc.ancestors(content).collect();
        assert_eq!(
            chain,
            vec![content, container, doc.body(), doc.document_element()]
        );
    }

    #[test]
    fn class_attribute_tracks_class_list() {
        let mut doc = Document::new();
        let el = doc.create_element_with_class("div", "ak-modal");
        doc.add_class(el, "ak-modal--enter").unwrap();
        doc.add_class(el, "ak-modal--enter").unwrap();
        assert_eq!(
            doc.attribute(el, "class").as_deref(),
            Some("ak-modal ak-modal--enter")
        );

        doc.toggle_class(el, "ak-modal--enter", false).unwrap();
        assert!(!doc.has_class(el, "ak-modal--enter"));

        doc.set_attribute(el, "class", "a  b").unwrap();
        assert!(doc.has_class(el, "a") && doc.has_class(el, "b"));
    }

    #[test]
    fn attribute_ops_reject_text_nodes() {
        let mut doc = Document::new();
        let text = doc.create_text("hi");
        assert_eq!(
            doc.set_attribute(text, "data-x", "1"),
            Err(DomError::NotAnElement(text))
        );
        assert_eq!(doc.attribute(text, "data-x"), None);
    }

    #[test]
    fn queries_ignore_detached_nodes() {
        let mut doc = Document::new();
        let (a, _) = container(&mut doc, "a");
        assert_eq!(doc.query_attr("data-ak-modal", Some("a")), Some(a));

        doc.detach(a).unwrap();
        assert_eq!(doc.query_attr("data-ak-modal", Some("a")), None);
        assert!(!doc.is_connected(a));
    }

    #[test]
    fn query_attr_matches_in_document_order() {
        let mut doc = Document::new();
        let (a, _) = container(&mut doc, "a");
        let (b, _) = container(&mut doc, "b");
        let all: Vec<_> = doc.query_attr_all("data-ak-modal", None).collect();
        assert_eq!(all, vec![a, b]);
        assert_eq!(doc.query_attr("data-ak-modal", Some("b")), Some(b));
        assert_eq!(doc.query_attr("data-ak-modal", Some("c")), None);
    }

    #[test]
    fn create_style_appends_to_head() {
        let mut doc = Document::new();
        let style = doc
            .create_style(&[("[data-ak-modal]", "display: none !important")])
            .unwrap();
        assert_eq!(doc.parent(style), Some(doc.head()));
        assert_eq!(
            doc.text_content(style),
            " [data-ak-modal] { display: none !important } "
        );
    }

    #[test]
    fn unknown_node_is_reported() {
        let mut other = Document::new();
        let foreign = (0..20).map(|_| other.create_element("i")).last().unwrap();
        let mut doc = Document::new();
        assert_eq!(
            doc.append_child(doc.body(), foreign),
            Err(DomError::UnknownNode(foreign))
        );
    }
}

//! Defines the document tree the annotation engine operates on.
//!
//! A `Document` is an ordered tree of *element* nodes (tag, attributes,
//! children) and *text* nodes (string content), similar to a pruned HTML
//! DOM. Tree mutation is confined to the engine's text wrapper, which
//! splits text nodes with `split_text` and swaps fragments with
//! `replace_child`; everything else is read-only traversal.

use alloc::{
    collections::btree_map::BTreeMap,
    format,
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;

use crate::id_tree::{NodeDataContainer, NodeHierarchy, NodeId};

/// List of node types that can appear in a conversation document.
///
/// This is a pruned set of HTML-like tags; hosts rendering other markup can
/// fall back to `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeType {
    /// Root element of the document.
    Document,
    /// Generic grouping container.
    Section,
    /// A single conversation message.
    Message,
    /// Heading.
    Heading,
    /// Paragraph.
    Paragraph,
    /// Block quote.
    BlockQuote,
    /// Preformatted block.
    Pre,
    /// Inline or block code.
    Code,
    /// Unordered list.
    List,
    /// List item.
    ListItem,
    /// Generic inline container.
    Span,
    /// Strong emphasis.
    Strong,
    /// Emphasis.
    Emphasis,
    /// Hyperlink.
    Link,
    /// Line break.
    Br,
    /// Highlight overlay element, owned by the engine.
    Mark,
    /// Any other element tag.
    Custom(String),
    /// Text content. Text nodes have no tag and no children.
    Text(String),
}

impl NodeType {
    /// The tag name used in path selectors, or `None` for text nodes.
    pub fn tag_name(&self) -> Option<&str> {
        use self::NodeType::*;
        match self {
            Document => Some("document"),
            Section => Some("section"),
            Message => Some("message"),
            Heading => Some("h"),
            Paragraph => Some("p"),
            BlockQuote => Some("blockquote"),
            Pre => Some("pre"),
            Code => Some("code"),
            List => Some("ul"),
            ListItem => Some("li"),
            Span => Some("span"),
            Strong => Some("strong"),
            Emphasis => Some("em"),
            Link => Some("a"),
            Br => Some("br"),
            Mark => Some("mark"),
            Custom(tag) => Some(tag.as_str()),
            Text(_) => None,
        }
    }

    /// Inverse of `tag_name`. Unknown tags map to `Custom`.
    pub fn from_tag_name(tag: &str) -> NodeType {
        use self::NodeType::*;
        match tag {
            "document" => Document,
            "section" => Section,
            "message" => Message,
            "h" => Heading,
            "p" => Paragraph,
            "blockquote" => BlockQuote,
            "pre" => Pre,
            "code" => Code,
            "ul" => List,
            "li" => ListItem,
            "span" => Span,
            "strong" => Strong,
            "em" => Emphasis,
            "a" => Link,
            "br" => Br,
            "mark" => Mark,
            other => Custom(other.to_string()),
        }
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, NodeType::Text(_))
    }
}

/// Either an `id` (stable identifier) or a `class` annotation on an element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdOrClass {
    Id(String),
    Class(String),
}

impl IdOrClass {
    pub fn as_id(&self) -> Option<&str> {
        match self {
            IdOrClass::Id(s) => Some(s.as_str()),
            IdOrClass::Class(_) => None,
        }
    }

    pub fn as_class(&self) -> Option<&str> {
        match self {
            IdOrClass::Class(s) => Some(s.as_str()),
            IdOrClass::Id(_) => None,
        }
    }
}

/// Content of a single node in the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    node_type: NodeType,
    ids_and_classes: Vec<IdOrClass>,
    attributes: BTreeMap<String, String>,
}

impl NodeData {
    #[inline]
    pub const fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            ids_and_classes: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn text(content: &str) -> Self {
        Self::new(NodeType::Text(content.to_string()))
    }

    #[inline]
    pub fn get_node_type(&self) -> &NodeType {
        &self.node_type
    }

    #[inline]
    pub fn get_ids_and_classes(&self) -> &[IdOrClass] {
        &self.ids_and_classes
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.ids_and_classes.push(IdOrClass::Id(id.to_string()));
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.ids_and_classes.push(IdOrClass::Class(class.to_string()));
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// The first `id` annotation, if any. Used as the stable identifier for
    /// path selectors.
    pub fn stable_id(&self) -> Option<&str> {
        self.ids_and_classes.iter().find_map(|i| i.as_id())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.ids_and_classes
            .iter()
            .filter_map(|i| i.as_class())
            .any(|c| c == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if !self.has_class(class) {
            self.ids_and_classes.push(IdOrClass::Class(class.to_string()));
        }
    }

    pub fn remove_class(&mut self, class: &str) {
        self.ids_and_classes
            .retain(|i| i.as_class().map(|c| c != class).unwrap_or(true));
    }

    /// Removes every class for which `pred` returns true.
    pub fn remove_classes_where<F: Fn(&str) -> bool>(&mut self, pred: F) {
        self.ids_and_classes
            .retain(|i| i.as_class().map(|c| !pred(c)).unwrap_or(true));
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.ids_and_classes.iter().filter_map(|i| i.as_class())
    }

    pub fn get_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    pub fn set_attribute(&mut self, key: &str, value: &str) {
        self.attributes.insert(key.to_string(), value.to_string());
    }

    /// Content of a text node, `None` for elements.
    pub fn text_content(&self) -> Option<&str> {
        match &self.node_type {
            NodeType::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn set_text_content(&mut self, content: String) {
        debug_assert!(self.node_type.is_text());
        self.node_type = NodeType::Text(content);
    }
}

/// Errors raised by tree mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The operation requires a text node.
    NotATextNode(NodeId),
    /// The operation requires an element node.
    NotAnElement(NodeId),
    /// `child` is not a child of `parent`.
    NotAChild { parent: NodeId, child: NodeId },
    /// A replacement node is still linked into the tree.
    NodeStillAttached(NodeId),
    /// Split offset is out of bounds or not on a character boundary.
    InvalidSplitOffset { offset: usize, len: usize },
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::DomError::*;
        match self {
            NotATextNode(id) => write!(f, "node {} is not a text node", id),
            NotAnElement(id) => write!(f, "node {} is not an element", id),
            NotAChild { parent, child } => {
                write!(f, "node {} is not a child of {}", child, parent)
            }
            NodeStillAttached(id) => write!(f, "node {} is still attached", id),
            InvalidSplitOffset { offset, len } => {
                write!(f, "split offset {} invalid for text of length {}", offset, len)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DomError {}

/// An ordered tree of element and text nodes.
///
/// The hierarchy (parent/sibling links) and the node content are stored in
/// two parallel arenas indexed by `NodeId`, as in the azul DOM. Detached
/// node slots are never reused; document-order traversal follows links only,
/// so unreachable slots are inert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    hierarchy: NodeHierarchy,
    nodes: NodeDataContainer<NodeData>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates a document containing only a `Document` root element.
    pub fn new() -> Self {
        let mut hierarchy = NodeHierarchy::new();
        let root = hierarchy.new_node();
        let nodes = NodeDataContainer::new(alloc::vec![NodeData::new(NodeType::Document)]);
        Self {
            hierarchy,
            nodes,
            root,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn hierarchy(&self) -> &NodeHierarchy {
        &self.hierarchy
    }

    /// Number of allocated node slots, including detached ones.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id]
    }

    #[inline]
    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id]
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.hierarchy[id].parent
    }

    #[inline]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.hierarchy[id].next_sibling
    }

    #[inline]
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.hierarchy[id].previous_sibling
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        id.children(&self.hierarchy).collect()
    }

    #[inline]
    pub fn is_text(&self, id: NodeId) -> bool {
        self.nodes[id].get_node_type().is_text()
    }

    #[inline]
    pub fn is_element(&self, id: NodeId) -> bool {
        !self.is_text(id)
    }

    /// Text content of a text node, `None` for elements.
    #[inline]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].text_content()
    }

    /// Whether `node` is still reachable from the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        node == self.root
            || node
                .ancestors(&self.hierarchy)
                .last()
                .map(|top| top == self.root)
                .unwrap_or(false)
    }

    /// Allocates a detached node with the given data.
    pub fn create_node(&mut self, data: NodeData) -> NodeId {
        let id = self.hierarchy.new_node();
        self.nodes.push(data);
        id
    }

    /// Allocates a detached element node.
    pub fn create_element(&mut self, node_type: NodeType) -> NodeId {
        debug_assert!(!node_type.is_text());
        self.create_node(NodeData::new(node_type))
    }

    /// Allocates a detached text node.
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.create_node(NodeData::text(content))
    }

    /// Appends a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, DomError> {
        if self.is_text(parent) {
            return Err(DomError::NotAnElement(parent));
        }
        if self.hierarchy[child].parent.is_some() {
            return Err(DomError::NodeStillAttached(child));
        }
        self.hierarchy.append_child(parent, child);
        Ok(child)
    }

    /// Inserts a detached node directly before `reference` under `parent`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        reference: NodeId,
        child: NodeId,
    ) -> Result<NodeId, DomError> {
        if self.is_text(parent) {
            return Err(DomError::NotAnElement(parent));
        }
        if self.hierarchy[reference].parent != Some(parent) {
            return Err(DomError::NotAChild {
                parent,
                child: reference,
            });
        }
        if self.hierarchy[child].parent.is_some() {
            return Err(DomError::NodeStillAttached(child));
        }
        self.hierarchy.insert_before(parent, reference, child);
        Ok(child)
    }

    /// Detaches `node` from its parent. The slot stays allocated.
    pub fn detach(&mut self, node: NodeId) {
        self.hierarchy.detach(node);
    }

    /// Splits the text node `t` at `offset`, replacing it with two adjacent
    /// text nodes whose concatenation equals the original content. Returns
    /// `(left, right)`; `left` is the original node, truncated in place.
    pub fn split_text(&mut self, t: NodeId, offset: usize) -> Result<(NodeId, NodeId), DomError> {
        let content = match self.nodes[t].text_content() {
            Some(s) => s.to_string(),
            None => return Err(DomError::NotATextNode(t)),
        };
        if offset > content.len() || !content.is_char_boundary(offset) {
            return Err(DomError::InvalidSplitOffset {
                offset,
                len: content.len(),
            });
        }

        let (left, right) = content.split_at(offset);
        let left = left.to_string();
        let right_node = self.create_text(right);
        self.nodes[t].set_text_content(left);

        if let Some(parent) = self.hierarchy[t].parent {
            match self.hierarchy[t].next_sibling {
                Some(next) => self.hierarchy.insert_before(parent, next, right_node),
                None => self.hierarchy.append_child(parent, right_node),
            }
        }
        Ok((t, right_node))
    }

    /// Atomically replaces the child `old` of `parent` with `new_children`,
    /// preserving sibling order. `old` is detached; every replacement must be
    /// detached beforehand. Validation happens before any link is touched.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        old: NodeId,
        new_children: &[NodeId],
    ) -> Result<(), DomError> {
        if self.is_text(parent) {
            return Err(DomError::NotAnElement(parent));
        }
        if self.hierarchy[old].parent != Some(parent) {
            return Err(DomError::NotAChild { parent, child: old });
        }
        for new in new_children {
            if self.hierarchy[*new].parent.is_some() {
                return Err(DomError::NodeStillAttached(*new));
            }
        }
        for new in new_children {
            self.hierarchy.insert_before(parent, old, *new);
        }
        self.hierarchy.detach(old);
        Ok(())
    }

    /// In-order traversal yielding every text node in the subtree under
    /// `node` (including `node` itself if it is a text node).
    pub fn text_nodes_in_subtree(&self, node: NodeId) -> Vec<NodeId> {
        node.descendants(&self.hierarchy)
            .filter(|id| self.is_text(*id))
            .collect()
    }

    /// Concatenated text content of the subtree under `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        for id in node.descendants(&self.hierarchy) {
            if let Some(text) = self.text(id) {
                out.push_str(text);
            }
        }
        out
    }

    /// Total character length of the text in the subtree under `node`.
    pub fn text_len(&self, node: NodeId) -> usize {
        node.descendants(&self.hierarchy)
            .filter_map(|id| self.text(id))
            .map(|t| t.len())
            .sum()
    }

    /// First element in document order carrying the given stable id.
    pub fn find_by_stable_id(&self, id: &str) -> Option<NodeId> {
        self.root
            .descendants(&self.hierarchy)
            .find(|n| self.nodes[*n].stable_id() == Some(id))
    }

    /// 1-based index of `node` among siblings that share its tag name.
    /// Text nodes and detached nodes have no such index.
    pub fn index_among_same_tag(&self, node: NodeId) -> Option<usize> {
        let tag = self.nodes[node].get_node_type().tag_name()?;
        self.hierarchy[node].parent?;
        // preceding_siblings includes the node itself, so the count is 1-based
        let count = node
            .preceding_siblings(&self.hierarchy)
            .filter(|s| self.nodes[*s].get_node_type().tag_name() == Some(tag))
            .count();
        Some(count)
    }

    /// Debug rendering of the subtree under `node`, one line per node.
    pub fn to_outline_string(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.outline_recursive(node, 0, &mut out);
        out
    }

    fn outline_recursive(&self, node: NodeId, indent: usize, out: &mut String) {
        for _ in 0..indent {
            out.push_str("    ");
        }
        let data = &self.nodes[node];
        match data.get_node_type() {
            NodeType::Text(s) => out.push_str(&format!("{:?}\n", s)),
            other => {
                let tag = other.tag_name().unwrap_or("?");
                match data.stable_id() {
                    Some(id) => out.push_str(&format!("<{} id={:?}>\n", tag, id)),
                    None => out.push_str(&format!("<{}>\n", tag)),
                }
            }
        }
        for child in node.children(&self.hierarchy) {
            self.outline_recursive(child, indent + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_document() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let msg = doc.create_node(NodeData::new(NodeType::Message).with_id("msg-1"));
        let p = doc.create_element(NodeType::Paragraph);
        let t = doc.create_text("This is the first paragraph with some text.");
        doc.append_child(doc.root(), msg).unwrap();
        doc.append_child(msg, p).unwrap();
        doc.append_child(p, t).unwrap();
        (doc, p, t)
    }

    #[test]
    fn test_split_text_preserves_content() {
        let (mut doc, p, t) = message_document();
        let (left, right) = doc.split_text(t, 12).unwrap();
        assert_eq!(doc.text(left), Some("This is the "));
        assert_eq!(doc.text(right), Some("first paragraph with some text."));
        assert_eq!(
            doc.text_content(p),
            "This is the first paragraph with some text."
        );
        assert_eq!(doc.children(p), alloc::vec![left, right]);
    }

    #[test]
    fn test_split_text_rejects_out_of_bounds() {
        let (mut doc, _, t) = message_document();
        let err = doc.split_text(t, 9999).unwrap_err();
        assert!(matches!(err, DomError::InvalidSplitOffset { .. }));
    }

    #[test]
    fn test_split_text_rejects_non_text() {
        let (mut doc, p, _) = message_document();
        assert_eq!(doc.split_text(p, 0).unwrap_err(), DomError::NotATextNode(p));
    }

    #[test]
    fn test_replace_child_preserves_order() {
        let (mut doc, p, t) = message_document();
        let before = doc.create_text("before ");
        let after = doc.create_text(" after");
        doc.replace_child(p, t, &[before, after]).unwrap();
        assert_eq!(doc.text_content(p), "before  after");
        assert!(doc.parent(t).is_none());
    }

    #[test]
    fn test_replace_child_rejects_foreign_node() {
        let (mut doc, p, _) = message_document();
        let stranger = doc.create_text("x");
        let err = doc.replace_child(p, stranger, &[]).unwrap_err();
        assert!(matches!(err, DomError::NotAChild { .. }));
    }

    #[test]
    fn test_insert_before_orders_children() {
        let (mut doc, p, t) = message_document();
        let lead = doc.create_text("lead: ");
        doc.insert_before(p, t, lead).unwrap();
        assert_eq!(
            doc.text_content(p),
            "lead: This is the first paragraph with some text."
        );
        let stranger = doc.create_text("x");
        let err = doc.insert_before(p, stranger, lead);
        assert!(err.is_err());
    }

    #[test]
    fn test_text_nodes_in_subtree_in_order() {
        let (mut doc, p, t) = message_document();
        let t2 = doc.create_text(" more");
        doc.append_child(p, t2).unwrap();
        assert_eq!(doc.text_nodes_in_subtree(doc.root()), alloc::vec![t, t2]);
    }

    #[test]
    fn test_find_by_stable_id() {
        let (doc, _, _) = message_document();
        let found = doc.find_by_stable_id("msg-1");
        assert!(found.is_some());
        assert_eq!(
            doc.data(found.unwrap()).get_node_type(),
            &NodeType::Message
        );
        assert!(doc.find_by_stable_id("msg-2").is_none());
    }

    #[test]
    fn test_index_among_same_tag() {
        let mut doc = Document::new();
        let p1 = doc.create_element(NodeType::Paragraph);
        let s = doc.create_element(NodeType::Span);
        let p2 = doc.create_element(NodeType::Paragraph);
        doc.append_child(doc.root(), p1).unwrap();
        doc.append_child(doc.root(), s).unwrap();
        doc.append_child(doc.root(), p2).unwrap();
        assert_eq!(doc.index_among_same_tag(p1), Some(1));
        assert_eq!(doc.index_among_same_tag(s), Some(1));
        assert_eq!(doc.index_among_same_tag(p2), Some(2));
    }

    #[test]
    fn test_is_attached() {
        let (mut doc, _, t) = message_document();
        assert!(doc.is_attached(t));
        doc.detach(t);
        assert!(!doc.is_attached(t));
    }
}

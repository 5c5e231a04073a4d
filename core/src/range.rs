//! Contiguous text spans between two (text node, offset) endpoints.
//!
//! A `TextRange` is the transient carrier of a selection: it is constructed
//! when the user selects text, consumed by anchor creation, and produced
//! again by anchor resolution. Ranges are never persisted.
//!
//! Offsets are UTF-8 byte offsets validated to lie on character boundaries,
//! so slicing is always safe and the arithmetic stays deterministic across
//! re-renders of the same content.

use alloc::{string::String, vec::Vec};
use core::{cmp::Ordering, fmt};

use crate::{dom::Document, id_tree::NodeId};

/// One endpoint of a range: a position inside a text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextEndpoint {
    pub node: NodeId,
    pub offset: usize,
}

impl TextEndpoint {
    #[inline]
    pub const fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Why a range could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// An endpoint does not refer to a text node.
    NotATextNode(NodeId),
    /// An endpoint node is not reachable from the document root.
    DetachedNode(NodeId),
    /// Offset beyond the node's content or not on a character boundary.
    OffsetOutOfBounds {
        node: NodeId,
        offset: usize,
        len: usize,
    },
    /// Start and end denote the same position.
    Collapsed,
    /// End precedes start in document order.
    Inverted,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::RangeError::*;
        match self {
            NotATextNode(id) => write!(f, "endpoint {} is not a text node", id),
            DetachedNode(id) => write!(f, "endpoint {} is detached from the document", id),
            OffsetOutOfBounds { node, offset, len } => write!(
                f,
                "offset {} out of bounds for text node {} of length {}",
                offset, node, len
            ),
            Collapsed => write!(f, "range is collapsed"),
            Inverted => write!(f, "range end precedes its start"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RangeError {}

/// A non-collapsed span of text between two endpoints in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: TextEndpoint,
    pub end: TextEndpoint,
}

impl TextRange {
    /// Validates and constructs a range. Both endpoints must refer to
    /// attached text nodes, offsets must be in bounds, and the range must be
    /// non-collapsed with `start` preceding `end` in document order.
    pub fn new(doc: &Document, start: TextEndpoint, end: TextEndpoint) -> Result<Self, RangeError> {
        for ep in [&start, &end] {
            let text = match doc.text(ep.node) {
                Some(t) => t,
                None => return Err(RangeError::NotATextNode(ep.node)),
            };
            if !doc.is_attached(ep.node) {
                return Err(RangeError::DetachedNode(ep.node));
            }
            if ep.offset > text.len() || !text.is_char_boundary(ep.offset) {
                return Err(RangeError::OffsetOutOfBounds {
                    node: ep.node,
                    offset: ep.offset,
                    len: text.len(),
                });
            }
        }
        match compare_endpoints(doc, &start, &end) {
            Ordering::Less => Ok(Self { start, end }),
            Ordering::Equal => Err(RangeError::Collapsed),
            Ordering::Greater => Err(RangeError::Inverted),
        }
    }

    /// Whether both endpoints lie in the same text node.
    #[inline]
    pub fn is_single_node(&self) -> bool {
        self.start.node == self.end.node
    }

    /// The canonical string view of the range.
    pub fn extract_text(&self, doc: &Document) -> String {
        if self.is_single_node() {
            let text = doc.text(self.start.node).unwrap_or("");
            return text
                .get(self.start.offset..self.end.offset)
                .unwrap_or("")
                .into();
        }

        let mut out = String::new();
        let nodes = self.text_nodes_within(doc);
        let last = nodes.len().saturating_sub(1);
        for (i, node) in nodes.iter().enumerate() {
            let text = doc.text(*node).unwrap_or("");
            let lo = if i == 0 { self.start.offset } else { 0 };
            let hi = if i == last { self.end.offset } else { text.len() };
            if let Some(slice) = text.get(lo..hi) {
                out.push_str(slice);
            }
        }
        out
    }

    /// All text nodes the range touches, in document order, from the start
    /// node to the end node inclusive.
    pub fn text_nodes_within(&self, doc: &Document) -> Vec<NodeId> {
        let all = doc.text_nodes_in_subtree(doc.root());
        let from = all.iter().position(|n| *n == self.start.node);
        let to = all.iter().position(|n| *n == self.end.node);
        match (from, to) {
            (Some(a), Some(b)) if a <= b => all[a..=b].to_vec(),
            _ => Vec::new(),
        }
    }

    /// Whether any portion of `node` (or its subtree) lies inside the range.
    pub fn intersects_node(&self, doc: &Document, node: NodeId) -> bool {
        let covered = self.text_nodes_within(doc);
        let subtree = doc.text_nodes_in_subtree(node);
        subtree.iter().any(|t| {
            if !covered.contains(t) {
                return false;
            }
            // boundary nodes count only if a nonzero slice of them is covered
            let len = doc.text(*t).map(|s| s.len()).unwrap_or(0);
            let lo = if *t == self.start.node { self.start.offset } else { 0 };
            let hi = if *t == self.end.node { self.end.offset } else { len };
            lo < hi
        })
    }

    /// The deepest node containing both endpoints.
    pub fn common_ancestor(&self, doc: &Document) -> NodeId {
        let start_chain: Vec<NodeId> = self.start.node.ancestors(doc.hierarchy()).collect();
        self.end
            .node
            .ancestors(doc.hierarchy())
            .find(|a| start_chain.contains(a))
            .unwrap_or_else(|| doc.root())
    }

    /// The nearest element enclosing both endpoints.
    pub fn enclosing_element(&self, doc: &Document) -> NodeId {
        let ancestor = self.common_ancestor(doc);
        if doc.is_element(ancestor) {
            ancestor
        } else {
            doc.parent(ancestor).unwrap_or_else(|| doc.root())
        }
    }
}

/// Compares two endpoints in document order: first by tree position of the
/// node, then by offset.
pub fn compare_endpoints(doc: &Document, a: &TextEndpoint, b: &TextEndpoint) -> Ordering {
    if a.node == b.node {
        return a.offset.cmp(&b.offset);
    }
    let chain_a = doc.hierarchy().child_index_chain(a.node);
    let chain_b = doc.hierarchy().child_index_chain(b.node);
    chain_a.cmp(&chain_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{NodeData, NodeType};

    // <document>
    //   <message id="m1"><p>"Hello, " <em>"world"</em> "!"</p></message>
    fn sample() -> (Document, NodeId, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let msg = doc.create_node(NodeData::new(NodeType::Message).with_id("m1"));
        let p = doc.create_element(NodeType::Paragraph);
        let em = doc.create_element(NodeType::Emphasis);
        let t1 = doc.create_text("Hello, ");
        let t2 = doc.create_text("world");
        let t3 = doc.create_text("!");
        doc.append_child(doc.root(), msg).unwrap();
        doc.append_child(msg, p).unwrap();
        doc.append_child(p, t1).unwrap();
        doc.append_child(p, em).unwrap();
        doc.append_child(em, t2).unwrap();
        doc.append_child(p, t3).unwrap();
        (doc, p, t1, t2, t3)
    }

    #[test]
    fn test_rejects_collapsed_range() {
        let (doc, _, t1, _, _) = sample();
        let err = TextRange::new(
            &doc,
            TextEndpoint::new(t1, 3),
            TextEndpoint::new(t1, 3),
        )
        .unwrap_err();
        assert_eq!(err, RangeError::Collapsed);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let (doc, _, t1, t2, _) = sample();
        let err = TextRange::new(
            &doc,
            TextEndpoint::new(t2, 0),
            TextEndpoint::new(t1, 2),
        )
        .unwrap_err();
        assert_eq!(err, RangeError::Inverted);
    }

    #[test]
    fn test_rejects_element_endpoint() {
        let (doc, p, t1, _, _) = sample();
        let err = TextRange::new(
            &doc,
            TextEndpoint::new(p, 0),
            TextEndpoint::new(t1, 2),
        )
        .unwrap_err();
        assert_eq!(err, RangeError::NotATextNode(p));
    }

    #[test]
    fn test_rejects_offset_past_end() {
        let (doc, _, t1, t2, _) = sample();
        let err = TextRange::new(
            &doc,
            TextEndpoint::new(t1, 200),
            TextEndpoint::new(t2, 1),
        )
        .unwrap_err();
        assert!(matches!(err, RangeError::OffsetOutOfBounds { .. }));
    }

    #[test]
    fn test_extract_text_single_node() {
        let (doc, _, t1, _, _) = sample();
        let range = TextRange::new(
            &doc,
            TextEndpoint::new(t1, 0),
            TextEndpoint::new(t1, 5),
        )
        .unwrap();
        assert_eq!(range.extract_text(&doc), "Hello");
    }

    #[test]
    fn test_extract_text_across_nodes() {
        let (doc, _, t1, _, t3) = sample();
        let range = TextRange::new(
            &doc,
            TextEndpoint::new(t1, 7),
            TextEndpoint::new(t3, 1),
        )
        .unwrap();
        assert_eq!(range.extract_text(&doc), "world!");
    }

    #[test]
    fn test_text_nodes_within() {
        let (doc, _, t1, t2, t3) = sample();
        let range = TextRange::new(
            &doc,
            TextEndpoint::new(t1, 0),
            TextEndpoint::new(t3, 1),
        )
        .unwrap();
        assert_eq!(range.text_nodes_within(&doc), alloc::vec![t1, t2, t3]);
    }

    #[test]
    fn test_intersects_node() {
        let (doc, p, t1, t2, t3) = sample();
        let range = TextRange::new(
            &doc,
            TextEndpoint::new(t1, 2),
            TextEndpoint::new(t2, 3),
        )
        .unwrap();
        assert!(range.intersects_node(&doc, p));
        assert!(range.intersects_node(&doc, t1));
        assert!(range.intersects_node(&doc, t2));
        assert!(!range.intersects_node(&doc, t3));
    }

    #[test]
    fn test_intersects_excludes_zero_width_boundary() {
        let (doc, _, t1, t2, _) = sample();
        // end offset 0 in t2 means no character of t2 is covered
        let range = TextRange::new(
            &doc,
            TextEndpoint::new(t1, 2),
            TextEndpoint::new(t2, 0),
        )
        .unwrap();
        assert!(!range.intersects_node(&doc, t2));
    }

    #[test]
    fn test_common_ancestor_and_enclosing_element() {
        let (doc, p, t1, t2, _) = sample();
        let range = TextRange::new(
            &doc,
            TextEndpoint::new(t1, 0),
            TextEndpoint::new(t2, 2),
        )
        .unwrap();
        assert_eq!(range.common_ancestor(&doc), p);
        assert_eq!(range.enclosing_element(&doc), p);
    }
}

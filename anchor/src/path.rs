//! Deterministic root-to-node path selectors.
//!
//! A path encodes a node's position as a sequence of steps, one per
//! ancestor, each either `tag[k]` (the k-th same-tag child, 1-based) or
//! `*[@id='…']` when the element carries a stable identifier. Paths are
//! serialized as slash-separated step strings, e.g.
//! `*[@id='msg-42']/p[2]/span[1]`.
//!
//! A stable identifier ends the upward walk: everything above it is
//! redundant because the id can be re-discovered globally. A depth cap
//! bounds path length for documents without stable ids; capped paths may
//! fail to resolve after heavy restructuring, which the offset and fuzzy
//! strategies compensate for.

use core::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tidemark_core::{Document, NodeId};

/// Default bound on the number of steps in a path.
pub const DEFAULT_DEPTH_CAP: usize = 10;

/// One step of a node path, read root-to-node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// `tag[k]`: the k-th child with this tag name, 1-based.
    Tagged { tag: String, index: usize },
    /// `*[@id='…']`: the element carrying this stable identifier.
    StableId(String),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PathStep::Tagged { tag, index } => write!(f, "{}[{}]", tag, index),
            PathStep::StableId(id) => write!(f, "*[@id='{}']", id),
        }
    }
}

/// Why a path failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    BadStep(String),
    BadIndex(String),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "empty path"),
            PathError::BadStep(s) => write!(f, "malformed path step: {:?}", s),
            PathError::BadIndex(s) => write!(f, "malformed step index: {:?}", s),
        }
    }
}

impl std::error::Error for PathError {}

/// Everything `NodePath::from_node` learned while walking up the tree,
/// needed later for confidence scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathBuildInfo {
    /// The depth cap truncated the walk before reaching the root.
    pub cap_hit: bool,
    /// Some step on the path is a stable identifier.
    pub has_stable_id: bool,
}

/// A root-to-node addressing path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath {
    steps: Vec<PathStep>,
}

impl NodePath {
    #[inline]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Builds the path for `node` by walking up toward the document root.
    ///
    /// The walk stops at the first stable-id ancestor: the id is globally
    /// re-discoverable, so steps above it carry no information and the path
    /// is rooted there instead of at the document root. Without a stable
    /// ancestor, a walk longer than `depth_cap` is truncated to the deepest
    /// `depth_cap` steps; such a path is no longer root-relative and is
    /// expected to fail the path strategy (the offset and fuzzy strategies
    /// back it up), which `PathBuildInfo::cap_hit` reports for confidence
    /// scoring.
    pub fn from_node(doc: &Document, node: NodeId, depth_cap: usize) -> (Self, PathBuildInfo) {
        let mut steps = Vec::new();
        let mut has_stable_id = false;
        let mut current = Some(node);

        while let Some(cur) = current {
            if cur == doc.root() {
                break;
            }
            let data = doc.data(cur);
            if let Some(id) = data.stable_id() {
                steps.push(PathStep::StableId(id.to_string()));
                has_stable_id = true;
                break;
            }
            match (
                data.get_node_type().tag_name(),
                doc.index_among_same_tag(cur),
            ) {
                (Some(tag), Some(index)) => steps.push(PathStep::Tagged {
                    tag: tag.to_string(),
                    index,
                }),
                // text nodes are not addressable; the path starts above them
                _ => {}
            }
            current = doc.parent(cur);
        }

        let mut cap_hit = false;
        if !has_stable_id && steps.len() > depth_cap {
            // steps are still node-to-root here, so truncation keeps the
            // deepest ones
            cap_hit = true;
            steps.truncate(depth_cap);
        }

        steps.reverse();
        (
            Self { steps },
            PathBuildInfo {
                cap_hit,
                has_stable_id,
            },
        )
    }

    /// Evaluates the path against the current tree, descending
    /// deterministically. Any missing step makes the whole resolution fail.
    pub fn resolve(&self, doc: &Document) -> Option<NodeId> {
        let mut current = doc.root();
        for (i, step) in self.steps.iter().enumerate() {
            current = match step {
                PathStep::StableId(id) => {
                    if i == 0 {
                        doc.find_by_stable_id(id)?
                    } else {
                        current
                            .children(doc.hierarchy())
                            .find(|c| doc.data(*c).stable_id() == Some(id.as_str()))?
                    }
                }
                PathStep::Tagged { tag, index } => {
                    let mut seen = 0usize;
                    current
                        .children(doc.hierarchy())
                        .find(|c| {
                            if doc.data(*c).get_node_type().tag_name() == Some(tag.as_str()) {
                                seen += 1;
                                seen == *index
                            } else {
                                false
                            }
                        })?
                }
            };
        }
        if self.steps.is_empty() {
            None
        } else {
            Some(current)
        }
    }

    /// Parses the slash-separated encoding. The inverse of `Display`.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.trim().is_empty() {
            return Err(PathError::Empty);
        }
        let mut steps = Vec::new();
        for raw in input.split('/') {
            let raw = raw.trim();
            if let Some(rest) = raw.strip_prefix("*[@id='") {
                let id = rest
                    .strip_suffix("']")
                    .ok_or_else(|| PathError::BadStep(raw.to_string()))?;
                if id.is_empty() || id.contains('\'') {
                    return Err(PathError::BadStep(raw.to_string()));
                }
                steps.push(PathStep::StableId(id.to_string()));
                continue;
            }
            let open = raw.find('[').ok_or_else(|| PathError::BadStep(raw.to_string()))?;
            let close = raw
                .strip_suffix(']')
                .ok_or_else(|| PathError::BadStep(raw.to_string()))?;
            let tag = &raw[..open];
            let index_str = &close[open + 1..];
            if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(PathError::BadStep(raw.to_string()));
            }
            let index: usize = index_str
                .parse()
                .map_err(|_| PathError::BadIndex(raw.to_string()))?;
            if index == 0 {
                return Err(PathError::BadIndex(raw.to_string()));
            }
            steps.push(PathStep::Tagged {
                tag: tag.to_string(),
                index,
            });
        }
        Ok(Self { steps })
    }

    /// Whether `encoded` parses cleanly, without touching any document.
    pub fn is_syntactically_valid(encoded: &str) -> bool {
        Self::parse(encoded).is_ok()
    }

    /// Whether the path resolves to an existing node right now.
    pub fn is_semantically_valid(&self, doc: &Document) -> bool {
        self.resolve(doc).is_some()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

// Paths persist inside anchors through their string encoding.
impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NodePath::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::{NodeData, NodeType};

    // <document>
    //   <message id="m1"><p><span/><span/></p><p/></message>
    //   <message><p/></message>
    fn sample() -> (Document, Vec<NodeId>) {
        let mut doc = Document::new();
        let m1 = doc.create_node(NodeData::new(NodeType::Message).with_id("m1"));
        let p1 = doc.create_element(NodeType::Paragraph);
        let s1 = doc.create_element(NodeType::Span);
        let s2 = doc.create_element(NodeType::Span);
        let p2 = doc.create_element(NodeType::Paragraph);
        let m2 = doc.create_element(NodeType::Message);
        let p3 = doc.create_element(NodeType::Paragraph);
        doc.append_child(doc.root(), m1).unwrap();
        doc.append_child(m1, p1).unwrap();
        doc.append_child(p1, s1).unwrap();
        doc.append_child(p1, s2).unwrap();
        doc.append_child(m1, p2).unwrap();
        doc.append_child(doc.root(), m2).unwrap();
        doc.append_child(m2, p3).unwrap();
        (doc, vec![m1, p1, s1, s2, p2, m2, p3])
    }

    #[test]
    fn test_round_trip_every_element() {
        let (doc, nodes) = sample();
        for node in nodes {
            let (path, _) = NodePath::from_node(&doc, node, DEFAULT_DEPTH_CAP);
            assert_eq!(path.resolve(&doc), Some(node), "path {} failed", path);
        }
    }

    #[test]
    fn test_stable_id_shortcut_ends_walk() {
        let (doc, nodes) = sample();
        let s2 = nodes[3];
        let (path, info) = NodePath::from_node(&doc, s2, DEFAULT_DEPTH_CAP);
        assert_eq!(path.to_string(), "*[@id='m1']/p[1]/span[2]");
        assert!(info.has_stable_id);
        assert!(!info.cap_hit);
    }

    #[test]
    fn test_plain_tag_path() {
        let (doc, nodes) = sample();
        let p3 = nodes[6];
        let (path, info) = NodePath::from_node(&doc, p3, DEFAULT_DEPTH_CAP);
        assert_eq!(path.to_string(), "message[2]/p[1]");
        assert!(!info.has_stable_id);
        assert!(!info.cap_hit);
    }

    #[test]
    fn test_depth_cap_reported() {
        let mut doc = Document::new();
        let mut parent = doc.root();
        let mut deepest = parent;
        for _ in 0..15 {
            let child = doc.create_element(NodeType::Section);
            doc.append_child(parent, child).unwrap();
            parent = child;
            deepest = child;
        }
        let (path, info) = NodePath::from_node(&doc, deepest, 10);
        assert!(info.cap_hit);
        assert_eq!(path.steps().len(), 10);
        // a truncated path is no longer root-relative; it must not claim
        // to address the original node
        assert_ne!(path.resolve(&doc), Some(deepest));
    }

    #[test]
    fn test_capped_walk_still_finds_stable_ancestor() {
        let mut doc = Document::new();
        let anchor_el = doc.create_node(NodeData::new(NodeType::Message).with_id("deep"));
        doc.append_child(doc.root(), anchor_el).unwrap();
        let mut parent = anchor_el;
        let mut deepest = parent;
        for _ in 0..6 {
            let child = doc.create_element(NodeType::Section);
            doc.append_child(parent, child).unwrap();
            parent = child;
            deepest = child;
        }
        let (path, info) = NodePath::from_node(&doc, deepest, 4);
        assert!(info.has_stable_id);
        // the stable ancestor re-roots the path, so the cap never bites
        assert!(!info.cap_hit);
        assert_eq!(path.steps().first(), Some(&PathStep::StableId("deep".into())));
        assert_eq!(path.resolve(&doc), Some(deepest));
    }

    #[test]
    fn test_missing_child_fails_resolution() {
        let (doc, _) = sample();
        let path = NodePath::parse("message[1]/p[9]").unwrap();
        assert!(path.resolve(&doc).is_none());
        assert!(!path.is_semantically_valid(&doc));
    }

    #[test]
    fn test_parse_display_round_trip() {
        for encoded in [
            "message[2]/p[1]",
            "*[@id='m1']/p[1]/span[2]",
            "section[3]",
        ] {
            let path = NodePath::parse(encoded).unwrap();
            assert_eq!(path.to_string(), encoded);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(NodePath::parse("").is_err());
        assert!(NodePath::parse("p[0]").is_err());
        assert!(NodePath::parse("p[x]").is_err());
        assert!(NodePath::parse("p").is_err());
        assert!(NodePath::parse("*[@id='']").is_err());
        assert!(NodePath::parse("p[1]/").is_err());
    }
}

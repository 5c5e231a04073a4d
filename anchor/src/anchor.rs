//! Anchor creation, validation and cascading resolution.
//!
//! `create_anchor` captures three redundant descriptions of one selection;
//! `resolve_anchor` replays them against the current (possibly mutated)
//! tree in order of precision. Strategies are a flat enum iterated in
//! order; each strategy is a plain function and its internal failures are
//! swallowed, surfacing only as "no range from this strategy".

use core::fmt;

use serde::{Deserialize, Serialize};
use tidemark_core::{Document, NodeId, NodeType, TextRange};

use crate::{
    checksum,
    fuzzy::{self, normalize_whitespace},
    offset,
    path::{NodePath, DEFAULT_DEPTH_CAP},
};

/// Confidence penalty when the path depth cap truncated the walk.
pub const PENALTY_PATH_CAP: f32 = 0.1;
/// Confidence penalty when no stable identifier exists anywhere on the path.
pub const PENALTY_NO_STABLE_ID: f32 = 0.05;
/// Confidence penalty per side whose captured context is shorter than
/// configured.
pub const PENALTY_SHORT_CONTEXT: f32 = 0.05;

/// The three resolution strategies, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStrategy {
    Path,
    Offset,
    Fuzzy,
}

impl AnchorStrategy {
    pub const CASCADE: [AnchorStrategy; 3] = [
        AnchorStrategy::Path,
        AnchorStrategy::Offset,
        AnchorStrategy::Fuzzy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorStrategy::Path => "path",
            AnchorStrategy::Offset => "offset",
            AnchorStrategy::Fuzzy => "fuzzy",
        }
    }
}

/// Tunables for anchor creation and resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnchorConfig {
    /// Characters of context captured before and after the selection.
    pub context_length: usize,
    /// Bound on path selector depth.
    pub path_depth_cap: usize,
    /// Minimum window similarity the fuzzy strategy accepts.
    pub fuzzy_accept_threshold: f64,
    /// Minimum combined neighborhood similarity for context tie-breaks.
    pub fuzzy_context_threshold: f64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            context_length: 50,
            path_depth_cap: DEFAULT_DEPTH_CAP,
            fuzzy_accept_threshold: 0.80,
            fuzzy_context_threshold: 0.75,
        }
    }
}

/// A durable location descriptor for one selected span of text.
/// Immutable after creation; persisted as part of a highlight record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    /// The text that was selected.
    pub selected_text: String,
    /// Absolute character offset of the selection start within the
    /// enclosing container.
    pub start_offset: usize,
    /// Absolute character offset one past the selection end.
    pub end_offset: usize,
    /// Structural path to the element enclosing the selection.
    pub node_path: NodePath,
    /// Stable identifier of the enclosing message, when the host knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Up to `context_length` characters preceding the selection.
    pub context_before: String,
    /// Up to `context_length` characters following the selection.
    pub context_after: String,
    /// Base-36 checksum of `context_before ‖ selected_text ‖ context_after`.
    pub checksum: String,
    /// Creation-time confidence in `[0, 1]`.
    pub confidence: f32,
    /// Strategy recorded at creation (always `path`) or the one that last
    /// resolved the anchor.
    pub strategy: AnchorStrategy,
}

/// Why anchor creation failed. Creation never retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    /// Collapsed, empty or cross-document selection.
    InvalidSelection(String),
}

impl fmt::Display for AnchorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnchorError::InvalidSelection(why) => write!(f, "invalid selection: {}", why),
        }
    }
}

impl std::error::Error for AnchorError {}

/// A successfully resolved anchor: the range plus the strategy that found
/// it, so callers can update confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedAnchor {
    pub range: TextRange,
    pub strategy: AnchorStrategy,
}

/// Creates an anchor from a validated selection range.
///
/// The range must already have passed `TextRange::new` (non-collapsed,
/// ordered, in-document); this additionally rejects selections whose
/// extracted text is empty.
pub fn create_anchor(
    doc: &Document,
    range: &TextRange,
    message_id: Option<&str>,
    config: &AnchorConfig,
) -> Result<Anchor, AnchorError> {
    let selected_text = range.extract_text(doc);
    if selected_text.is_empty() {
        return Err(AnchorError::InvalidSelection(
            "selection contains no text".into(),
        ));
    }

    let enclosing = range.enclosing_element(doc);
    let container = message_container(doc, range.start.node, message_id)
        .unwrap_or(enclosing);

    let start_offset = offset::absolute_offset(doc, container, &range.start)
        .ok_or_else(|| AnchorError::InvalidSelection("selection outside container".into()))?;
    let end_offset = offset::absolute_offset(doc, container, &range.end)
        .ok_or_else(|| AnchorError::InvalidSelection("selection outside container".into()))?;

    let (node_path, path_info) = NodePath::from_node(doc, enclosing, config.path_depth_cap);

    let container_text = doc.text_content(container);
    let context_before = tail_chars(&container_text[..start_offset], config.context_length);
    let context_after = head_chars(&container_text[end_offset..], config.context_length);

    let checksum = checksum::context_checksum(&context_before, &selected_text, &context_after);

    let mut confidence = 1.0f32;
    if path_info.cap_hit {
        confidence -= PENALTY_PATH_CAP;
    }
    if !path_info.has_stable_id {
        confidence -= PENALTY_NO_STABLE_ID;
    }
    if context_before.chars().count() < config.context_length {
        confidence -= PENALTY_SHORT_CONTEXT;
    }
    if context_after.chars().count() < config.context_length {
        confidence -= PENALTY_SHORT_CONTEXT;
    }
    confidence = confidence.clamp(0.0, 1.0);

    Ok(Anchor {
        selected_text,
        start_offset,
        end_offset,
        node_path,
        message_id: message_id.map(|s| s.to_string()),
        context_before,
        context_after,
        checksum,
        confidence,
        strategy: AnchorStrategy::Path,
    })
}

/// Resolves an anchor against the current tree.
///
/// Tries path, offset and fuzzy in order and returns the first range whose
/// text equals (exactly or whitespace-normalized) or fuzzy-matches the
/// anchored text. `None` when every strategy fails; this is the expected
/// steady-state failure mode, not an error.
pub fn resolve_anchor(
    doc: &Document,
    anchor: &Anchor,
    config: &AnchorConfig,
) -> Option<ResolvedAnchor> {
    for strategy in AnchorStrategy::CASCADE {
        let range = match strategy {
            AnchorStrategy::Path => try_path(doc, anchor),
            AnchorStrategy::Offset => try_offset(doc, anchor),
            AnchorStrategy::Fuzzy => try_fuzzy(doc, anchor, config),
        };
        if let Some(range) = range {
            log::debug!(
                "anchor resolved via {} strategy ({} chars)",
                strategy.as_str(),
                anchor.selected_text.len()
            );
            return Some(ResolvedAnchor { range, strategy });
        }
        log::trace!("{} strategy produced no range", strategy.as_str());
    }
    None
}

/// Structural validation, independent of whether the anchor currently
/// resolves.
pub fn validate_anchor(anchor: &Anchor) -> bool {
    !anchor.selected_text.is_empty()
        && anchor.end_offset > anchor.start_offset
        && anchor.confidence > 0.0
        && anchor.confidence <= 1.0
        && checksum::is_well_formed(&anchor.checksum)
}

// --- strategy implementations ---

/// Path strategy: resolve the stored path, then pin the exact text at the
/// occurrence nearest to the recorded offset.
fn try_path(doc: &Document, anchor: &Anchor) -> Option<TextRange> {
    let node = anchor.node_path.resolve(doc)?;
    let subtree_text = doc.text_content(node);
    let needle = anchor.selected_text.as_str();

    // nearest exact occurrence to the recorded offset wins
    let best = subtree_text
        .match_indices(needle)
        .map(|(pos, _)| pos)
        .min_by_key(|pos| pos.abs_diff(anchor.start_offset))?;

    let range = offset::range_at_offset(doc, node, best, needle.len())?;
    (range.extract_text(doc) == needle).then_some(range)
}

/// Offset strategy: re-discover the container, take the span at the
/// recorded absolute offset, and accept it if the text still matches
/// (exactly or with whitespace normalization).
fn try_offset(doc: &Document, anchor: &Anchor) -> Option<TextRange> {
    let container = rediscover_container(doc, anchor)?;
    let len = anchor.end_offset.checked_sub(anchor.start_offset)?;
    let range = offset::range_at_offset(doc, container, anchor.start_offset, len)?;
    let found = range.extract_text(doc);
    if found == anchor.selected_text
        || normalize_whitespace(&found) == normalize_whitespace(&anchor.selected_text)
    {
        Some(range)
    } else {
        None
    }
}

/// Fuzzy strategy: locate `before ‖ text ‖ after` in the full document
/// text, then pin the middle segment inside the matched window.
fn try_fuzzy(doc: &Document, anchor: &Anchor, config: &AnchorConfig) -> Option<TextRange> {
    let full_text = doc.text_content(doc.root());
    let union = format!(
        "{}{}{}",
        anchor.context_before, anchor.selected_text, anchor.context_after
    );

    let window = fuzzy::find_best_match(
        &full_text,
        &union,
        None,
        config.fuzzy_accept_threshold,
        config.fuzzy_context_threshold,
    )
    .or_else(|| {
        // short selections with long-gone context: search the text itself,
        // letting whatever context remains break ties
        fuzzy::find_best_match(
            &full_text,
            &anchor.selected_text,
            Some((&anchor.context_before, &anchor.context_after)),
            config.fuzzy_accept_threshold,
            config.fuzzy_context_threshold,
        )
    })?;

    // pin the selected text inside the matched window
    let window_str = &full_text[window.start..window.end];
    let inner = fuzzy::find_best_match(
        window_str,
        &anchor.selected_text,
        None,
        config.fuzzy_accept_threshold,
        config.fuzzy_context_threshold,
    )?;

    let start = window.start + inner.start;
    let len = inner.end - inner.start;
    let range = offset::range_at_offset(doc, doc.root(), start, len)?;

    let found = range.extract_text(doc);
    let score = fuzzy::similarity(
        &normalize_whitespace(&found),
        &normalize_whitespace(&anchor.selected_text),
    );
    (score >= config.fuzzy_accept_threshold).then_some(range)
}

// --- helpers ---

/// Nearest ancestor that is a message element or carries the given stable
/// id; the container for offset computation.
fn message_container(doc: &Document, node: NodeId, message_id: Option<&str>) -> Option<NodeId> {
    node.ancestors(doc.hierarchy()).find(|a| {
        let data = doc.data(*a);
        matches!(data.get_node_type(), NodeType::Message)
            || (message_id.is_some() && data.stable_id() == message_id)
    })
}

/// Container rediscovery for the offset strategy: stable message id first,
/// then the stored path's nearest resolvable ancestor, then the root.
fn rediscover_container(doc: &Document, anchor: &Anchor) -> Option<NodeId> {
    if let Some(id) = anchor.message_id.as_deref() {
        if let Some(node) = doc.find_by_stable_id(id) {
            return Some(node);
        }
    }
    if let Some(node) = anchor.node_path.resolve(doc) {
        return Some(
            message_container(doc, node, anchor.message_id.as_deref()).unwrap_or(node),
        );
    }
    Some(doc.root())
}

fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        return s.to_string();
    }
    s.chars().skip(count - n).collect()
}

fn head_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::{NodeData, TextEndpoint};

    // <document>
    //   <message id="m1"><p>"We discussed an important topic in depth."</p></message>
    //   <message id="m2"><p>"Another message entirely."</p></message>
    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let m1 = doc.create_node(NodeData::new(NodeType::Message).with_id("m1"));
        let p1 = doc.create_element(NodeType::Paragraph);
        let t1 = doc.create_text("We discussed an important topic in depth.");
        let m2 = doc.create_node(NodeData::new(NodeType::Message).with_id("m2"));
        let p2 = doc.create_element(NodeType::Paragraph);
        let t2 = doc.create_text("Another message entirely.");
        doc.append_child(doc.root(), m1).unwrap();
        doc.append_child(m1, p1).unwrap();
        doc.append_child(p1, t1).unwrap();
        doc.append_child(doc.root(), m2).unwrap();
        doc.append_child(m2, p2).unwrap();
        doc.append_child(p2, t2).unwrap();
        (doc, t1, m1)
    }

    fn select(doc: &Document, node: NodeId, from: usize, to: usize) -> TextRange {
        TextRange::new(
            doc,
            TextEndpoint::new(node, from),
            TextEndpoint::new(node, to),
        )
        .unwrap()
    }

    #[test]
    fn test_created_anchor_is_structurally_valid() {
        let (doc, t1, _) = sample();
        let range = select(&doc, t1, 16, 31);
        let anchor =
            create_anchor(&doc, &range, Some("m1"), &AnchorConfig::default()).unwrap();
        assert_eq!(anchor.selected_text, "important topic");
        assert!(anchor.end_offset > anchor.start_offset);
        assert!(validate_anchor(&anchor));
        assert_eq!(anchor.strategy, AnchorStrategy::Path);
    }

    #[test]
    fn test_context_is_bounded_by_container() {
        let (doc, t1, _) = sample();
        let range = select(&doc, t1, 16, 31);
        let anchor =
            create_anchor(&doc, &range, Some("m1"), &AnchorConfig::default()).unwrap();
        assert_eq!(anchor.context_before, "We discussed an ");
        assert_eq!(anchor.context_after, " in depth.");
        // short context on both sides costs 0.05 each
        assert!((anchor.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_on_unchanged_tree_uses_path() {
        let (doc, t1, _) = sample();
        let range = select(&doc, t1, 16, 31);
        let anchor =
            create_anchor(&doc, &range, Some("m1"), &AnchorConfig::default()).unwrap();
        let resolved = resolve_anchor(&doc, &anchor, &AnchorConfig::default()).unwrap();
        assert_eq!(resolved.strategy, AnchorStrategy::Path);
        assert_eq!(resolved.range.extract_text(&doc), "important topic");
    }

    #[test]
    fn test_resolve_survives_wrapping_in_new_element() {
        let (mut doc, t1, m1) = sample();
        let range = select(&doc, t1, 16, 31);
        let anchor =
            create_anchor(&doc, &range, Some("m1"), &AnchorConfig::default()).unwrap();

        // wrap the paragraph in a fresh <span>
        let p = doc.parent(t1).unwrap();
        let span = doc.create_element(NodeType::Span);
        doc.replace_child(m1, p, &[span]).unwrap();
        doc.append_child(span, p).unwrap();

        let resolved = resolve_anchor(&doc, &anchor, &AnchorConfig::default()).unwrap();
        assert_eq!(resolved.range.extract_text(&doc), "important topic");
        assert_ne!(resolved.strategy, AnchorStrategy::Path);
    }

    #[test]
    fn test_resolve_survives_text_node_split() {
        let (mut doc, t1, _) = sample();
        let range = select(&doc, t1, 16, 31);
        let anchor =
            create_anchor(&doc, &range, Some("m1"), &AnchorConfig::default()).unwrap();

        doc.split_text(t1, 20).unwrap();
        let resolved = resolve_anchor(&doc, &anchor, &AnchorConfig::default()).unwrap();
        assert_eq!(resolved.range.extract_text(&doc), "important topic");
    }

    #[test]
    fn test_resolve_fails_when_text_deleted() {
        let (mut doc, t1, _) = sample();
        let range = select(&doc, t1, 16, 31);
        let anchor =
            create_anchor(&doc, &range, Some("m1"), &AnchorConfig::default()).unwrap();

        let p = doc.parent(t1).unwrap();
        let replacement = doc.create_text("Completely unrelated words now.");
        doc.replace_child(p, t1, &[replacement]).unwrap();

        assert!(resolve_anchor(&doc, &anchor, &AnchorConfig::default()).is_none());
    }

    #[test]
    fn test_fuzzy_resolution_after_edit_near_selection() {
        let (mut doc, t1, _) = sample();
        let range = select(&doc, t1, 16, 31);
        let anchor =
            create_anchor(&doc, &range, Some("m1"), &AnchorConfig::default()).unwrap();

        // a small typo lands in the selected text itself
        let p = doc.parent(t1).unwrap();
        let edited = doc.create_text("We discussed an importantt topic in depth.");
        doc.replace_child(p, t1, &[edited]).unwrap();

        let resolved = resolve_anchor(&doc, &anchor, &AnchorConfig::default()).unwrap();
        assert_eq!(resolved.strategy, AnchorStrategy::Fuzzy);
        let found = resolved.range.extract_text(&doc);
        assert!(
            fuzzy::similarity(&found, "important topic") >= 0.8,
            "found {:?}",
            found
        );
    }

    #[test]
    fn test_validate_anchor_rejects_broken_invariants() {
        let (doc, t1, _) = sample();
        let range = select(&doc, t1, 16, 31);
        let good = create_anchor(&doc, &range, None, &AnchorConfig::default()).unwrap();

        let mut no_text = good.clone();
        no_text.selected_text.clear();
        assert!(!validate_anchor(&no_text));

        let mut inverted = good.clone();
        inverted.end_offset = inverted.start_offset;
        assert!(!validate_anchor(&inverted));

        let mut no_confidence = good.clone();
        no_confidence.confidence = 0.0;
        assert!(!validate_anchor(&no_confidence));

        let mut bad_checksum = good;
        bad_checksum.checksum = "NOT-BASE36".into();
        assert!(!validate_anchor(&bad_checksum));
    }

    #[test]
    fn test_anchor_serde_round_trip() {
        let (doc, t1, _) = sample();
        let range = select(&doc, t1, 16, 31);
        let anchor =
            create_anchor(&doc, &range, Some("m1"), &AnchorConfig::default()).unwrap();
        let json = serde_json::to_string(&anchor).unwrap();
        assert!(json.contains("\"selectedText\""));
        assert!(json.contains("\"strategy\":\"path\""));
        let back: Anchor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, anchor);
    }
}

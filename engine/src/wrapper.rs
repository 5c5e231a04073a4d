//! Wraps resolved ranges in overlay elements without corrupting the tree.
//!
//! Every wrap splits the text node at the segment edges with `split_text`
//! and swaps the middle piece for a `<mark>` overlay holding it, leaving
//! an up-to-three-child fragment (left text, overlay, right text); the
//! overlay carries the highlight id as an attribute and the styling
//! class. Unwrapping replaces the overlay with a single text node and
//! coalesces adjacent text siblings, so wrap followed by remove is a
//! textual identity.

use tidemark_core::{Document, NodeId, NodeType, TextRange};

/// Attribute carrying the owning highlight id on overlay elements.
pub const HIGHLIGHT_ID_ATTR: &str = "data-highlight-id";

/// Class applied to overlays when the caller does not pick one.
pub const DEFAULT_HIGHLIGHT_CLASS: &str = "tidemark-highlight";

/// Bookkeeping for one overlay element, owned by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedElement {
    pub highlight_id: String,
    /// The overlay element inserted into the tree.
    pub overlay: NodeId,
    /// Identity of the original text node the segment came from.
    pub source: NodeId,
    /// Full content of the source node before the wrap.
    pub original_text: String,
    /// Start of the wrapped slice within `original_text`.
    pub start: usize,
    /// End of the wrapped slice within `original_text`.
    pub end: usize,
}

/// A per-node wrap failure. One failing node does not roll back the nodes
/// that already wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapFailure {
    pub node: NodeId,
    pub reason: String,
}

/// Result of wrapping one range: the overlays created plus any per-node
/// failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapOutcome {
    pub wrapped: Vec<WrappedElement>,
    pub failures: Vec<WrapFailure>,
}

impl WrapOutcome {
    pub fn fully_succeeded(&self) -> bool {
        self.failures.is_empty() && !self.wrapped.is_empty()
    }
}

/// One (node, local start, local end) slice of a range.
struct Segment {
    node: NodeId,
    start: usize,
    end: usize,
}

/// Stateless tree surgery for highlights. All bookkeeping lives with the
/// caller (the renderer's active map).
pub struct TextWrapper;

impl TextWrapper {
    /// Wraps every text node the range intersects. Interior nodes are
    /// wrapped whole; the first and last use the range's own offsets.
    pub fn wrap_range(
        doc: &mut Document,
        range: &TextRange,
        highlight_id: &str,
        class: &str,
    ) -> WrapOutcome {
        let mut outcome = WrapOutcome::default();

        // collect all segments before the first mutation; wrapping one node
        // must not shift the others
        let mut segments = Vec::new();
        let nodes = range.text_nodes_within(doc);
        let last = nodes.len().saturating_sub(1);
        for (i, node) in nodes.iter().enumerate() {
            let len = doc.text(*node).map(|s| s.len()).unwrap_or(0);
            let start = if i == 0 { range.start.offset } else { 0 };
            let end = if i == last { range.end.offset } else { len };
            if start < end {
                segments.push(Segment {
                    node: *node,
                    start,
                    end,
                });
            }
        }

        for segment in segments {
            match Self::wrap_segment(doc, &segment, highlight_id, class) {
                Ok(wrapped) => outcome.wrapped.push(wrapped),
                Err(reason) => {
                    log::warn!(
                        "failed to wrap text node {} for highlight {}: {}",
                        segment.node,
                        highlight_id,
                        reason
                    );
                    outcome.failures.push(WrapFailure {
                        node: segment.node,
                        reason,
                    });
                }
            }
        }
        outcome
    }

    fn wrap_segment(
        doc: &mut Document,
        segment: &Segment,
        highlight_id: &str,
        class: &str,
    ) -> Result<WrappedElement, String> {
        let text = doc
            .text(segment.node)
            .ok_or_else(|| "not a text node".to_string())?
            .to_string();
        let parent = doc
            .parent(segment.node)
            .ok_or_else(|| "text node has no parent".to_string())?;
        if segment.end > text.len()
            || !text.is_char_boundary(segment.start)
            || !text.is_char_boundary(segment.end)
        {
            return Err(format!(
                "offsets {}..{} invalid for node of length {}",
                segment.start,
                segment.end,
                text.len()
            ));
        }

        // split once at the segment start, then split the right half at
        // the segment length; the middle node is what gets wrapped
        let middle = if segment.start > 0 {
            let (_, right) = doc
                .split_text(segment.node, segment.start)
                .map_err(|e| e.to_string())?;
            right
        } else {
            segment.node
        };
        if segment.end < text.len() {
            doc.split_text(middle, segment.end - segment.start)
                .map_err(|e| e.to_string())?;
        }

        let overlay = doc.create_element(NodeType::Mark);
        doc.data_mut(overlay).add_class(class);
        doc.data_mut(overlay)
            .set_attribute(HIGHLIGHT_ID_ATTR, highlight_id);
        doc.replace_child(parent, middle, &[overlay])
            .map_err(|e| e.to_string())?;
        doc.append_child(overlay, middle)
            .map_err(|e| e.to_string())?;

        Ok(WrappedElement {
            highlight_id: highlight_id.to_string(),
            overlay,
            source: segment.node,
            original_text: text,
            start: segment.start,
            end: segment.end,
        })
    }

    /// Replaces every overlay with a single text node holding the overlay's
    /// text and coalesces adjacent text siblings. Returns how many overlays
    /// were actually removed.
    pub fn remove_highlights(doc: &mut Document, wrapped: &[WrappedElement]) -> usize {
        let mut removed = 0;
        for element in wrapped {
            let Some(parent) = doc.parent(element.overlay) else {
                // already unwrapped, e.g. by a merge pass
                log::trace!("overlay {} already detached", element.overlay);
                continue;
            };
            let text = doc.text_content(element.overlay);
            let replacement = doc.create_text(&text);
            if doc
                .replace_child(parent, element.overlay, &[replacement])
                .is_err()
            {
                continue;
            }
            coalesce_around(doc, replacement);
            removed += 1;
        }
        removed
    }

    /// Swaps the styling class on every overlay, leaving children alone.
    pub fn update_styling(
        doc: &mut Document,
        wrapped: &[WrappedElement],
        old_class: &str,
        new_class: &str,
    ) {
        for element in wrapped {
            let data = doc.data_mut(element.overlay);
            data.remove_class(old_class);
            data.add_class(new_class);
        }
    }

    /// Merges overlay pairs of the same highlight that sit directly next to
    /// each other, concatenating their text and dropping the second.
    /// Returns the surviving bookkeeping entries.
    pub fn merge_adjacent(
        doc: &mut Document,
        wrapped: Vec<WrappedElement>,
    ) -> Vec<WrappedElement> {
        let mut result: Vec<WrappedElement> = Vec::with_capacity(wrapped.len());
        for element in wrapped {
            let absorbing = result.len().checked_sub(1).filter(|last| {
                result[*last].highlight_id == element.highlight_id
                    && doc.next_sibling(result[*last].overlay) == Some(element.overlay)
            });
            let Some(last) = absorbing else {
                result.push(element);
                continue;
            };
            let prev_overlay = result[last].overlay;
            let merged = format!(
                "{}{}",
                doc.text_content(prev_overlay),
                doc.text_content(element.overlay)
            );
            for child in doc.children(prev_overlay) {
                doc.detach(child);
            }
            let text = doc.create_text(&merged);
            let _ = doc.append_child(prev_overlay, text);
            doc.detach(element.overlay);
            if result[last].source == element.source {
                result[last].end = element.end;
            }
        }
        result
    }
}

/// Merges `node` with its directly adjacent text siblings.
fn coalesce_around(doc: &mut Document, node: NodeId) {
    let mut content = doc.text(node).unwrap_or("").to_string();

    if let Some(prev) = doc.previous_sibling(node) {
        if let Some(prev_text) = doc.text(prev) {
            content = format!("{}{}", prev_text, content);
            doc.detach(prev);
        }
    }
    if let Some(next) = doc.next_sibling(node) {
        if let Some(next_text) = doc.text(next) {
            content.push_str(next_text);
            doc.detach(next);
        }
    }

    if let Some(parent) = doc.parent(node) {
        let merged = doc.create_text(&content);
        let _ = doc.replace_child(parent, node, &[merged]);
    }
}

//! Absolute character offsets within an enclosing container.
//!
//! The offset strategy describes a selection as "N characters into the
//! container's text, M characters long". It survives restructuring that
//! keeps the text intact (wrapping a paragraph in a new element, splitting
//! a text node) but not edits that shift the text before the selection.

use tidemark_core::{Document, NodeId, TextEndpoint, TextRange};

/// Total character offset of `endpoint` within `container`, computed by
/// summing the lengths of all text nodes preceding the endpoint's node in an
/// in-order walk, plus the intra-node offset. `None` if the endpoint does
/// not lie inside the container.
pub fn absolute_offset(doc: &Document, container: NodeId, endpoint: &TextEndpoint) -> Option<usize> {
    let mut total = 0usize;
    for t in doc.text_nodes_in_subtree(container) {
        if t == endpoint.node {
            return Some(total + endpoint.offset);
        }
        total += doc.text(t).map(|s| s.len()).unwrap_or(0);
    }
    None
}

/// Maps an absolute `(start, len)` span back onto the container's text
/// nodes and returns the corresponding range.
///
/// The start container is the first text node whose cumulative end exceeds
/// `start`; the end container is found the same way for `start + len`.
/// Fails when the span reaches past the container's total text length or
/// when either computed offset falls off a character boundary.
pub fn range_at_offset(
    doc: &Document,
    container: NodeId,
    start: usize,
    len: usize,
) -> Option<TextRange> {
    if len == 0 {
        return None;
    }
    let end = start.checked_add(len)?;

    let mut start_ep: Option<TextEndpoint> = None;
    let mut end_ep: Option<TextEndpoint> = None;
    let mut running = 0usize;

    for t in doc.text_nodes_in_subtree(container) {
        let node_len = doc.text(t).map(|s| s.len()).unwrap_or(0);
        let node_end = running + node_len;
        if start_ep.is_none() && node_end > start {
            start_ep = Some(TextEndpoint::new(t, start - running));
        }
        if end_ep.is_none() && node_end >= end && end > running {
            end_ep = Some(TextEndpoint::new(t, end - running));
        }
        running = node_end;
        if start_ep.is_some() && end_ep.is_some() {
            break;
        }
    }

    let (s, e) = (start_ep?, end_ep?);
    TextRange::new(doc, s, e).ok()
}

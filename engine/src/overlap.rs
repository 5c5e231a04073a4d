//! Spatial overlap detection and per-highlight opacity resolution.
//!
//! Two highlights overlap when their document-order character extents
//! intersect and they share at least one text node in the current tree.
//! Overlapping highlights are unioned into groups; within a group, stack
//! order is priority descending then creation time ascending, and each
//! level down the stack loses one opacity step.

use std::collections::BTreeSet;

use tidemark_anchor::absolute_offset;
use tidemark_core::{Document, NodeId, TextEndpoint};

use crate::wrapper::WrappedElement;

/// Class prefix for computed opacity classes; the numeric suffix is the
/// opacity in percent.
pub const OPACITY_CLASS_PREFIX: &str = "tidemark-opacity-";

/// Opacity ladder parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacityScale {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for OpacityScale {
    fn default() -> Self {
        Self {
            min: 0.30,
            max: 0.90,
            step: 0.15,
        }
    }
}

/// Everything the overlap pass needs to know about one active highlight.
#[derive(Debug, Clone)]
pub struct OverlapInput {
    pub id: String,
    pub priority: i32,
    /// Creation time in epoch milliseconds; breaks priority ties.
    pub created_ms: i64,
    /// Document-order character interval covered by the highlight.
    pub extent: (usize, usize),
    /// Text nodes currently under the highlight's overlays.
    pub text_nodes: BTreeSet<NodeId>,
}

/// The spatial extent of one highlight in the current tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightExtent {
    pub start: usize,
    pub end: usize,
    pub text_nodes: BTreeSet<NodeId>,
}

/// Computes a highlight's extent from its overlays. `None` when every
/// overlay has been detached from the tree.
pub fn compute_extent(doc: &Document, wrapped: &[WrappedElement]) -> Option<HighlightExtent> {
    let mut extent: Option<HighlightExtent> = None;
    for element in wrapped {
        let texts = doc.text_nodes_in_subtree(element.overlay);
        let first = match texts.first() {
            Some(first) => *first,
            None => continue,
        };
        let start = match absolute_offset(doc, doc.root(), &TextEndpoint::new(first, 0)) {
            Some(start) => start,
            None => continue,
        };
        let end = start + doc.text_len(element.overlay);
        let acc = extent.get_or_insert_with(|| HighlightExtent {
            start,
            end,
            text_nodes: BTreeSet::new(),
        });
        acc.start = acc.start.min(start);
        acc.end = acc.end.max(end);
        acc.text_nodes.extend(texts);
    }
    extent
}

/// A maximal set of mutually connected overlapping highlights, as indices
/// into the input slice, plus the group's combined extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapGroup {
    pub members: Vec<usize>,
    pub extent: (usize, usize),
}

/// Pair-tests all active highlights and unions the overlapping ones.
/// Every highlight lands in exactly one group; non-overlapping highlights
/// form singleton groups.
pub fn detect_overlaps(inputs: &[OverlapInput]) -> Vec<OverlapGroup> {
    let mut uf = UnionFind::new(inputs.len());
    for a in 0..inputs.len() {
        for b in (a + 1)..inputs.len() {
            if overlaps(&inputs[a], &inputs[b]) {
                uf.union(a, b);
            }
        }
    }

    let mut groups: Vec<OverlapGroup> = Vec::new();
    let mut root_to_group: Vec<Option<usize>> = vec![None; inputs.len()];
    for i in 0..inputs.len() {
        let root = uf.find(i);
        let slot = match root_to_group[root] {
            Some(slot) => slot,
            None => {
                groups.push(OverlapGroup {
                    members: Vec::new(),
                    extent: inputs[i].extent,
                });
                root_to_group[root] = Some(groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[slot];
        group.members.push(i);
        group.extent.0 = group.extent.0.min(inputs[i].extent.0);
        group.extent.1 = group.extent.1.max(inputs[i].extent.1);
    }
    groups
}

fn overlaps(a: &OverlapInput, b: &OverlapInput) -> bool {
    let spans_intersect = a.extent.0 < b.extent.1 && b.extent.0 < a.extent.1;
    spans_intersect && a.text_nodes.intersection(&b.text_nodes).next().is_some()
}

/// Assigns an opacity to every member of a group.
///
/// Members are stacked by priority descending, creation time ascending;
/// the k-th member gets `max(min, max - (k-1) * step)` plus a bounded
/// priority boost, clamped back into `[min, max]`. Returned in stack
/// order.
pub fn resolve_overlap_group(
    group: &OverlapGroup,
    inputs: &[OverlapInput],
    scale: &OpacityScale,
) -> Vec<(usize, f32)> {
    let mut order = group.members.clone();
    order.sort_by(|x, y| {
        inputs[*y]
            .priority
            .cmp(&inputs[*x].priority)
            .then(inputs[*x].created_ms.cmp(&inputs[*y].created_ms))
    });

    order
        .into_iter()
        .enumerate()
        .map(|(k, idx)| {
            let base = (scale.max - k as f32 * scale.step).max(scale.min);
            let boost = (0.1 * inputs[idx].priority as f32).min(0.2);
            let opacity = (base + boost).clamp(scale.min, scale.max);
            (idx, opacity)
        })
        .collect()
}

/// The class name encoding an opacity, e.g. `tidemark-opacity-75`.
pub fn opacity_class(opacity: f32) -> String {
    format!("{}{}", OPACITY_CLASS_PREFIX, (opacity * 100.0).round() as u32)
}

/// Replaces any previous opacity class on the highlight's overlays with
/// the computed one.
pub fn apply_opacity_class(doc: &mut Document, wrapped: &[WrappedElement], class: &str) {
    for element in wrapped {
        let data = doc.data_mut(element.overlay);
        data.remove_classes_where(|c| c.starts_with(OPACITY_CLASS_PREFIX));
        data.add_class(class);
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str, extent: (usize, usize), nodes: &[NodeId], created_ms: i64) -> OverlapInput {
        OverlapInput {
            id: id.to_string(),
            priority: 0,
            created_ms,
            extent,
            text_nodes: nodes.iter().copied().collect(),
        }
    }

    fn some_nodes() -> Vec<NodeId> {
        // real node ids out of a scratch hierarchy
        let mut h = tidemark_core::NodeHierarchy::new();
        (0..4).map(|_| h.new_node()).collect()
    }

    #[test]
    fn test_disjoint_highlights_form_singletons() {
        let n = some_nodes();
        let inputs = vec![
            input("a", (0, 10), &n[0..1], 1),
            input("b", (20, 30), &n[1..2], 2),
        ];
        let groups = detect_overlaps(&inputs);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.members.len() == 1));
    }

    #[test]
    fn test_interval_overlap_without_shared_node_is_not_overlap() {
        let n = some_nodes();
        let inputs = vec![
            input("a", (0, 10), &n[0..1], 1),
            input("b", (5, 15), &n[1..2], 2),
        ];
        assert_eq!(detect_overlaps(&inputs).len(), 2);
    }

    #[test]
    fn test_transitive_grouping() {
        let n = some_nodes();
        // a-b overlap, b-c overlap, a-c do not; still one group
        let inputs = vec![
            input("a", (0, 10), &n[0..2], 1),
            input("b", (8, 20), &n[1..3], 2),
            input("c", (18, 30), &n[2..4], 3),
        ];
        let groups = detect_overlaps(&inputs);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 3);
        assert_eq!(groups[0].extent, (0, 30));
    }

    #[test]
    fn test_stack_opacities_match_ladder() {
        let n = some_nodes();
        let inputs = vec![
            input("a", (0, 10), &n[0..1], 100),
            input("b", (0, 10), &n[0..1], 200),
            input("c", (0, 10), &n[0..1], 300),
        ];
        let groups = detect_overlaps(&inputs);
        assert_eq!(groups.len(), 1);
        let resolved = resolve_overlap_group(&groups[0], &inputs, &OpacityScale::default());
        let by_id: Vec<(&str, f32)> = resolved
            .iter()
            .map(|(idx, o)| (inputs[*idx].id.as_str(), *o))
            .collect();
        assert_eq!(by_id[0], ("a", 0.90));
        assert!((by_id[1].1 - 0.75).abs() < 1e-6);
        assert!((by_id[2].1 - 0.60).abs() < 1e-6);
    }

    #[test]
    fn test_priority_outranks_creation_time() {
        let n = some_nodes();
        let mut late_but_important = input("vip", (0, 10), &n[0..1], 900);
        late_but_important.priority = 2;
        let inputs = vec![input("first", (0, 10), &n[0..1], 100), late_but_important];
        let groups = detect_overlaps(&inputs);
        let resolved = resolve_overlap_group(&groups[0], &inputs, &OpacityScale::default());
        assert_eq!(inputs[resolved[0].0].id, "vip");
        // boost is bounded, so the top slot stays within the scale
        assert!(resolved[0].1 <= 0.90);
    }

    #[test]
    fn test_opacities_never_increase_down_the_stack() {
        let n = some_nodes();
        let inputs: Vec<_> = (0..6)
            .map(|i| input(&format!("h{}", i), (0, 10), &n[0..1], i as i64))
            .collect();
        let groups = detect_overlaps(&inputs);
        let resolved = resolve_overlap_group(&groups[0], &inputs, &OpacityScale::default());
        for pair in resolved.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        // the ladder bottoms out at the configured minimum
        assert!((resolved.last().unwrap().1 - 0.30).abs() < 1e-6);
    }

    #[test]
    fn test_opacity_class_rendering() {
        assert_eq!(opacity_class(0.90), "tidemark-opacity-90");
        assert_eq!(opacity_class(0.75), "tidemark-opacity-75");
        assert_eq!(opacity_class(0.3), "tidemark-opacity-30");
    }
}

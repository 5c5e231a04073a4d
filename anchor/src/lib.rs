//! Durable text anchors for the tidemark annotation engine.
//!
//! An anchor is a location descriptor that can re-identify a span of text
//! after the surrounding document has been edited, re-rendered or partially
//! restructured. Creation captures three redundant descriptions of the same
//! span (a structural path, an absolute offset, and the text itself with its
//! surrounding context); resolution tries them in order of precision:
//!
//! 1. **Path** - resolve the stored node path and look for the exact text
//!    near the recorded offset.
//! 2. **Offset** - re-discover the enclosing container and take the span at
//!    the recorded absolute offset.
//! 3. **Fuzzy** - search the whole document text for the best
//!    bounded-edit-distance match of context + text + context.
//!
//! All of this is synchronous and allocation-light; no strategy suspends.

pub mod anchor;
pub mod checksum;
pub mod fuzzy;
pub mod offset;
pub mod path;

pub use anchor::{
    create_anchor, resolve_anchor, validate_anchor, Anchor, AnchorConfig, AnchorError,
    AnchorStrategy, ResolvedAnchor,
};
pub use checksum::context_checksum;
pub use fuzzy::{find_best_match, normalize_whitespace, similarity, FuzzyMatch};
pub use offset::{absolute_offset, range_at_offset};
pub use path::{NodePath, PathError, PathStep};

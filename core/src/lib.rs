//! Shared document tree datatypes for the tidemark annotation engine.
//!
//! The crate holds the arena-backed node hierarchy, the element/text node
//! model and the text-range type that every other tidemark crate builds on.
//! Nothing in here performs I/O and nothing suspends; the tree is mutated
//! exclusively through the `Document` API.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod dom;
pub mod id_tree;
pub mod range;

pub use dom::{Document, DomError, IdOrClass, NodeData, NodeType};
pub use id_tree::{Node, NodeHierarchy, NodeId};
pub use range::{RangeError, TextEndpoint, TextRange};

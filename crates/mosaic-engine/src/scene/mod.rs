//! Retained display tree consumed by the batch renderer and cache manager.
//!
//! Nodes carry already-resolved transforms and a closed render style
//! ([`NodeKind`]); the renderer never inspects anything else about them.

mod frame;
mod node;
mod tree;

pub use frame::{Frame, UvRect};
pub use node::{Node, NodeKind, RawImage, TextLeaf, Transform};
pub use tree::{NodeId, Scene};

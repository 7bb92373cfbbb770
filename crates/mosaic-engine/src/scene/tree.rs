use std::fmt;

use crate::error::{RenderError, Result};

use super::Node;

/// Generational handle to a node stored in a [`Scene`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena owning every node of one display tree.
///
/// Parents own their children: removing a node frees its whole subtree and
/// invalidates every id inside it.
pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Creates a scene with an empty root container.
    pub fn new() -> Self {
        let mut scene = Self { slots: Vec::new(), free: Vec::new(), root: NodeId { index: 0, generation: 0 } };
        scene.root = scene.alloc(Node::container());
        scene
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    /// Appends `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> Result<NodeId> {
        if !self.contains(parent) {
            return Err(RenderError::UnknownNode(parent));
        }
        let id = self.alloc(node);
        if let Some(n) = self.get_mut(id) {
            n.parent = Some(parent);
        }
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        Ok(id)
    }

    /// Shorthand for `add_child(self.root(), node)`.
    pub fn add(&mut self, node: Node) -> NodeId {
        let root = self.root;
        let id = self.alloc(node);
        if let Some(n) = self.get_mut(id) {
            n.parent = Some(root);
        }
        if let Some(r) = self.get_mut(root) {
            r.children.push(id);
        }
        id
    }

    /// Children of `id` in paint order (empty for unknown ids).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Removes `id` and its subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) {
            return false;
        }
        if let Some(parent) = self.get(id).and_then(|n| n.parent) {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }

        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let slot = &mut self.slots[next.index as usize];
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(next.index);
            }
        }
        true
    }

    /// Ids of `id` and all its descendants, depth-first pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !self.contains(next) {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, node: Some(node) });
            NodeId { index, generation: 0 }
        }
    }
}

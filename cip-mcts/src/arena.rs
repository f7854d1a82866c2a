//! Arena-backed tree storage.
//!
//! Nodes are only ever appended; a `NodeId` stays valid for the arena's lifetime. Parent
//! links are plain ids, so ownership runs strictly root -> children.

use crate::node::{Node, NodeId};

pub const ROOT: NodeId = 0;

pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    /// A fresh arena holding only the root.
    pub fn with_root() -> Self {
        Self {
            nodes: vec![Node::root()],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is created with the arena and never removed.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    /// Append `node` as the last child of its parent.
    pub fn attach(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len() as NodeId;
        let parent = node.parent;
        self.nodes.push(node);
        if let Some(p) = parent {
            self.nodes[p as usize].children.push(id);
        }
        id
    }

    /// Ids from `id` up to and including the root.
    pub fn ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut cur = self.get(id).parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.get(p).parent;
        }
        out
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::with_root()
    }
}

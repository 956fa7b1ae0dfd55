use std::ops::{Index, IndexMut};

use super::node::RidbagNode;

/// Stable reference to a node owned by a bag's [`NodeArena`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeHandle(u32);

/// Owns every node of one bag. Chain, free list and lookup table refer to
/// nodes by handle only.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    slots: Vec<Option<RidbagNode>>,
    vacant: Vec<u32>,
}

impl NodeArena {
    pub fn insert(&mut self, node: RidbagNode) -> NodeHandle {
        if let Some(idx) = self.vacant.pop() {
            self.slots[idx as usize] = Some(node);
            return NodeHandle(idx);
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Some(node));
        NodeHandle(idx)
    }

    pub fn remove(&mut self, handle: NodeHandle) -> Option<RidbagNode> {
        let node = self.slots.get_mut(handle.0 as usize)?.take();
        if node.is_some() {
            self.vacant.push(handle.0);
        }
        node
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&RidbagNode> {
        self.slots.get(handle.0 as usize)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }
}

impl Index<NodeHandle> for NodeArena {
    type Output = RidbagNode;

    fn index(&self, handle: NodeHandle) -> &RidbagNode {
        match self.slots.get(handle.0 as usize) {
            Some(Some(node)) => node,
            _ => panic!("stale node handle {handle:?}"),
        }
    }
}

impl IndexMut<NodeHandle> for NodeArena {
    fn index_mut(&mut self, handle: NodeHandle) -> &mut RidbagNode {
        match self.slots.get_mut(handle.0 as usize) {
            Some(Some(node)) => node,
            _ => panic!("stale node handle {handle:?}"),
        }
    }
}

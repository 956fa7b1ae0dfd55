use std::collections::VecDeque;

use super::arena::{NodeArena, NodeHandle};

/// Ordered list of nodes holding live entries. The tail, once installed,
/// stays the last element; every other node is inserted before it.
#[derive(Debug, Default)]
pub(crate) struct NodeChain {
    nodes: Vec<NodeHandle>,
    tail: Option<NodeHandle>,
    active: Option<NodeHandle>,
}

impl NodeChain {
    pub fn tail(&self) -> Option<NodeHandle> {
        self.tail
    }

    pub fn active(&self) -> Option<NodeHandle> {
        self.active
    }

    pub fn set_active(&mut self, active: Option<NodeHandle>) {
        debug_assert!(active.is_none() || active != self.tail);
        self.active = active;
    }

    pub fn install_tail(&mut self, handle: NodeHandle) {
        debug_assert!(self.tail.is_none());
        self.nodes.push(handle);
        self.tail = Some(handle);
    }

    pub fn insert_before_tail(&mut self, handle: NodeHandle) {
        match self.tail {
            Some(_) => {
                let at = self.nodes.len() - 1;
                self.nodes.insert(at, handle);
            }
            None => self.nodes.push(handle),
        }
    }

    /// Unlinks a non-tail node. Clears the active reference when it pointed there.
    pub fn detach(&mut self, handle: NodeHandle) -> bool {
        debug_assert!(Some(handle) != self.tail);
        let Some(at) = self.nodes.iter().position(|h| *h == handle) else {
            return false;
        };
        self.nodes.remove(at);
        if self.active == Some(handle) {
            self.active = None;
        }
        true
    }

    pub fn get(&self, at: usize) -> Option<NodeHandle> {
        self.nodes.get(at).copied()
    }

    pub fn handles(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.tail = None;
        self.active = None;
    }

    /// Rebuilds a chain from decoded parts, moving the tail to the end.
    pub fn from_parts(
        mut nodes: Vec<NodeHandle>,
        tail: Option<NodeHandle>,
        active: Option<NodeHandle>,
    ) -> Self {
        if let Some(tail) = tail {
            if let Some(at) = nodes.iter().position(|h| *h == tail) {
                nodes.remove(at);
            }
            nodes.push(tail);
        }
        Self {
            nodes,
            tail,
            active,
        }
    }
}

/// Empty nodes detached from the chain, reused before new storage is allocated.
#[derive(Debug, Default)]
pub(crate) struct FreeNodeRegistry {
    queue: VecDeque<NodeHandle>,
}

impl FreeNodeRegistry {
    pub fn push(&mut self, handle: NodeHandle) {
        self.queue.push_back(handle);
    }

    /// Removes and returns the oldest free node with room for `capacity` entries.
    pub fn take_fitting(&mut self, capacity: usize, arena: &NodeArena) -> Option<NodeHandle> {
        let at = self
            .queue
            .iter()
            .position(|h| arena.get(*h).map_or(false, |n| n.capacity() >= capacity))?;
        self.queue.remove(at)
    }

    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.queue.iter().copied()
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.queue.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

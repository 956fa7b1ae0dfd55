use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::types::Rid;

use super::arena::NodeHandle;

/// Maps a rid to the nodes holding it, one handle per stored instance.
///
/// A table built from decoded metadata starts stale: node payloads have not
/// been read yet, so it must be rebuilt before the first lookup.
///
/// Records stored without an identity are only counted. While any are
/// present a miss is not conclusive, since such a record may have been
/// assigned an identity after it was stored.
#[derive(Debug, Default)]
pub(crate) struct LookupTable {
    map: FxHashMap<Rid, SmallVec<[NodeHandle; 2]>>,
    unindexed: usize,
    stale: bool,
}

impl LookupTable {
    pub fn stale() -> Self {
        Self {
            map: FxHashMap::default(),
            unindexed: 0,
            stale: true,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn note_unindexed(&mut self) {
        self.unindexed += 1;
    }

    pub fn forget_unindexed(&mut self) {
        self.unindexed = self.unindexed.saturating_sub(1);
    }

    pub fn has_unindexed(&self) -> bool {
        self.unindexed > 0
    }

    pub fn insert(&mut self, rid: Rid, handle: NodeHandle) {
        self.map.entry(rid).or_default().push(handle);
    }

    /// Drops one instance of `rid` recorded against `handle`.
    pub fn remove_one(&mut self, rid: Rid, handle: NodeHandle) {
        if let Some(handles) = self.map.get_mut(&rid) {
            if let Some(at) = handles.iter().position(|h| *h == handle) {
                handles.swap_remove(at);
            }
            if handles.is_empty() {
                self.map.remove(&rid);
            }
        }
    }

    /// Records that one instance of `rid` moved from `from` to `to`.
    pub fn relocate(&mut self, rid: Rid, from: NodeHandle, to: NodeHandle) {
        if let Some(handles) = self.map.get_mut(&rid) {
            if let Some(slot) = handles.iter_mut().find(|h| **h == from) {
                *slot = to;
            }
        }
    }

    pub fn find(&self, rid: Rid) -> Option<NodeHandle> {
        self.map.get(&rid).and_then(|handles| handles.first().copied())
    }

    /// Number of stored instances of `rid`.
    pub fn count(&self, rid: Rid) -> usize {
        self.map.get(&rid).map_or(0, |handles| handles.len())
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.unindexed = 0;
        self.stale = false;
    }
}

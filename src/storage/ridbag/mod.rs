//! Page-backed multiset of record references.
//!
//! Entries live in a chain of nodes, each stored as one record of a
//! [`ClusterStore`](crate::primitives::cluster::ClusterStore). New entries go
//! to the *active* node when one has room, otherwise to the *tail*, which
//! spills into a larger node once its page is full. Every [`MAX_NODE_SIZE`]
//! insertions the under-filled nodes are consolidated ("mega-merge") and the
//! emptied ones are recycled through a free list or released, depending on
//! the [`RelaxPolicy`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::primitives::cluster::StoreError;
use crate::types::{ClusterPos, Identifiable, Record, RecordType, Result, Rid, RidBagError};

use super::options::{RelaxPolicy, RidBagOptions};

mod arena;
mod chain;
mod changes;
mod codec;
mod iter;
mod lookup;
mod node;
mod owner;

pub use arena::NodeHandle;
pub use changes::{ChangeEvent, ChangeKind, ChangeListener, ChangeLog};
pub use codec::EncodeMode;
pub use iter::RidBagIter;
pub use node::{NodeKind, ADDITIONAL_ALLOCATION_SIZE, MAX_NODE_SIZE, MIN_ARRAY_NODE_SIZE};
pub use owner::{NoopTracker, RecordLoader, RecordTracker};

use arena::NodeArena;
use chain::{FreeNodeRegistry, NodeChain};
use changes::Listeners;
use lookup::LookupTable;
use node::RidbagNode;

/// Wraps a store error, logging it first.
pub(crate) fn storage_fault(
    op: &'static str,
    pos: ClusterPos,
) -> impl FnOnce(StoreError) -> RidBagError {
    move |source| {
        error!(op, pos = pos.0, error = %source, "ridbag.storage_fault");
        RidBagError::Storage { op, pos, source }
    }
}

/// Node layout summary for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainStats {
    /// Nodes in the chain, tail included.
    pub chain_nodes: usize,
    /// Nodes waiting in the free list.
    pub free_nodes: usize,
    /// Chain nodes holding [`MAX_NODE_SIZE`] entries.
    pub max_size_full_nodes: usize,
    /// Sum of chain node capacities.
    pub chain_capacity: usize,
    /// Position of the tail node.
    pub tail: Option<ClusterPos>,
    /// Position of the active node.
    pub active: Option<ClusterPos>,
    /// Chain positions in chain order.
    pub chain_positions: Vec<ClusterPos>,
    /// Free positions in queue order.
    pub free_positions: Vec<ClusterPos>,
}

/// A multiset of record references stored as a chain of page-backed nodes.
///
/// A bag has a single writer; every operation that may read node payloads
/// takes `&mut self`.
pub struct RidBag {
    options: RidBagOptions,
    size: usize,
    arena: NodeArena,
    chain: NodeChain,
    free: FreeNodeRegistry,
    lookup: Option<LookupTable>,
    owner: Option<Arc<dyn Record>>,
    listeners: Listeners,
    auto_convert_to_record: bool,
    /// Set when the consolidation due after an insert failed; the next
    /// insert runs it before changing anything.
    merge_pending: bool,
}

impl RidBag {
    /// Creates an empty bag. No storage is allocated until the first insertion.
    pub fn new(options: RidBagOptions) -> Self {
        let lookup = options.lookup_table.then(LookupTable::default);
        let auto_convert_to_record = options.auto_convert_to_record;
        Self {
            options,
            size: 0,
            arena: NodeArena::default(),
            chain: NodeChain::default(),
            free: FreeNodeRegistry::default(),
            lookup,
            owner: None,
            listeners: Listeners::default(),
            auto_convert_to_record,
            merge_pending: false,
        }
    }

    /// The options this bag was created with.
    pub fn options(&self) -> &RidBagOptions {
        &self.options
    }

    /// Number of stored entries, duplicates included.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true when the bag holds no entries.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Inserts one entry.
    ///
    /// A null link is rejected with [`RidBagError::InvalidArgument`] before any
    /// state changes.
    ///
    /// Once the entry is stored the call succeeds. A consolidation that fails
    /// after the insert is logged and retried at the start of the next `add`,
    /// where a second failure is returned before the new entry is placed.
    pub fn add(&mut self, value: Identifiable) -> Result<()> {
        if let Identifiable::Link(rid) = &value {
            if rid.is_null() {
                return Err(RidBagError::InvalidArgument(
                    "cannot add a null link to a ridbag".into(),
                ));
            }
        }
        if self.merge_pending {
            self.mega_merge(self.options.relax_policy)?;
            self.merge_pending = false;
        }
        let tail = self.ensure_tail()?;
        self.drop_full_active();

        let placed = match self.chain.active() {
            Some(active) => {
                self.load_node(active)?;
                self.arena[active].add(value.clone())?;
                trace!(pos = self.arena[active].pos().0, "ridbag.add.active");
                active
            }
            None => self.add_via_tail(tail, value.clone())?,
        };

        self.size += 1;
        if let Some(table) = self.lookup.as_mut() {
            match value.rid() {
                Some(rid) => table.insert(rid, placed),
                None => table.note_unindexed(),
            }
        }
        self.drop_full_active();
        if let Some(owner) = &self.owner {
            self.options.tracker.track(owner, &value);
        }
        self.listeners.fire(&ChangeEvent::add(value));

        if self.size % MAX_NODE_SIZE == 0 {
            if let Err(err) = self.mega_merge(self.options.relax_policy) {
                warn!(size = self.size, error = %err, "ridbag.mega_merge.deferred");
                self.merge_pending = true;
            }
        }
        Ok(())
    }

    /// Inserts every entry in order, stopping at the first failure.
    pub fn add_all<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = Identifiable>,
    {
        for value in values {
            self.add(value)?;
        }
        Ok(())
    }

    /// Removes one instance of `value`. Returns whether anything was removed.
    pub fn remove(&mut self, value: &Identifiable) -> Result<bool> {
        let Some(handle) = self.locate(value)? else {
            return Ok(false);
        };
        if !self.arena[handle].remove(value)? {
            return Ok(false);
        }
        self.size -= 1;
        if let Some(table) = self.lookup.as_mut() {
            match value.rid() {
                Some(rid) => table.remove_one(rid, handle),
                None => table.forget_unindexed(),
            }
        }

        if Some(handle) != self.chain.tail() {
            if self.arena[handle].current_index() == 0 {
                self.chain.detach(handle);
                self.relax_node(handle, self.options.relax_policy);
            } else if self.chain.active().is_none() {
                self.chain.set_active(Some(handle));
            }
        }

        if let Some(owner) = &self.owner {
            self.options.tracker.untrack(owner, value);
        }
        self.listeners.fire(&ChangeEvent::remove(value.clone()));
        Ok(true)
    }

    /// Returns true when at least one instance of `value` is stored.
    pub fn contains(&mut self, value: &Identifiable) -> Result<bool> {
        Ok(self.locate(value)?.is_some())
    }

    /// Registers a listener; it sees every later mutation.
    pub fn add_change_listener(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.add(listener);
    }

    /// Unregisters the given listener instance.
    pub fn remove_change_listener(&mut self, listener: &Arc<dyn ChangeListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Registered listeners, in notification order.
    pub fn change_listeners(&self) -> &[Arc<dyn ChangeListener>] {
        self.listeners.as_slice()
    }

    /// Whether [`RidBag::iter`] resolves links through the configured loader.
    pub fn is_auto_convert_to_record(&self) -> bool {
        self.auto_convert_to_record
    }

    /// Sets the auto-convert flag.
    pub fn set_auto_convert_to_record(&mut self, enabled: bool) {
        self.auto_convert_to_record = enabled;
    }

    /// Writes every modified node to the store. Returns the number of records written.
    pub fn flush(&mut self) -> Result<usize> {
        let handles: Vec<NodeHandle> = self
            .free
            .handles()
            .chain(self.chain.handles().iter().copied())
            .collect();
        let mut written = 0;
        for handle in handles {
            let node = &mut self.arena[handle];
            if node.flush(self.options.store.as_ref())? {
                trace!(
                    pos = node.pos().0,
                    entries = node.current_index(),
                    version = node.version(),
                    "ridbag.flush.node"
                );
                written += 1;
            }
        }
        Ok(written)
    }

    /// Deletes the records of every node, free ones included.
    ///
    /// Every node is attempted; the first failure is returned. The bag is
    /// empty afterwards.
    pub fn request_delete(&mut self) -> Result<()> {
        let handles: Vec<NodeHandle> = self
            .free
            .handles()
            .chain(self.chain.handles().iter().copied())
            .collect();
        let store = self.options.store.clone();
        let mut first_err = None;
        for handle in handles {
            let pos = self.arena[handle].pos();
            let outcome = store
                .physical_position_of(pos)
                .map_err(storage_fault("physical_position_of", pos))
                .and_then(|phys| {
                    store
                        .delete_record(phys.cluster_pos)
                        .map_err(storage_fault("delete", pos))
                });
            match outcome {
                Ok(()) => {
                    self.options.metrics.node_released();
                    debug!(pos = pos.0, "ridbag.release");
                }
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        self.arena = NodeArena::default();
        self.chain.clear();
        self.free.clear();
        self.size = 0;
        self.merge_pending = false;
        if let Some(table) = self.lookup.as_mut() {
            table.clear();
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Rebuilds the state this bag had before `events` were applied.
    ///
    /// The result shares this bag's store and options but has no listeners
    /// and no owner. Only [`ChangeKind::Add`] and [`ChangeKind::Remove`]
    /// events can be reverted.
    pub fn return_original_state(&mut self, events: &[ChangeEvent]) -> Result<RidBag> {
        let mut original = RidBag::new(self.options.clone());
        for entry in self.raw_iter() {
            original.add(entry?)?;
        }
        for event in events.iter().rev() {
            match event.kind {
                ChangeKind::Add => {
                    original.remove(&event.key)?;
                }
                ChangeKind::Remove => {
                    let value = event.old_value.clone().unwrap_or_else(|| event.key.clone());
                    original.add(value)?;
                }
                other => {
                    return Err(RidBagError::InvalidArgument(format!(
                        "unexpected change kind {other:?} while restoring original state"
                    )))
                }
            }
        }
        Ok(original)
    }

    /// Checks the structural invariants of the chain and free list.
    pub fn check_invariants(&self) -> Result<()> {
        let broken = |msg: String| Err(RidBagError::IllegalState(msg));
        let counted: usize = self
            .chain
            .handles()
            .iter()
            .map(|h| self.arena[*h].current_index())
            .sum();
        if counted != self.size {
            return broken(format!("size {} but nodes hold {counted}", self.size));
        }
        if let Some(tail) = self.chain.tail() {
            if self.chain.handles().last() != Some(&tail) {
                return broken("tail is not the last chain node".into());
            }
            if self.arena[tail].kind() != NodeKind::List {
                return broken("tail does not use the elastic layout".into());
            }
            if self.free.contains(tail) {
                return broken("tail is in the free list".into());
            }
        }
        if let Some(active) = self.chain.active() {
            if Some(active) == self.chain.tail() {
                return broken("active node is the tail".into());
            }
            if !self.chain.handles().contains(&active) {
                return broken("active node is not in the chain".into());
            }
        }
        for handle in self.free.handles() {
            let node = &self.arena[handle];
            if node.current_index() != 0 {
                return broken(format!("free node {} holds entries", node.pos()));
            }
            if self.chain.handles().contains(&handle) {
                return broken(format!("free node {} is still chained", node.pos()));
            }
        }
        for handle in self.chain.handles() {
            let node = &self.arena[*handle];
            if node.capacity() > MAX_NODE_SIZE || node.current_index() > node.capacity() {
                return broken(format!("node {} exceeds its capacity", node.pos()));
            }
        }
        Ok(())
    }

    /// Summarises the current node layout.
    pub fn chain_stats(&self) -> ChainStats {
        let pos = |h: NodeHandle| self.arena[h].pos();
        let chain = self.chain.handles();
        ChainStats {
            chain_nodes: chain.len(),
            free_nodes: self.free.len(),
            max_size_full_nodes: chain
                .iter()
                .filter(|h| self.arena[**h].is_max_size_full())
                .count(),
            chain_capacity: chain.iter().map(|h| self.arena[*h].capacity()).sum(),
            tail: self.chain.tail().map(pos),
            active: self.chain.active().map(pos),
            chain_positions: chain.iter().copied().map(pos).collect(),
            free_positions: self.free.handles().map(pos).collect(),
        }
    }

    fn ensure_tail(&mut self) -> Result<NodeHandle> {
        if let Some(tail) = self.chain.tail() {
            return Ok(tail);
        }
        let handle = self.create_node(1)?;
        self.chain.install_tail(handle);
        Ok(handle)
    }

    fn drop_full_active(&mut self) {
        if let Some(active) = self.chain.active() {
            if self.arena[active].is_full() {
                self.chain.set_active(None);
            }
        }
    }

    fn create_node(&mut self, capacity: usize) -> Result<NodeHandle> {
        let pos = self
            .options
            .store
            .allocate_position(RecordType::RidbagNode)
            .map_err(storage_fault("allocate", ClusterPos::NONE))?;
        self.options.metrics.node_allocated();
        Ok(self.arena.insert(RidbagNode::new(pos, capacity)))
    }

    /// Hands out an empty node with room for `capacity` entries, preferring
    /// the free list over fresh storage.
    fn get_or_create_node(&mut self, capacity: usize) -> Result<NodeHandle> {
        let capacity = capacity.clamp(MIN_ARRAY_NODE_SIZE, MAX_NODE_SIZE);
        if let Some(handle) = self.free.take_fitting(capacity, &self.arena) {
            let node = &mut self.arena[handle];
            if node.current_index() != 0 {
                let msg = format!(
                    "free node {} holds {} entries",
                    node.pos(),
                    node.current_index()
                );
                self.free.push(handle);
                return Err(RidBagError::IllegalState(msg));
            }
            node.reset();
            self.options.metrics.node_recycled();
            debug!(pos = node.pos().0, capacity = node.capacity(), "ridbag.recycle");
            return Ok(handle);
        }
        self.create_node(capacity)
    }

    fn load_node(&mut self, handle: NodeHandle) -> Result<()> {
        let node = &mut self.arena[handle];
        if node.is_loaded() {
            return Ok(());
        }
        if node.load(self.options.store.as_ref())? {
            self.options.metrics.node_loaded();
            trace!(
                pos = node.pos().0,
                entries = node.current_index(),
                "ridbag.node.load"
            );
        }
        Ok(())
    }

    fn load_chain(&mut self) -> Result<()> {
        for at in 0..self.chain.len() {
            if let Some(handle) = self.chain.get(at) {
                self.load_node(handle)?;
            }
        }
        Ok(())
    }

    fn add_via_tail(&mut self, tail: NodeHandle, value: Identifiable) -> Result<NodeHandle> {
        self.load_node(tail)?;
        let node = &self.arena[tail];
        let pos = node.pos();
        let fits = node.current_index() < MAX_NODE_SIZE
            && self
                .options
                .store
                .check_fits(pos, node.projected_len(&value))
                .map_err(storage_fault("check_fits", pos))?;
        if fits {
            self.arena[tail].add(value)?;
            trace!(pos = pos.0, "ridbag.add.tail");
            return Ok(tail);
        }
        self.spill_tail(tail, value, self.options.relax_policy)
    }

    /// Moves the tail's entries into a grown node and resets the tail.
    fn spill_tail(
        &mut self,
        tail: NodeHandle,
        value: Identifiable,
        policy: RelaxPolicy,
    ) -> Result<NodeHandle> {
        let tail_pos = self.arena[tail].pos();
        let tail_size = self.arena[tail].current_index();
        let grow = (tail_size * 2)
            .min(tail_size + ADDITIONAL_ALLOCATION_SIZE)
            .min(MAX_NODE_SIZE);
        let extra = usize::from(grow < MAX_NODE_SIZE);
        let target = self.get_or_create_node(grow + extra)?;

        if policy == RelaxPolicy::Hard {
            if let Err(err) = self.release_storage(tail_pos) {
                self.free.push(target);
                return Err(err);
            }
        }

        let mut entries = self.arena[tail].take_entries()?;
        if let Some(table) = self.lookup.as_mut() {
            for rid in entries.iter().filter_map(Identifiable::rid) {
                table.relocate(rid, tail, target);
            }
        }
        self.chain.insert_before_tail(target);
        self.options.metrics.tail_spilled();
        debug!(
            tail = tail_pos.0,
            node = self.arena[target].pos().0,
            tail_size,
            capacity = grow + extra,
            "ridbag.grow"
        );

        if extra == 1 {
            entries.push(value);
            self.arena[target].add_all(entries)?;
            self.chain.set_active(Some(target));
            Ok(target)
        } else {
            self.arena[target].add_all(entries)?;
            self.arena[tail].add(value)?;
            Ok(tail)
        }
    }

    /// Consolidates every chain node that is not already a full max-size
    /// node into max-size nodes, relaxing the emptied ones under `policy`.
    fn mega_merge(&mut self, policy: RelaxPolicy) -> Result<()> {
        let candidates: Vec<NodeHandle> = self
            .chain
            .handles()
            .iter()
            .copied()
            .filter(|h| !self.arena[*h].is_max_size_full())
            .collect();
        for handle in &candidates {
            self.load_node(*handle)?;
        }
        let total: usize = candidates
            .iter()
            .map(|h| self.arena[*h].current_index())
            .sum();

        let mut targets = Vec::new();
        for capacity in merge_capacities(total) {
            match self.get_or_create_node(capacity) {
                Ok(handle) => targets.push(handle),
                Err(err) => {
                    for handle in targets {
                        self.free.push(handle);
                    }
                    return Err(err);
                }
            }
        }

        let mut t = 0;
        for source in &candidates {
            let entries = self.arena[*source].take_entries()?;
            for entry in entries {
                while t < targets.len() && self.arena[targets[t]].free_space() == 0 {
                    t += 1;
                }
                let target = *targets.get(t).ok_or_else(|| {
                    RidBagError::IllegalState("consolidation ran out of node capacity".into())
                })?;
                if let (Some(table), Some(rid)) = (self.lookup.as_mut(), entry.rid()) {
                    table.relocate(rid, *source, target);
                }
                self.arena[target].add(entry)?;
            }
        }

        self.chain.set_active(None);
        let tail = self.chain.tail();
        let mut released = 0;
        for handle in candidates {
            if Some(handle) == tail {
                // the tail stays chained; its record is re-created by the next flush
                if policy == RelaxPolicy::Hard {
                    let pos = self.arena[handle].pos();
                    match self.release_storage(pos) {
                        Ok(()) => released += 1,
                        Err(err) => warn!(pos = pos.0, error = %err, "ridbag.release.skipped"),
                    }
                }
                continue;
            }
            self.chain.detach(handle);
            if self.relax_node(handle, policy) {
                released += 1;
            }
        }
        for handle in &targets {
            self.chain.insert_before_tail(*handle);
        }

        self.options.metrics.mega_merge(total);
        debug!(
            entries = total,
            nodes = targets.len(),
            released,
            chain = self.chain.len(),
            free = self.free.len(),
            "ridbag.mega_merge"
        );
        Ok(())
    }

    /// Recycles or releases an emptied node that has left the chain. Returns
    /// true when its storage was released.
    ///
    /// A node whose record cannot be deleted is recycled instead, so a failed
    /// release never loses track of a stored record.
    fn relax_node(&mut self, handle: NodeHandle, policy: RelaxPolicy) -> bool {
        let pos = self.arena[handle].pos();
        if policy == RelaxPolicy::Hard {
            match self.release_storage(pos) {
                Ok(()) => {
                    self.arena.remove(handle);
                    return true;
                }
                Err(err) => warn!(pos = pos.0, error = %err, "ridbag.release.skipped"),
            }
        }
        self.arena[handle].reset();
        self.free.push(handle);
        debug!(pos = pos.0, "ridbag.recycle");
        false
    }

    fn release_storage(&self, pos: ClusterPos) -> Result<()> {
        self.options
            .store
            .delete_record(pos)
            .map_err(storage_fault("delete", pos))?;
        self.options.metrics.node_released();
        debug!(pos = pos.0, "ridbag.release");
        Ok(())
    }

    /// Finds the loaded node holding `value`.
    fn locate(&mut self, value: &Identifiable) -> Result<Option<NodeHandle>> {
        if let (true, Some(rid)) = (self.lookup.is_some(), value.rid()) {
            self.ensure_lookup()?;
            if let Some(handle) = self.locate_indexed(rid, value)? {
                return Ok(Some(handle));
            }
            // records stored without an identity may have gained one since
            let Some(table) = self.lookup.as_mut().filter(|t| t.has_unindexed()) else {
                return Ok(None);
            };
            table.mark_stale();
            self.ensure_lookup()?;
            return self.locate_indexed(rid, value);
        }
        for at in 0..self.chain.len() {
            let Some(handle) = self.chain.get(at) else {
                break;
            };
            self.load_node(handle)?;
            if self.arena[handle].contains(value)? {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    fn locate_indexed(&mut self, rid: Rid, value: &Identifiable) -> Result<Option<NodeHandle>> {
        let Some(handle) = self.lookup.as_ref().and_then(|t| t.find(rid)) else {
            return Ok(None);
        };
        self.load_node(handle)?;
        Ok(self.arena[handle].contains(value)?.then_some(handle))
    }

    /// Rebuilds a stale lookup table from the node payloads.
    fn ensure_lookup(&mut self) -> Result<()> {
        if !self.lookup.as_ref().map_or(false, LookupTable::is_stale) {
            return Ok(());
        }
        self.load_chain()?;
        let Some(table) = self.lookup.as_mut() else {
            return Ok(());
        };
        table.clear();
        for handle in self.chain.handles() {
            for entry in self.arena[*handle].entries()? {
                match entry.rid() {
                    Some(rid) => table.insert(rid, *handle),
                    None => table.note_unindexed(),
                }
            }
        }
        Ok(())
    }
}

/// Capacities of the nodes a consolidation of `total` entries fills.
fn merge_capacities(total: usize) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }
    if total <= MAX_NODE_SIZE {
        return vec![MAX_NODE_SIZE];
    }
    let mut capacities = vec![MAX_NODE_SIZE; total / MAX_NODE_SIZE];
    let rest = total % MAX_NODE_SIZE;
    if rest > 0 {
        capacities.push(rest.max(MIN_ARRAY_NODE_SIZE));
    }
    capacities
}

impl fmt::Debug for RidBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RidBag")
            .field("size", &self.size)
            .field("chain_nodes", &self.chain.len())
            .field("free_nodes", &self.free.len())
            .field("arena_nodes", &self.arena.len())
            .field("lookup_table", &self.lookup.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

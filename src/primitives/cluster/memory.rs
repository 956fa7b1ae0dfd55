use std::collections::HashSet;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use super::{
    ClusterStore, PhysicalPosition, RecordStatus, StoreError, StoreResult, DEFAULT_PAGE_SIZE,
};
use crate::types::{ClusterPos, RecordType};

/// Bytes of every page reserved for the record header.
pub const PAGE_OVERHEAD: usize = 32;

/// Store operations that can be targeted by fault injection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StoreOp {
    /// [`ClusterStore::allocate_position`]
    Allocate,
    /// [`ClusterStore::check_fits`]
    CheckFits,
    /// [`ClusterStore::create_record`]
    Create,
    /// [`ClusterStore::update_record`]
    Update,
    /// [`ClusterStore::read_record`]
    Read,
    /// [`ClusterStore::delete_record`]
    Delete,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::Allocate => "allocate",
            StoreOp::CheckFits => "check_fits",
            StoreOp::Create => "create",
            StoreOp::Update => "update",
            StoreOp::Read => "read",
            StoreOp::Delete => "delete",
        }
    }
}

#[derive(Debug)]
struct Slot {
    status: RecordStatus,
    bytes: Vec<u8>,
    version: u32,
    record_type: u8,
}

#[derive(Debug, Default)]
struct Inner {
    next_pos: i64,
    slots: FxHashMap<ClusterPos, Slot>,
    failing: HashSet<StoreOp>,
}

impl Inner {
    fn take_failure(&mut self, op: StoreOp) -> StoreResult<()> {
        if self.failing.remove(&op) {
            return Err(StoreError::Injected(op.name()));
        }
        Ok(())
    }

    fn slot_mut(&mut self, pos: ClusterPos) -> StoreResult<&mut Slot> {
        self.slots
            .get_mut(&pos)
            .ok_or(StoreError::UnknownPosition(pos))
    }
}

/// In-memory [`ClusterStore`].
///
/// Records larger than a page span several pages; [`ClusterStore::check_fits`]
/// only answers whether a record fits the single page backing a position.
/// Used by tests and by embedders that keep bags transient.
#[derive(Debug)]
pub struct MemClusterStore {
    page_size: u32,
    inner: Mutex<Inner>,
}

impl Default for MemClusterStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl MemClusterStore {
    /// Creates an empty store with the given page size.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Makes the next call of `op` fail with [`StoreError::Injected`].
    pub fn fail_next(&self, op: StoreOp) {
        self.inner.lock().failing.insert(op);
    }

    /// Number of positions currently holding a record.
    pub fn live_records(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values()
            .filter(|slot| slot.status == RecordStatus::Present)
            .count()
    }

    /// Number of positions handed out and not yet released.
    pub fn allocated_positions(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values()
            .filter(|slot| slot.status != RecordStatus::Removed)
            .count()
    }

    fn payload_capacity(&self) -> usize {
        (self.page_size as usize).saturating_sub(PAGE_OVERHEAD)
    }

    /// Pages the record at `pos` spans; 0 when nothing is stored.
    pub fn pages_spanned(&self, pos: ClusterPos) -> usize {
        let inner = self.inner.lock();
        match inner.slots.get(&pos) {
            Some(slot) if slot.status == RecordStatus::Present => {
                slot.bytes.len().div_ceil(self.payload_capacity().max(1)).max(1)
            }
            _ => 0,
        }
    }
}

impl ClusterStore for MemClusterStore {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn allocate_position(&self, record_type: RecordType) -> StoreResult<ClusterPos> {
        let mut inner = self.inner.lock();
        inner.take_failure(StoreOp::Allocate)?;
        let pos = ClusterPos(inner.next_pos);
        inner.next_pos += 1;
        inner.slots.insert(
            pos,
            Slot {
                status: RecordStatus::Allocated,
                bytes: Vec::new(),
                version: 0,
                record_type: record_type.as_u8(),
            },
        );
        trace!(pos = pos.0, "mem_store.allocate");
        Ok(pos)
    }

    fn check_fits(&self, pos: ClusterPos, byte_len: usize) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.take_failure(StoreOp::CheckFits)?;
        inner.slot_mut(pos)?;
        Ok(byte_len <= self.payload_capacity())
    }

    fn record_status(&self, pos: ClusterPos) -> StoreResult<RecordStatus> {
        let mut inner = self.inner.lock();
        Ok(inner.slot_mut(pos)?.status)
    }

    fn create_record(
        &self,
        pos: ClusterPos,
        bytes: &[u8],
        version: u32,
        record_type: RecordType,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.take_failure(StoreOp::Create)?;
        let slot = inner.slot_mut(pos)?;
        slot.status = RecordStatus::Present;
        slot.bytes = bytes.to_vec();
        slot.version = version;
        slot.record_type = record_type.as_u8();
        trace!(pos = pos.0, len = bytes.len(), version, "mem_store.create");
        Ok(())
    }

    fn update_record(
        &self,
        pos: ClusterPos,
        bytes: &[u8],
        version: u32,
        record_type: RecordType,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.take_failure(StoreOp::Update)?;
        let slot = inner.slot_mut(pos)?;
        if slot.status != RecordStatus::Present {
            return Err(StoreError::RecordMissing(pos));
        }
        slot.bytes = bytes.to_vec();
        slot.version = version;
        slot.record_type = record_type.as_u8();
        trace!(pos = pos.0, len = bytes.len(), version, "mem_store.update");
        Ok(())
    }

    fn read_record(&self, pos: ClusterPos) -> StoreResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.take_failure(StoreOp::Read)?;
        let slot = inner.slot_mut(pos)?;
        if slot.status != RecordStatus::Present {
            return Err(StoreError::RecordMissing(pos));
        }
        Ok(slot.bytes.clone())
    }

    fn delete_record(&self, pos: ClusterPos) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.take_failure(StoreOp::Delete)?;
        let slot = inner.slot_mut(pos)?;
        slot.status = RecordStatus::Removed;
        slot.bytes.clear();
        trace!(pos = pos.0, "mem_store.delete");
        Ok(())
    }

    fn physical_position_of(&self, pos: ClusterPos) -> StoreResult<PhysicalPosition> {
        let mut inner = self.inner.lock();
        let slot = inner.slot_mut(pos)?;
        Ok(PhysicalPosition {
            cluster_pos: pos,
            record_version: slot.version,
            record_size: slot.bytes.len(),
        })
    }
}

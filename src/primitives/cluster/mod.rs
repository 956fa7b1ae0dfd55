#![forbid(unsafe_code)]

mod memory;

pub use memory::{MemClusterStore, StoreOp, PAGE_OVERHEAD};

use crate::types::{ClusterPos, RecordType};

/// Default page size for stores that do not configure one.
pub const DEFAULT_PAGE_SIZE: u32 = 8192;

/// Lifecycle state of a position inside the store.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordStatus {
    /// Position reserved, no record written yet.
    Allocated,
    /// A record was written and later deleted.
    Removed,
    /// A record is currently stored at the position.
    Present,
}

/// Physical location details reported by the store for a position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhysicalPosition {
    /// Position the record is addressed by.
    pub cluster_pos: ClusterPos,
    /// Version of the stored record.
    pub record_version: u32,
    /// Size in bytes of the stored record (0 when none is present).
    pub record_size: usize,
}

/// Errors raised by a [`ClusterStore`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The position was never allocated.
    #[error("unknown position {0}")]
    UnknownPosition(ClusterPos),
    /// A read or update targeted a position without a stored record.
    #[error("no record stored at {0}")]
    RecordMissing(ClusterPos),
    /// Failure injected by a test harness.
    #[error("injected failure: {0}")]
    Injected(&'static str),
}

/// Result alias for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Paginated record store backing ridbag nodes.
///
/// All calls are synchronous and blocking; implementations own their retry
/// policy, callers never retry.
pub trait ClusterStore: Send + Sync {
    /// Returns the page size in bytes.
    fn page_size(&self) -> u32;
    /// Reserves a fresh position for a record of the given type.
    fn allocate_position(&self, record_type: RecordType) -> StoreResult<ClusterPos>;
    /// Whether a record of `byte_len` bytes fits the single page backing `pos`.
    /// Larger records are still accepted by create and update.
    fn check_fits(&self, pos: ClusterPos, byte_len: usize) -> StoreResult<bool>;
    /// Returns the lifecycle state of `pos`.
    fn record_status(&self, pos: ClusterPos) -> StoreResult<RecordStatus>;
    /// Writes a new record at a reserved or removed position.
    fn create_record(
        &self,
        pos: ClusterPos,
        bytes: &[u8],
        version: u32,
        record_type: RecordType,
    ) -> StoreResult<()>;
    /// Replaces the record stored at `pos`.
    fn update_record(
        &self,
        pos: ClusterPos,
        bytes: &[u8],
        version: u32,
        record_type: RecordType,
    ) -> StoreResult<()>;
    /// Reads the record stored at `pos`.
    fn read_record(&self, pos: ClusterPos) -> StoreResult<Vec<u8>>;
    /// Deletes the record at `pos`; the position reports [`RecordStatus::Removed`] afterwards.
    fn delete_record(&self, pos: ClusterPos) -> StoreResult<()>;
    /// Resolves the physical position backing `pos`.
    fn physical_position_of(&self, pos: ClusterPos) -> StoreResult<PhysicalPosition>;
}

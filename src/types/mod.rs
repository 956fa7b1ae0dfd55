#![forbid(unsafe_code)]
//! Identifiers, entry values and the crate-wide error type.

use std::fmt;
use std::sync::Arc;

pub mod checksum;

pub use checksum::{Checksum, Crc32Fast};

use crate::primitives::cluster::StoreError;

/// Position of a node record inside the paginated store.
///
/// Assigned once by [`crate::primitives::cluster::ClusterStore::allocate_position`]
/// and never changes afterwards.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ClusterPos(pub i64);

impl ClusterPos {
    /// Wire sentinel for "no node".
    pub const NONE: ClusterPos = ClusterPos(-1);

    /// Returns true when this is the [`ClusterPos::NONE`] sentinel.
    pub fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ClusterPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a record (the target of an edge or link).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Rid {
    /// Cluster the record lives in.
    pub cluster: i32,
    /// Position of the record inside its cluster.
    pub position: i64,
}

impl Rid {
    /// The "no record" reference, `#-1:-1`.
    pub const NULL: Rid = Rid::new(-1, -1);

    /// Creates a new record reference.
    pub const fn new(cluster: i32, position: i64) -> Self {
        Self { cluster, position }
    }

    /// Returns true when the reference cannot address a record.
    pub fn is_null(&self) -> bool {
        self.cluster < 0
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster, self.position)
    }
}

/// Record kind byte handed to the store when creating records.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordType {
    /// A ridbag node payload.
    RidbagNode = b'n',
}

impl RecordType {
    /// Returns the raw kind byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// The resolved, in-memory form of a referenced record.
pub trait Record: fmt::Debug + Send + Sync {
    /// Persistent identity, or `None` for a transient record that was never saved.
    fn identity(&self) -> Option<Rid>;
}

/// A single bag entry: either a bare link or a resolved record.
#[derive(Clone, Debug)]
pub enum Identifiable {
    /// Lightweight reference form.
    Link(Rid),
    /// Resolved object form.
    Record(Arc<dyn Record>),
}

impl Identifiable {
    /// Returns the persistent identity of this entry, if it has one.
    pub fn rid(&self) -> Option<Rid> {
        match self {
            Identifiable::Link(rid) => Some(*rid),
            Identifiable::Record(record) => record.identity(),
        }
    }

    /// Returns true for the resolved object form.
    pub fn is_record(&self) -> bool {
        matches!(self, Identifiable::Record(_))
    }
}

impl PartialEq for Identifiable {
    fn eq(&self, other: &Self) -> bool {
        match (self.rid(), other.rid()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (self, other) {
                (Identifiable::Record(a), Identifiable::Record(b)) => same_allocation(a, b),
                _ => false,
            },
            _ => false,
        }
    }
}

/// Compares two records by allocation, ignoring vtable pointers.
pub(crate) fn same_allocation(a: &Arc<dyn Record>, b: &Arc<dyn Record>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl From<Rid> for Identifiable {
    fn from(rid: Rid) -> Self {
        Identifiable::Link(rid)
    }
}

impl fmt::Display for Identifiable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rid() {
            Some(rid) => write!(f, "{rid}"),
            None => write!(f, "#transient"),
        }
    }
}

/// Errors raised by ridbag operations.
#[derive(thiserror::Error, Debug)]
pub enum RidBagError {
    /// Caller supplied an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Operation is not allowed in the current state.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// A node received more entries than it can hold.
    #[error("node capacity {capacity} exceeded")]
    CapacityExceeded {
        /// Capacity of the node that rejected the entry.
        capacity: usize,
    },
    /// Direct slot access beyond the live entries of a node.
    #[error("slot index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// Requested slot.
        index: usize,
        /// Live entries in the node.
        len: usize,
    },
    /// The paginated store failed.
    #[error("storage fault during {op} at position {pos}: {source}")]
    Storage {
        /// Store operation that failed.
        op: &'static str,
        /// Node position involved.
        pos: ClusterPos,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// Encoded bytes are malformed.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// An entry cannot be written to bytes.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RidBagError>;

use smallvec::SmallVec;

use crate::primitives::bytes::{buf::Cursor, var};
use crate::primitives::cluster::{ClusterStore, RecordStatus};
use crate::types::checksum::node_crc32;
use crate::types::{ClusterPos, Identifiable, RecordType, Result, Rid, RidBagError};

use super::storage_fault;

/// Largest number of entries a single node ever holds.
pub const MAX_NODE_SIZE: usize = 600;
/// Upper bound on how much a spilled tail grows in one step.
pub const ADDITIONAL_ALLOCATION_SIZE: usize = 20;
/// Smallest capacity of a node allocated outside the tail.
pub const MIN_ARRAY_NODE_SIZE: usize = 2;

const CRC_LEN: usize = 4;
/// Bytes assumed for an entry that has no identity yet.
const TRANSIENT_ENTRY_LEN: usize = 2;

/// Storage layout tag of a node, written to metadata and payloads.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// Dense array of a fixed capacity.
    Array = 1,
    /// Elastic single-slot layout used by the tail.
    List = 2,
}

impl NodeKind {
    /// Returns the wire tag.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(NodeKind::Array),
            2 => Ok(NodeKind::List),
            _ => Err(RidBagError::Corruption("unknown node kind")),
        }
    }
}

#[derive(Debug)]
enum NodeBody {
    Array {
        slots: Vec<Identifiable>,
        capacity: usize,
    },
    List {
        slots: SmallVec<[Identifiable; 1]>,
    },
}

impl NodeBody {
    fn with_capacity(capacity: usize) -> Self {
        if capacity <= 1 {
            NodeBody::List {
                slots: SmallVec::new(),
            }
        } else {
            NodeBody::Array {
                slots: Vec::new(),
                capacity,
            }
        }
    }

    fn slots(&self) -> &[Identifiable] {
        match self {
            NodeBody::Array { slots, .. } => slots,
            NodeBody::List { slots } => slots,
        }
    }

    fn slots_mut(&mut self) -> &mut [Identifiable] {
        match self {
            NodeBody::Array { slots, .. } => slots,
            NodeBody::List { slots } => slots,
        }
    }

    fn push(&mut self, entry: Identifiable) {
        match self {
            NodeBody::Array { slots, capacity } => {
                if slots.capacity() < *capacity {
                    slots.reserve_exact(*capacity - slots.len());
                }
                slots.push(entry);
            }
            NodeBody::List { slots } => slots.push(entry),
        }
    }

    fn remove(&mut self, index: usize) -> Identifiable {
        match self {
            NodeBody::Array { slots, .. } => slots.remove(index),
            NodeBody::List { slots } => slots.remove(index),
        }
    }

    fn take(&mut self) -> Vec<Identifiable> {
        match self {
            NodeBody::Array { slots, .. } => std::mem::take(slots),
            NodeBody::List { slots } => std::mem::take(slots).into_vec(),
        }
    }

    fn clear(&mut self) {
        match self {
            NodeBody::Array { slots, .. } => slots.clear(),
            NodeBody::List { slots } => slots.clear(),
        }
    }

    fn replace(&mut self, entries: Vec<Identifiable>) {
        match self {
            NodeBody::Array { slots, .. } => *slots = entries,
            NodeBody::List { slots } => *slots = SmallVec::from_vec(entries),
        }
    }
}

/// A fixed-position storage unit holding part of a bag's entries.
///
/// A node may be unloaded: only its metadata (kind, count, capacity) is in
/// memory and the entries must be read from the store before use.
#[derive(Debug)]
pub(crate) struct RidbagNode {
    pos: ClusterPos,
    body: NodeBody,
    current_index: usize,
    loaded: bool,
    dirty: bool,
    version: u32,
    entry_bytes: usize,
}

pub(crate) struct DecodedPayload {
    pub kind: NodeKind,
    pub capacity: usize,
    pub entries: Vec<Identifiable>,
}

impl RidbagNode {
    /// Creates an empty, loaded node; capacity 1 selects the elastic layout.
    pub fn new(pos: ClusterPos, capacity: usize) -> Self {
        Self {
            pos,
            body: NodeBody::with_capacity(capacity),
            current_index: 0,
            loaded: true,
            dirty: true,
            version: 0,
            entry_bytes: 0,
        }
    }

    /// Rebuilds a node from metadata alone.
    pub fn unloaded(
        pos: ClusterPos,
        kind: NodeKind,
        current_index: usize,
        capacity: usize,
    ) -> Result<Self> {
        let body = match kind {
            NodeKind::Array => {
                if !(MIN_ARRAY_NODE_SIZE..=MAX_NODE_SIZE).contains(&capacity) {
                    return Err(RidBagError::Corruption("array node capacity out of range"));
                }
                if current_index > capacity {
                    return Err(RidBagError::Corruption("node count exceeds capacity"));
                }
                NodeBody::Array {
                    slots: Vec::new(),
                    capacity,
                }
            }
            NodeKind::List => {
                if current_index > MAX_NODE_SIZE {
                    return Err(RidBagError::Corruption("node count exceeds capacity"));
                }
                NodeBody::List {
                    slots: SmallVec::new(),
                }
            }
        };
        Ok(Self {
            pos,
            body,
            current_index,
            loaded: false,
            dirty: false,
            version: 0,
            entry_bytes: 0,
        })
    }

    pub fn pos(&self) -> ClusterPos {
        self.pos
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Array { .. } => NodeKind::Array,
            NodeBody::List { .. } => NodeKind::List,
        }
    }

    /// Capacity as reported in metadata. The elastic layout is always full.
    pub fn capacity(&self) -> usize {
        match self.body {
            NodeBody::Array { capacity, .. } => capacity,
            NodeBody::List { .. } => self.current_index.max(1),
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_full(&self) -> bool {
        self.current_index >= self.capacity()
    }

    pub fn is_max_size_full(&self) -> bool {
        self.is_full() && self.capacity() == MAX_NODE_SIZE
    }

    pub fn free_space(&self) -> usize {
        self.capacity().saturating_sub(self.current_index)
    }

    fn require_loaded(&self) -> Result<()> {
        if !self.loaded {
            return Err(RidBagError::IllegalState(format!(
                "node {} is not loaded",
                self.pos
            )));
        }
        Ok(())
    }

    /// Appends an entry after the live ones.
    pub fn add(&mut self, entry: Identifiable) -> Result<()> {
        self.require_loaded()?;
        let limit = match self.body {
            NodeBody::Array { capacity, .. } => capacity,
            NodeBody::List { .. } => MAX_NODE_SIZE,
        };
        if self.current_index >= limit {
            return Err(RidBagError::CapacityExceeded { capacity: limit });
        }
        self.entry_bytes += entry_len(&entry);
        self.body.push(entry);
        self.current_index += 1;
        self.dirty = true;
        Ok(())
    }

    /// Appends every entry, failing before any change when they do not all fit.
    pub fn add_all(&mut self, entries: Vec<Identifiable>) -> Result<()> {
        self.require_loaded()?;
        let limit = match self.body {
            NodeBody::Array { capacity, .. } => capacity,
            NodeBody::List { .. } => MAX_NODE_SIZE,
        };
        if self.current_index + entries.len() > limit {
            return Err(RidBagError::CapacityExceeded { capacity: limit });
        }
        for entry in entries {
            self.entry_bytes += entry_len(&entry);
            self.body.push(entry);
            self.current_index += 1;
        }
        self.dirty = true;
        Ok(())
    }

    /// Removes the first entry equal to `entry`, keeping the rest contiguous.
    pub fn remove(&mut self, entry: &Identifiable) -> Result<bool> {
        self.require_loaded()?;
        let Some(index) = self.body.slots().iter().position(|e| e == entry) else {
            return Ok(false);
        };
        let removed = self.body.remove(index);
        // a record may have gained an identity, and a longer encoding, since it was added
        self.entry_bytes = self.entry_bytes.saturating_sub(entry_len(&removed));
        self.current_index -= 1;
        self.dirty = true;
        Ok(true)
    }

    pub fn contains(&self, entry: &Identifiable) -> Result<bool> {
        self.require_loaded()?;
        Ok(self.body.slots().iter().any(|e| e == entry))
    }

    pub fn get_at(&self, index: usize) -> Result<&Identifiable> {
        self.require_loaded()?;
        self.body
            .slots()
            .get(index)
            .ok_or(RidBagError::IndexOutOfBounds {
                index,
                len: self.current_index,
            })
    }

    /// Overwrites a live slot in place.
    pub fn set_at(&mut self, entry: Identifiable, index: usize) -> Result<()> {
        self.require_loaded()?;
        let len = self.current_index;
        let slot = self
            .body
            .slots_mut()
            .get_mut(index)
            .ok_or(RidBagError::IndexOutOfBounds { index, len })?;
        let old_len = entry_len(slot);
        let new_len = entry_len(&entry);
        *slot = entry;
        self.entry_bytes = self.entry_bytes.saturating_sub(old_len) + new_len;
        self.dirty = true;
        Ok(())
    }

    /// The live entries, in slot order.
    pub fn entries(&self) -> Result<&[Identifiable]> {
        self.require_loaded()?;
        Ok(self.body.slots())
    }

    /// Moves every live entry out, leaving the node empty.
    pub fn take_entries(&mut self) -> Result<Vec<Identifiable>> {
        self.require_loaded()?;
        let entries = self.body.take();
        self.current_index = 0;
        self.entry_bytes = 0;
        self.dirty = true;
        Ok(entries)
    }

    /// Empties the node without touching its storage.
    pub fn reset(&mut self) {
        self.body.clear();
        self.current_index = 0;
        self.entry_bytes = 0;
        self.loaded = true;
        self.dirty = true;
    }

    /// Reads the entries from the store. Returns `true` when a record was read.
    pub fn load(&mut self, store: &dyn ClusterStore) -> Result<bool> {
        if self.loaded {
            return Ok(false);
        }
        let status = store
            .record_status(self.pos)
            .map_err(storage_fault("record_status", self.pos))?;
        match status {
            RecordStatus::Allocated | RecordStatus::Removed => {
                if self.current_index != 0 {
                    return Err(RidBagError::Corruption(
                        "node record missing while metadata lists entries",
                    ));
                }
                self.body.clear();
                self.loaded = true;
                Ok(false)
            }
            RecordStatus::Present => {
                let bytes = store
                    .read_record(self.pos)
                    .map_err(storage_fault("read", self.pos))?;
                self.load_from_payload(&bytes)?;
                Ok(true)
            }
        }
    }

    /// Installs entries decoded from `bytes`, checking them against metadata.
    pub fn load_from_payload(&mut self, bytes: &[u8]) -> Result<()> {
        let decoded = decode_payload(self.pos, bytes)?;
        if decoded.kind != self.kind() {
            return Err(RidBagError::Corruption("node kind differs from metadata"));
        }
        if decoded.entries.len() != self.current_index {
            return Err(RidBagError::Corruption(
                "node entry count differs from metadata",
            ));
        }
        if let NodeBody::Array { capacity, .. } = self.body {
            if decoded.capacity != capacity {
                return Err(RidBagError::Corruption(
                    "node capacity differs from metadata",
                ));
            }
        }
        self.entry_bytes = decoded.entries.iter().map(entry_len).sum();
        self.body.replace(decoded.entries);
        self.loaded = true;
        self.dirty = false;
        Ok(())
    }

    /// Encoded payload length if `entry` were appended.
    pub fn projected_len(&self, entry: &Identifiable) -> usize {
        let count = self.current_index + 1;
        let capacity = match self.body {
            NodeBody::Array { capacity, .. } => capacity,
            NodeBody::List { .. } => count,
        };
        header_len(count, capacity) + self.entry_bytes + entry_len(entry)
    }

    /// Encodes the live entries as a store record.
    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        self.require_loaded()?;
        let mut out =
            Vec::with_capacity(header_len(self.current_index, self.capacity()) + self.entry_bytes);
        out.push(self.kind().as_u8());
        var::encode_i64(self.current_index as i64, &mut out);
        var::encode_i64(self.capacity() as i64, &mut out);
        for entry in self.body.slots() {
            let rid = entry.rid().ok_or_else(|| {
                RidBagError::Serialization(format!(
                    "entry in node {} has no identity; save it before flushing",
                    self.pos
                ))
            })?;
            encode_rid(rid, &mut out);
        }
        let crc = node_crc32(self.pos, &out);
        out.extend_from_slice(&crc.to_be_bytes());
        Ok(out)
    }

    /// Writes the node to its store position when it has unsaved changes.
    pub fn flush(&mut self, store: &dyn ClusterStore) -> Result<bool> {
        if !self.loaded || !self.dirty {
            return Ok(false);
        }
        let bytes = self.encode_payload()?;
        let status = store
            .record_status(self.pos)
            .map_err(storage_fault("record_status", self.pos))?;
        match status {
            RecordStatus::Present => store
                .update_record(self.pos, &bytes, self.version, RecordType::RidbagNode)
                .map_err(storage_fault("update", self.pos))?,
            RecordStatus::Allocated | RecordStatus::Removed => store
                .create_record(self.pos, &bytes, self.version, RecordType::RidbagNode)
                .map_err(storage_fault("create", self.pos))?,
        }
        self.dirty = false;
        self.version = self.version.wrapping_add(1);
        Ok(true)
    }
}

fn encode_rid(rid: Rid, out: &mut Vec<u8>) {
    var::encode_i64(rid.cluster as i64, out);
    var::encode_i64(rid.position, out);
}

fn entry_len(entry: &Identifiable) -> usize {
    match entry.rid() {
        Some(rid) => var::encoded_len_i64(rid.cluster as i64) + var::encoded_len_i64(rid.position),
        None => TRANSIENT_ENTRY_LEN,
    }
}

fn header_len(count: usize, capacity: usize) -> usize {
    1 + var::encoded_len_i64(count as i64) + var::encoded_len_i64(capacity as i64) + CRC_LEN
}

/// Parses and verifies a node payload stored at `pos`.
pub(crate) fn decode_payload(pos: ClusterPos, bytes: &[u8]) -> Result<DecodedPayload> {
    if bytes.len() < 3 + CRC_LEN {
        return Err(RidBagError::Corruption("node payload truncated"));
    }
    let (body, crc_bytes) = bytes.split_at(bytes.len() - CRC_LEN);
    let stored = Cursor::new(crc_bytes).u32_be()?;
    if node_crc32(pos, body) != stored {
        return Err(RidBagError::Corruption("node checksum mismatch"));
    }
    let mut cur = Cursor::new(body);
    let kind = NodeKind::from_u8(cur.u8()?)?;
    let count = cur.var_len()?;
    let capacity = cur.var_len()?;
    if count > MAX_NODE_SIZE {
        return Err(RidBagError::Corruption("node count exceeds capacity"));
    }
    if kind == NodeKind::Array && (capacity > MAX_NODE_SIZE || count > capacity) {
        return Err(RidBagError::Corruption("node count exceeds capacity"));
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let cluster = i32::try_from(cur.var_i64()?)
            .map_err(|_| RidBagError::Corruption("cluster id out of range"))?;
        let position = cur.var_i64()?;
        entries.push(Identifiable::Link(Rid::new(cluster, position)));
    }
    if cur.remaining() != 0 {
        return Err(RidBagError::Corruption("trailing bytes in node payload"));
    }
    Ok(DecodedPayload {
        kind,
        capacity,
        entries,
    })
}

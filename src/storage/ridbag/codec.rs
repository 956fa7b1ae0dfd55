#![forbid(unsafe_code)]

//! Binary encoding of a bag's node layout.
//!
//! ```text
//! size | active_pos | free_count | free_count × node | chain_count | chain_count × node
//! node := kind:u8 | pos | current_index | capacity [| payload_len | payload]
//! ```
//!
//! Every integer is a ZigZag varint; `active_pos` is `-1` when no node is
//! active. Payloads are present only in [`EncodeMode::Full`].

use tracing::warn;

use crate::primitives::bytes::{buf::Cursor, var};
use crate::storage::options::RidBagOptions;
use crate::types::{ClusterPos, Result, RidBagError};

use super::arena::NodeHandle;
use super::chain::NodeChain;
use super::lookup::LookupTable;
use super::node::{NodeKind, RidbagNode};
use super::RidBag;

/// Smallest encoding of one node's metadata.
const MIN_NODE_METADATA_LEN: usize = 4;

/// What [`RidBag::serialize`] writes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum EncodeMode {
    /// Node metadata only; payloads stay in the store.
    #[default]
    Metadata,
    /// Node metadata followed by each node's payload.
    Full,
}

fn encode_metadata(node: &RidbagNode, out: &mut Vec<u8>) {
    out.push(node.kind().as_u8());
    var::encode_i64(node.pos().0, out);
    var::encode_i64(node.current_index() as i64, out);
    var::encode_i64(node.capacity() as i64, out);
}

fn metadata_len(node: &RidbagNode) -> usize {
    1 + var::encoded_len_i64(node.pos().0)
        + var::encoded_len_i64(node.current_index() as i64)
        + var::encoded_len_i64(node.capacity() as i64)
}

fn decode_node(cur: &mut Cursor<'_>, mode: EncodeMode) -> Result<RidbagNode> {
    let kind = NodeKind::from_u8(cur.u8()?)?;
    let pos = ClusterPos(cur.var_i64()?);
    if pos.is_none() {
        return Err(RidBagError::Corruption("node position missing"));
    }
    let current_index = cur.var_len()?;
    let capacity = cur.var_len()?;
    let mut node = RidbagNode::unloaded(pos, kind, current_index, capacity)?;
    if mode == EncodeMode::Full {
        let len = cur.var_len()?;
        node.load_from_payload(cur.take(len)?)?;
    }
    Ok(node)
}

fn decode_count(cur: &mut Cursor<'_>) -> Result<usize> {
    let count = cur.var_len()?;
    if count > cur.remaining() / MIN_NODE_METADATA_LEN {
        return Err(RidBagError::Corruption("node count exceeds input"));
    }
    Ok(count)
}

impl RidBag {
    /// Encodes the node layout. [`EncodeMode::Full`] loads every node first.
    pub fn serialize(&mut self, mode: EncodeMode) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.serialized_size());
        var::encode_i64(self.size as i64, &mut out);
        let active = self
            .chain
            .active()
            .map_or(ClusterPos::NONE, |h| self.arena[h].pos());
        var::encode_i64(active.0, &mut out);

        let free: Vec<NodeHandle> = self.free.handles().collect();
        self.encode_section(&free, mode, &mut out)?;
        let chain = self.chain.handles().to_vec();
        self.encode_section(&chain, mode, &mut out)?;
        Ok(out)
    }

    /// Length of the [`EncodeMode::Metadata`] encoding.
    pub fn serialized_size(&self) -> usize {
        let active = self
            .chain
            .active()
            .map_or(ClusterPos::NONE, |h| self.arena[h].pos());
        let free: usize = self
            .free
            .handles()
            .map(|h| metadata_len(&self.arena[h]))
            .sum();
        let chain: usize = self
            .chain
            .handles()
            .iter()
            .map(|h| metadata_len(&self.arena[*h]))
            .sum();
        var::encoded_len_i64(self.size as i64)
            + var::encoded_len_i64(active.0)
            + var::encoded_len_i64(self.free.len() as i64)
            + free
            + var::encoded_len_i64(self.chain.len() as i64)
            + chain
    }

    /// Flushes every modified node, then encodes the metadata.
    pub fn serialize_to_store(&mut self) -> Result<Vec<u8>> {
        self.flush()?;
        self.serialize(EncodeMode::Metadata)
    }

    /// Decodes a bag from the front of `bytes`, returning it with the number
    /// of bytes consumed.
    ///
    /// With [`EncodeMode::Metadata`] nodes stay unloaded until first use.
    pub fn deserialize(
        options: RidBagOptions,
        bytes: &[u8],
        mode: EncodeMode,
    ) -> Result<(RidBag, usize)> {
        let mut cur = Cursor::new(bytes);
        let size = cur.var_len()?;
        let active_pos = ClusterPos(cur.var_i64()?);
        let mut bag = RidBag::new(options);

        let free_count = decode_count(&mut cur)?;
        for _ in 0..free_count {
            let node = decode_node(&mut cur, mode)?;
            if node.kind() == NodeKind::List {
                return Err(RidBagError::Corruption("tail node in free section"));
            }
            if node.current_index() != 0 {
                return Err(RidBagError::Corruption("free node holds entries"));
            }
            let handle = bag.arena.insert(node);
            bag.free.push(handle);
        }

        let chain_count = decode_count(&mut cur)?;
        let mut nodes = Vec::with_capacity(chain_count);
        let mut tail = None;
        let mut active = None;
        let mut counted = 0usize;
        for _ in 0..chain_count {
            let node = decode_node(&mut cur, mode)?;
            counted += node.current_index();
            let is_list = node.kind() == NodeKind::List;
            let pos = node.pos();
            let handle = bag.arena.insert(node);
            if is_list {
                tail = Some(handle);
            }
            if !active_pos.is_none() && pos == active_pos {
                active = Some(handle);
            }
            nodes.push(handle);
        }

        if !active_pos.is_none() && active.is_none() {
            return Err(RidBagError::Corruption("active node not in chain"));
        }
        if active.is_some() && active == tail {
            return Err(RidBagError::Corruption("active node is the tail"));
        }
        if let Some(handle) = active {
            if bag.arena[handle].is_full() {
                warn!(pos = active_pos.0, "ridbag.decode.active_full");
                active = None;
            }
        }
        if counted != size {
            return Err(RidBagError::Corruption("size does not match node counts"));
        }

        bag.chain = NodeChain::from_parts(nodes, tail, active);
        bag.size = size;
        if bag.lookup.is_some() {
            bag.lookup = Some(LookupTable::stale());
        }
        Ok((bag, cur.off))
    }

    fn encode_section(
        &mut self,
        handles: &[NodeHandle],
        mode: EncodeMode,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        var::encode_i64(handles.len() as i64, out);
        for handle in handles {
            encode_metadata(&self.arena[*handle], out);
            if mode == EncodeMode::Full {
                self.load_node(*handle)?;
                let payload = self.arena[*handle].encode_payload()?;
                var::encode_i64(payload.len() as i64, out);
                out.extend_from_slice(&payload);
            }
        }
        Ok(())
    }
}

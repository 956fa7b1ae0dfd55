//! Checksums guarding node payloads.
#![forbid(unsafe_code)]

use super::ClusterPos;

/// Incremental 32-bit checksum.
pub trait Checksum {
    /// Forgets every byte fed so far.
    fn reset(&mut self);
    /// Feeds more bytes.
    fn update(&mut self, bytes: &[u8]);
    /// Checksum of the bytes fed since the last reset. Does not consume the state.
    fn finalize(&self) -> u32;
}

/// CRC-32 (IEEE) backed by `crc32fast`.
///
/// ```
/// use ridbag::types::{Checksum, Crc32Fast};
///
/// let mut crc = Crc32Fast::default();
/// crc.update(b"123456789");
/// assert_eq!(crc.finalize(), 0xCBF4_3926);
/// crc.reset();
/// assert_eq!(crc.finalize(), 0);
/// ```
pub struct Crc32Fast {
    inner: crc32fast::Hasher,
}

impl Default for Crc32Fast {
    fn default() -> Self {
        Self {
            inner: crc32fast::Hasher::new(),
        }
    }
}

impl Checksum for Crc32Fast {
    fn reset(&mut self) {
        self.inner.reset();
    }

    fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    fn finalize(&self) -> u32 {
        self.inner.clone().finalize()
    }
}

/// CRC of a node payload, salted with the node's position so a payload
/// read back from the wrong record does not validate.
pub fn node_crc32(pos: ClusterPos, payload: &[u8]) -> u32 {
    let mut hasher = Crc32Fast::default();
    hasher.update(&pos.0.to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}

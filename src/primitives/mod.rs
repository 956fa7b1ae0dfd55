//! Low-level primitives the ridbag engine is built on.
//!
//! Includes byte utilities and the paginated record store abstraction.

/// Byte-level utilities and encoding/decoding.
///
/// Varints and a bounds-checked cursor used by the node and metadata codecs.
pub mod bytes;

/// Paginated record store.
///
/// The [`cluster::ClusterStore`] seam node payloads are persisted through,
/// plus an in-memory implementation.
pub mod cluster;

//! Page-backed multiset of record references.
//!
//! A [`RidBag`] stores edge targets and other record links in a chain of
//! nodes persisted through a [`primitives::cluster::ClusterStore`].

#![warn(missing_docs)]

pub mod logging;
pub mod primitives;
pub mod storage;
pub mod types;

pub use primitives::cluster::{ClusterStore, MemClusterStore};
pub use storage::{RidBag, RidBagConfig, RidBagOptions};
pub use types::{ClusterPos, Identifiable, Record, Result, Rid, RidBagError};

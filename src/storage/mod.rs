//! Ridbag engine and the options, configuration and metrics around it.
//!
//! A [`RidBag`] keeps a multiset of record references in a chain of
//! page-backed nodes, growing, consolidating and recycling nodes as
//! entries come and go.

/// The node-chain engine.
///
/// Node layout, growth and consolidation, change events and the metadata codec.
pub mod ridbag;

mod config;
mod metrics;
mod options;

/// Core collection type and its companion types.
pub use ridbag::{
    ChainStats, ChangeEvent, ChangeKind, ChangeListener, ChangeLog, EncodeMode, NodeHandle,
    NodeKind, NoopTracker, RecordLoader, RecordTracker, RidBag, RidBagIter,
    ADDITIONAL_ALLOCATION_SIZE, MAX_NODE_SIZE, MIN_ARRAY_NODE_SIZE,
};

/// TOML configuration.
pub use config::RidBagConfig;

/// Metrics and counters.
pub use metrics::{default_metrics, CounterMetrics, MetricsSnapshot, NoopMetrics, RidBagMetrics};

/// Bag configuration options.
pub use options::{RelaxPolicy, RidBagOptions};

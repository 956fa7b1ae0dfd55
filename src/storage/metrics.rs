use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking node-chain activity of ridbags.
///
/// Implementations receive one call per structural event. This information
/// can be used for monitoring how often bags grow, recycle and consolidate.
pub trait RidBagMetrics: Send + Sync {
    /// Records a node allocated at a fresh store position.
    fn node_allocated(&self);

    /// Records a node taken from the free list instead of allocating.
    fn node_recycled(&self);

    /// Records a node whose storage was released.
    fn node_released(&self);

    /// Records the tail spilling into a newly grown node.
    fn tail_spilled(&self);

    /// Records a consolidation pass.
    ///
    /// # Parameters
    /// * `merged_entries` - Number of entries copied into consolidated nodes.
    fn mega_merge(&self, merged_entries: usize);

    /// Records a node payload read from the store.
    fn node_loaded(&self);
}

/// A no-op implementation of [`RidBagMetrics`] that discards all events.
#[derive(Default)]
pub struct NoopMetrics;

impl RidBagMetrics for NoopMetrics {
    fn node_allocated(&self) {}
    fn node_recycled(&self) {}
    fn node_released(&self) {}
    fn tail_spilled(&self) {}
    fn mega_merge(&self, _merged_entries: usize) {}
    fn node_loaded(&self) {}
}

/// A thread-safe counter-based implementation of [`RidBagMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Nodes allocated at fresh positions.
    pub nodes_allocated: AtomicU64,

    /// Nodes reused from a free list.
    pub nodes_recycled: AtomicU64,

    /// Nodes whose storage was released.
    pub nodes_released: AtomicU64,

    /// Tail spills into grown nodes.
    pub tail_spills: AtomicU64,

    /// Consolidation passes run.
    pub mega_merges: AtomicU64,

    /// Entries moved by consolidation passes.
    pub merged_entries: AtomicU64,

    /// Node payloads read from the store.
    pub nodes_loaded: AtomicU64,
}

impl RidBagMetrics for CounterMetrics {
    fn node_allocated(&self) {
        self.nodes_allocated.fetch_add(1, Ordering::Relaxed);
    }

    fn node_recycled(&self) {
        self.nodes_recycled.fetch_add(1, Ordering::Relaxed);
    }

    fn node_released(&self) {
        self.nodes_released.fetch_add(1, Ordering::Relaxed);
    }

    fn tail_spilled(&self) {
        self.tail_spills.fetch_add(1, Ordering::Relaxed);
    }

    fn mega_merge(&self, merged_entries: usize) {
        self.mega_merges.fetch_add(1, Ordering::Relaxed);
        self.merged_entries
            .fetch_add(merged_entries as u64, Ordering::Relaxed);
    }

    fn node_loaded(&self) {
        self.nodes_loaded.fetch_add(1, Ordering::Relaxed);
    }
}

impl CounterMetrics {
    /// Captures the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_allocated: self.nodes_allocated.load(Ordering::Relaxed),
            nodes_recycled: self.nodes_recycled.load(Ordering::Relaxed),
            nodes_released: self.nodes_released.load(Ordering::Relaxed),
            tail_spills: self.tail_spills.load(Ordering::Relaxed),
            mega_merges: self.mega_merges.load(Ordering::Relaxed),
            merged_entries: self.merged_entries.load(Ordering::Relaxed),
            nodes_loaded: self.nodes_loaded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Nodes allocated at fresh positions.
    pub nodes_allocated: u64,
    /// Nodes reused from a free list.
    pub nodes_recycled: u64,
    /// Nodes whose storage was released.
    pub nodes_released: u64,
    /// Tail spills into grown nodes.
    pub tail_spills: u64,
    /// Consolidation passes run.
    pub mega_merges: u64,
    /// Entries moved by consolidation passes.
    pub merged_entries: u64,
    /// Node payloads read from the store.
    pub nodes_loaded: u64,
}

/// Returns the metrics sink used when none is configured.
pub fn default_metrics() -> Arc<dyn RidBagMetrics> {
    Arc::new(NoopMetrics)
}

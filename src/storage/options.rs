use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::primitives::cluster::ClusterStore;

use super::config::RidBagConfig;
use super::metrics::{default_metrics, RidBagMetrics};
use super::ridbag::{NoopTracker, RecordLoader, RecordTracker};

/// What happens to the storage of a node that gets emptied by consolidation
/// or tail spill.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelaxPolicy {
    /// Reset the node and keep it for reuse.
    #[default]
    Soft,
    /// Delete the node's record immediately; non-tail nodes are not reused.
    Hard,
}

/// Configuration options supplied when creating or decoding a
/// [`super::RidBag`].
#[derive(Clone)]
pub struct RidBagOptions {
    /// The store node payloads live in.
    pub store: Arc<dyn ClusterStore>,
    /// Storage-release policy applied on tail spill and consolidation.
    pub relax_policy: RelaxPolicy,
    /// Whether to maintain the direct rid-to-node lookup table.
    pub lookup_table: bool,
    /// Whether iteration should prefer resolved records over links.
    pub auto_convert_to_record: bool,
    /// Resolves links during auto-converting iteration.
    pub loader: Option<Arc<dyn RecordLoader>>,
    /// Record-tracking collaborator notified on owner changes.
    pub tracker: Arc<dyn RecordTracker>,
    /// Metrics sink.
    pub metrics: Arc<dyn RidBagMetrics>,
}

impl RidBagOptions {
    /// Creates options with default settings over `store`.
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self {
            store,
            relax_policy: RelaxPolicy::Soft,
            lookup_table: false,
            auto_convert_to_record: true,
            loader: None,
            tracker: Arc::new(NoopTracker),
            metrics: default_metrics(),
        }
    }

    /// Sets the storage-release policy.
    pub fn relax_policy(mut self, policy: RelaxPolicy) -> Self {
        self.relax_policy = policy;
        self
    }

    /// Enables or disables the direct lookup table.
    pub fn lookup_table(mut self, enabled: bool) -> Self {
        self.lookup_table = enabled;
        self
    }

    /// Sets the initial auto-convert flag.
    pub fn auto_convert_to_record(mut self, enabled: bool) -> Self {
        self.auto_convert_to_record = enabled;
        self
    }

    /// Sets the loader used to resolve links while iterating.
    pub fn loader(mut self, loader: Arc<dyn RecordLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Sets the record-tracking collaborator.
    pub fn tracker(mut self, tracker: Arc<dyn RecordTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Sets the metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn RidBagMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Applies every tunable present in `cfg`.
    pub fn with_config(mut self, cfg: &RidBagConfig) -> Self {
        if let Some(policy) = cfg.relax_policy {
            self.relax_policy = policy;
        }
        if let Some(enabled) = cfg.lookup_table {
            self.lookup_table = enabled;
        }
        if let Some(enabled) = cfg.auto_convert_to_record {
            self.auto_convert_to_record = enabled;
        }
        self
    }
}

impl fmt::Debug for RidBagOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RidBagOptions")
            .field("page_size", &self.store.page_size())
            .field("relax_policy", &self.relax_policy)
            .field("lookup_table", &self.lookup_table)
            .field("auto_convert_to_record", &self.auto_convert_to_record)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

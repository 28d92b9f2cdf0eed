//! The tree engine and its public façade.

pub(crate) mod builder;
pub mod core;
pub(crate) mod diff;
pub(crate) mod ops;
pub mod search;
pub(crate) mod splitter;
pub mod stats;

mod iter;

pub use iter::TreeIterator;
pub use search::{Search, SearchResult, SearchResults};
pub use stats::TreeStats;

use crate::batch::Batch;
use crate::config::{ReadWriteMode, TreeConfig};
use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::tree::builder::TransactionBuilder;
use crate::tree::core::TreeCore;
use std::sync::Arc;

/// MetricTree is the public face of spheredb: a durable similarity-search
/// index over a metric space.
///
/// Its API makes the internal machinery (the transaction compiler, the diff
/// tracker, the storage backend) feel like one simple data structure: add
/// batches of key/value tuples, then run range or k-nearest-neighbor
/// searches against them.
///
/// The handle is cheaply cloneable; clones share the same underlying tree.
///
/// # Examples
///
/// ```rust,ignore
/// let tree = TreeConfig::builder()
///     .metric(|a: &Vec<f64>, b: &Vec<f64>| euclidean(a, b))
///     .key_codec(VectorCodec)
///     .value_codec(StringCodec)
///     .build_tree()?;
///
/// tree.add_batch(Batch::new(tuples))?;
/// let nearest = tree.knn_search(&probe, 4)?;
/// ```
pub struct MetricTree<K, V> {
    core: Arc<TreeCore<K, V>>,
    read_write_mode: ReadWriteMode,
}

impl<K, V> Clone for MetricTree<K, V> {
    fn clone(&self) -> Self {
        MetricTree {
            core: self.core.clone(),
            read_write_mode: self.read_write_mode,
        }
    }
}

impl<K: Clone, V: Clone> MetricTree<K, V> {
    /// A tree over this configuration.
    pub fn new(config: TreeConfig<K, V>) -> Self {
        let read_write_mode = config.read_write_mode();
        MetricTree {
            core: Arc::new(TreeCore::new(config)),
            read_write_mode,
        }
    }

    /// Blocks while one batch of data is compiled into a transaction and
    /// applied to the tree.
    pub fn add_batch(&self, batch: Batch<K, V>) -> SphereResult<()> {
        self.verify_can_write()?;

        log::trace!("Adding a new batch of {} tuples", batch.size());

        let builder = TransactionBuilder::for_batch(&self.core, batch);
        let transaction = builder.compute_transaction()?;
        self.core.apply_transaction(transaction)
    }

    /// Blocks while multiple batches are added, one transaction each.
    pub fn add_batches(&self, batches: Vec<Batch<K, V>>) -> SphereResult<()> {
        for batch in batches {
            self.add_batch(batch)?;
        }
        Ok(())
    }

    /// Rebuilds every leaf in the tree. Expensive; worthwhile before a
    /// read-heavy phase because repacked leaves have tighter spheres.
    pub fn repack_tree(&self) -> SphereResult<()> {
        self.verify_can_write()?;

        log::trace!("Repacking the entire tree");

        let builder = TransactionBuilder::for_repack(&self.core);
        let transaction = builder.compute_transaction()?;
        self.core.apply_transaction(transaction)
    }

    /// The single nearest tuple: a k-nearest-neighbors search with k = 1.
    pub fn closest(&self, search_key: K) -> SphereResult<SearchResults<K, V>> {
        self.knn_search(search_key, 1)
    }

    /// The k tuples nearest to the search key.
    pub fn knn_search(&self, search_key: K, k: usize) -> SphereResult<SearchResults<K, V>> {
        let mut search = self.knn_query(search_key, k)?;
        search.execute()?;
        search.results()
    }

    /// All tuples within `range` of the search key.
    pub fn range_search(&self, search_key: K, range: f64) -> SphereResult<SearchResults<K, V>> {
        let mut search = self.range_query(search_key, range)?;
        search.execute()?;
        search.results()
    }

    /// An unexecuted kNN search, for callers that want to drive the
    /// execute/results lifecycle themselves.
    pub fn knn_query(&self, search_key: K, k: usize) -> SphereResult<Search<K, V>> {
        self.verify_can_search()?;
        Search::knn(self.core.clone(), search_key, k)
    }

    /// An unexecuted range search.
    pub fn range_query(&self, search_key: K, range: f64) -> SphereResult<Search<K, V>> {
        self.verify_can_search()?;
        Search::range(self.core.clone(), search_key, range)
    }

    /// A summary of this tree's size and shape.
    pub fn tree_stats(&self) -> SphereResult<TreeStats> {
        self.core.tree_stats()
    }

    /// An iterator over every DataPage. When `prevent_mutation` is true the
    /// iterator fails with a concurrent-modification error if a batch lands
    /// while it is being consumed.
    pub fn iterator(&self, prevent_mutation: bool) -> SphereResult<TreeIterator<K, V>> {
        TreeIterator::new(self.core.clone(), prevent_mutation)
    }

    /// How many times the configured distance metric has been executed.
    /// Valuable when comparing the efficiency of tree configurations.
    pub fn distance_metric_execution_count(&self) -> u64 {
        self.core.config().metric().executions()
    }

    /// The internal tree view. Its inspection methods load entire trees into
    /// memory; they exist for tests and diagnostics, not production queries.
    pub fn core(&self) -> &TreeCore<K, V> {
        &self.core
    }

    fn verify_can_write(&self) -> SphereResult<()> {
        if self.read_write_mode == ReadWriteMode::ReadOnly {
            return Err(SphereError::new(
                "Cannot mutate the tree in READ_ONLY mode",
                ErrorKind::ModeViolation,
            ));
        }
        Ok(())
    }

    fn verify_can_search(&self) -> SphereResult<()> {
        if self.read_write_mode == ReadWriteMode::WriteOnly {
            return Err(SphereError::new(
                "Cannot run queries in WRITE_ONLY mode",
                ErrorKind::ModeViolation,
            ));
        }
        Ok(())
    }
}

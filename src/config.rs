//! Tree configuration and its builder.

use crate::codec::{Codec, CodecPair};
use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::metric::{CountingDistanceMetric, DistanceMetric};
use crate::store::{DataStore, InMemoryStore};
use crate::tree::MetricTree;
use std::sync::Arc;

/// Controls how much leaf maintenance each batch performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepackingMode {
    /// No repacking. Usually best when the distance metric is expensive.
    None,
    /// Each batch rebuilds `floor(ln(leaf_count)) + 1` of the oldest leaves.
    /// Usually best when the tree will serve many reads, because repacked
    /// leaves have tighter spheres and prune more I/O.
    IncrementalLn,
}

/// Which operations the façade accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadWriteMode {
    /// Accept search queries, reject batches.
    ReadOnly,
    /// Accept batches, reject search queries.
    WriteOnly,
    /// Accept both.
    ReadAndWrite,
}

/// Everything a [`MetricTree`] needs to operate: tree-shape knobs, the
/// instrumented distance metric, the codec pair, and the storage backend.
pub struct TreeConfig<K, V> {
    branching_factor: usize,
    max_tuples_per_page: usize,
    repacking_mode: RepackingMode,
    read_write_mode: ReadWriteMode,
    metric: Arc<CountingDistanceMetric<K>>,
    codec_pair: CodecPair<K, V>,
    data_store: Arc<dyn DataStore>,
    splitter_seed: Option<u64>,
}

impl<K, V> Clone for TreeConfig<K, V> {
    fn clone(&self) -> Self {
        TreeConfig {
            branching_factor: self.branching_factor,
            max_tuples_per_page: self.max_tuples_per_page,
            repacking_mode: self.repacking_mode,
            read_write_mode: self.read_write_mode,
            metric: self.metric.clone(),
            codec_pair: self.codec_pair.clone(),
            data_store: self.data_store.clone(),
            splitter_seed: self.splitter_seed,
        }
    }
}

impl<K, V> std::fmt::Debug for TreeConfig<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeConfig")
            .field("branching_factor", &self.branching_factor)
            .field("max_tuples_per_page", &self.max_tuples_per_page)
            .field("repacking_mode", &self.repacking_mode)
            .field("read_write_mode", &self.read_write_mode)
            .field("splitter_seed", &self.splitter_seed)
            .finish_non_exhaustive()
    }
}

impl<K, V> TreeConfig<K, V> {
    pub fn builder() -> TreeConfigBuilder<K, V> {
        TreeConfigBuilder::new()
    }

    /// The maximum number of children each inner node may have.
    pub fn branching_factor(&self) -> usize {
        self.branching_factor
    }

    /// The maximum number of tuples each leaf (i.e. DataPage) may have.
    pub fn max_tuples_per_page(&self) -> usize {
        self.max_tuples_per_page
    }

    pub fn repacking_mode(&self) -> RepackingMode {
        self.repacking_mode
    }

    pub fn read_write_mode(&self) -> ReadWriteMode {
        self.read_write_mode
    }

    /// The instrumented metric wrapping the user metric supplied at build time.
    pub fn metric(&self) -> &Arc<CountingDistanceMetric<K>> {
        &self.metric
    }

    pub fn codec_pair(&self) -> &CodecPair<K, V> {
        &self.codec_pair
    }

    pub fn data_store(&self) -> &Arc<dyn DataStore> {
        &self.data_store
    }

    pub fn splitter_seed(&self) -> Option<u64> {
        self.splitter_seed
    }
}

/// Builder for [`TreeConfig`].
///
/// # Examples
///
/// ```rust,ignore
/// let tree = TreeConfig::builder()
///     .branching_factor(32)
///     .max_tuples_per_page(100)
///     .metric(|a: &Vec<f64>, b: &Vec<f64>| euclidean(a, b))
///     .key_codec(VectorCodec)
///     .value_codec(StringCodec)
///     .build_tree()?;
/// ```
pub struct TreeConfigBuilder<K, V> {
    branching_factor: usize,
    max_tuples_per_page: usize,
    repacking_mode: RepackingMode,
    read_write_mode: ReadWriteMode,
    metric: Option<Arc<dyn DistanceMetric<K>>>,
    key_codec: Option<Arc<dyn Codec<K>>>,
    value_codec: Option<Arc<dyn Codec<V>>>,
    data_store: Option<Arc<dyn DataStore>>,
    splitter_seed: Option<u64>,
}

impl<K, V> TreeConfigBuilder<K, V> {
    fn new() -> Self {
        TreeConfigBuilder {
            branching_factor: 64,
            max_tuples_per_page: 50,
            repacking_mode: RepackingMode::IncrementalLn,
            read_write_mode: ReadWriteMode::ReadAndWrite,
            metric: None,
            key_codec: None,
            value_codec: None,
            data_store: None,
            splitter_seed: None,
        }
    }

    pub fn branching_factor(mut self, branching_factor: usize) -> Self {
        self.branching_factor = branching_factor;
        self
    }

    pub fn max_tuples_per_page(mut self, max_tuples_per_page: usize) -> Self {
        self.max_tuples_per_page = max_tuples_per_page;
        self
    }

    /// The distance metric over keys. MUST satisfy the metric axioms.
    pub fn metric<M: DistanceMetric<K> + 'static>(mut self, metric: M) -> Self {
        self.metric = Some(Arc::new(metric));
        self
    }

    pub fn key_codec<C: Codec<K> + 'static>(mut self, codec: C) -> Self {
        self.key_codec = Some(Arc::new(codec));
        self
    }

    pub fn value_codec<C: Codec<V> + 'static>(mut self, codec: C) -> Self {
        self.value_codec = Some(Arc::new(codec));
        self
    }

    /// The storage backend. Defaults to a fresh [`InMemoryStore`].
    pub fn data_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.data_store = Some(store);
        self
    }

    /// Do not repack DataPages while the tree is built.
    pub fn no_repacking(self) -> Self {
        self.repacking_mode(RepackingMode::None)
    }

    /// Repack `floor(ln(leaf_count)) + 1` of the oldest DataPages per batch.
    pub fn incremental_repacking(self) -> Self {
        self.repacking_mode(RepackingMode::IncrementalLn)
    }

    pub fn repacking_mode(mut self, mode: RepackingMode) -> Self {
        self.repacking_mode = mode;
        self
    }

    /// The resulting tree only serves search queries (no new data).
    pub fn read_only(self) -> Self {
        self.read_write_mode(ReadWriteMode::ReadOnly)
    }

    /// The resulting tree only accepts batches (no search queries).
    pub fn write_only(self) -> Self {
        self.read_write_mode(ReadWriteMode::WriteOnly)
    }

    pub fn read_and_write(self) -> Self {
        self.read_write_mode(ReadWriteMode::ReadAndWrite)
    }

    pub fn read_write_mode(mut self, mode: ReadWriteMode) -> Self {
        self.read_write_mode = mode;
        self
    }

    /// Pins the center-selection RNG for reproducible tree builds. By default
    /// center selection is seeded from entropy and tree shape is not
    /// deterministic.
    pub fn splitter_seed(mut self, seed: u64) -> Self {
        self.splitter_seed = Some(seed);
        self
    }

    /// Validates the knobs and assembles the configuration.
    pub fn build(self) -> SphereResult<TreeConfig<K, V>> {
        if self.branching_factor < 2 {
            return Err(SphereError::new(
                "The branching factor must be at least 2",
                ErrorKind::Misuse,
            ));
        }
        if self.max_tuples_per_page < 5 {
            return Err(SphereError::new(
                "max_tuples_per_page must be at least 5",
                ErrorKind::Misuse,
            ));
        }

        let Some(metric) = self.metric else {
            return Err(SphereError::new(
                "The distance metric was not specified",
                ErrorKind::Misuse,
            ));
        };
        let Some(key_codec) = self.key_codec else {
            return Err(SphereError::new(
                "The key codec was not specified",
                ErrorKind::Misuse,
            ));
        };
        let Some(value_codec) = self.value_codec else {
            return Err(SphereError::new(
                "The value codec was not specified",
                ErrorKind::Misuse,
            ));
        };

        let data_store = self
            .data_store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));

        log::info!("TreeConfig.branching_factor: {}", self.branching_factor);
        log::info!(
            "TreeConfig.max_tuples_per_page: {}",
            self.max_tuples_per_page
        );
        log::info!("TreeConfig.repacking_mode: {:?}", self.repacking_mode);
        log::info!("TreeConfig.read_write_mode: {:?}", self.read_write_mode);

        Ok(TreeConfig {
            branching_factor: self.branching_factor,
            max_tuples_per_page: self.max_tuples_per_page,
            repacking_mode: self.repacking_mode,
            read_write_mode: self.read_write_mode,
            metric: Arc::new(CountingDistanceMetric::instrument(metric)),
            codec_pair: CodecPair::new(key_codec, value_codec),
            data_store,
            splitter_seed: self.splitter_seed,
        })
    }

    /// Shorthand for `MetricTree::new(self.build()?)`.
    pub fn build_tree(self) -> SphereResult<MetricTree<K, V>>
    where
        K: Clone,
        V: Clone,
    {
        Ok(MetricTree::new(self.build()?))
    }
}

impl<K, V> Default for TreeConfigBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

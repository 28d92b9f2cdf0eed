//! The codec boundary between the typed tree and the byte-oriented store.

use crate::config::TreeConfig;
use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::node::NodeHeader;
use crate::page::DataPage;
use crate::store::DataStore;
use crate::transaction::TreeTransaction;
use crate::tree::stats::TreeStats;
use crate::tuple::Tuple;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// TreeCore wraps the configured [`DataStore`] with the codec pair, so the
/// rest of the engine reads and writes nicely typed headers, pages, and
/// transactions while the store only ever sees bytes.
///
/// The exhaustive inspection methods (`all_nodes`, `tuples`, ...) exist to
/// support rigorous testing of how transactions reshape the tree. They load
/// the whole tree and are NOT suitable for querying a large production tree.
pub struct TreeCore<K, V> {
    config: TreeConfig<K, V>,
}

impl<K: Clone, V: Clone> TreeCore<K, V> {
    pub fn new(config: TreeConfig<K, V>) -> Self {
        TreeCore { config }
    }

    pub fn config(&self) -> &TreeConfig<K, V> {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        self.config.data_store()
    }

    /// The id of the last transaction that altered this tree. Transactions
    /// must always be applied to the exact tree state they were built from;
    /// this id is how mismatches (i.e. concurrent writers) are detected.
    pub fn last_transaction_id(&self) -> Option<SphereId> {
        self.store().last_transaction_id()
    }

    pub fn root_id(&self) -> Option<SphereId> {
        self.store().root_id()
    }

    pub fn root_node(&self) -> SphereResult<Option<NodeHeader<K>>> {
        match self.root_id() {
            Some(id) => self.node_at(id),
            None => Ok(None),
        }
    }

    pub fn node_at(&self, id: SphereId) -> SphereResult<Option<NodeHeader<K>>> {
        match self.store().node_at(id)? {
            Some(raw) => Ok(Some(self.config.codec_pair().decode_header(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn data_page_at(&self, id: SphereId) -> SphereResult<Option<DataPage<K, V>>> {
        match self.store().data_page_at(id)? {
            Some(raw) => Ok(Some(self.config.codec_pair().decode_page(&raw)?)),
            None => Ok(None),
        }
    }

    /// The child headers of this node; empty for a leaf.
    pub fn nodes_below(&self, id: SphereId) -> SphereResult<Vec<NodeHeader<K>>> {
        let Some(node) = self.node_at(id)? else {
            return Ok(Vec::new());
        };
        if node.is_leaf() {
            return Ok(Vec::new());
        }

        let mut children = Vec::new();
        for child_id in node.children()? {
            if let Some(child) = self.node_at(*child_id)? {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Serializes and applies a transaction, after verifying it was built
    /// from the current tree state. The store re-checks under its own lock.
    pub fn apply_transaction(&self, transaction: TreeTransaction<K, V>) -> SphereResult<()> {
        if transaction.expected_tree_id() != self.last_transaction_id() {
            return Err(SphereError::new(
                "The tree changed while this transaction was being built",
                ErrorKind::ConcurrentModification,
            ));
        }

        let raw = self.config.codec_pair().encode_transaction(&transaction)?;
        self.store().apply_transaction(raw)
    }

    /// Stats on the tree's size and shape, from a single header walk.
    pub fn tree_stats(&self) -> SphereResult<TreeStats> {
        let mut tuples = 0usize;
        let mut leaf_nodes = 0usize;
        let mut inner_nodes = 0usize;
        let mut radius_sum = 0.0f64;
        let mut radii = Vec::new();

        for node in self.all_nodes()? {
            if node.is_leaf() {
                leaf_nodes += 1;
                tuples += node.tuple_count()?;
                radius_sum += node.radius();
                radii.push(node.radius());
            } else {
                inner_nodes += 1;
            }
        }

        if leaf_nodes == 0 {
            return Err(SphereError::new(
                "Cannot compute statistics for an empty tree",
                ErrorKind::State,
            ));
        }

        let mean = radius_sum / leaf_nodes as f64;

        // sample std-dev divides by n-1, which fails with one leaf; report 0
        let std_dev = if leaf_nodes == 1 {
            0.0
        } else {
            let sum_sq: f64 = radii.iter().map(|r| (r - mean) * (r - mean)).sum();
            (sum_sq / (leaf_nodes - 1) as f64).sqrt()
        };

        TreeStats::new(tuples, leaf_nodes, inner_nodes, mean, std_dev)
    }

    /// Every header in the tree, reachable from the root. Exists to launch
    /// exhaustive verification passes.
    pub fn all_nodes(&self) -> SphereResult<Vec<NodeHeader<K>>> {
        let mut unique: BTreeMap<SphereId, NodeHeader<K>> = BTreeMap::new();
        let mut to_explore: VecDeque<NodeHeader<K>> = VecDeque::new();

        if let Some(root) = self.root_node()? {
            to_explore.push_back(root);
        }

        while let Some(current) = to_explore.pop_front() {
            let id = current.id();
            if unique.insert(id, current).is_none() {
                to_explore.extend(self.nodes_below(id)?);
            }
        }

        Ok(unique.into_values().collect())
    }

    /// Every leaf header in the tree. Not suitable for large trees.
    pub fn leaf_nodes(&self) -> SphereResult<Vec<NodeHeader<K>>> {
        Ok(self
            .all_nodes()?
            .into_iter()
            .filter(|node| node.is_leaf())
            .collect())
    }

    /// Every inner header in the tree. Not suitable for large trees.
    pub fn inner_nodes(&self) -> SphereResult<Vec<NodeHeader<K>>> {
        Ok(self
            .all_nodes()?
            .into_iter()
            .filter(|node| node.is_inner())
            .collect())
    }

    /// Every DataPage in the tree. Not suitable for large trees.
    pub fn all_data_pages(&self) -> SphereResult<Vec<DataPage<K, V>>> {
        let mut pages = Vec::new();
        for leaf in self.leaf_nodes()? {
            if let Some(page) = self.data_page_at(leaf.id())? {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    /// Every tuple in the tree. Not suitable for large trees.
    pub fn tuples(&self) -> SphereResult<Vec<Tuple<K, V>>> {
        let mut tuples = Vec::new();
        for page in self.all_data_pages()? {
            tuples.extend(page.into_tuples());
        }
        Ok(tuples)
    }
}

//! The staging area where a transaction is assembled.

use crate::batch::Batch;
use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::node::NodeHeader;
use crate::page::DataPage;
use crate::transaction::{TreeTransaction, TupleAssignment};
use crate::tree::core::TreeCore;
use crate::tree::ops::{DistBtw, OpList, TreeOp};
use crate::tuple::Tuple;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A DiffTracker holds a fixed view of one tree snapshot while numerous
/// updates to headers and tuple assignments accumulate on top of it.
/// Eventually all staged mutations are exported as a single
/// [`TreeTransaction`].
///
/// The approach is like git: the snapshot is the fixed remote state, the
/// staged maps are the changing local state, and the emitted transaction is
/// the commit that bulk-updates the remote. Keeping the in-flux mutations
/// separate from the snapshot is what makes the compiled transactions
/// trustworthy.
pub(crate) struct DiffTracker<'t, K, V> {
    /// The tree this tracker's transaction will alter.
    core: &'t TreeCore<K, V>,

    /// The snapshot's last transaction id, captured at construction. The
    /// emitted transaction is invalid if the tree moves past this id.
    last_transaction_id: Option<SphereId>,

    /// Headers that will be written by the transaction.
    node_updates: BTreeMap<SphereId, NodeHeader<K>>,

    /// Every tuple touched (created or moved) by the transaction.
    tuple_assignments: BTreeMap<SphereId, TupleAssignment<K, V>>,

    /// DataPages whose snapshot content must be discarded.
    deleted_pages: BTreeSet<SphereId>,

    /// Headers that are deleted outright.
    deleted_nodes: BTreeSet<SphereId>,

    /// Ids allocated during this transaction, so the emitted transaction can
    /// distinguish CREATE NODE from UPDATE NODE.
    new_node_ids: BTreeSet<SphereId>,

    /// Ids of tuples that enter the tree in this transaction, distinguishing
    /// CREATE TUPLE from MOVE TUPLE.
    new_tuple_ids: BTreeSet<SphereId>,

    /// Leaves produced by splits. Fresh leaves always introduce sphere
    /// overlap, so they are the best candidates for an immediate repack.
    repack_seeds: BTreeSet<SphereId>,

    was_built: bool,
}

impl<'t, K: Clone, V: Clone> DiffTracker<'t, K, V> {
    pub fn new(core: &'t TreeCore<K, V>) -> Self {
        DiffTracker {
            core,
            last_transaction_id: core.last_transaction_id(),
            node_updates: BTreeMap::new(),
            tuple_assignments: BTreeMap::new(),
            deleted_pages: BTreeSet::new(),
            deleted_nodes: BTreeSet::new(),
            new_node_ids: BTreeSet::new(),
            new_tuple_ids: BTreeSet::new(),
            repack_seeds: BTreeSet::new(),
            was_built: false,
        }
    }

    pub fn register_new_tuple_ids(&mut self, ids: BTreeSet<SphereId>) {
        self.new_tuple_ids.extend(ids);
    }

    /// Any id drawn fresh during the transaction must be registered so the
    /// transaction writes it with a CREATE instead of an UPDATE.
    pub fn register_new_node(&mut self, id: SphereId) {
        self.new_node_ids.insert(id);
    }

    pub fn register_repack_seed(&mut self, id: SphereId) {
        self.repack_seeds.insert(id);
    }

    /// A snapshot of the current repack candidates.
    pub fn repack_seeds(&self) -> BTreeSet<SphereId> {
        self.repack_seeds.clone()
    }

    pub fn put_node(&mut self, node: NodeHeader<K>) {
        self.node_updates.insert(node.id(), node);
    }

    pub fn put_all_nodes(&mut self, nodes: Vec<NodeHeader<K>>) {
        for node in nodes {
            self.put_node(node);
        }
    }

    pub fn delete_node(&mut self, id: SphereId) {
        self.deleted_nodes.insert(id);
        self.node_updates.remove(&id);
    }

    pub fn put_tuple_assignment(&mut self, assignment: TupleAssignment<K, V>) {
        self.tuple_assignments
            .insert(assignment.tuple_id(), assignment);
    }

    pub fn put_all_tuples(&mut self, assignments: Vec<TupleAssignment<K, V>>) {
        for assignment in assignments {
            self.put_tuple_assignment(assignment);
        }
    }

    pub fn delete_page(&mut self, id: SphereId) {
        self.deleted_pages.insert(id);
    }

    /// The most up-to-date edition of this header: staged if present, else the
    /// snapshot's.
    pub fn current_node(&self, id: SphereId) -> SphereResult<NodeHeader<K>> {
        self.current_node_opt(id)?.ok_or_else(|| {
            SphereError::new(
                &format!("No NodeHeader found at {}", id),
                ErrorKind::Invariant,
            )
        })
    }

    fn current_node_opt(&self, id: SphereId) -> SphereResult<Option<NodeHeader<K>>> {
        if let Some(staged) = self.node_updates.get(&id) {
            return Ok(Some(staged.clone()));
        }
        self.core.node_at(id)
    }

    /// The most up-to-date edition of this DataPage: the staged assignments
    /// merged over the snapshot page, unless the page was deleted earlier in
    /// this transaction (then the snapshot content is treated as cleared).
    pub fn current_page(&self, id: SphereId) -> SphereResult<DataPage<K, V>> {
        let mut page = DataPage::new(id);
        for assignment in self.tuple_assignments.values() {
            if assignment.is_on_page(id) {
                page.insert(assignment.tuple().clone());
            }
        }

        if self.deleted_pages.contains(&id) {
            return Ok(page);
        }

        match self.core.data_page_at(id)? {
            Some(priors) => DataPage::merge(page, priors),
            None => Ok(page),
        }
    }

    /// The current root: a staged parentless header if one exists, else the
    /// snapshot's root. `None` only for an empty tree.
    pub fn current_root(&self) -> SphereResult<Option<NodeHeader<K>>> {
        if let Some(staged) = self.node_updates.values().find(|node| node.is_root()) {
            return Ok(Some(staged.clone()));
        }
        self.core.root_node()
    }

    /// The staged-view children of this node; empty for a leaf.
    pub fn nodes_below(&self, id: SphereId) -> SphereResult<Vec<NodeHeader<K>>> {
        let node = self.current_node(id)?;
        if node.is_leaf() {
            return Ok(Vec::new());
        }

        let mut children = Vec::new();
        for child_id in node.children()? {
            if let Some(child) = self.current_node_opt(*child_id)? {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Every leaf in the staged view of the tree.
    pub fn leaf_nodes(&self) -> SphereResult<Vec<NodeHeader<K>>> {
        let mut unique: BTreeMap<SphereId, NodeHeader<K>> = BTreeMap::new();
        let mut to_explore: VecDeque<NodeHeader<K>> = VecDeque::new();

        if let Some(root) = self.current_root()? {
            to_explore.push_back(root);
        }

        while let Some(current) = to_explore.pop_front() {
            let id = current.id();
            if unique.insert(id, current).is_none() {
                to_explore.extend(self.nodes_below(id)?);
            }
        }

        Ok(unique
            .into_values()
            .filter(|node| node.is_leaf())
            .collect())
    }

    pub fn num_leaf_nodes(&self) -> SphereResult<usize> {
        Ok(self.leaf_nodes()?.len())
    }

    /// The leaf with the minimum id, i.e. the oldest leaf.
    pub fn oldest_leaf_id(&self) -> SphereResult<SphereId> {
        self.leaf_nodes()?
            .iter()
            .map(|node| node.id())
            .min()
            .ok_or_else(|| {
                SphereError::new("An empty tree has no oldest leaf", ErrorKind::Invariant)
            })
    }

    /// True if the staged working set contains a header that must be split.
    pub fn has_splittable_header(&self) -> bool {
        let branching_factor = self.core.config().branching_factor();
        let max_tuples = self.core.config().max_tuples_per_page();
        self.node_updates
            .values()
            .any(|node| node.is_splittable(branching_factor, max_tuples))
    }

    /// One staged header that must be split. Calling this when none exists is
    /// a logic error.
    pub fn find_splittable_header(&self) -> SphereResult<NodeHeader<K>> {
        let branching_factor = self.core.config().branching_factor();
        let max_tuples = self.core.config().max_tuples_per_page();
        self.node_updates
            .values()
            .find(|node| node.is_splittable(branching_factor, max_tuples))
            .cloned()
            .ok_or_else(|| {
                SphereError::new(
                    "No splittable header in the working set",
                    ErrorKind::Invariant,
                )
            })
    }

    /// The elementary operations that insert a whole batch into the staged
    /// tree.
    pub fn basic_ops_for_batch(&self, batch: Batch<K, V>) -> SphereResult<OpList<K, V>> {
        let mut ops = Vec::new();
        for tuple in batch.into_tuples() {
            ops.extend(self.basic_ops_for_tuple(tuple)?);
        }
        Ok(OpList::new(ops))
    }

    /// The elementary operations that insert one tuple into the staged tree:
    /// a radius increase for every path step the key falls outside of, plus
    /// the tuple assignment at the path's leaf. An empty tree yields a single
    /// CreateRoot.
    ///
    /// Deducing these ops reads the whole root-to-leaf path from the
    /// snapshot; efficient operation requires those header reads to be cheap.
    pub fn basic_ops_for_tuple(&self, tuple: Tuple<K, V>) -> SphereResult<Vec<TreeOp<K, V>>> {
        let path = self.path_to_leaf(tuple.key())?;

        let Some(last_step) = path.last() else {
            // the tree is completely empty, not even a root node
            return Ok(vec![TreeOp::CreateRoot(tuple)]);
        };

        let mut ops: Vec<TreeOp<K, V>> = path
            .iter()
            .filter(|step| step.increases_radius())
            .map(|step| TreeOp::IncreaseRadius {
                node: step.node.clone(),
                new_radius: step.distance,
            })
            .collect();

        ops.push(TreeOp::AssignTuple {
            leaf: last_step.node.clone(),
            tuple,
        });

        Ok(ops)
    }

    /// The root-to-leaf path this key descends, choosing the child with the
    /// nearest center at every inner node. Empty when the tree is empty.
    pub fn path_to_leaf(&self, key: &K) -> SphereResult<Vec<DistBtw<K>>> {
        let metric = self.core.config().metric();

        let Some(root) = self.current_root()? else {
            return Ok(Vec::new());
        };

        let root_id = root.id();
        let mut path = vec![DistBtw::measure(metric, root, key)?];

        let mut next_level = self.nodes_below(root_id)?;
        while !next_level.is_empty() {
            let best = DistBtw::choose_closest(metric, next_level, key)?;
            let best_id = best.node.id();
            path.push(best);
            next_level = self.nodes_below(best_id)?;
        }

        Ok(path)
    }

    /// Exports all staged mutations as one transaction. Usable exactly once.
    pub fn as_transaction(&mut self) -> SphereResult<TreeTransaction<K, V>> {
        if self.was_built {
            return Err(SphereError::new(
                "The transaction was already built and returned",
                ErrorKind::State,
            ));
        }
        self.was_built = true;

        let mut created_nodes = Vec::new();
        let mut updated_nodes = Vec::new();
        for node in self.node_updates.values() {
            if self.new_node_ids.contains(&node.id()) {
                created_nodes.push(node.clone());
            } else {
                updated_nodes.push(node.clone());
            }
        }

        let mut created_tuples = Vec::new();
        let mut updated_tuples = Vec::new();
        for assignment in self.tuple_assignments.values() {
            if self.new_tuple_ids.contains(&assignment.tuple_id()) {
                created_tuples.push(assignment.clone());
            } else {
                updated_tuples.push(assignment.clone());
            }
        }

        TreeTransaction::new(
            self.last_transaction_id,
            created_nodes,
            updated_nodes,
            created_tuples,
            updated_tuples,
            std::mem::take(&mut self.deleted_pages),
            std::mem::take(&mut self.deleted_nodes),
        )
    }
}

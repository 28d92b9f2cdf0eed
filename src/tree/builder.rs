//! The batch-to-transaction compiler.
//!
//! A TransactionBuilder knows how the tree must change to ingest more data:
//! it converts a batch of new tuples into a suite of header updates and tuple
//! assignments, drives splits up to the root, runs the repacking policy, and
//! emits everything as one [`TreeTransaction`].

use crate::batch::Batch;
use crate::config::RepackingMode;
use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::metric::CountingDistanceMetric;
use crate::node::NodeHeader;
use crate::transaction::{TreeTransaction, TupleAssignment};
use crate::tree::core::TreeCore;
use crate::tree::diff::DiffTracker;
use crate::tree::ops::OpList;
use crate::tree::splitter::{Splitter, Stub};
use crate::tuple::Tuple;
use std::collections::BTreeSet;
use std::sync::Arc;

pub(crate) struct TransactionBuilder<'t, K, V> {
    batch: Option<Batch<K, V>>,
    repacking_mode: RepackingMode,
    diff: DiffTracker<'t, K, V>,
    metric: Arc<CountingDistanceMetric<K>>,
    splitter: Splitter<K>,
}

impl<'t, K: Clone, V: Clone> TransactionBuilder<'t, K, V> {
    /// A builder whose transaction will add this batch to the tree.
    pub fn for_batch(core: &'t TreeCore<K, V>, batch: Batch<K, V>) -> Self {
        Self::new(core, Some(batch))
    }

    /// A builder whose transaction will repack the whole tree.
    pub fn for_repack(core: &'t TreeCore<K, V>) -> Self {
        Self::new(core, None)
    }

    fn new(core: &'t TreeCore<K, V>, batch: Option<Batch<K, V>>) -> Self {
        let metric = core.config().metric().clone();
        let splitter = Splitter::new(metric.clone(), core.config().splitter_seed());
        TransactionBuilder {
            batch,
            repacking_mode: core.config().repacking_mode(),
            diff: DiffTracker::new(core),
            metric,
            splitter,
        }
    }

    /// Compiles the batch (or the whole-tree repack) into a transaction.
    pub fn compute_transaction(mut self) -> SphereResult<TreeTransaction<K, V>> {
        let Some(batch) = self.batch.take() else {
            return self.repack_tree();
        };

        // knowing the batch's tuple ids up front lets the transaction use
        // CREATE for them and MOVE for everything else
        self.diff.register_new_tuple_ids(batch.tuple_ids());

        let op_list = self.diff.basic_ops_for_batch(batch)?;

        if op_list.is_seeding() {
            return self.initial_transaction_for_root(op_list);
        }

        let headers = op_list.resulting_headers()?;
        let assignments = op_list.tuple_assignments();
        self.diff.put_all_nodes(headers);
        self.diff.put_all_tuples(assignments);

        self.split_nodes_quickly()?;

        let seeds = self.diff.repack_seeds();
        self.repack(seeds)?;

        let n = self.num_leaves_to_rebuild()?;
        self.rebuild_oldest_leaves(n)?;

        self.diff.as_transaction()
    }

    /// The first batch against an empty tree: every op wants to create the
    /// root. Seed one inner root plus one leaf around the first tuple's key,
    /// then let split propagation sort out any overflow.
    fn initial_transaction_for_root(
        &mut self,
        op_list: OpList<K, V>,
    ) -> SphereResult<TreeTransaction<K, V>> {
        let seed_tuples = op_list.extract_seed_tuples()?;

        let Some(first) = seed_tuples.first() else {
            return Err(SphereError::new(
                "Cannot seed a tree from zero tuples",
                ErrorKind::Invariant,
            ));
        };

        let center = first.key().clone();
        let radius = self
            .metric
            .enclosing_radius(&center, seed_tuples.iter().map(|t| t.key()))?;

        let root_id = SphereId::new();
        let leaf_id = SphereId::new();
        self.diff.register_new_node(root_id);
        self.diff.register_new_node(leaf_id);

        let root = NodeHeader::inner(root_id, None, center.clone(), radius, vec![leaf_id]);
        let leaf = NodeHeader::leaf(leaf_id, Some(root_id), center, radius, seed_tuples.len());

        self.diff.put_node(root);
        self.diff.put_node(leaf);

        for tuple in seed_tuples {
            self.diff
                .put_tuple_assignment(TupleAssignment::assign(tuple, leaf_id));
        }

        self.split_nodes_carefully()?;

        self.diff.as_transaction()
    }

    /// Repacking a set of leaves means: remove all their tuples, reinsert
    /// them as if newly added, and trim any node left without content.
    /// Zeroing the headers first lets radii SHRINK, which is what speeds up
    /// later searches.
    fn repack(&mut self, leaves_to_repack: BTreeSet<SphereId>) -> SphereResult<()> {
        log::trace!("Repacking {} leaves", leaves_to_repack.len());

        // all the tuples across all the leaves being repacked
        let mut tuples_to_repack: Vec<Tuple<K, V>> = Vec::new();
        for id in &leaves_to_repack {
            log::trace!("Repacking: {}", id);
            let page = self.diff.current_page(*id)?;
            tuples_to_repack.extend(page.into_tuples());
        }

        for id in &leaves_to_repack {
            let leaf = self.diff.current_node(*id)?;
            self.diff.put_node(leaf.zeroed()?);
        }

        for id in &leaves_to_repack {
            self.diff.delete_page(*id);
        }

        let mut raw_ops = Vec::new();
        for tuple in tuples_to_repack {
            raw_ops.extend(self.diff.basic_ops_for_tuple(tuple)?);
        }
        let op_list = OpList::new(raw_ops);

        let headers = op_list.resulting_headers()?;
        let assignments = op_list.tuple_assignments();

        // pages that were pruned but grew back must not be deleted
        let regrown: BTreeSet<SphereId> = headers.iter().map(|h| h.id()).collect();

        self.diff.put_all_nodes(headers);
        self.diff.put_all_tuples(assignments);

        self.split_nodes_carefully()?;

        // IMPORTANT: it is WRONG to assume a repacked leaf keeps at least one
        // tuple. When zero tuples route back to it, the page and every
        // reference to it must go.
        for id in leaves_to_repack {
            if !regrown.contains(&id) {
                let delete_me = self.diff.current_node(id)?;
                self.remove_node_from_tree(delete_me)?;
            }
        }

        Ok(())
    }

    /// How many old leaves this transaction should rebuild.
    fn num_leaves_to_rebuild(&self) -> SphereResult<usize> {
        match self.repacking_mode {
            RepackingMode::None => Ok(0),
            // ln(leaf_count) amortizes the maintenance work across batches
            RepackingMode::IncrementalLn => {
                let leaf_count = self.diff.num_leaf_nodes()?;
                if leaf_count == 0 {
                    Ok(0)
                } else {
                    Ok((leaf_count as f64).ln() as usize + 1)
                }
            }
        }
    }

    fn rebuild_oldest_leaves(&mut self, n: usize) -> SphereResult<()> {
        for _ in 0..n {
            self.rebuild_oldest_leaf()?;
        }
        Ok(())
    }

    /// Replaces the oldest leaf with a fresh one carrying the same center
    /// key, then reinserts its tuples. The center was selected wisely once;
    /// it stays a reasonable anchor. The page's id is refreshed so the
    /// "oldest leaf" rotation keeps moving.
    fn rebuild_oldest_leaf(&mut self) -> SphereResult<()> {
        let Some(root) = self.diff.current_root()? else {
            return Ok(());
        };
        if root.num_children()? < 3 {
            log::trace!("Skipping the oldest-leaf rebuild, the tree is too small");
            return Ok(());
        }

        let oldest_id = self.diff.oldest_leaf_id()?;
        let new_leaf_id = SphereId::new();

        log::trace!("Replacing oldest leaf {} with {}", oldest_id, new_leaf_id);

        let tuples_to_repack = self.diff.current_page(oldest_id)?.into_tuples();

        let oldest_header = self.diff.current_node(oldest_id)?;
        let Some(parent_id) = oldest_header.parent() else {
            return Err(SphereError::new(
                "The oldest leaf cannot be the root",
                ErrorKind::Invariant,
            ));
        };
        let parent = self.diff.current_node(parent_id)?;

        let new_leaf = NodeHeader::leaf(
            new_leaf_id,
            Some(parent_id),
            oldest_header.center().clone(),
            0.0,
            0,
        );
        let updated_parent = parent.replace_child(oldest_id, new_leaf_id)?;

        self.diff.delete_page(oldest_id);
        self.diff.delete_node(oldest_id);
        self.diff.register_new_node(new_leaf_id);
        self.diff.put_node(new_leaf);
        self.diff.put_node(updated_parent);

        let mut raw_ops = Vec::new();
        for tuple in tuples_to_repack {
            raw_ops.extend(self.diff.basic_ops_for_tuple(tuple)?);
        }
        let op_list = OpList::new(raw_ops);

        let headers = op_list.resulting_headers()?;
        let assignments = op_list.tuple_assignments();

        // did the replacement leaf, whose initial size was 0, receive anything?
        let regrown = headers.iter().any(|h| h.has_id(new_leaf_id));

        self.diff.put_all_nodes(headers);
        self.diff.put_all_tuples(assignments);

        if !regrown {
            let unused = self.diff.current_node(new_leaf_id)?;
            self.remove_node_from_tree(unused)?;
        }

        // must come after removing a rebuilt leaf that went unused
        self.split_nodes_carefully()?;

        Ok(())
    }

    /// Rebuilds every leaf in the tree, oldest first. Expensive.
    fn repack_tree(&mut self) -> SphereResult<TreeTransaction<K, V>> {
        let n = self.diff.num_leaf_nodes()?;

        for _ in 2..n {
            self.rebuild_oldest_leaf()?;
        }

        self.diff.as_transaction()
    }

    /// Removes a node, cascading upward: a parent left with zero children is
    /// removed as well. The cascade never reaches through the root because a
    /// non-empty tree keeps at least one child there.
    fn remove_node_from_tree(&mut self, node: NodeHeader<K>) -> SphereResult<()> {
        let mut delete_me = node;

        loop {
            log::trace!("Deleting node {}", delete_me.id());
            self.diff.delete_node(delete_me.id());

            let Some(parent_id) = delete_me.parent() else {
                return Err(SphereError::new(
                    "Node removal cascaded into the root",
                    ErrorKind::Invariant,
                ));
            };

            let parent = self.diff.current_node(parent_id)?;
            let smaller_parent = parent.remove_child(delete_me.id())?;

            if smaller_parent.num_children()? == 0 {
                log::trace!("Must also delete the parent of {}", delete_me.id());
                delete_me = smaller_parent;
                continue;
            }

            self.diff.put_node(smaller_parent);
            return Ok(());
        }
    }

    /// Used when the resulting leaves will be repacked immediately, so any
    /// careful tuple assignment would be thrown away.
    fn split_nodes_quickly(&mut self) -> SphereResult<()> {
        self.split_nodes(true)
    }

    fn split_nodes_carefully(&mut self) -> SphereResult<()> {
        self.split_nodes(false)
    }

    /// Searches the working set for overflowing headers and splits them until
    /// none remain. The root is handled by pushing it down a level first and
    /// letting the old root split as a regular inner node on a later pass.
    fn split_nodes(&mut self, split_leaves_quickly: bool) -> SphereResult<()> {
        while self.diff.has_splittable_header() {
            let node_to_split = self.diff.find_splittable_header()?;

            if node_to_split.is_root() {
                self.push_down_root(node_to_split)?;
                continue;
            }

            if node_to_split.is_leaf() {
                self.split_leaf(node_to_split, split_leaves_quickly)?;
            } else {
                self.split_inner(node_to_split)?;
            }
        }
        Ok(())
    }

    /// Pushes the root down one layer: a fresh root takes over the old root's
    /// sphere and adopts it as an only child.
    fn push_down_root(&mut self, current_root: NodeHeader<K>) -> SphereResult<()> {
        let new_root_id = SphereId::new();
        let new_root = NodeHeader::inner(
            new_root_id,
            None,
            current_root.center().clone(),
            current_root.radius(),
            vec![current_root.id()],
        );

        self.diff.register_new_node(new_root_id);

        let updated_old_root = current_root.with_parent(new_root_id);

        log::trace!(
            "Adding new root at {}, pushing down {}",
            new_root_id,
            updated_old_root.id()
        );

        self.diff.put_node(new_root);
        self.diff.put_node(updated_old_root);
        Ok(())
    }

    /// An over-sized leaf becomes two leaves at the same level. The original
    /// id stays on the "left" side; the "right" side gets a fresh id. Both
    /// are remembered as repack seeds.
    fn split_leaf(
        &mut self,
        node_to_split: NodeHeader<K>,
        split_quickly: bool,
    ) -> SphereResult<()> {
        let Some(parent_id) = node_to_split.parent() else {
            return Err(SphereError::new(
                "Cannot split the root as a leaf",
                ErrorKind::Invariant,
            ));
        };

        // everything that would have been stored at the over-sized leaf
        let combined = self.diff.current_page(node_to_split.id())?;

        // all of it is being reassigned among the splits
        self.diff.delete_page(node_to_split.id());

        let (left_stub, right_stub) = if split_quickly {
            self.splitter.quick_split(&combined)?
        } else {
            self.splitter.careful_split(&combined)?
        };

        let new_leaf_id = SphereId::new();
        self.diff.register_new_node(new_leaf_id);

        // fresh leaves introduce new center keys, which reshapes the local
        // space partition; repacking near them combats the overlap
        self.diff.register_repack_seed(node_to_split.id());
        self.diff.register_repack_seed(new_leaf_id);

        log::debug!(
            "{} splitting leaf {} into {} and {}, sizes {} and {}",
            if split_quickly { "Quickly" } else { "Carefully" },
            node_to_split.id(),
            node_to_split.id(),
            new_leaf_id,
            left_stub.tuples.len(),
            right_stub.tuples.len()
        );

        let parent = self.diff.current_node(parent_id)?;
        let updated_parent = parent.add_child(new_leaf_id)?;
        self.diff.put_node(updated_parent);

        self.stage_leaf_stub(node_to_split.id(), parent_id, left_stub);
        self.stage_leaf_stub(new_leaf_id, parent_id, right_stub);

        Ok(())
    }

    /// Turns one side of a split into a staged leaf header plus its tuple
    /// assignments.
    fn stage_leaf_stub(&mut self, leaf_id: SphereId, parent_id: SphereId, stub: Stub<K, V>) {
        let header = NodeHeader::leaf(
            leaf_id,
            Some(parent_id),
            stub.center,
            stub.radius,
            stub.tuples.len(),
        );
        self.diff.put_node(header);

        for tuple in stub.tuples {
            self.diff
                .put_tuple_assignment(TupleAssignment::assign(tuple, leaf_id));
        }
    }

    /// An inner node with too many children becomes two inner nodes at the
    /// same level: a smaller version of the original plus a brand new
    /// sibling. The children are divided by nearest new center; the sibling's
    /// children are re-staged with their new parent.
    fn split_inner(&mut self, node_to_split: NodeHeader<K>) -> SphereResult<()> {
        let Some(parent_id) = node_to_split.parent() else {
            return Err(SphereError::new(
                "Cannot split the root as an inner node",
                ErrorKind::Invariant,
            ));
        };

        let mut children = Vec::new();
        for child_id in node_to_split.children()? {
            children.push(self.diff.current_node(*child_id)?);
        }

        let centers: Vec<K> = children.iter().map(|c| c.center().clone()).collect();
        let (left_center, right_center) = self.splitter.pick_centers(&centers)?;

        let (left_children, right_children) =
            self.divide_children(children, &left_center, &right_center)?;

        if left_children.is_empty() || right_children.is_empty() {
            return Err(SphereError::new(
                "An inner split may not produce an empty side",
                ErrorKind::Invariant,
            ));
        }

        // estimate each side's radius from the child spheres; an overestimate
        // loosens pruning a little but never excludes a valid result
        let left_radius = self.metric.estimate_inner_radius(&left_center, &left_children)?;
        let right_radius = self
            .metric
            .estimate_inner_radius(&right_center, &right_children)?;

        let sibling_id = SphereId::new();
        self.diff.register_new_node(sibling_id);

        let replacement = NodeHeader::inner(
            node_to_split.id(),
            Some(parent_id),
            left_center,
            left_radius,
            left_children.iter().map(|c| c.id()).collect(),
        );
        let sibling = NodeHeader::inner(
            sibling_id,
            Some(parent_id),
            right_center,
            right_radius,
            right_children.iter().map(|c| c.id()).collect(),
        );

        let parent = self.diff.current_node(parent_id)?;
        let updated_parent = parent.add_child(sibling_id)?;

        log::debug!(
            "Splitting inner node {} into {} and {} with {} and {} children",
            node_to_split.id(),
            node_to_split.id(),
            sibling_id,
            left_children.len(),
            right_children.len()
        );

        // children staying on the left keep their parent; children moving to
        // the sibling must be re-staged with the new parent id
        for child in right_children {
            self.diff.put_node(child.with_parent(sibling_id));
        }

        self.diff.put_node(replacement);
        self.diff.put_node(sibling);
        self.diff.put_node(updated_parent);

        Ok(())
    }

    /// Divides child nodes between two centers by nearest center distance.
    /// Exact ties MUST alternate sides, otherwise a set of identical keys
    /// would pile onto one side forever.
    fn divide_children(
        &self,
        children: Vec<NodeHeader<K>>,
        left_center: &K,
        right_center: &K,
    ) -> SphereResult<(Vec<NodeHeader<K>>, Vec<NodeHeader<K>>)> {
        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut tie_breaker = false;

        for child in children {
            let left_dist = self.metric.distance(left_center, child.center())?;
            let right_dist = self.metric.distance(right_center, child.center())?;

            let goes_left = if left_dist == right_dist {
                tie_breaker = !tie_breaker;
                tie_breaker
            } else {
                left_dist < right_dist
            };

            if goes_left {
                left.push(child);
            } else {
                right.push(child);
            }
        }

        Ok((left, right))
    }
}

//! Elementary tree operations and their reduction.
//!
//! Inserting one tuple touches every node on its root-to-leaf path. Performing
//! those touches naively would cascade I/O, so the compiler first expresses a
//! batch as a list of small reducible operations, then compacts them: all
//! radius increases that target the same node collapse to the single largest
//! one, and tuple-count increments add up. Only the final state of each header
//! is ever written.

use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::metric::CountingDistanceMetric;
use crate::node::{NodeHeader, NodeKind};
use crate::transaction::TupleAssignment;
use crate::tuple::Tuple;
use std::collections::BTreeMap;

/// One step of a root-to-leaf descent: a node and the distance between the
/// search key and that node's center. Caching the distance here keeps the
/// number of (potentially expensive) metric calls down.
#[derive(Clone, Debug)]
pub(crate) struct DistBtw<K> {
    pub node: NodeHeader<K>,
    pub distance: f64,
}

impl<K> DistBtw<K> {
    /// Measures the distance between a node's center and this key.
    pub fn measure(
        metric: &CountingDistanceMetric<K>,
        node: NodeHeader<K>,
        key: &K,
    ) -> SphereResult<DistBtw<K>> {
        let distance = metric.distance(key, node.center())?;
        Ok(DistBtw { node, distance })
    }

    /// Given these nodes, the one whose center is closest to the key.
    pub fn choose_closest(
        metric: &CountingDistanceMetric<K>,
        options: Vec<NodeHeader<K>>,
        key: &K,
    ) -> SphereResult<DistBtw<K>> {
        let mut best: Option<DistBtw<K>> = None;
        for node in options {
            let candidate = DistBtw::measure(metric, node, key)?;
            best = match best {
                Some(current) if current.distance <= candidate.distance => Some(current),
                _ => Some(candidate),
            };
        }
        best.ok_or_else(|| {
            SphereError::new(
                "Cannot choose the closest of zero nodes",
                ErrorKind::Invariant,
            )
        })
    }

    /// True if adding this key to this node would grow its radius.
    pub fn increases_radius(&self) -> bool {
        self.distance > self.node.radius()
    }
}

/// An elementary, reducible change to the tree.
///
/// DataStores never see these; a list of TreeOps is compacted into final
/// headers and tuple assignments first.
#[derive(Clone, Debug)]
pub(crate) enum TreeOp<K, V> {
    /// Builds the very first root node around this tuple. Only emitted when
    /// the tree has no root at all.
    CreateRoot(Tuple<K, V>),
    /// Marks a node whose radius must rise to at least `new_radius`.
    IncreaseRadius { node: NodeHeader<K>, new_radius: f64 },
    /// Places a tuple at a leaf, implicitly incrementing its tuple count.
    AssignTuple { leaf: NodeHeader<K>, tuple: Tuple<K, V> },
}

/// A list of TreeOps, reducible to the final headers and tuple assignments a
/// transaction needs.
pub(crate) struct OpList<K, V> {
    ops: Vec<TreeOp<K, V>>,
}

impl<K: Clone, V: Clone> OpList<K, V> {
    pub fn new(ops: Vec<TreeOp<K, V>>) -> Self {
        OpList { ops }
    }

    /// When the tree has no root EVERY operation wants to build one.
    pub fn is_seeding(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, TreeOp::CreateRoot(_)))
    }

    /// Pulls out the tuples that all want to seed the first root. Mixing
    /// CreateRoot with any other operation is a compiler bug.
    pub fn extract_seed_tuples(self) -> SphereResult<Vec<Tuple<K, V>>> {
        let mut seeds = Vec::with_capacity(self.ops.len());
        for op in self.ops {
            match op {
                TreeOp::CreateRoot(tuple) => seeds.push(tuple),
                _ => {
                    return Err(SphereError::new(
                        "A seeding op list may only contain CreateRoot operations",
                        ErrorKind::Invariant,
                    ))
                }
            }
        }
        Ok(seeds)
    }

    /// Reduces the node-touching operations down to exactly one final header
    /// per touched node: the radius is the max of the old radius and every
    /// requested increase, and a leaf's tuple count grows by the number of
    /// tuples assigned to it. Child lists are carried over unchanged.
    pub fn resulting_headers(&self) -> SphereResult<Vec<NodeHeader<K>>> {
        struct Pending<K> {
            node: NodeHeader<K>,
            max_radius: f64,
            added_tuples: usize,
        }

        let mut pending: BTreeMap<SphereId, Pending<K>> = BTreeMap::new();

        for op in &self.ops {
            match op {
                TreeOp::CreateRoot(_) => {
                    return Err(SphereError::new(
                        "CreateRoot cannot be reduced to a header update",
                        ErrorKind::Invariant,
                    ))
                }
                TreeOp::IncreaseRadius { node, new_radius } => {
                    let entry = pending.entry(node.id()).or_insert_with(|| Pending {
                        node: node.clone(),
                        max_radius: 0.0,
                        added_tuples: 0,
                    });
                    entry.max_radius = entry.max_radius.max(*new_radius);
                }
                TreeOp::AssignTuple { leaf, .. } => {
                    if !leaf.is_leaf() {
                        return Err(SphereError::new(
                            "Tuples can only be assigned to leaf nodes",
                            ErrorKind::Invariant,
                        ));
                    }
                    let entry = pending.entry(leaf.id()).or_insert_with(|| Pending {
                        node: leaf.clone(),
                        max_radius: 0.0,
                        added_tuples: 0,
                    });
                    entry.added_tuples += 1;
                }
            }
        }

        let mut headers = Vec::with_capacity(pending.len());
        for entry in pending.into_values() {
            let radius = entry.node.radius().max(entry.max_radius);
            let header = match entry.node.kind() {
                NodeKind::Inner { children } => NodeHeader::inner(
                    entry.node.id(),
                    entry.node.parent(),
                    entry.node.center().clone(),
                    radius,
                    children.clone(),
                ),
                NodeKind::Leaf { tuple_count } => NodeHeader::leaf(
                    entry.node.id(),
                    entry.node.parent(),
                    entry.node.center().clone(),
                    radius,
                    tuple_count + entry.added_tuples,
                ),
            };
            headers.push(header);
        }
        Ok(headers)
    }

    /// The tuple placements these operations perform.
    pub fn tuple_assignments(&self) -> Vec<TupleAssignment<K, V>> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                TreeOp::AssignTuple { leaf, tuple } => {
                    Some(TupleAssignment::assign(tuple.clone(), leaf.id()))
                }
                _ => None,
            })
            .collect()
    }
}

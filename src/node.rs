//! Node headers: the small, aggressively cacheable summary of every tree node.

use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;

/// What a node is: an inner routing node with children, or a leaf with tuples.
///
/// A leaf has no child list and an inner node has no tuple count; encoding the
/// distinction as a variant makes the illegal combinations unrepresentable.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// An inner node routing to child spheres. An empty child list is legal
    /// only as transient state inside a transaction build; it never commits.
    Inner { children: Vec<SphereId> },
    /// A leaf node owning a DataPage with this many tuples.
    Leaf { tuple_count: usize },
}

/// A NodeHeader summarizes one node of the tree: its identity, its position
/// (parent link), and its sphere (center key + radius), plus the
/// [`NodeKind`]-specific payload.
///
/// Headers are intended to be small so the whole routing structure can be read
/// without touching any DataPage. Finding which pages a query must load only
/// requires header reads.
#[derive(Clone, Debug)]
pub struct NodeHeader<K> {
    id: SphereId,
    parent: Option<SphereId>,
    center: K,
    radius: f64,
    kind: NodeKind,
}

impl<K> NodeHeader<K> {
    /// A new inner node header with the given children.
    pub fn inner(
        id: SphereId,
        parent: Option<SphereId>,
        center: K,
        radius: f64,
        children: Vec<SphereId>,
    ) -> Self {
        debug_assert!(radius >= 0.0);
        NodeHeader {
            id,
            parent,
            center,
            radius,
            kind: NodeKind::Inner { children },
        }
    }

    /// A new leaf node header (the DataPage is made separately).
    pub fn leaf(
        id: SphereId,
        parent: Option<SphereId>,
        center: K,
        radius: f64,
        tuple_count: usize,
    ) -> Self {
        debug_assert!(radius >= 0.0);
        NodeHeader {
            id,
            parent,
            center,
            radius,
            kind: NodeKind::Leaf { tuple_count },
        }
    }

    pub fn id(&self) -> SphereId {
        self.id
    }

    pub fn parent(&self) -> Option<SphereId> {
        self.parent
    }

    pub fn center(&self) -> &K {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Any header whose parent is absent is the root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn is_inner(&self) -> bool {
        matches!(self.kind, NodeKind::Inner { .. })
    }

    pub fn has_id(&self, id: SphereId) -> bool {
        self.id == id
    }

    /// The child ids of an inner node. Asking a leaf is a logic error.
    pub fn children(&self) -> SphereResult<&[SphereId]> {
        match &self.kind {
            NodeKind::Inner { children } => Ok(children),
            NodeKind::Leaf { .. } => Err(SphereError::new(
                "Leaf nodes have no children",
                ErrorKind::Invariant,
            )),
        }
    }

    pub fn num_children(&self) -> SphereResult<usize> {
        Ok(self.children()?.len())
    }

    /// The tuple count of a leaf. Asking an inner node is a logic error.
    pub fn tuple_count(&self) -> SphereResult<usize> {
        match &self.kind {
            NodeKind::Leaf { tuple_count } => Ok(*tuple_count),
            NodeKind::Inner { .. } => Err(SphereError::new(
                "Inner nodes have no tuple count",
                ErrorKind::Invariant,
            )),
        }
    }

    /// A copy of this header with a different parent.
    pub fn with_parent(&self, parent: SphereId) -> Self
    where
        K: Clone,
    {
        NodeHeader {
            id: self.id,
            parent: Some(parent),
            center: self.center.clone(),
            radius: self.radius,
            kind: self.kind.clone(),
        }
    }

    /// A copy of this inner header with one more child.
    pub fn add_child(&self, child: SphereId) -> SphereResult<Self>
    where
        K: Clone,
    {
        let mut children = self.children()?.to_vec();
        children.push(child);
        Ok(NodeHeader::inner(
            self.id,
            self.parent,
            self.center.clone(),
            self.radius,
            children,
        ))
    }

    /// A copy of this inner header with one child removed. The radius collapses
    /// to 0 when the last child goes away.
    pub fn remove_child(&self, child: SphereId) -> SphereResult<Self>
    where
        K: Clone,
    {
        let mut children = self.children()?.to_vec();
        let Some(position) = children.iter().position(|id| *id == child) else {
            return Err(SphereError::new(
                "Inner node attempting to remove a child it does not have",
                ErrorKind::Misuse,
            ));
        };
        children.remove(position);

        let radius = if children.is_empty() { 0.0 } else { self.radius };
        Ok(NodeHeader::inner(
            self.id,
            self.parent,
            self.center.clone(),
            radius,
            children,
        ))
    }

    /// A copy of this inner header with one child swapped for another.
    pub fn replace_child(&self, old_child: SphereId, new_child: SphereId) -> SphereResult<Self>
    where
        K: Clone,
    {
        let children = self.children()?;
        if children.contains(&new_child) {
            return Err(SphereError::new(
                "Cannot add a child that already exists",
                ErrorKind::Misuse,
            ));
        }
        let smaller = self.remove_child(old_child)?;
        smaller.add_child(new_child)
    }

    /// A copy of this leaf with radius 0 and tuple count 0. Used when a leaf is
    /// repacked from scratch, so its radius is allowed to shrink.
    pub fn zeroed(&self) -> SphereResult<Self>
    where
        K: Clone,
    {
        if !self.is_leaf() {
            return Err(SphereError::new(
                "Only leaf nodes can be zeroed for repacking",
                ErrorKind::Invariant,
            ));
        }
        Ok(NodeHeader::leaf(
            self.id,
            self.parent,
            self.center.clone(),
            0.0,
            0,
        ))
    }

    /// True when this node holds more than it may legally keep and must be
    /// split before the transaction commits.
    pub fn is_splittable(&self, branching_factor: usize, max_tuples_per_page: usize) -> bool {
        match &self.kind {
            NodeKind::Inner { children } => children.len() > branching_factor,
            NodeKind::Leaf { tuple_count } => *tuple_count > max_tuples_per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> SphereId {
        SphereId::new()
    }

    #[test]
    fn leaf_reports_tuple_count_but_not_children() {
        let leaf = NodeHeader::leaf(id(), Some(id()), 1.0f64, 2.0, 7);
        assert!(leaf.is_leaf());
        assert!(!leaf.is_inner());
        assert_eq!(leaf.tuple_count().unwrap(), 7);
        assert!(leaf.children().is_err());
        assert!(leaf.num_children().is_err());
    }

    #[test]
    fn inner_reports_children_but_not_tuple_count() {
        let child = id();
        let inner = NodeHeader::inner(id(), None, 1.0f64, 2.0, vec![child]);
        assert!(inner.is_inner());
        assert!(inner.is_root());
        assert_eq!(inner.children().unwrap(), &[child]);
        assert!(inner.tuple_count().is_err());
    }

    #[test]
    fn with_parent_rewrites_only_the_parent() {
        let leaf = NodeHeader::leaf(id(), None, 5.0f64, 1.5, 3);
        let new_parent = id();
        let moved = leaf.with_parent(new_parent);
        assert_eq!(moved.parent(), Some(new_parent));
        assert_eq!(moved.id(), leaf.id());
        assert_eq!(moved.radius(), leaf.radius());
        assert_eq!(moved.tuple_count().unwrap(), 3);
    }

    #[test]
    fn add_and_remove_child() {
        let first = id();
        let second = id();
        let inner = NodeHeader::inner(id(), None, 0.0f64, 1.0, vec![first]);

        let bigger = inner.add_child(second).unwrap();
        assert_eq!(bigger.num_children().unwrap(), 2);

        let smaller = bigger.remove_child(first).unwrap();
        assert_eq!(smaller.children().unwrap(), &[second]);
        assert_eq!(smaller.radius(), 1.0);
    }

    #[test]
    fn removing_last_child_collapses_radius() {
        let only = id();
        let inner = NodeHeader::inner(id(), None, 0.0f64, 9.0, vec![only]);
        let empty = inner.remove_child(only).unwrap();
        assert_eq!(empty.num_children().unwrap(), 0);
        assert_eq!(empty.radius(), 0.0);
    }

    #[test]
    fn removing_missing_child_is_misuse() {
        let inner = NodeHeader::inner(id(), None, 0.0f64, 1.0, vec![id()]);
        let err = inner.remove_child(id()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Misuse);
    }

    #[test]
    fn replace_child_swaps_ids() {
        let old_child = id();
        let inner = NodeHeader::inner(id(), None, 0.0f64, 1.0, vec![old_child]);
        let new_child = id();
        let replaced = inner.replace_child(old_child, new_child).unwrap();
        assert_eq!(replaced.children().unwrap(), &[new_child]);
    }

    #[test]
    fn replace_child_rejects_duplicates() {
        let a = id();
        let b = id();
        let inner = NodeHeader::inner(id(), None, 0.0f64, 1.0, vec![a, b]);
        assert!(inner.replace_child(a, b).is_err());
    }

    #[test]
    fn zeroed_resets_leaf_geometry() {
        let leaf = NodeHeader::leaf(id(), Some(id()), 3.0f64, 2.5, 10);
        let zeroed = leaf.zeroed().unwrap();
        assert_eq!(zeroed.radius(), 0.0);
        assert_eq!(zeroed.tuple_count().unwrap(), 0);
        assert_eq!(zeroed.center(), leaf.center());

        let inner = NodeHeader::inner(id(), None, 3.0f64, 2.5, vec![]);
        assert!(inner.zeroed().is_err());
    }

    #[test]
    fn splittable_thresholds_are_strict() {
        let leaf_at_max = NodeHeader::leaf(id(), Some(id()), 0.0f64, 0.0, 8);
        assert!(!leaf_at_max.is_splittable(3, 8));

        let leaf_over_max = NodeHeader::leaf(id(), Some(id()), 0.0f64, 0.0, 9);
        assert!(leaf_over_max.is_splittable(3, 8));

        let children: Vec<SphereId> = (0..4).map(|_| id()).collect();
        let inner = NodeHeader::inner(id(), None, 0.0f64, 0.0, children);
        assert!(!inner.is_splittable(4, 8));
        assert!(inner.is_splittable(3, 8));
    }
}

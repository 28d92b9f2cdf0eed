use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::node::NodeHeader;
use crate::tuple::Tuple;
use std::collections::BTreeSet;

/// A TupleAssignment places a tuple on a specific leaf page. It backs both the
/// CREATE operation (a tuple enters the tree for the first time) and the MOVE
/// operation (a repack or split relocates a tuple to another page).
#[derive(Clone, Debug)]
pub struct TupleAssignment<K, V> {
    tuple: Tuple<K, V>,
    page_id: SphereId,
}

impl<K, V> TupleAssignment<K, V> {
    pub fn assign(tuple: Tuple<K, V>, page_id: SphereId) -> Self {
        TupleAssignment { tuple, page_id }
    }

    pub fn tuple(&self) -> &Tuple<K, V> {
        &self.tuple
    }

    pub fn into_tuple(self) -> Tuple<K, V> {
        self.tuple
    }

    pub fn tuple_id(&self) -> SphereId {
        self.tuple.id()
    }

    pub fn page_id(&self) -> SphereId {
        self.page_id
    }

    pub fn is_on_page(&self, id: SphereId) -> bool {
        self.page_id == id
    }
}

/// A TreeTransaction is an atomic changeset: applied in full, it moves the
/// tree from one valid state to the next.
///
/// The transaction is only valid against the exact tree snapshot it was built
/// from. `expected_tree_id` captures that snapshot's last transaction id; a
/// store MUST reject the transaction when the ids no longer match, which is
/// how concurrent writers are detected (think of transactions as commits and
/// of the mismatch as a conflicting push).
#[derive(Clone, Debug)]
pub struct TreeTransaction<K, V> {
    transaction_id: SphereId,
    expected_tree_id: Option<SphereId>,
    created_nodes: Vec<NodeHeader<K>>,
    updated_nodes: Vec<NodeHeader<K>>,
    created_tuples: Vec<TupleAssignment<K, V>>,
    updated_tuples: Vec<TupleAssignment<K, V>>,
    deleted_pages: BTreeSet<SphereId>,
    deleted_nodes: BTreeSet<SphereId>,
    new_root: Option<SphereId>,
}

impl<K, V> TreeTransaction<K, V> {
    /// Collects the I/O operations of one changeset under a fresh transaction
    /// id. A new root is detected if one of the incoming headers has no
    /// parent; two parentless headers is a logic error.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        expected_tree_id: Option<SphereId>,
        created_nodes: Vec<NodeHeader<K>>,
        updated_nodes: Vec<NodeHeader<K>>,
        created_tuples: Vec<TupleAssignment<K, V>>,
        updated_tuples: Vec<TupleAssignment<K, V>>,
        deleted_pages: BTreeSet<SphereId>,
        deleted_nodes: BTreeSet<SphereId>,
    ) -> SphereResult<Self> {
        Self::with_id(
            SphereId::new(),
            expected_tree_id,
            created_nodes,
            updated_nodes,
            created_tuples,
            updated_tuples,
            deleted_pages,
            deleted_nodes,
        )
    }

    /// Rebuilds a transaction under an existing id. Used at the codec boundary
    /// so the raw transaction handed to the store keeps the id of the typed
    /// transaction it came from.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_id(
        transaction_id: SphereId,
        expected_tree_id: Option<SphereId>,
        created_nodes: Vec<NodeHeader<K>>,
        updated_nodes: Vec<NodeHeader<K>>,
        created_tuples: Vec<TupleAssignment<K, V>>,
        updated_tuples: Vec<TupleAssignment<K, V>>,
        deleted_pages: BTreeSet<SphereId>,
        deleted_nodes: BTreeSet<SphereId>,
    ) -> SphereResult<Self> {
        let new_root = find_new_root(&created_nodes, &updated_nodes)?;

        Ok(TreeTransaction {
            transaction_id,
            expected_tree_id,
            created_nodes,
            updated_nodes,
            created_tuples,
            updated_tuples,
            deleted_pages,
            deleted_nodes,
            new_root,
        })
    }

    pub fn transaction_id(&self) -> SphereId {
        self.transaction_id
    }

    /// The last transaction id of the snapshot this changeset was built from.
    pub fn expected_tree_id(&self) -> Option<SphereId> {
        self.expected_tree_id
    }

    /// The node headers created by this transaction (CRUD's Create).
    pub fn created_nodes(&self) -> &[NodeHeader<K>] {
        &self.created_nodes
    }

    /// The node headers mutated by this transaction (bigger radius, more
    /// children, ...).
    pub fn updated_nodes(&self) -> &[NodeHeader<K>] {
        &self.updated_nodes
    }

    pub fn created_tuples(&self) -> &[TupleAssignment<K, V>] {
        &self.created_tuples
    }

    pub fn updated_tuples(&self) -> &[TupleAssignment<K, V>] {
        &self.updated_tuples
    }

    /// The ids of DataPages whose pre-existing content must be dropped before
    /// the new tuple assignments are written (their tuples all moved elsewhere
    /// during a split or repack).
    pub fn deleted_pages(&self) -> &BTreeSet<SphereId> {
        &self.deleted_pages
    }

    /// The ids of node headers to delete outright. Repacking can leave a node
    /// with no content; this is how those orphans are removed.
    pub fn deleted_node_headers(&self) -> &BTreeSet<SphereId> {
        &self.deleted_nodes
    }

    /// True when this transaction installs a new root (i.e. grows the tree by
    /// one level or seeds an empty tree).
    pub fn has_new_root(&self) -> bool {
        self.new_root.is_some()
    }

    pub fn new_root(&self) -> Option<SphereId> {
        self.new_root
    }
}

/// If one of these headers is a root, find its id. Two or more roots is a bug
/// in the transaction compiler.
fn find_new_root<K>(
    created: &[NodeHeader<K>],
    updated: &[NodeHeader<K>],
) -> SphereResult<Option<SphereId>> {
    let mut roots = created
        .iter()
        .chain(updated.iter())
        .filter(|node| node.is_root());

    let first = roots.next().map(|node| node.id());
    if roots.next().is_some() {
        return Err(SphereError::new(
            "A transaction cannot stage multiple root nodes",
            ErrorKind::Invariant,
        ));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_parts() -> (
        Vec<TupleAssignment<f64, String>>,
        Vec<TupleAssignment<f64, String>>,
        BTreeSet<SphereId>,
        BTreeSet<SphereId>,
    ) {
        (Vec::new(), Vec::new(), BTreeSet::new(), BTreeSet::new())
    }

    #[test]
    fn detects_a_new_root() {
        let leaf_id = SphereId::new();
        let root = NodeHeader::inner(SphereId::new(), None, 0.0f64, 1.0, vec![leaf_id]);
        let root_id = root.id();
        let leaf = NodeHeader::leaf(leaf_id, Some(root_id), 0.0f64, 1.0, 3);

        let (ct, ut, dp, dn) = empty_parts();
        let tx = TreeTransaction::new(None, vec![root, leaf], vec![], ct, ut, dp, dn).unwrap();

        assert!(tx.has_new_root());
        assert_eq!(tx.new_root(), Some(root_id));
    }

    #[test]
    fn no_root_when_every_header_has_a_parent() {
        let leaf = NodeHeader::leaf(SphereId::new(), Some(SphereId::new()), 0.0f64, 1.0, 3);
        let (ct, ut, dp, dn) = empty_parts();
        let tx = TreeTransaction::new(Some(SphereId::new()), vec![], vec![leaf], ct, ut, dp, dn)
            .unwrap();
        assert!(!tx.has_new_root());
    }

    #[test]
    fn two_staged_roots_is_an_invariant_error() {
        let a = NodeHeader::inner(SphereId::new(), None, 0.0f64, 1.0, vec![SphereId::new()]);
        let b = NodeHeader::inner(SphereId::new(), None, 0.0f64, 1.0, vec![SphereId::new()]);
        let (ct, ut, dp, dn) = empty_parts();
        let err = TreeTransaction::new(None, vec![a], vec![b], ct, ut, dp, dn).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Invariant);
    }

    #[test]
    fn assignment_reports_its_page() {
        let tuple = Tuple::new(1.0f64, "a".to_string());
        let tuple_id = tuple.id();
        let page = SphereId::new();
        let assignment = TupleAssignment::assign(tuple, page);

        assert_eq!(assignment.tuple_id(), tuple_id);
        assert!(assignment.is_on_page(page));
        assert!(!assignment.is_on_page(SphereId::new()));
    }
}

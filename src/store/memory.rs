use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::store::{DataStore, RawDataPage, RawNodeHeader, RawTransaction, RawTuple};
use crate::transaction::TupleAssignment;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// In-memory implementation of a [`DataStore`].
///
/// # Purpose
/// `InMemoryStore` keeps all node headers and tuples in process memory. It is
/// fast because it performs no I/O, and it is the reference implementation of
/// the transaction semantics every backend must honor. Data does not survive
/// the process.
///
/// # Concurrency
/// All state sits behind one `parking_lot::RwLock`; a transaction applies
/// inside a single write critical section, so readers never observe a partial
/// changeset. The optimistic `expected_tree_id` check happens inside the same
/// section.
pub struct InMemoryStore {
    inner: RwLock<InMemoryStoreInner>,
}

struct InMemoryStoreInner {
    last_transaction_id: Option<SphereId>,
    root_id: Option<SphereId>,
    nodes: BTreeMap<SphereId, RawNodeHeader>,
    /// All tuples at any given page id, keyed tuple-id-unique.
    tuples: BTreeMap<SphereId, BTreeMap<SphereId, RawTuple>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            inner: RwLock::new(InMemoryStoreInner {
                last_transaction_id: None,
                root_id: None,
                nodes: BTreeMap::new(),
                tuples: BTreeMap::new(),
            }),
        }
    }

    /// The ids of every node header in this store. Not used during regular
    /// operation; exists so test harnesses can assert there are no orphans.
    pub fn all_node_ids(&self) -> BTreeSet<SphereId> {
        self.inner.read().nodes.keys().copied().collect()
    }

    /// The ids of every non-empty DataPage in this store. Not used during
    /// regular operation; exists so test harnesses can assert there are no
    /// orphans.
    pub fn all_page_ids(&self) -> BTreeSet<SphereId> {
        self.inner
            .read()
            .tuples
            .iter()
            .filter(|(_, page)| !page.is_empty())
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore for InMemoryStore {
    fn last_transaction_id(&self) -> Option<SphereId> {
        self.inner.read().last_transaction_id
    }

    fn root_id(&self) -> Option<SphereId> {
        self.inner.read().root_id
    }

    fn node_at(&self, id: SphereId) -> SphereResult<Option<RawNodeHeader>> {
        Ok(self.inner.read().nodes.get(&id).cloned())
    }

    fn data_page_at(&self, id: SphereId) -> SphereResult<Option<RawDataPage>> {
        let inner = self.inner.read();
        let Some(tuples) = inner.tuples.get(&id) else {
            return Ok(None);
        };
        if tuples.is_empty() {
            // Do NOT hand back an empty page here; surfacing the absence
            // makes logic errors visible sooner.
            return Ok(None);
        }
        Ok(Some(RawDataPage::from_tuples(
            id,
            tuples.values().cloned(),
        )))
    }

    fn apply_transaction(&self, transaction: RawTransaction) -> SphereResult<()> {
        let mut inner = self.inner.write();

        if inner.last_transaction_id != transaction.expected_tree_id() {
            return Err(SphereError::new(
                "Cannot apply transaction, the tree state has changed",
                ErrorKind::ConcurrentModification,
            ));
        }

        inner.last_transaction_id = Some(transaction.transaction_id());

        for id in transaction.deleted_pages() {
            inner.tuples.remove(id);
        }
        for id in transaction.deleted_node_headers() {
            inner.nodes.remove(id);
        }

        inner.write_tuples(transaction.created_tuples());
        inner.write_tuples(transaction.updated_tuples());

        inner.write_headers(transaction.created_nodes());
        inner.write_headers(transaction.updated_nodes());

        if let Some(new_root) = transaction.new_root() {
            inner.root_id = Some(new_root);
        }

        Ok(())
    }
}

impl InMemoryStoreInner {
    fn write_tuples(&mut self, assignments: &[TupleAssignment<Vec<u8>, Vec<u8>>]) {
        for assignment in assignments {
            self.tuples
                .entry(assignment.page_id())
                .or_default()
                .insert(assignment.tuple_id(), assignment.tuple().clone());
        }
    }

    /// These headers always overwrite whatever header existed previously.
    fn write_headers(&mut self, headers: &[RawNodeHeader]) {
        for header in headers {
            self.nodes.insert(header.id(), header.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeHeader;
    use crate::transaction::TreeTransaction;
    use crate::tuple::Tuple;

    fn seed_transaction() -> (RawTransaction, SphereId, SphereId) {
        let root_id = SphereId::new();
        let leaf_id = SphereId::new();
        let root = NodeHeader::inner(root_id, None, vec![0u8], 1.0, vec![leaf_id]);
        let leaf = NodeHeader::leaf(leaf_id, Some(root_id), vec![0u8], 1.0, 1);
        let tuple = Tuple::new(vec![0u8], vec![1u8]);

        let tx = TreeTransaction::new(
            None,
            vec![root, leaf],
            vec![],
            vec![TupleAssignment::assign(tuple, leaf_id)],
            vec![],
            BTreeSet::new(),
            BTreeSet::new(),
        )
        .unwrap();

        (tx, root_id, leaf_id)
    }

    #[test]
    fn empty_store_has_no_state() {
        let store = InMemoryStore::new();
        assert!(store.last_transaction_id().is_none());
        assert!(store.root_id().is_none());
        assert!(store.node_at(SphereId::new()).unwrap().is_none());
        assert!(store.data_page_at(SphereId::new()).unwrap().is_none());
    }

    #[test]
    fn applying_a_transaction_installs_the_tree() {
        let store = InMemoryStore::new();
        let (tx, root_id, leaf_id) = seed_transaction();
        let tx_id = tx.transaction_id();

        store.apply_transaction(tx).unwrap();

        assert_eq!(store.last_transaction_id(), Some(tx_id));
        assert_eq!(store.root_id(), Some(root_id));
        assert!(store.node_at(root_id).unwrap().is_some());
        assert_eq!(store.data_page_at(leaf_id).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn rejects_transaction_built_from_stale_state() {
        let store = InMemoryStore::new();
        let (tx, _, _) = seed_transaction();
        store.apply_transaction(tx).unwrap();

        // a second transaction that still expects the empty tree
        let (stale, _, _) = seed_transaction();
        let err = store.apply_transaction(stale).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ConcurrentModification);
    }

    #[test]
    fn stale_rejection_leaves_state_unchanged() {
        let store = InMemoryStore::new();
        let (tx, root_id, _) = seed_transaction();
        let tx_id = tx.transaction_id();
        store.apply_transaction(tx.clone()).unwrap();

        // re-applying the exact same transaction is detected as stale
        assert!(store.apply_transaction(tx).is_err());

        assert_eq!(store.last_transaction_id(), Some(tx_id));
        assert_eq!(store.root_id(), Some(root_id));
        assert_eq!(store.all_node_ids().len(), 2);
    }

    #[test]
    fn deleted_pages_drop_preexisting_tuples() {
        let store = InMemoryStore::new();
        let (tx, root_id, leaf_id) = seed_transaction();
        let tx_id = tx.transaction_id();
        store.apply_transaction(tx).unwrap();

        let mut deleted_pages = BTreeSet::new();
        deleted_pages.insert(leaf_id);
        let follow_up: RawTransaction = TreeTransaction::new(
            Some(tx_id),
            vec![],
            vec![NodeHeader::leaf(leaf_id, Some(root_id), vec![0u8], 0.0, 0)],
            vec![],
            vec![],
            deleted_pages,
            BTreeSet::new(),
        )
        .unwrap();

        store.apply_transaction(follow_up).unwrap();
        assert!(store.data_page_at(leaf_id).unwrap().is_none());
    }

    #[test]
    fn deleted_node_headers_are_removed() {
        let store = InMemoryStore::new();
        let (tx, root_id, leaf_id) = seed_transaction();
        let tx_id = tx.transaction_id();
        store.apply_transaction(tx).unwrap();

        let mut deleted_nodes = BTreeSet::new();
        deleted_nodes.insert(leaf_id);
        let follow_up: RawTransaction = TreeTransaction::new(
            Some(tx_id),
            vec![],
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            deleted_nodes,
        )
        .unwrap();

        store.apply_transaction(follow_up).unwrap();
        assert!(store.node_at(leaf_id).unwrap().is_none());
        assert!(store.node_at(root_id).unwrap().is_some());
    }

    #[test]
    fn inspection_hooks_report_all_ids() {
        let store = InMemoryStore::new();
        let (tx, root_id, leaf_id) = seed_transaction();
        store.apply_transaction(tx).unwrap();

        let node_ids = store.all_node_ids();
        assert!(node_ids.contains(&root_id));
        assert!(node_ids.contains(&leaf_id));

        let page_ids = store.all_page_ids();
        assert_eq!(page_ids.len(), 1);
        assert!(page_ids.contains(&leaf_id));
    }
}

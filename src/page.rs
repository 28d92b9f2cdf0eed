use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::tuple::Tuple;
use std::collections::{BTreeMap, BTreeSet};

/// A DataPage holds the set of tuples assigned to one leaf node. It is the
/// I/O unit of the tree: queries load ALL of a leaf's tuples or none of them,
/// just like a page of a B-tree-backed database.
///
/// The sphere geometry (center + radius) intentionally lives in the leaf's
/// [`crate::node::NodeHeader`], not here, so the geometry can be cached far
/// more aggressively than the bulky tuple data.
///
/// Tuples within a page are unique by tuple id.
#[derive(Clone, Debug)]
pub struct DataPage<K, V> {
    id: SphereId,
    tuples: BTreeMap<SphereId, Tuple<K, V>>,
}

impl<K, V> DataPage<K, V> {
    /// A new empty page with this id.
    pub fn new(id: SphereId) -> Self {
        DataPage {
            id,
            tuples: BTreeMap::new(),
        }
    }

    /// A new page with this id and these tuples.
    pub fn from_tuples(id: SphereId, tuples: impl IntoIterator<Item = Tuple<K, V>>) -> Self {
        let mut page = DataPage::new(id);
        for tuple in tuples {
            page.insert(tuple);
        }
        page
    }

    pub fn id(&self) -> SphereId {
        self.id
    }

    /// Adds a tuple, replacing any prior tuple with the same id.
    pub fn insert(&mut self, tuple: Tuple<K, V>) {
        self.tuples.insert(tuple.id(), tuple);
    }

    pub fn tuples(&self) -> impl Iterator<Item = &Tuple<K, V>> {
        self.tuples.values()
    }

    pub fn into_tuples(self) -> Vec<Tuple<K, V>> {
        self.tuples.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// The keys of every tuple on this page. A list, not a set, because keys
    /// can repeat.
    pub fn key_list(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.tuples.values().map(|t| t.key().clone()).collect()
    }

    /// The ids of every tuple on this page.
    pub fn id_set(&self) -> BTreeSet<SphereId> {
        self.tuples.keys().copied().collect()
    }

    /// Combine two pages that share an id. On a tuple-id collision the tuple
    /// from `a` wins (staged state beats snapshot state).
    pub fn merge(a: DataPage<K, V>, b: DataPage<K, V>) -> SphereResult<DataPage<K, V>> {
        if a.id != b.id {
            return Err(SphereError::new(
                "Cannot merge DataPages with different ids",
                ErrorKind::Invariant,
            ));
        }

        let mut merged = a;
        for (id, tuple) in b.tuples {
            merged.tuples.entry(id).or_insert(tuple);
        }
        Ok(merged)
    }
}

use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use std::cmp::Ordering;

/// A Tuple is the unit of data kept in the tree: a key/value pair decorated
/// with a unique [`SphereId`].
///
/// The id serves several purposes at once: it tracks insertion time, it
/// distinguishes tuples with identical keys, and it gives every tuple a stable
/// identity while repacking moves it between leaf pages. Values are optional;
/// a key-only tuple is useful when the tree is used purely as a spatial index.
///
/// Equality and ordering consider the id alone.
#[derive(Clone, Debug)]
pub struct Tuple<K, V> {
    id: SphereId,
    key: K,
    value: Option<V>,
}

impl<K, V> Tuple<K, V> {
    /// Draws a fresh id and constructs a new tuple.
    pub fn new(key: K, value: V) -> Self {
        Tuple {
            id: SphereId::new(),
            key,
            value: Some(value),
        }
    }

    /// Draws a fresh id and constructs a tuple with no value.
    pub fn key_only(key: K) -> Self {
        Tuple {
            id: SphereId::new(),
            key,
            value: None,
        }
    }

    /// Rebuilds a tuple that already has an identity (e.g. decoded from storage).
    pub fn restore(id: SphereId, key: K, value: Option<V>) -> Self {
        Tuple { id, key, value }
    }

    pub fn id(&self) -> SphereId {
        self.id
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Decomposes the tuple into its parts.
    pub fn into_parts(self) -> (SphereId, K, Option<V>) {
        (self.id, self.key, self.value)
    }
}

/// Zip n keys and n values together into n new tuples.
pub fn zip_tuples<K, V>(keys: Vec<K>, values: Vec<V>) -> SphereResult<Vec<Tuple<K, V>>> {
    if keys.len() != values.len() {
        return Err(SphereError::new(
            "The number of keys must equal the number of values",
            ErrorKind::Misuse,
        ));
    }

    Ok(keys
        .into_iter()
        .zip(values)
        .map(|(k, v)| Tuple::new(k, v))
        .collect())
}

impl<K, V> PartialEq for Tuple<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K, V> Eq for Tuple<K, V> {}

impl<K, V> PartialOrd for Tuple<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for Tuple<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

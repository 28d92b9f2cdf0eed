use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::tuple::{zip_tuples, Tuple};
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};

/// A Batch is a group of tuples that will be written to the tree as a single
/// atomic transaction.
#[derive(Clone, Debug)]
pub struct Batch<K, V> {
    id: SphereId,
    tuples: Vec<Tuple<K, V>>,
}

impl<K, V> Batch<K, V> {
    /// Wraps these tuples in a batch with a fresh id capturing creation time.
    pub fn new(tuples: Vec<Tuple<K, V>>) -> Self {
        Batch {
            id: SphereId::new(),
            tuples,
        }
    }

    pub fn id(&self) -> SphereId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// The tuples in insertion order.
    pub fn tuples(&self) -> &[Tuple<K, V>] {
        &self.tuples
    }

    pub fn into_tuples(self) -> Vec<Tuple<K, V>> {
        self.tuples
    }

    /// The set of tuple ids in this batch. Knowing these up front lets the
    /// transaction compiler distinguish CREATE from MOVE when emitting I/O
    /// operations.
    pub fn tuple_ids(&self) -> BTreeSet<SphereId> {
        self.tuples.iter().map(|t| t.id()).collect()
    }
}

/// Cuts a collection of tuples into batches of (at most) `batch_size` tuples.
pub fn batchify<K, V>(
    tuples: impl IntoIterator<Item = Tuple<K, V>>,
    batch_size: usize,
) -> SphereResult<Vec<Batch<K, V>>> {
    if batch_size == 0 {
        return Err(SphereError::new(
            "Batch size must be at least 1",
            ErrorKind::Misuse,
        ));
    }

    let mut batches = Vec::new();
    let mut pending = Vec::with_capacity(batch_size);
    for tuple in tuples {
        pending.push(tuple);
        if pending.len() == batch_size {
            batches.push(Batch::new(std::mem::take(&mut pending)));
        }
    }
    if !pending.is_empty() {
        batches.push(Batch::new(pending));
    }
    Ok(batches)
}

/// Zips parallel key/value vectors into batches.
pub fn batchify_pairs<K, V>(
    keys: Vec<K>,
    values: Vec<V>,
    batch_size: usize,
) -> SphereResult<Vec<Batch<K, V>>> {
    batchify(zip_tuples(keys, values)?, batch_size)
}

/// Cuts bare keys into batches of value-less tuples.
pub fn batchify_keys<K, V>(
    keys: impl IntoIterator<Item = K>,
    batch_size: usize,
) -> SphereResult<Vec<Batch<K, V>>> {
    batchify(keys.into_iter().map(Tuple::key_only), batch_size)
}

/// A BatchAccumulator queues incoming tuples until they are drained into a
/// [`Batch`] for bulk writing. `add` and `drain` never interleave a partial
/// observation; both take the same lock.
pub struct BatchAccumulator<K, V> {
    queue: Mutex<VecDeque<Tuple<K, V>>>,
}

impl<K, V> BatchAccumulator<K, V> {
    pub fn new() -> Self {
        BatchAccumulator {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a tuple in arrival order.
    pub fn add(&self, tuple: Tuple<K, V>) {
        self.queue.lock().push_back(tuple);
    }

    /// The number of tuples currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Atomically moves all queued tuples into a fresh batch and clears the
    /// queue.
    pub fn drain(&self) -> Batch<K, V> {
        let mut queue = self.queue.lock();
        let tuples: Vec<Tuple<K, V>> = queue.drain(..).collect();
        Batch::new(tuples)
    }
}

impl<K, V> Default for BatchAccumulator<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_insertion_order() {
        let tuples = vec![Tuple::new(1.0f64, "a"), Tuple::new(2.0f64, "b")];
        let ids: Vec<SphereId> = tuples.iter().map(|t| t.id()).collect();
        let batch = Batch::new(tuples);

        assert_eq!(batch.size(), 2);
        let batch_ids: Vec<SphereId> = batch.tuples().iter().map(|t| t.id()).collect();
        assert_eq!(batch_ids, ids);
    }

    #[test]
    fn tuple_ids_cover_the_batch() {
        let tuples = vec![Tuple::new(1.0f64, "a"), Tuple::new(2.0f64, "b")];
        let batch = Batch::new(tuples);
        assert_eq!(batch.tuple_ids().len(), 2);
    }

    #[test]
    fn batchify_partitions_evenly() {
        let tuples: Vec<Tuple<f64, i32>> = (0..10).map(|i| Tuple::new(i as f64, i)).collect();
        let batches = batchify(tuples, 4).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].size(), 4);
        assert_eq!(batches[1].size(), 4);
        assert_eq!(batches[2].size(), 2);
    }

    #[test]
    fn batchify_rejects_zero_batch_size() {
        let tuples: Vec<Tuple<f64, i32>> = vec![];
        assert!(batchify(tuples, 0).is_err());
    }

    #[test]
    fn batchify_keys_makes_value_less_tuples() {
        let batches: Vec<Batch<f64, String>> = batchify_keys(vec![1.0, 2.0, 3.0], 2).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].tuples()[0].value().is_none());
    }

    #[test]
    fn accumulator_drains_to_a_batch() {
        let accumulator = BatchAccumulator::new();
        accumulator.add(Tuple::new(1.0f64, "a"));
        accumulator.add(Tuple::new(2.0f64, "b"));
        assert_eq!(accumulator.len(), 2);

        let batch = accumulator.drain();
        assert_eq!(batch.size(), 2);
        assert!(accumulator.is_empty());
    }

    #[test]
    fn accumulator_drain_on_empty_yields_empty_batch() {
        let accumulator: BatchAccumulator<f64, String> = BatchAccumulator::new();
        assert!(accumulator.drain().is_empty());
    }

    #[test]
    fn later_batches_have_larger_ids() {
        let first: Batch<f64, i32> = Batch::new(vec![]);
        let second: Batch<f64, i32> = Batch::new(vec![]);
        assert!(first.id() < second.id());
    }
}

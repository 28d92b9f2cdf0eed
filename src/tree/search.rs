//! Range and k-nearest-neighbor queries.

use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::node::NodeHeader;
use crate::tree::core::TreeCore;
use crate::tuple::Tuple;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// One result of a query: a tuple and its distance to the search key.
#[derive(Clone, Debug)]
pub struct SearchResult<K, V> {
    tuple: Tuple<K, V>,
    distance: f64,
}

impl<K, V> SearchResult<K, V> {
    pub fn tuple(&self) -> &Tuple<K, V> {
        &self.tuple
    }

    pub fn key(&self) -> &K {
        self.tuple.key()
    }

    pub fn value(&self) -> Option<&V> {
        self.tuple.value()
    }

    pub fn id(&self) -> SphereId {
        self.tuple.id()
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }
}

// Ordered by distance so the result heap always has the worst-kept result on
// top, making the threshold for improving a kNN solution readily accessible.
impl<K, V> PartialEq for SearchResult<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K, V> Eq for SearchResult<K, V> {}

impl<K, V> PartialOrd for SearchResult<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for SearchResult<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.tuple.id().cmp(&other.tuple.id()))
    }
}

#[derive(Clone, Copy)]
enum SearchKind {
    KNearestNeighbors(usize),
    Range(f64),
}

/// A Search is an executable process that walks the tree collecting tuples
/// close to a search key, as either a k-nearest-neighbors query or a
/// fixed-radius range query.
///
/// A search executes at most once; re-executing is a warned no-op and the
/// result set is immutable once the search completes.
pub struct Search<K, V> {
    kind: SearchKind,
    search_key: K,
    queue: BinaryHeap<SearchResult<K, V>>,
    core: Arc<TreeCore<K, V>>,
    is_done: bool,
}

impl<K: Clone, V: Clone> Search<K, V> {
    pub(crate) fn knn(core: Arc<TreeCore<K, V>>, search_key: K, k: usize) -> SphereResult<Self> {
        if k < 1 {
            return Err(SphereError::new("k must be at least 1", ErrorKind::Misuse));
        }
        Ok(Search {
            kind: SearchKind::KNearestNeighbors(k),
            search_key,
            queue: BinaryHeap::new(),
            core,
            is_done: false,
        })
    }

    pub(crate) fn range(
        core: Arc<TreeCore<K, V>>,
        search_key: K,
        range: f64,
    ) -> SphereResult<Self> {
        if !(range > 0.0) {
            return Err(SphereError::new(
                "The range must be strictly positive",
                ErrorKind::Misuse,
            ));
        }
        Ok(Search {
            kind: SearchKind::Range(range),
            search_key,
            queue: BinaryHeap::new(),
            core,
            is_done: false,
        })
    }

    /// Runs the query.
    ///
    /// The descent uses an explicit stack, never recursion: the tree can be
    /// deeper than the call stack. Children are pushed worst-first so that
    /// promising spheres are explored early, the inclusion radius tightens
    /// quickly, and far-away spheres get skipped without I/O.
    pub fn execute(&mut self) -> SphereResult<()> {
        if self.is_done {
            log::warn!("Attempting to (re)execute a completed search");
            return Ok(());
        }

        let Some(root) = self.core.root_node()? else {
            self.is_done = true;
            return Ok(());
        };

        let metric = self.core.config().metric().clone();

        let mut nodes_to_search: Vec<NodeHeader<K>> = vec![root];

        while let Some(current) = nodes_to_search.pop() {
            // skip this node, and its entire subtree, when its sphere cannot
            // overlap the query sphere
            let center_dist = metric.distance(&self.search_key, current.center())?;
            if center_dist > current.radius() + self.inclusion_radius() {
                continue;
            }

            if current.is_leaf() {
                if let Some(page) = self.core.data_page_at(current.id())? {
                    for tuple in page.tuples() {
                        let distance = metric.distance(&self.search_key, tuple.key())?;
                        if distance <= self.inclusion_radius() {
                            self.queue.push(SearchResult {
                                tuple: tuple.clone(),
                                distance,
                            });
                            if let SearchKind::KNearestNeighbors(k) = self.kind {
                                while self.queue.len() > k {
                                    self.queue.pop();
                                }
                            }
                        }
                    }
                }
            } else {
                let mut children: Vec<(f64, NodeHeader<K>)> = Vec::new();
                for child in self.core.nodes_below(current.id())? {
                    let dist = metric.distance(&self.search_key, child.center())?;
                    children.push((dist, child));
                }

                // push from worst to best, so the best is popped first
                children.sort_by(|a, b| b.0.total_cmp(&a.0));
                for (_, child) in children {
                    nodes_to_search.push(child);
                }
            }
        }

        self.is_done = true;
        Ok(())
    }

    /// The effective radius used to prune subtrees: for kNN, infinite until k
    /// results are held and the k-th best distance afterwards; for a range
    /// query, the fixed range.
    fn inclusion_radius(&self) -> f64 {
        match self.kind {
            SearchKind::KNearestNeighbors(k) => {
                if self.queue.len() < k {
                    f64::INFINITY
                } else {
                    self.queue.peek().map(|worst| worst.distance).unwrap_or(f64::INFINITY)
                }
            }
            SearchKind::Range(range) => range,
        }
    }

    /// The results of the executed search, sorted by ascending distance.
    /// Asking before [`Search::execute`] ran is a state error.
    pub fn results(&self) -> SphereResult<SearchResults<K, V>> {
        if !self.is_done {
            return Err(SphereError::new(
                "The search was not executed",
                ErrorKind::State,
            ));
        }
        Ok(SearchResults {
            search_key: self.search_key.clone(),
            results: self.queue.clone().into_sorted_vec(),
        })
    }
}

/// The results of a kNN or range search, always sorted by distance to the
/// search key (element 0 is the nearest neighbor).
#[derive(Clone, Debug)]
pub struct SearchResults<K, V> {
    search_key: K,
    results: Vec<SearchResult<K, V>>,
}

impl<K, V> SearchResults<K, V> {
    /// The key the search was based on.
    pub fn search_key(&self) -> &K {
        &self.search_key
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// All results, sorted by ascending distance.
    pub fn results(&self) -> &[SearchResult<K, V>] {
        &self.results
    }

    /// Cherry-picks one result (0 = the closest tuple).
    pub fn result(&self, i: usize) -> Option<&SearchResult<K, V>> {
        self.results.get(i)
    }

    /// Just the tuples, sorted by distance.
    pub fn tuples(&self) -> Vec<&Tuple<K, V>> {
        self.results.iter().map(|r| r.tuple()).collect()
    }

    /// Just the keys, sorted by distance.
    pub fn keys(&self) -> Vec<&K> {
        self.results.iter().map(|r| r.key()).collect()
    }

    /// Just the values, sorted by distance.
    pub fn values(&self) -> Vec<Option<&V>> {
        self.results.iter().map(|r| r.value()).collect()
    }

    /// Just the tuple ids, sorted by distance.
    pub fn ids(&self) -> Vec<SphereId> {
        self.results.iter().map(|r| r.id()).collect()
    }

    /// Just the distances, ascending.
    pub fn distances(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.distance()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_sort_ascending_by_distance() {
        let mut heap = BinaryHeap::new();
        for (key, dist) in [(1.0f64, 5.0), (2.0, 1.0), (3.0, 3.0)] {
            heap.push(SearchResult {
                tuple: Tuple::new(key, "v"),
                distance: dist,
            });
        }

        let sorted = heap.into_sorted_vec();
        let distances: Vec<f64> = sorted.iter().map(|r| r.distance()).collect();
        assert_eq!(distances, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn heap_keeps_the_worst_result_on_top() {
        let mut heap = BinaryHeap::new();
        for dist in [2.0, 9.0, 4.0] {
            heap.push(SearchResult {
                tuple: Tuple::new(dist, "v"),
                distance: dist,
            });
        }
        assert_eq!(heap.peek().map(|r| r.distance()), Some(9.0));
    }
}

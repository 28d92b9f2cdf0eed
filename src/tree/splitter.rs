//! Center selection and DataPage splitting.

use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::metric::CountingDistanceMetric;
use crate::page::DataPage;
use crate::tuple::Tuple;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Enough information to build a node header and a DataPage for one side of a
/// split.
pub(crate) struct Stub<K, V> {
    pub center: K,
    pub tuples: Vec<Tuple<K, V>>,
    pub radius: f64,
}

/// A Splitter owns the policy for electing the center points of new nodes and
/// for dividing an overflowing DataPage between two siblings.
///
/// The reference center policy draws `floor(sqrt(n))` random key pairs and
/// keeps the pair with the largest distance; those two keys should produce
/// child spheres whose volumes overlap as little as possible.
pub(crate) struct Splitter<K> {
    metric: Arc<CountingDistanceMetric<K>>,
    rng: StdRng,
}

impl<K: Clone> Splitter<K> {
    /// A splitter seeded from entropy, or deterministically when a seed was
    /// configured for reproducible benchmarks.
    pub fn new(metric: Arc<CountingDistanceMetric<K>>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Splitter { metric, rng }
    }

    /// Selects two keys from this set that are likely far apart.
    pub fn pick_centers(&mut self, keys: &[K]) -> SphereResult<(K, K)> {
        if keys.len() < 2 {
            return Err(SphereError::new(
                "Cannot pick two centers from fewer than two keys",
                ErrorKind::Invariant,
            ));
        }

        // sqrt(n) draws strikes a good balance between split quality and the
        // number of metric executions
        let num_pairs_to_draw = (keys.len() as f64).sqrt() as usize;

        let (mut best_a, mut best_b) = self.random_pair(keys);
        let mut biggest_distance = self.metric.distance(&keys[best_a], &keys[best_b])?;

        for _ in 1..num_pairs_to_draw {
            let (a, b) = self.random_pair(keys);
            let distance = self.metric.distance(&keys[a], &keys[b])?;
            if distance > biggest_distance {
                best_a = a;
                best_b = b;
                biggest_distance = distance;
            }
        }

        Ok((keys[best_a].clone(), keys[best_b].clone()))
    }

    /// Two random distinct indices into the key list.
    fn random_pair(&mut self, keys: &[K]) -> (usize, usize) {
        let n = keys.len();
        let first = self.rng.gen_range(0..n);
        let mut second = self.rng.gen_range(0..n);
        while first == second {
            second = self.rng.gen_range(0..n);
        }
        (first, second)
    }

    /// Splits an overflowing DataPage into two stubs, assigning every tuple to
    /// the nearer of two freshly elected centers (ties alternate sides) and
    /// tracking each side's exact radius as it goes.
    pub fn careful_split<V: Clone>(
        &mut self,
        page: &DataPage<K, V>,
    ) -> SphereResult<(Stub<K, V>, Stub<K, V>)> {
        let (left_center, right_center) = self.pick_centers(&page.key_list())?;

        let mut left_tuples = Vec::new();
        let mut right_tuples = Vec::new();
        let mut left_radius: f64 = 0.0;
        let mut right_radius: f64 = 0.0;
        let mut tie_breaker = false;

        for tuple in page.tuples() {
            let left_dist = self.metric.distance(&left_center, tuple.key())?;
            let right_dist = self.metric.distance(&right_center, tuple.key())?;

            let goes_left = if left_dist == right_dist {
                tie_breaker = !tie_breaker;
                tie_breaker
            } else {
                left_dist < right_dist
            };

            if goes_left {
                left_tuples.push(tuple.clone());
                left_radius = left_radius.max(left_dist);
            } else {
                right_tuples.push(tuple.clone());
                right_radius = right_radius.max(right_dist);
            }
        }

        Ok((
            Stub {
                center: left_center,
                tuples: left_tuples,
                radius: left_radius,
            },
            Stub {
                center: right_center,
                tuples: right_tuples,
                radius: right_radius,
            },
        ))
    }

    /// QUICKLY splits an overflowing DataPage by dealing tuples out
    /// alternately, with no distance computation and radii of zero.
    ///
    /// Only legal when the caller will immediately repack both sides, because
    /// the sloppy assignment (and the zero radii) would otherwise corrupt
    /// query pruning. Any effort spent on a good assignment here would be
    /// thrown away by that repack.
    pub fn quick_split<V: Clone>(
        &mut self,
        page: &DataPage<K, V>,
    ) -> SphereResult<(Stub<K, V>, Stub<K, V>)> {
        let (left_center, right_center) = self.pick_centers(&page.key_list())?;

        let mut left_tuples = Vec::new();
        let mut right_tuples = Vec::new();
        let mut tie_breaker = false;

        for tuple in page.tuples() {
            if tie_breaker {
                left_tuples.push(tuple.clone());
            } else {
                right_tuples.push(tuple.clone());
            }
            tie_breaker = !tie_breaker;
        }

        Ok((
            Stub {
                center: left_center,
                tuples: left_tuples,
                radius: 0.0,
            },
            Stub {
                center: right_center,
                tuples: right_tuples,
                radius: 0.0,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SphereId;

    fn splitter() -> Splitter<f64> {
        let metric = CountingDistanceMetric::instrument(Arc::new(|a: &f64, b: &f64| (a - b).abs()));
        Splitter::new(Arc::new(metric), Some(17))
    }

    fn page_of(keys: &[f64]) -> DataPage<f64, String> {
        DataPage::from_tuples(
            SphereId::new(),
            keys.iter().map(|k| Tuple::new(*k, k.to_string())),
        )
    }

    #[test]
    fn pick_centers_needs_two_keys() {
        let mut splitter = splitter();
        assert!(splitter.pick_centers(&[1.0]).is_err());
        assert!(splitter.pick_centers(&[]).is_err());
        assert!(splitter.pick_centers(&[1.0, 2.0]).is_ok());
    }

    #[test]
    fn pick_centers_returns_two_existing_keys() {
        let mut splitter = splitter();
        let keys = vec![1.0, 2.0, 50.0, 51.0, 100.0];
        let (a, b) = splitter.pick_centers(&keys).unwrap();
        assert!(keys.contains(&a));
        assert!(keys.contains(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn careful_split_covers_every_tuple_exactly_once() {
        let mut splitter = splitter();
        let page = page_of(&[1.0, 2.0, 3.0, 90.0, 91.0, 92.0]);

        let (left, right) = splitter.careful_split(&page).unwrap();
        assert_eq!(left.tuples.len() + right.tuples.len(), page.len());
        assert!(!left.tuples.is_empty());
        assert!(!right.tuples.is_empty());
    }

    #[test]
    fn careful_split_radii_are_exact() {
        let mut splitter = splitter();
        let page = page_of(&[1.0, 2.0, 3.0, 90.0, 91.0, 92.0]);

        let (left, right) = splitter.careful_split(&page).unwrap();
        for stub in [&left, &right] {
            let expected = stub
                .tuples
                .iter()
                .map(|t| (t.key() - stub.center).abs())
                .fold(0.0f64, f64::max);
            assert_eq!(stub.radius, expected);
        }
    }

    #[test]
    fn careful_split_with_identical_keys_alternates() {
        let mut splitter = splitter();
        let page = page_of(&[5.0, 5.0, 5.0, 5.0, 5.0, 5.0]);

        let (left, right) = splitter.careful_split(&page).unwrap();
        assert_eq!(left.tuples.len(), 3);
        assert_eq!(right.tuples.len(), 3);
        assert_eq!(left.radius, 0.0);
        assert_eq!(right.radius, 0.0);
    }

    #[test]
    fn quick_split_deals_alternately_with_zero_radii() {
        let mut splitter = splitter();
        let page = page_of(&[1.0, 2.0, 3.0, 90.0, 91.0]);

        let (left, right) = splitter.quick_split(&page).unwrap();
        assert_eq!(left.tuples.len() + right.tuples.len(), 5);
        assert!(left.tuples.len().abs_diff(right.tuples.len()) <= 1);
        assert_eq!(left.radius, 0.0);
        assert_eq!(right.radius, 0.0);
    }

    #[test]
    fn seeded_splitters_agree() {
        let mut first = splitter();
        let mut second = splitter();
        let keys: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert_eq!(first.pick_centers(&keys).unwrap(), second.pick_centers(&keys).unwrap());
    }
}

//! Distance metrics over the key space.

use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::node::NodeHeader;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A DistanceMetric must define a true metric space (in the strict algebraic
/// sense) over keys:
///
/// ```text
/// (1) d(x, y) >= 0
/// (2) d(x, y) == d(y, x)
/// (3) d(x, z) <= d(x, y) + d(y, z)
/// ```
///
/// All sphere-based pruning in the tree depends on the triangle inequality; a
/// function that violates it will silently return wrong query results.
///
/// Any `Fn(&K, &K) -> f64 + Send + Sync` closure works as a metric.
pub trait DistanceMetric<K>: Send + Sync {
    /// The distance between two keys.
    fn distance(&self, a: &K, b: &K) -> f64;
}

impl<K, F> DistanceMetric<K> for F
where
    F: Fn(&K, &K) -> f64 + Send + Sync,
{
    fn distance(&self, a: &K, b: &K) -> f64 {
        self(a, b)
    }
}

/// Decorates a user metric with execution counting and result verification.
///
/// The counter makes it cheap to measure how much distance work different tree
/// configurations cost. Verification rejects NaN and negative results at the
/// metric boundary, so a broken metric fails loudly instead of corrupting the
/// tree geometry.
pub struct CountingDistanceMetric<K> {
    inner: Arc<dyn DistanceMetric<K>>,
    executions: AtomicU64,
}

impl<K> CountingDistanceMetric<K> {
    /// Instruments this metric.
    pub fn instrument(metric: Arc<dyn DistanceMetric<K>>) -> Self {
        CountingDistanceMetric {
            inner: metric,
            executions: AtomicU64::new(0),
        }
    }

    /// Computes the distance between two keys, counting the call and failing
    /// with an invariant error when the metric produces NaN or a negative
    /// value.
    pub fn distance(&self, a: &K, b: &K) -> SphereResult<f64> {
        self.executions.fetch_add(1, Ordering::Relaxed);

        let dist = self.inner.distance(a, b);
        if dist.is_nan() {
            return Err(SphereError::new(
                "A distance measurement was NaN",
                ErrorKind::Invariant,
            ));
        }
        if dist < 0.0 {
            return Err(SphereError::new(
                "A negative distance measurement was observed",
                ErrorKind::Invariant,
            ));
        }
        Ok(dist)
    }

    /// How many times the user metric was invoked.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// The radius of the sphere centered at `center` that just barely contains
    /// all of `items`.
    pub fn enclosing_radius<'a>(
        &self,
        center: &K,
        items: impl Iterator<Item = &'a K>,
    ) -> SphereResult<f64>
    where
        K: 'a,
    {
        let mut radius: f64 = 0.0;
        for item in items {
            radius = radius.max(self.distance(center, item)?);
        }
        Ok(radius)
    }

    /// The largest radius a new inner node could need if it had this center and
    /// these children. This overestimates (center-to-center distance plus the
    /// child's own radius) so it never requires touching tuples; leaf radii
    /// stay exact, which keeps queries correct.
    pub fn estimate_inner_radius(
        &self,
        center: &K,
        children: &[NodeHeader<K>],
    ) -> SphereResult<f64> {
        let mut radius: f64 = 0.0;
        for child in children {
            let full = self.distance(center, child.center())? + child.radius();
            radius = radius.max(full);
        }
        Ok(radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SphereId;

    fn abs_metric() -> CountingDistanceMetric<f64> {
        CountingDistanceMetric::instrument(Arc::new(|a: &f64, b: &f64| (a - b).abs()))
    }

    #[test]
    fn counts_every_execution() {
        let metric = abs_metric();
        assert_eq!(metric.executions(), 0);

        metric.distance(&1.0, &4.0).unwrap();
        metric.distance(&2.0, &2.0).unwrap();
        assert_eq!(metric.executions(), 2);
    }

    #[test]
    fn rejects_nan_distances() {
        let metric: CountingDistanceMetric<f64> =
            CountingDistanceMetric::instrument(Arc::new(|_: &f64, _: &f64| f64::NAN));
        let err = metric.distance(&0.0, &0.0).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Invariant);
    }

    #[test]
    fn rejects_negative_distances() {
        let metric: CountingDistanceMetric<f64> =
            CountingDistanceMetric::instrument(Arc::new(|_: &f64, _: &f64| -1.0));
        let err = metric.distance(&0.0, &0.0).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Invariant);
    }

    #[test]
    fn enclosing_radius_is_the_max_distance() {
        let metric = abs_metric();
        let items = [1.0, 5.0, 3.0];
        let radius = metric.enclosing_radius(&2.0, items.iter()).unwrap();
        assert_eq!(radius, 3.0);
    }

    #[test]
    fn enclosing_radius_of_nothing_is_zero() {
        let metric = abs_metric();
        let radius = metric.enclosing_radius(&2.0, std::iter::empty()).unwrap();
        assert_eq!(radius, 0.0);
    }

    #[test]
    fn inner_radius_estimate_adds_child_radii() {
        let metric = abs_metric();
        let near = NodeHeader::leaf(SphereId::new(), None, 1.0, 0.5, 1);
        let far = NodeHeader::leaf(SphereId::new(), None, 10.0, 2.0, 1);
        let estimate = metric.estimate_inner_radius(&0.0, &[near, far]).unwrap();
        assert_eq!(estimate, 12.0);
    }
}

//! Shared fixtures for the end-to-end tests: a 2-D point key type, its codec,
//! a Euclidean metric, random data generators, and a rigorous tree verifier.

#![allow(dead_code)]

use rand::Rng;
use spheredb::batch::{batchify, Batch};
use spheredb::codec::{Codec, StringCodec};
use spheredb::config::{TreeConfig, TreeConfigBuilder};
use spheredb::errors::{ErrorKind, SphereError, SphereResult};
use spheredb::id::SphereId;
use spheredb::store::InMemoryStore;
use spheredb::tree::MetricTree;
use spheredb::tuple::Tuple;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A point on a 2-D plane; the key type for most scenarios.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }
}

pub fn euclid(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

pub struct PointCodec;

impl Codec<Point> for PointCodec {
    fn to_bytes(&self, item: &Point) -> SphereResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&item.x.to_be_bytes());
        bytes.extend_from_slice(&item.y.to_be_bytes());
        Ok(bytes)
    }

    fn from_bytes(&self, bytes: &[u8]) -> SphereResult<Point> {
        if bytes.len() != 16 {
            return Err(SphereError::new(
                "A point encoding must be 16 bytes",
                ErrorKind::Backend,
            ));
        }
        let mut x = [0u8; 8];
        let mut y = [0u8; 8];
        x.copy_from_slice(&bytes[..8]);
        y.copy_from_slice(&bytes[8..]);
        Ok(Point::new(f64::from_be_bytes(x), f64::from_be_bytes(y)))
    }
}

pub fn random_point() -> Point {
    let mut rng = rand::thread_rng();
    Point::new(rng.gen_range(-90.0..90.0), rng.gen_range(-180.0..180.0))
}

/// n tuples with random point keys and stringified-index values.
pub fn test_data(n: usize) -> Vec<Tuple<Point, String>> {
    (0..n)
        .map(|i| Tuple::new(random_point(), i.to_string()))
        .collect()
}

/// A builder pre-loaded with the point metric and codecs, wired to this store.
pub fn tree_builder(store: Arc<InMemoryStore>) -> TreeConfigBuilder<Point, String> {
    TreeConfig::builder()
        .metric(euclid)
        .key_codec(PointCodec)
        .value_codec(StringCodec)
        .data_store(store)
}

/// A fresh in-memory tree plus a handle on its concrete store, for orphan
/// checks.
pub fn build_tree(
    max_tuples_per_page: usize,
    branching_factor: usize,
) -> (MetricTree<Point, String>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let tree = tree_builder(store.clone())
        .max_tuples_per_page(max_tuples_per_page)
        .branching_factor(branching_factor)
        .build_tree()
        .expect("config should build");
    (tree, store)
}

/// Adds test data in batches of 50, like a steady stream of writes would.
pub fn add_test_data(tree: &MetricTree<Point, String>, data: &[Tuple<Point, String>]) {
    add_test_data_in_batches(tree, data, 50);
}

pub fn add_test_data_in_batches(
    tree: &MetricTree<Point, String>,
    data: &[Tuple<Point, String>],
    batch_size: usize,
) {
    let batches: Vec<Batch<Point, String>> =
        batchify(data.iter().cloned(), batch_size).expect("batchify");
    tree.add_batches(batches).expect("batches should apply");
}

/// Rigorously verifies that the tree contains exactly this data and that
/// every structural invariant holds.
pub fn verify_tree(
    test_data: &[Tuple<Point, String>],
    tree: &MetricTree<Point, String>,
    store: &InMemoryStore,
) {
    let core = tree.core();
    let config_branching = core.config().branching_factor();
    let config_max_tuples = core.config().max_tuples_per_page();

    let all_nodes = core.all_nodes().expect("all_nodes");
    let leaf_nodes = core.leaf_nodes().expect("leaf_nodes");
    let inner_nodes = core.inner_nodes().expect("inner_nodes");

    // root uniqueness: exactly one parentless node, and it is the store's root
    let roots: Vec<_> = all_nodes.iter().filter(|n| n.is_root()).collect();
    assert_eq!(roots.len(), 1, "exactly one root");
    assert_eq!(Some(roots[0].id()), core.root_id(), "root id matches store");

    // no orphans: everything in the store is reachable from the root
    let reachable_node_ids: BTreeSet<SphereId> = all_nodes.iter().map(|n| n.id()).collect();
    assert_eq!(
        store.all_node_ids(),
        reachable_node_ids,
        "no orphan NodeHeaders"
    );

    let leaf_ids: BTreeSet<SphereId> = leaf_nodes.iter().map(|n| n.id()).collect();
    assert_eq!(store.all_page_ids(), leaf_ids, "no orphan DataPages");

    // parent links: every non-root node's parent lists it as a child
    for node in &all_nodes {
        if let Some(parent_id) = node.parent() {
            let parent = core
                .node_at(parent_id)
                .expect("parent read")
                .expect("parent exists");
            assert!(
                parent.children().expect("inner parent").contains(&node.id()),
                "parent {} lists child {}",
                parent_id,
                node.id()
            );
        }
    }

    // leaf constraints: size match, bounded size, exact radii, page exists
    for leaf in &leaf_nodes {
        let page = core
            .data_page_at(leaf.id())
            .expect("page read")
            .unwrap_or_else(|| panic!("leaf {} has no DataPage", leaf.id()));

        let tuple_count = leaf.tuple_count().expect("leaf count");
        assert_eq!(tuple_count, page.len(), "leaf count matches page size");
        assert!(
            tuple_count <= config_max_tuples,
            "no leaf exceeds maxTuplesPerPage"
        );

        let expected_radius = page
            .tuples()
            .map(|t| euclid(leaf.center(), t.key()))
            .fold(0.0f64, f64::max);
        assert_eq!(leaf.radius(), expected_radius, "leaf radius is exact");
    }

    // inner constraints: bounded branching, children present, no data pages
    for inner in &inner_nodes {
        let num_children = inner.num_children().expect("inner children");
        assert!(num_children >= 1, "inner nodes have children");
        assert!(
            num_children <= config_branching,
            "no inner node exceeds the branching factor"
        );
        assert!(
            core.data_page_at(inner.id()).expect("page read").is_none(),
            "no DataPage shares an id with an inner node"
        );
    }

    // every tuple is in exactly one leaf, and the data is exactly the test set
    let test_ids: BTreeSet<SphereId> = test_data.iter().map(|t| t.id()).collect();
    let tree_ids: BTreeSet<SphereId> = core
        .tuples()
        .expect("tuples")
        .iter()
        .map(|t| t.id())
        .collect();
    assert_eq!(test_ids, tree_ids, "the tree holds exactly the test data");

    let leaf_size_sum: usize = leaf_nodes
        .iter()
        .map(|leaf| leaf.tuple_count().expect("leaf count"))
        .sum();
    assert_eq!(
        leaf_size_sum,
        test_data.len(),
        "no tuple is in two leaves"
    );
}

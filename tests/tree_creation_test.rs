mod common;

use common::*;

#[test]
fn simplest_possible_spin_up_root_never_splits() {
    let (tree, store) = build_tree(64, 64);

    // 10 < 64 tuples, so the first leaf never splits
    let test_data = test_data(10);
    add_test_data(&tree, &test_data);

    verify_tree(&test_data, &tree, &store);

    let stats = tree.tree_stats().expect("stats");
    assert_eq!(stats.num_inner_nodes(), 1, "tree has one inner node");
    assert_eq!(stats.num_leaf_nodes(), 1, "tree has one leaf node");
    assert_eq!(stats.num_tuples(), 10);
}

#[test]
fn spin_up_that_splits_a_leaf_node() {
    let (tree, store) = build_tree(8, 64);

    // 9 tuples overflow an 8-tuple page, forcing one leaf split
    let test_data = test_data(9);
    add_test_data(&tree, &test_data);

    verify_tree(&test_data, &tree, &store);

    let stats = tree.tree_stats().expect("stats");
    assert_eq!(stats.num_inner_nodes(), 1, "tree has one inner node");
    assert_eq!(stats.num_leaf_nodes(), 2, "tree has two leaf nodes");
    assert_eq!(stats.num_tuples(), 9);
}

#[test]
fn spin_up_that_splits_an_inner_node() {
    // storing 19 items requires at least 4 leaves (given this config), which
    // overflows a 3-way inner node and forces an inner split
    let (tree, store) = build_tree(5, 3);

    let test_data = test_data(19);
    add_test_data(&tree, &test_data);

    verify_tree(&test_data, &tree, &store);

    let stats = tree.tree_stats().expect("stats");
    assert!(
        stats.num_inner_nodes() >= 2,
        "at least one inner split happened (saw {} inner nodes)",
        stats.num_inner_nodes()
    );
}

#[test]
fn large_in_memory_tree() {
    let (tree, store) = build_tree(500, 20);

    let test_data = test_data(10_000);
    add_test_data(&tree, &test_data);

    verify_tree(&test_data, &tree, &store);

    let stats = tree.tree_stats().expect("stats");
    assert_eq!(stats.num_tuples(), 10_000);
    assert!(stats.mean_page_radius() > 0.0);
}

#[test]
fn tree_with_value_less_tuples() {
    use spheredb::batch::batchify;
    use spheredb::tuple::Tuple;

    let (tree, store) = build_tree(50, 20);

    let test_data: Vec<Tuple<Point, String>> = (0..1_000)
        .map(|_| Tuple::key_only(random_point()))
        .collect();

    let batches = batchify(test_data.iter().cloned(), 50).expect("batchify");
    tree.add_batches(batches).expect("batches apply");

    verify_tree(&test_data, &tree, &store);

    // queries still run against key-only data
    let results = tree.closest(random_point()).expect("search");
    assert_eq!(results.len(), 1);
    assert!(results.result(0).expect("one result").value().is_none());
}

#[test]
fn no_repacking_mode_still_builds_a_valid_tree() {
    let store = std::sync::Arc::new(spheredb::store::InMemoryStore::new());
    let tree = tree_builder(store.clone())
        .max_tuples_per_page(25)
        .branching_factor(8)
        .no_repacking()
        .build_tree()
        .expect("config");

    let test_data = test_data(2_000);
    add_test_data(&tree, &test_data);

    verify_tree(&test_data, &tree, &store);
}

#[test]
fn whole_tree_repack_preserves_the_data() {
    let (tree, store) = build_tree(25, 8);

    let test_data = test_data(1_500);
    add_test_data(&tree, &test_data);
    verify_tree(&test_data, &tree, &store);

    tree.repack_tree().expect("repack");
    verify_tree(&test_data, &tree, &store);
}

#[test]
fn batches_accumulate_across_calls() {
    let (tree, store) = build_tree(50, 8);

    let first = test_data(300);
    add_test_data(&tree, &first);

    let second = test_data(300);
    add_test_data(&tree, &second);

    let mut all = first;
    all.extend(second);
    verify_tree(&all, &tree, &store);
}

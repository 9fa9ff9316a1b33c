//! End-to-end find/aggregate scenarios, scaled down from the full-size
//! scenarios so the default test run stays fast (see `stress.rs` for the
//! million-element variants run manually).

use sombra::{
    AccOp, AggregateLeaf, AggregateTarget, Atom, CancellationToken, Collection, EngineConfig,
    FindLeaf, Operator, PredicateTree, QueryDriver, QueryMetrics, TypeTag,
};

const NAME: u32 = 10;
const VALUE: u64 = 7;
const SCALE: u64 = 4_000;

fn populated_collection() -> Collection {
    let mut cfg = EngineConfig::small();
    cfg.bin_max_elems = 512;
    cfg.bin_max_bytes = 256 * 1024;
    cfg.max_bins = 256;
    let coll = Collection::new("widgets", cfg);

    for _ in 0..SCALE {
        let atoms: Vec<Atom> = (0..30).map(|_| Atom::new(0, NAME, TypeTag::Int64, 8, VALUE)).collect();
        let (bin_idx, elem_idx) = coll.acquire_insert_buffer(atoms.len() as u32).unwrap();
        coll.write_and_release(bin_idx, elem_idx, &atoms).unwrap();
    }
    coll
}

#[test]
fn s1_ne_and_gte_on_an_all_equal_collection_matches_nothing() {
    let coll = populated_collection();
    let driver = QueryDriver::new(EngineConfig::small());
    let filter = Atom::new(0, NAME, TypeTag::Int64, 8, VALUE);

    let leaves = vec![
        FindLeaf::new(0, Operator::Ne, filter),
        FindLeaf::new(1, Operator::Gte, filter),
    ];
    let out = driver
        .find(&coll, leaves, PredicateTree::AndAll, None, &CancellationToken::new(), &QueryMetrics::new())
        .unwrap();
    assert_eq!(out[0].value(), 0);
    assert_eq!(out.len(), 1); // header only
}

#[test]
fn s2_eq_on_a_distinct_tail_element_matches_exactly_that_element() {
    let coll = populated_collection();
    let tail_atoms = [
        Atom::new(0, NAME, TypeTag::Int64, 8, VALUE),
        Atom::new(0, 20, TypeTag::Utf8String, 4, 0xDEAD),
    ];
    let (bin_idx, elem_idx) = coll.acquire_insert_buffer(tail_atoms.len() as u32).unwrap();
    coll.write_and_release(bin_idx, elem_idx, &tail_atoms).unwrap();

    let driver = QueryDriver::new(EngineConfig::small());
    let filter = Atom::new(0, 20, TypeTag::Utf8String, 4, 0xDEAD);
    let leaf = FindLeaf::new(0, Operator::Eq, filter);
    let out = driver
        .find(&coll, vec![leaf], PredicateTree::Trivial, None, &CancellationToken::new(), &QueryMetrics::new())
        .unwrap();

    assert_eq!(out[0].value(), 1);
    // header, ID-less document: the two atoms we inserted, then a delimiter.
    assert_eq!(out.len(), 4);
    assert_eq!(out[1], tail_atoms[0]);
    assert_eq!(out[2], tail_atoms[1]);
}

#[test]
fn s3_gte_range_query_returns_only_documents_at_or_above_the_threshold() {
    let coll = populated_collection();
    let threshold = VALUE + 1000;
    let tagged = [Atom::new(0, NAME, TypeTag::Int64, 8, threshold)];
    let (bin_idx, elem_idx) = coll.acquire_insert_buffer(tagged.len() as u32).unwrap();
    coll.write_and_release(bin_idx, elem_idx, &tagged).unwrap();

    let driver = QueryDriver::new(EngineConfig::small());
    let filter = Atom::new(0, NAME, TypeTag::Int64, 8, threshold);
    let leaf = FindLeaf::new(0, Operator::Gte, filter);
    let out = driver
        .find(&coll, vec![leaf], PredicateTree::Trivial, None, &CancellationToken::new(), &QueryMetrics::new())
        .unwrap();

    assert!(out[0].value() > 0);
    let mut i = 1;
    while i < out.len() {
        assert_eq!(out[i].name(), NAME);
        assert!(out[i].value() >= threshold);
        i += 2; // one atom, then a delimiter
    }
}

#[test]
fn s4_sum_aggregation_matches_the_true_numeric_sum() {
    let mut cfg = EngineConfig::small();
    cfg.bin_max_elems = 512;
    cfg.bin_max_bytes = 256 * 1024;
    cfg.max_bins = 256;
    let coll = Collection::new("widgets", cfg);

    const GROUP: u32 = 50;
    const VALUE_NAME: u32 = 51;
    for _ in 0..SCALE {
        let atoms = [
            Atom::new(0, GROUP, TypeTag::Int64, 8, 1),
            Atom::new(0, VALUE_NAME, TypeTag::Int64, 8, 2),
        ];
        let (bin_idx, elem_idx) = coll.acquire_insert_buffer(atoms.len() as u32).unwrap();
        coll.write_and_release(bin_idx, elem_idx, &atoms).unwrap();
    }

    let driver = QueryDriver::new(EngineConfig::small());
    let leaf = AggregateLeaf::new(0, GROUP, VALUE_NAME, AccOp::Sum);
    let target = AggregateTarget { leaf_index: 0, target_name: 99, op: AccOp::Sum };
    let out = driver
        .aggregate(&coll, vec![leaf], vec![target], false, &CancellationToken::new(), &QueryMetrics::new())
        .unwrap();

    assert_eq!(out[0].value(), 1); // one group
    assert_eq!(out[2].as_f64(), (SCALE * 2) as f64);
}

#[test]
fn malformed_predicate_tree_shape_is_rejected_before_any_scan_runs() {
    use sombra::predicate_tree::{TreeNode, TreeOp};

    let coll = populated_collection();
    let driver = QueryDriver::new(EngineConfig::small());
    let filter = Atom::new(0, NAME, TypeTag::Int64, 8, VALUE);
    let leaf = FindLeaf::new(0, Operator::Eq, filter);

    // a single AND node with arity 2 over only one leaf can never reduce to
    // a single boolean.
    let tree = PredicateTree::Nodes(vec![TreeNode { op: TreeOp::And, arity: 2 }]);
    let err = driver.find(&coll, vec![leaf], tree, None, &CancellationToken::new(), &QueryMetrics::new());
    assert!(err.is_err());
}

#[test]
fn cancelled_token_short_circuits_leaf_scans_and_is_recorded_in_metrics() {
    let coll = populated_collection();
    let driver = QueryDriver::new(EngineConfig::small());
    let filter = Atom::new(0, NAME, TypeTag::Int64, 8, VALUE);
    let leaf = FindLeaf::new(0, Operator::Eq, filter);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let metrics = QueryMetrics::new();
    let out = driver.find(&coll, vec![leaf], PredicateTree::Trivial, None, &cancel, &metrics).unwrap();

    assert_eq!(out[0].value(), 0);
    assert!(metrics.snapshot().cancellations > 0);
}

mod find_soundness {
    //! Property-based coverage of invariant #3: a GTE find must return
    //! exactly the elements a naive linear scan would, regardless of how
    //! many worker threads the driver happens to use.
    use super::*;
    use proptest::prelude::*;

    fn run_case(values: Vec<i64>, threshold: i64) {
        let mut cfg = EngineConfig::small();
        cfg.bin_max_elems = 32;
        cfg.bin_max_bytes = 8 * 1024;
        cfg.max_bins = 64;
        let coll = Collection::new("widgets", cfg);

        for &v in &values {
            let atoms = [Atom::new(0, NAME, TypeTag::Int64, 8, v as u64)];
            let (bin_idx, elem_idx) = coll.acquire_insert_buffer(atoms.len() as u32).unwrap();
            coll.write_and_release(bin_idx, elem_idx, &atoms).unwrap();
        }

        let driver = QueryDriver::new(EngineConfig::small());
        let filter = Atom::new(0, NAME, TypeTag::Int64, 8, threshold as u64);
        let leaf = FindLeaf::new(0, Operator::Gte, filter);
        let out = driver
            .find(&coll, vec![leaf], PredicateTree::Trivial, None, &CancellationToken::new(), &QueryMetrics::new())
            .unwrap();

        let expected = values.iter().filter(|&&v| v >= threshold).count() as u64;
        assert_eq!(out[0].value(), expected);
    }

    proptest! {
        #[test]
        fn gte_find_matches_a_naive_linear_scan(
            values in prop::collection::vec(-100i64..100, 0..200),
            threshold in -100i64..100,
        ) {
            run_case(values, threshold);
        }
    }
}

//! Full million-element scenarios (S1, S4), ignored by default. Run
//! explicitly with `cargo test --test stress -- --ignored`.

use sombra::{
    AccOp, AggregateLeaf, AggregateTarget, Atom, CancellationToken, Collection, EngineConfig,
    FindLeaf, Operator, PredicateTree, QueryDriver, QueryMetrics, TypeTag,
};

const SCALE: u64 = 1_000_000;

#[test]
#[ignore]
fn s1_at_full_scale_matches_nothing() {
    let coll = Collection::new("widgets", EngineConfig::large());
    const NAME: u32 = 10;
    const VALUE: u64 = 7;

    for _ in 0..SCALE {
        let atoms: Vec<Atom> = (0..30).map(|_| Atom::new(0, NAME, TypeTag::Int64, 8, VALUE)).collect();
        let (bin_idx, elem_idx) = coll.acquire_insert_buffer(atoms.len() as u32).unwrap();
        coll.write_and_release(bin_idx, elem_idx, &atoms).unwrap();
    }

    let driver = QueryDriver::new(EngineConfig::large());
    let filter = Atom::new(0, NAME, TypeTag::Int64, 8, VALUE);
    let leaves = vec![
        FindLeaf::new(0, Operator::Ne, filter),
        FindLeaf::new(1, Operator::Gte, filter),
    ];
    let out = driver
        .find(&coll, leaves, PredicateTree::AndAll, None, &CancellationToken::new(), &QueryMetrics::new())
        .unwrap();
    assert_eq!(out[0].value(), 0);
}

#[test]
#[ignore]
fn s4_sum_aggregation_at_full_scale() {
    const GROUP: u32 = 50;
    const VALUE_NAME: u32 = 51;
    let coll = Collection::new("widgets", EngineConfig::large());

    for _ in 0..SCALE {
        let atoms = [
            Atom::new(0, GROUP, TypeTag::Int64, 8, 1),
            Atom::new(0, VALUE_NAME, TypeTag::Int64, 8, 2),
        ];
        let (bin_idx, elem_idx) = coll.acquire_insert_buffer(atoms.len() as u32).unwrap();
        coll.write_and_release(bin_idx, elem_idx, &atoms).unwrap();
    }

    let driver = QueryDriver::new(EngineConfig::large());
    let leaf = AggregateLeaf::new(0, GROUP, VALUE_NAME, AccOp::Sum);
    let target = AggregateTarget { leaf_index: 0, target_name: 99, op: AccOp::Sum };
    let out = driver
        .aggregate(&coll, vec![leaf], vec![target], false, &CancellationToken::new(), &QueryMetrics::new())
        .unwrap();

    // header, ID group atom, float target atom.
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].value(), 1);
    assert_eq!(out[2].as_f64(), (SCALE * 2) as f64);
}

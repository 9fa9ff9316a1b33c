//! Populates a collection, checkpoints every bin to disk, reloads them into
//! a fresh collection, and confirms a query against the reload matches the
//! original (scenario S6).

use sombra::{
    persistence, CancellationToken, Collection, EngineConfig, FindLeaf, Operator, PredicateTree,
    QueryDriver, QueryMetrics,
};
use sombra::atom::{Atom, TypeTag};

fn small_config() -> EngineConfig {
    let mut cfg = EngineConfig::small();
    cfg.bin_max_elems = 8;
    cfg.bin_max_bytes = 4 * 1024;
    cfg.max_bins = 32;
    cfg
}

#[test]
fn reloaded_bins_answer_the_same_query_as_the_original() {
    let coll = Collection::new("widgets", small_config());
    for i in 0..50u64 {
        let atoms = [Atom::new(0, 10, TypeTag::Int64, 8, i)];
        let (bin_idx, elem_idx) = coll.acquire_insert_buffer(atoms.len() as u32).unwrap();
        coll.write_and_release(bin_idx, elem_idx, &atoms).unwrap();
    }
    let tagged = [
        Atom::new(0, 10, TypeTag::Int64, 8, 999),
        Atom::new(0, 20, TypeTag::Utf8String, 4, 0xBEEF),
    ];
    let (bin_idx, elem_idx) = coll.acquire_insert_buffer(tagged.len() as u32).unwrap();
    coll.write_and_release(bin_idx, elem_idx, &tagged).unwrap();

    let dir = tempfile::tempdir().unwrap();
    for bin in coll.bins_snapshot() {
        let path = dir.path().join(format!("bin-{:04}.dat", bin.index()));
        persistence::serialize_bin(&bin, &path).unwrap();
    }

    let mut bin_paths: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
    bin_paths.sort();
    let reloaded_bins = bin_paths
        .iter()
        .map(|path| persistence::deserialize_bin(path).unwrap())
        .collect();
    let reloaded = Collection::from_bins("widgets", small_config(), reloaded_bins);

    assert_eq!(reloaded.bin_count(), coll.bin_count());

    let driver = QueryDriver::new(small_config());
    let filter = Atom::new(0, 20, TypeTag::Utf8String, 4, 0xBEEF);
    let leaf = FindLeaf::new(0, Operator::Eq, filter);

    let original = driver
        .find(&coll, vec![FindLeaf::new(0, Operator::Eq, filter)], PredicateTree::Trivial, None, &CancellationToken::new(), &QueryMetrics::new())
        .unwrap();
    let from_reload = driver
        .find(&reloaded, vec![leaf], PredicateTree::Trivial, None, &CancellationToken::new(), &QueryMetrics::new())
        .unwrap();

    assert_eq!(original, from_reload);
    assert_eq!(from_reload[0].value(), 1);
}

#[test]
fn reloading_an_empty_directory_starts_a_fresh_single_bin_collection() {
    let dir = tempfile::tempdir().unwrap();
    let bins: Vec<sombra::bin::Bin> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| persistence::deserialize_bin(&e.unwrap().path()).unwrap())
        .collect();
    let coll = Collection::from_bins("empty", small_config(), bins);
    assert_eq!(coll.bin_count(), 1);
}

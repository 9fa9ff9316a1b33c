//! Orchestrates one query end to end: builds the chore queue, sizes and
//! spawns the worker pool, runs the composer loop inline on the calling
//! thread, and hands the combined result to the projection or aggregate
//! output formatter.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::aggregate_output::{self, AggregateTarget};
use crate::atom::Atom;
use crate::chore::{CancellationToken, ChoreQueue};
use crate::collection::Collection;
use crate::composer::{self, ChoreProgress};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::leaf::{AggMatch, AggregateLeaf, FindLeaf, FindMatch, LeafPayload};
use crate::metrics::QueryMetrics;
use crate::predicate_tree::PredicateTree;
use crate::projection;
use crate::slot_ring::SlotRing;

/// Matches a slot ring's per-slot item cap; a generous batch keeps leaves
/// from reserving a fresh slot on every single match.
const LEAF_SLOT_CAPACITY: usize = 1024;

/// A field-projection set for a "find" query. `None` means "project every
/// field"; `Some` follows the inverse `ID_NAME` convention documented on
/// [`projection::project`].
pub type Projection = Option<std::collections::HashSet<u32>>;

fn worker_count(num_chores: usize) -> usize {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let oversubscribed = (cores * 3) / 2;
    oversubscribed.min(num_chores.max(1))
}

/// Runs every (leaf, bin) chore for `leaves.len()` leaves against every bin
/// in `bins`, calling `apply_leaf` per chore and `on_bin_done` once every
/// leaf has finished one bin. Shared by both the find and aggregate paths.
fn run_chores<T: Copy + Default + Send, P: Copy + Default + Send>(
    bins_len: usize,
    num_leaves: usize,
    ring: &SlotRing<T, P>,
    cancel: &CancellationToken,
    composer_sleep: Duration,
    apply_leaf: impl Fn(u32, u32) -> Result<()> + Sync,
    mut stage2: impl FnMut(P, Vec<T>),
    mut stage3: impl FnMut(u32),
) -> usize {
    let queue = ChoreQueue::new();
    for leaf_idx in 0..num_leaves as u32 {
        for bin_idx in 0..bins_len as u32 {
            queue.push((leaf_idx, bin_idx));
        }
    }
    let num_chores = queue.len();
    let progress = ChoreProgress::new(bins_len, num_leaves as u64);
    let workers = worker_count(num_chores);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let queue = &queue;
            let progress = &progress;
            let apply_leaf = &apply_leaf;
            let cancel = cancel.clone();
            scope.spawn(move || {
                while let Some((leaf_idx, bin_idx)) = queue.pop() {
                    if !cancel.is_cancelled() {
                        if let Err(e) = apply_leaf(leaf_idx, bin_idx) {
                            error!(leaf_idx, bin_idx, error = %e, "leaf scan failed");
                        }
                    }
                    progress.mark_done(bin_idx);
                }
            });
        }
        for _ in 0..workers {
            queue.push_sentinel();
        }

        composer::run(
            ring,
            &progress,
            bins_len,
            composer_sleep,
            cancel,
            &mut stage2,
            &mut stage3,
        );
    });

    num_chores
}

/// Drives one "find" query: scans every predicate against every bin,
/// combines per-element predicate hits through `tree`, and projects the
/// matched documents.
pub struct QueryDriver {
    config: EngineConfig,
}

impl QueryDriver {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn find(
        &self,
        collection: &Collection,
        leaves: Vec<FindLeaf>,
        tree: PredicateTree,
        projection: Projection,
        cancel: &CancellationToken,
        metrics: &QueryMetrics,
    ) -> Result<Vec<Atom>> {
        let bins = collection.bins_snapshot();
        let num_bins = bins.len();
        let num_leaves = leaves.len();

        // Validate the tree shape once against the real leaf count so stage3
        // can trust every bit vector it builds evaluates cleanly.
        let dummy = vec![false; num_leaves];
        tree.evaluate(&dummy)?;

        let ring: SlotRing<FindMatch, LeafPayload> =
            SlotRing::new(self.config.slot_ring_size, LEAF_SLOT_CAPACITY, self.config.slot_ring_wait_attempts);

        let mut elem_bits: Vec<HashMap<u32, Vec<bool>>> = (0..num_bins).map(|_| HashMap::new()).collect();
        let mut matches_per_bin: Vec<Vec<u32>> = vec![Vec::new(); num_bins];

        let leaves_start = Instant::now();
        let num_chores = run_chores(
            num_bins,
            num_leaves,
            &ring,
            cancel,
            Duration::from_millis(self.config.composer_sleep_ms),
            |leaf_idx, bin_idx| leaves[leaf_idx as usize].apply(&bins[bin_idx as usize], &ring),
            |payload, items| {
                let (leaf_idx, bin_idx) = payload;
                let bucket = &mut elem_bits[bin_idx as usize];
                for elem_idx in items {
                    let bits = bucket.entry(elem_idx).or_insert_with(|| vec![false; num_leaves]);
                    bits[leaf_idx as usize] = true;
                }
            },
            |bin_idx| {
                let bucket = &elem_bits[bin_idx as usize];
                let mut matched: Vec<u32> = bucket
                    .iter()
                    .filter_map(|(&elem, bits)| tree.evaluate(bits).unwrap_or(false).then_some(elem))
                    .collect();
                matched.sort_unstable();
                matches_per_bin[bin_idx as usize] = matched;
            },
        );
        metrics.record_leaves_duration(leaves_start.elapsed());
        metrics.num_cores.store(worker_count(num_chores) as u64, std::sync::atomic::Ordering::Relaxed);
        metrics.num_chores.store(num_chores as u64, std::sync::atomic::Ordering::Relaxed);
        metrics.num_leaves.store(num_leaves as u64, std::sync::atomic::Ordering::Relaxed);
        metrics.num_bins.store(num_bins as u64, std::sync::atomic::Ordering::Relaxed);
        if cancel.is_cancelled() {
            metrics.note_cancellation();
        }

        let project_start = Instant::now();
        let out = projection::project(&bins, &matches_per_bin, projection.as_ref(), self.config.max_output_bytes)?;
        metrics.record_project_duration(project_start.elapsed());
        debug!(num_bins, num_leaves, docs = out[0].value(), "find query complete");
        Ok(out)
    }

    pub fn aggregate(
        &self,
        collection: &Collection,
        leaves: Vec<AggregateLeaf>,
        targets: Vec<AggregateTarget>,
        sort_ascending: bool,
        cancel: &CancellationToken,
        metrics: &QueryMetrics,
    ) -> Result<Vec<Atom>> {
        assert_eq!(leaves.len(), targets.len(), "one target per aggregate leaf");
        let bins = collection.bins_snapshot();
        let num_bins = bins.len();
        let num_leaves = targets.len();
        let wire_targets = targets;

        let ring: SlotRing<AggMatch, LeafPayload> =
            SlotRing::new(self.config.slot_ring_size, LEAF_SLOT_CAPACITY, self.config.slot_ring_wait_attempts);

        let mut matches_by_leaf: HashMap<u32, Vec<AggMatch>> = HashMap::new();

        let leaves_start = Instant::now();
        let num_chores = run_chores(
            num_bins,
            num_leaves,
            &ring,
            cancel,
            Duration::from_millis(self.config.composer_sleep_ms),
            |leaf_idx, bin_idx| leaves[leaf_idx as usize].apply(&bins[bin_idx as usize], &ring),
            |payload, items| {
                let (leaf_idx, _bin_idx) = payload;
                matches_by_leaf.entry(leaf_idx).or_default().extend(items);
            },
            |_bin_idx| {},
        );
        metrics.record_leaves_duration(leaves_start.elapsed());
        metrics.num_cores.store(worker_count(num_chores) as u64, std::sync::atomic::Ordering::Relaxed);
        metrics.num_chores.store(num_chores as u64, std::sync::atomic::Ordering::Relaxed);
        metrics.num_leaves.store(num_leaves as u64, std::sync::atomic::Ordering::Relaxed);
        metrics.num_bins.store(num_bins as u64, std::sync::atomic::Ordering::Relaxed);
        if cancel.is_cancelled() {
            metrics.note_cancellation();
        }

        let project_start = Instant::now();
        let out = aggregate_output::aggregate(&wire_targets, &matches_by_leaf, sort_ascending, self.config.max_output_bytes)?;
        metrics.record_project_duration(project_start.elapsed());
        debug!(num_bins, num_leaves, docs = out[0].value(), "aggregate query complete");
        Ok(out)
    }
}

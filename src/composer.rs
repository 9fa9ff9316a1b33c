//! The single-task composer: drains the slot ring into per-bin intermediate
//! state, and finalizes a bin once every leaf has reported completion for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::chore::CancellationToken;
use crate::slot_ring::SlotRing;

/// Tracks, per bin, how many leaves have finished scanning it. A bin is
/// ready for stage3 finalization once its count reaches `num_leaves`.
pub struct ChoreProgress {
    done_per_bin: Vec<AtomicU64>,
    num_leaves: u64,
}

impl ChoreProgress {
    pub fn new(num_bins: usize, num_leaves: u64) -> Self {
        Self {
            done_per_bin: (0..num_bins).map(|_| AtomicU64::new(0)).collect(),
            num_leaves,
        }
    }

    pub fn mark_done(&self, bin_idx: u32) {
        self.done_per_bin[bin_idx as usize].fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_ready(&self, bin_idx: u32) -> bool {
        self.done_per_bin[bin_idx as usize].load(Ordering::Acquire) >= self.num_leaves
    }
}

/// Runs the composer main loop: repeatedly drains promoted slots into
/// `stage2`, then finalizes any bin whose chores have all completed via
/// `stage3`. Exits once every bin has been finalized or `cancel` fires.
pub fn run<T: Copy + Default, P: Copy + Default>(
    ring: &SlotRing<T, P>,
    progress: &ChoreProgress,
    num_bins: usize,
    composer_sleep: Duration,
    cancel: &CancellationToken,
    mut stage2: impl FnMut(P, Vec<T>),
    mut stage3: impl FnMut(u32),
) {
    let mut remaining: Vec<u32> = (0..num_bins as u32).collect();

    while !remaining.is_empty() && !cancel.is_cancelled() {
        while let Some((handle, payload, items)) = ring.consume_one() {
            stage2(payload, items);
            ring.release_consumed(handle);
        }

        let mut ready = Vec::new();
        remaining.retain(|&bin_idx| {
            if progress.is_ready(bin_idx) {
                ready.push(bin_idx);
                false
            } else {
                true
            }
        });

        if !ready.is_empty() {
            // A leaf's final promote for one of these bins can land in the
            // window between the drain loop above observing the ring empty
            // and is_ready flipping true. Drain once more before finalizing
            // so that slot is folded into stage2 before stage3 runs.
            while let Some((handle, payload, items)) = ring.consume_one() {
                stage2(payload, items);
                ring.release_consumed(handle);
            }
            for bin_idx in ready {
                stage3(bin_idx);
            }
        }

        if !remaining.is_empty() {
            std::thread::sleep(composer_sleep);
        }
    }

    // Drain whatever is left so no promoted slot is silently dropped on
    // cancellation.
    while let Some((handle, payload, items)) = ring.consume_one() {
        stage2(payload, items);
        ring.release_consumed(handle);
    }
}

//! Sizing and tuning knobs for the engine, threaded through [`crate::initialize`]
//! and [`crate::collection::Collection::new`].

use std::path::PathBuf;

/// Tunable parameters controlling bin sizing, worker concurrency, and the
/// producer/consumer slot ring.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on concurrent insert producers the engine advertises to callers.
    pub max_concurrent_inserts: u32,
    /// Maximum number of elements a single bin may hold.
    pub bin_max_elems: u32,
    /// Maximum number of atom bytes a single bin may hold.
    pub bin_max_bytes: u64,
    /// Maximum number of bins a collection may grow to.
    pub max_bins: u32,
    /// Root directory used by [`crate::persistence`] for bin checkpoints.
    pub data_path: Option<PathBuf>,
    /// Number of fixed-capacity buffers in the slot ring shared by a query.
    pub slot_ring_size: usize,
    /// Bounded number of 1ms waits before a producer reports the ring saturated.
    pub slot_ring_wait_attempts: u32,
    /// Sleep between composer drain passes.
    pub composer_sleep_ms: u64,
    /// Hard cap on a single query's output buffer, in bytes.
    pub max_output_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_inserts: 64,
            bin_max_elems: 100 * 1024,
            bin_max_bytes: 64 * 1024 * 1024,
            max_bins: 1024,
            data_path: None,
            slot_ring_size: 10,
            slot_ring_wait_attempts: 1000,
            composer_sleep_ms: 1,
            max_output_bytes: 16 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// A configuration sized for unit tests and small collections.
    pub fn small() -> Self {
        Self {
            bin_max_elems: 256,
            bin_max_bytes: 64 * 1024,
            max_bins: 16,
            slot_ring_size: 4,
            slot_ring_wait_attempts: 200,
            max_output_bytes: 1024 * 1024,
            ..Self::default()
        }
    }

    /// A configuration sized for large collections under sustained write load.
    pub fn large() -> Self {
        Self {
            max_concurrent_inserts: 256,
            bin_max_elems: 1024 * 1024,
            bin_max_bytes: 512 * 1024 * 1024,
            max_bins: 8192,
            slot_ring_size: 32,
            ..Self::default()
        }
    }
}

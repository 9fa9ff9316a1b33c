//! An ordered, growable sequence of [`Bin`]s sharing a name and sizing
//! configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::atom::ATOM_BYTES;
use crate::bin::Bin;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

fn bytes_to_atoms(bytes: u64) -> u32 {
    (bytes / ATOM_BYTES as u64).min(u32::MAX as u64) as u32
}

/// An append-only collection of bins. Appends always target the tail bin;
/// on `BinFull` exactly one thread grows the collection by appending a new
/// bin, guarded by a CAS on `growing`.
pub struct Collection {
    name: String,
    config: EngineConfig,
    bins: RwLock<Vec<Arc<Bin>>>,
    growing: AtomicBool,
}

impl Collection {
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        let first = Arc::new(Bin::new(
            0,
            bytes_to_atoms(config.bin_max_bytes),
            config.bin_max_elems,
        ));
        Self {
            name: name.into(),
            config,
            bins: RwLock::new(vec![first]),
            growing: AtomicBool::new(false),
        }
    }

    /// Rebuilds a collection from bins already materialized elsewhere (for
    /// example, reloaded one-by-one via [`crate::persistence::deserialize_bin`]).
    /// `bins` must be ordered by index with no gaps, matching how a live
    /// collection would have grown them.
    pub fn from_bins(name: impl Into<String>, config: EngineConfig, bins: Vec<Bin>) -> Self {
        let bins = if bins.is_empty() {
            vec![Arc::new(Bin::new(0, bytes_to_atoms(config.bin_max_bytes), config.bin_max_elems))]
        } else {
            bins.into_iter().map(Arc::new).collect()
        };
        Self {
            name: name.into(),
            config,
            bins: RwLock::new(bins),
            growing: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A stable snapshot of the bins backing this collection, fixed for the
    /// lifetime of one query even if the collection grows concurrently.
    pub fn bins_snapshot(&self) -> Vec<Arc<Bin>> {
        self.bins.read().clone()
    }

    pub fn bin_count(&self) -> usize {
        self.bins.read().len()
    }

    /// Reserves room for `size_atoms` atoms in the tail bin, growing the
    /// collection as needed. Returns `(bin_index, elem_index)`.
    pub fn acquire_insert_buffer(&self, size_atoms: u32) -> Result<(u32, u32)> {
        loop {
            let (tail_idx, outcome) = {
                let bins = self.bins.read();
                let tail_idx = bins.len() as u32 - 1;
                (tail_idx, bins[tail_idx as usize].acquire_buffer(size_atoms))
            };
            match outcome {
                Ok(elem_idx) => return Ok((tail_idx, elem_idx)),
                Err(EngineError::BinFull) => self.grow_past(tail_idx)?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes `atoms` into the reserved element and releases it, making it
    /// visible to subsequent scans.
    pub fn write_and_release(&self, bin_idx: u32, elem_idx: u32, atoms: &[crate::atom::Atom]) -> Result<()> {
        let bins = self.bins.read();
        let bin = bins
            .get(bin_idx as usize)
            .ok_or_else(|| EngineError::Internal(format!("bin {bin_idx} no longer exists")))?;
        bin.write_elem(elem_idx, atoms);
        bin.release_buffer(elem_idx)
    }

    /// Releases the growth obligation for the bin at `observed_tail`: one
    /// thread wins the CAS and appends a new tail bin, losers simply retry
    /// their reservation against whatever the winner published.
    fn grow_past(&self, observed_tail: u32) -> Result<()> {
        if self
            .growing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let result = {
                let mut bins = self.bins.write();
                if bins.len() as u32 - 1 == observed_tail {
                    if bins.len() as u32 >= self.config.max_bins {
                        Err(EngineError::BinFull)
                    } else {
                        let idx = bins.len() as u32;
                        debug!(collection = %self.name, new_bin = idx, "growing collection");
                        bins.push(Arc::new(Bin::new(
                            idx,
                            bytes_to_atoms(self.config.bin_max_bytes),
                            self.config.bin_max_elems,
                        )));
                        Ok(())
                    }
                } else {
                    // someone else already grew past this point
                    Ok(())
                }
            };
            self.growing.store(false, Ordering::Release);
            result
        } else {
            std::thread::yield_now();
            Ok(())
        }
    }
}

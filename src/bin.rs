//! The append-only, lock-free shard ("bin") that backs a [`crate::collection::Collection`].
//!
//! A bin owns a fixed-capacity arena of [`Atom`]s and a parallel array of
//! element headers. Producers reserve space by a fetch-add on the next-free
//! index, spin-publish their header once their predecessor has published
//! theirs, and roll back the reservation if the bin is full. Readers walk the
//! published header prefix without ever taking a lock.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use rand::Rng;

use crate::atom::Atom;
use crate::error::{EngineError, Result};

const SPIN_SPINS_BEFORE_SLEEP: u32 = 1000;

/// Lifecycle state of a single bin element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElemState {
    /// Header slot reserved but not yet published (transient).
    Inactive = 0,
    /// Header published, buffer handed to the inserting caller.
    Acquired = 1,
    /// Caller released the buffer; visible to scans.
    Active = 2,
    /// Logically deleted; scans skip it.
    Forgotten = 3,
}

impl ElemState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Acquired,
            2 => Self::Active,
            3 => Self::Forgotten,
            _ => Self::Inactive,
        }
    }
}

/// Packed element header: atom offset (32 bits), atom length (24 bits),
/// status (8 bits). A header with offset==0 and length==0 has not yet been
/// published by its owning producer.
#[derive(Debug)]
struct ElemHeader(AtomicU64);

impl ElemHeader {
    const fn empty() -> Self {
        Self(AtomicU64::new(0))
    }

    fn load(&self, order: Ordering) -> (u32, u32, ElemState) {
        let packed = self.0.load(order);
        let offset = packed as u32;
        let length = ((packed >> 32) & 0x00FF_FFFF) as u32;
        let status = (packed >> 56) as u8;
        (offset, length, ElemState::from_u8(status))
    }

    fn publish(&self, offset: u32, length: u32, status: ElemState) {
        let packed =
            offset as u64 | ((length as u64 & 0x00FF_FFFF) << 32) | ((status as u64) << 56);
        self.0.store(packed, Ordering::Release);
    }

    fn set_status(&self, status: ElemState) {
        let mut packed = self.0.load(Ordering::Relaxed);
        packed &= !(0xFFu64 << 56);
        packed |= (status as u64) << 56;
        self.0.store(packed, Ordering::Release);
    }

    fn is_published(&self, order: Ordering) -> bool {
        self.0.load(order) != 0
    }
}

/// A contiguous run of atoms belonging to one element.
#[derive(Debug, Clone, Copy)]
pub struct AtomRange<'a> {
    atoms: &'a [Atom],
}

impl<'a> AtomRange<'a> {
    pub fn iter(&self) -> std::slice::Iter<'a, Atom> {
        self.atoms.iter()
    }

    pub fn as_slice(&self) -> &'a [Atom] {
        self.atoms
    }
}

/// An append-only, fixed-capacity shard of atoms.
///
/// The atom arena is a fixed-size allocation accessed through raw pointers so
/// that concurrent producers can write into their own (disjoint, by
/// construction) reserved ranges without a lock. Safety rests on
/// `acquire_buffer` never handing out overlapping ranges.
pub struct Bin {
    index: u32,
    atom_capacity: u32,
    elem_capacity: u32,
    next_free_elem_index: AtomicU32,
    headers: Vec<ElemHeader>,
    raw: UnsafeCell<Vec<Atom>>,
    num_active: AtomicU64,
}

// SAFETY: all concurrent mutable access to `raw` goes through `write_elem`,
// which is only ever called with the disjoint, non-overlapping offset range
// handed out by `acquire_buffer` for a given element index.
unsafe impl Sync for Bin {}

impl Bin {
    pub fn new(index: u32, atom_capacity: u32, elem_capacity: u32) -> Self {
        let mut headers = Vec::with_capacity(elem_capacity as usize);
        headers.resize_with(elem_capacity as usize, ElemHeader::empty);
        Self {
            index,
            atom_capacity,
            elem_capacity,
            next_free_elem_index: AtomicU32::new(0),
            headers,
            raw: UnsafeCell::new(vec![Atom::invalid(); atom_capacity as usize]),
            num_active: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Reserves room for `size_atoms` atoms, returning the element index the
    /// caller should fill via [`Bin::write_elem`]. Fails with
    /// [`EngineError::BinFull`] (rolling the reservation back) if the element
    /// table or atom arena is exhausted.
    pub fn acquire_buffer(&self, size_atoms: u32) -> Result<u32> {
        let elem_idx = self.next_free_elem_index.fetch_add(1, Ordering::AcqRel);
        if elem_idx >= self.elem_capacity {
            self.next_free_elem_index.fetch_sub(1, Ordering::AcqRel);
            return Err(EngineError::BinFull);
        }

        let prev_end = if elem_idx == 0 {
            0
        } else {
            let prev = &self.headers[(elem_idx - 1) as usize];
            self.spin_until_published(prev);
            let (offset, length, _) = prev.load(Ordering::Acquire);
            offset + length
        };

        if prev_end as u64 + size_atoms as u64 >= self.atom_capacity as u64 {
            self.next_free_elem_index.fetch_sub(1, Ordering::AcqRel);
            return Err(EngineError::BinFull);
        }

        self.headers[elem_idx as usize].publish(prev_end, size_atoms, ElemState::Acquired);
        self.num_active.fetch_add(1, Ordering::Relaxed);
        Ok(elem_idx)
    }

    fn spin_until_published(&self, header: &ElemHeader) {
        let mut spins = 0u32;
        while !header.is_published(Ordering::Acquire) {
            std::hint::spin_loop();
            spins += 1;
            if spins % SPIN_SPINS_BEFORE_SLEEP == 0 {
                let millis = rand::thread_rng().gen_range(0..11);
                std::thread::sleep(std::time::Duration::from_millis(millis));
            }
        }
    }

    /// Copies `atoms` into the range reserved for `elem_idx` by a prior
    /// `acquire_buffer` call. `atoms.len()` must not exceed the reserved
    /// length.
    pub fn write_elem(&self, elem_idx: u32, atoms: &[Atom]) {
        let (offset, length, _) = self.headers[elem_idx as usize].load(Ordering::Acquire);
        assert!(
            atoms.len() as u32 <= length,
            "write exceeds reserved element length"
        );
        // SAFETY: [offset, offset+length) was exclusively reserved for this
        // element index by acquire_buffer and no other element's range
        // overlaps it.
        unsafe {
            let base = (*self.raw.get()).as_mut_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(atoms.as_ptr(), base, atoms.len());
        }
    }

    /// Transitions a freshly filled element to `Active`, making it visible to
    /// scans. `elem_idx` must be the index returned by the matching
    /// `acquire_buffer` call.
    pub fn release_buffer(&self, elem_idx: u32) -> Result<()> {
        if elem_idx >= self.headers.len() as u32 {
            return Err(EngineError::ReleaseBuffer {
                pointer: elem_idx as usize,
                element_index: elem_idx,
            });
        }
        let (_, _, status) = self.headers[elem_idx as usize].load(Ordering::Acquire);
        if status != ElemState::Acquired {
            return Err(EngineError::ReleaseBuffer {
                pointer: elem_idx as usize,
                element_index: elem_idx,
            });
        }
        self.headers[elem_idx as usize].set_status(ElemState::Active);
        Ok(())
    }

    /// Logically deletes an element; scans will skip it from the next
    /// observation onward.
    pub fn disable_element(&self, elem_idx: u32) {
        if (elem_idx as usize) < self.headers.len() {
            self.headers[elem_idx as usize].set_status(ElemState::Forgotten);
            self.num_active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of how many elements have been published so far.
    pub fn len(&self) -> u32 {
        self.next_free_elem_index
            .load(Ordering::Acquire)
            .min(self.elem_capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_active(&self) -> u64 {
        self.num_active.load(Ordering::Relaxed)
    }

    pub fn atom_capacity(&self) -> u32 {
        self.atom_capacity
    }

    pub fn elem_capacity(&self) -> u32 {
        self.elem_capacity
    }

    /// The atom range for `elem_idx`, or `None` if the element is not
    /// (yet) published or not `Active`.
    pub fn get_elem_range(&self, elem_idx: u32) -> Option<AtomRange<'_>> {
        if elem_idx >= self.len() {
            return None;
        }
        let (offset, length, status) = self.headers[elem_idx as usize].load(Ordering::Acquire);
        if status != ElemState::Active {
            return None;
        }
        // SAFETY: [offset, offset+length) was published by acquire_buffer and
        // is never written to again once status is Active.
        let atoms = unsafe {
            std::slice::from_raw_parts((*self.raw.get()).as_ptr().add(offset as usize), length as usize)
        };
        Some(AtomRange { atoms })
    }

    /// Iterates every currently `Active` element index and its atom range.
    pub fn scan(&self) -> impl Iterator<Item = (u32, AtomRange<'_>)> {
        let count = self.len();
        (0..count).filter_map(move |idx| self.get_elem_range(idx).map(|r| (idx, r)))
    }

    /// The reserved atom offset for `elem_idx`, regardless of its status
    /// (including freshly `Acquired`, not-yet-`Active` elements).
    pub fn reserved_offset(&self, elem_idx: u32) -> Option<u32> {
        if elem_idx >= self.len() {
            return None;
        }
        let (offset, _, status) = self.headers[elem_idx as usize].load(Ordering::Acquire);
        if status == ElemState::Inactive {
            return None;
        }
        Some(offset)
    }

    /// A mutable pointer into the arena at `offset`, for callers writing
    /// across the FFI boundary directly into a reserved-but-not-yet-filled
    /// element. The caller must write no more than the reserved length and
    /// must not retain the pointer past the matching `release_buffer` call.
    ///
    /// # Safety
    /// `offset` must fall within an element range this caller itself
    /// reserved via `acquire_buffer`, and the write must stay within that
    /// element's reserved length.
    pub unsafe fn atom_ptr_mut(&self, offset: u32) -> *mut Atom {
        (*self.raw.get()).as_mut_ptr().add(offset as usize)
    }

    pub fn headers_snapshot(&self) -> Vec<(u32, u32, ElemState)> {
        (0..self.len() as usize)
            .map(|i| self.headers[i].load(Ordering::Acquire))
            .collect()
    }

    /// A read-only view of the entire backing arena, including the unused
    /// tail past the last published element. Used by [`crate::persistence`]
    /// to dump a bin's raw atom bytes without walking per-element ranges.
    pub fn raw_snapshot(&self) -> &[Atom] {
        // SAFETY: producers only ever write within a range already reserved
        // by acquire_buffer; the unused tail was initialized to
        // `Atom::invalid()` at construction and is never written.
        unsafe { std::slice::from_raw_parts((*self.raw.get()).as_ptr(), self.atom_capacity as usize) }
    }
}

//! A fixed number of lock-free, fixed-capacity buffers shared by every leaf
//! filter producer and the single composer consumer of one query.
//!
//! Each slot owns a small state machine `Free -> ProducerHeld -> Promoted ->
//! ConsumerHeld -> Free`. Producer reservation is a CAS on the state atomic;
//! consumption is single-threaded by construction so no further
//! synchronization is needed once a slot is observed `Promoted`.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::error::{EngineError, Result};

const FREE: u8 = 0;
const PRODUCER_HELD: u8 = 1;
const PROMOTED: u8 = 2;
const CONSUMER_HELD: u8 = 3;

struct Slot<T, P> {
    state: AtomicU8,
    buffer: UnsafeCell<Vec<T>>,
    count: AtomicU32,
    payload: UnsafeCell<P>,
}

// SAFETY: a slot's buffer/payload are written only by the producer that
// holds it (state == ProducerHeld) and read only by the consumer after it
// transitions to Promoted/ConsumerHeld; the state CAS enforces exclusivity.
unsafe impl<T: Send, P: Send> Sync for Slot<T, P> {}

/// A handle identifying a slot this thread currently owns (as producer or
/// consumer). Not `Clone` — ownership of a slot is exclusive.
pub struct SlotHandle {
    index: usize,
}

/// The shared producer/consumer slot ring for one query.
pub struct SlotRing<T, P> {
    slots: Vec<Slot<T, P>>,
    capacity: usize,
    wait_attempts: u32,
    promoted_count: AtomicU64,
}

impl<T: Copy + Default, P: Copy + Default> SlotRing<T, P> {
    pub fn new(num_slots: usize, slot_capacity: usize, wait_attempts: u32) -> Self {
        let slots = (0..num_slots)
            .map(|_| Slot {
                state: AtomicU8::new(FREE),
                buffer: UnsafeCell::new(vec![T::default(); slot_capacity]),
                count: AtomicU32::new(0),
                payload: UnsafeCell::new(P::default()),
            })
            .collect();
        Self {
            slots,
            capacity: slot_capacity,
            wait_attempts,
            promoted_count: AtomicU64::new(0),
        }
    }

    pub fn slot_capacity(&self) -> usize {
        self.capacity
    }

    /// Reserves a free slot for producer use, retrying with a bounded sleep
    /// if all slots are currently held. Returns [`EngineError::SlotRingSaturated`]
    /// once `wait_attempts` has been exhausted.
    pub fn reserve_slot(&self) -> Result<SlotHandle> {
        for attempt in 0..self.wait_attempts.max(1) {
            for (index, slot) in self.slots.iter().enumerate() {
                if slot
                    .state
                    .compare_exchange(FREE, PRODUCER_HELD, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    slot.count.store(0, Ordering::Relaxed);
                    return Ok(SlotHandle { index });
                }
            }
            if attempt + 1 < self.wait_attempts {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }
        Err(EngineError::SlotRingSaturated)
    }

    /// Appends `item` to the producer-held slot. Returns `false` if the slot
    /// is full; the caller must `promote` and reserve a new slot.
    pub fn try_push(&self, handle: &SlotHandle, item: T) -> bool {
        let slot = &self.slots[handle.index];
        let cur = slot.count.load(Ordering::Relaxed) as usize;
        if cur >= self.capacity {
            return false;
        }
        // SAFETY: only the producer holding this slot (ProducerHeld) writes here.
        unsafe {
            (*slot.buffer.get())[cur] = item;
        }
        slot.count.store((cur + 1) as u32, Ordering::Relaxed);
        true
    }

    pub fn pushed_len(&self, handle: &SlotHandle) -> usize {
        self.slots[handle.index].count.load(Ordering::Relaxed) as usize
    }

    /// Hands a filled slot off to the consumer, consuming the producer's
    /// handle. `payload` is opaque caller context (e.g. `(leaf_index, bin_index)`).
    pub fn promote(&self, handle: SlotHandle, payload: P) {
        let slot = &self.slots[handle.index];
        // SAFETY: exclusive producer access, about to hand off via Release store below.
        unsafe {
            *slot.payload.get() = payload;
        }
        slot.state.store(PROMOTED, Ordering::Release);
        self.promoted_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn promoted_len(&self) -> u64 {
        self.promoted_count.load(Ordering::Acquire)
    }

    /// Takes ownership of one promoted slot for the (single) consumer, or
    /// `None` if nothing is currently promoted.
    pub fn consume_one(&self) -> Option<(SlotHandle, P, Vec<T>)> {
        if self.promoted_count.load(Ordering::Acquire) == 0 {
            return None;
        }
        for (index, slot) in self.slots.iter().enumerate() {
            if slot
                .state
                .compare_exchange(PROMOTED, CONSUMER_HELD, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.promoted_count.fetch_sub(1, Ordering::AcqRel);
                let count = slot.count.load(Ordering::Relaxed) as usize;
                // SAFETY: consumer now exclusively owns this slot (ConsumerHeld).
                let items = unsafe { (*slot.buffer.get())[..count].to_vec() };
                let payload = unsafe { *slot.payload.get() };
                return Some((SlotHandle { index }, payload, items));
            }
        }
        None
    }

    /// Returns a consumed slot to the pool, ready for producer reuse.
    pub fn release_consumed(&self, handle: SlotHandle) {
        let slot = &self.slots[handle.index];
        slot.count.store(0, Ordering::Relaxed);
        slot.state.store(FREE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Payload = (u32, u32);

    #[test]
    fn reserve_push_promote_consume_round_trip() {
        let ring: SlotRing<u32, Payload> = SlotRing::new(4, 8, 10);
        let handle = ring.reserve_slot().unwrap();
        for i in 0..3 {
            assert!(ring.try_push(&handle, i));
        }
        ring.promote(handle, (1, 2));
        assert_eq!(ring.promoted_len(), 1);

        let (consumer_handle, payload, items) = ring.consume_one().unwrap();
        assert_eq!(payload, (1, 2));
        assert_eq!(items, vec![0, 1, 2]);
        ring.release_consumed(consumer_handle);
        assert_eq!(ring.promoted_len(), 0);
    }

    #[test]
    fn full_slot_rejects_further_pushes() {
        let ring: SlotRing<u32, Payload> = SlotRing::new(1, 2, 10);
        let handle = ring.reserve_slot().unwrap();
        assert!(ring.try_push(&handle, 1));
        assert!(ring.try_push(&handle, 2));
        assert!(!ring.try_push(&handle, 3));
    }

    #[test]
    fn saturation_is_reported_not_blocked_forever() {
        let ring: SlotRing<u32, Payload> = SlotRing::new(1, 2, 3);
        let _held = ring.reserve_slot().unwrap();
        let err = ring.reserve_slot();
        assert!(matches!(err, Err(EngineError::SlotRingSaturated)));
    }

    #[test]
    fn concurrent_producers_never_observe_double_ownership() {
        use std::sync::Arc;
        use std::thread;

        let ring: Arc<SlotRing<u32, Payload>> = Arc::new(SlotRing::new(4, 16, 500));
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let ring = Arc::clone(&ring);
            handles.push(thread::spawn(move || {
                for i in 0..20u32 {
                    if let Ok(h) = ring.reserve_slot() {
                        assert!(ring.try_push(&h, i));
                        ring.promote(h, (t, i));
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let mut drained = 0;
        while let Some((h, _, _)) = ring.consume_one() {
            ring.release_consumed(h);
            drained += 1;
        }
        assert!(drained > 0);
    }
}

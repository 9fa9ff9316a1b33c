//! The unit of scheduled work (`Chore = (leaf_index, bin_index)`), its bounded
//! blocking queue, and cooperative query cancellation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// One predicate (or aggregate leaf) applied to one bin.
pub type Chore = (u32, u32);

/// A bounded FIFO of chores. Workers block popping it; shutdown is signalled
/// by enqueueing one `None` sentinel per worker.
pub struct ChoreQueue {
    queue: Mutex<VecDeque<Option<Chore>>>,
    not_empty: Condvar,
}

impl ChoreQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    pub fn push(&self, chore: Chore) {
        self.queue.lock().push_back(Some(chore));
        self.not_empty.notify_one();
    }

    /// Wakes one blocked worker with a shutdown signal.
    pub fn push_sentinel(&self) {
        self.queue.lock().push_back(None);
        self.not_empty.notify_one();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until a chore or a sentinel is available. `None` means "stop".
    pub fn pop(&self) -> Option<Chore> {
        let mut guard = self.queue.lock();
        while guard.is_empty() {
            self.not_empty.wait(&mut guard);
        }
        guard.pop_front().flatten()
    }
}

impl Default for ChoreQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A single atomic cancellation flag, cheaply cloned and shared across every
/// worker and the composer for one query.
#[derive(Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pop_blocks_until_pushed() {
        let queue = Arc::new(ChoreQueue::new());
        let popper = Arc::clone(&queue);
        let handle = thread::spawn(move || popper.pop());
        thread::sleep(Duration::from_millis(20));
        queue.push((1, 2));
        assert_eq!(handle.join().unwrap(), Some((1, 2)));
    }

    #[test]
    fn sentinel_unblocks_with_none() {
        let queue = ChoreQueue::new();
        queue.push_sentinel();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn cancellation_is_observed_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}

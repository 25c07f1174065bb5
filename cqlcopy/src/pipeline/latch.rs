//! Countdown latch for joining pipeline slots.
//!
//! The writer's calling thread blocks on a [`CompletionLatch`] until every
//! slot has signalled that it terminated. Slots hold a [`SlotGuard`] so the
//! count-down happens exactly once per slot, however the slot ends.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A countdown synchronization primitive.
///
/// Starts at `n` and releases every waiter once `n` count-downs have been
/// observed. The counter never increases, so once released the latch stays
/// released. Counting down past zero is harmless.
#[derive(Debug)]
pub struct CompletionLatch {
    count: Mutex<i64>,
    released: Condvar,
}

impl CompletionLatch {
    /// Creates a latch that releases after `n` count-downs.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "latch count must be > 0");
        Self {
            count: Mutex::new(n as i64),
            released: Condvar::new(),
        }
    }

    /// Decrements the counter, waking all waiters when it reaches zero.
    pub fn count_down(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count <= 0 {
            self.released.notify_all();
        }
    }

    /// Blocks the calling thread until the counter reaches zero.
    ///
    /// Returns immediately if the latch is already released. Must not be
    /// called from a thread that has to make progress for the count-downs
    /// to happen (e.g. a single-threaded runtime driving the slots).
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.released.wait(&mut count);
        }
    }

    /// Blocks until the counter reaches zero or `timeout` elapses.
    ///
    /// Returns `true` if the latch was released.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        if *count <= 0 {
            return true;
        }
        // Wakeups may be spurious, the count is the source of truth
        let deadline = Instant::now() + timeout;
        while *count > 0 {
            if self.released.wait_until(&mut count, deadline).timed_out() {
                return *count <= 0;
            }
        }
        true
    }

    /// Returns the number of count-downs still outstanding (never negative).
    pub fn remaining(&self) -> usize {
        (*self.count.lock()).max(0) as usize
    }

    /// Returns a guard that counts the latch down when dropped.
    pub fn slot_guard(&self) -> SlotGuard<'_> {
        SlotGuard { latch: self }
    }
}

/// Counts a [`CompletionLatch`] down once when dropped.
///
/// A slot keeps one of these for its whole lifetime, so a slot that panics
/// still releases its share of the latch instead of hanging the caller.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    latch: &'a CompletionLatch,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.latch.count_down();
    }
}

//! Global transaction lock.
//!
//! One nonce-bearing submission may be in flight per trade account, so every
//! market's cycle takes this lock before touching the venue. Acquisition
//! never waits: a loser backs off and reschedules.

use std::sync::atomic::{AtomicU64, Ordering};

const HELD: u64 = 1;

/// State word: `epoch << 1 | held`. A forced release starts a new epoch, so
/// a guard from before it cannot free a lock taken after it.
#[derive(Debug, Default)]
pub struct TransactionLock {
    state: AtomicU64,
}

impl TransactionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if free. It is released when the guard drops, on every
    /// exit path of the holder.
    pub fn try_acquire(&self) -> Option<LockGuard<'_>> {
        let current = self.state.load(Ordering::Acquire);
        if current & HELD != 0 {
            return None;
        }
        self.state
            .compare_exchange(current, current | HELD, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LockGuard {
                lock: self,
                epoch: current >> 1,
            })
    }

    pub fn is_held(&self) -> bool {
        self.state.load(Ordering::Acquire) & HELD != 0
    }

    /// Clear the lock regardless of holder and start a new epoch. Used on
    /// engine stop; the previous holder's guard becomes inert.
    pub fn force_release(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                Some(((state >> 1).wrapping_add(1)) << 1)
            });
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a TransactionLock,
    epoch: u64,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // Fails when a forced release already moved to a later epoch
        let held = (self.epoch << 1) | HELD;
        let _ = self
            .lock
            .state
            .compare_exchange(held, self.epoch << 1, Ordering::AcqRel, Ordering::Acquire);
    }
}

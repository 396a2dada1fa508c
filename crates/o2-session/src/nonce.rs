//! Trade account nonce tracking.
//!
//! Every signed registration or action batch carries the account nonce, and
//! the venue accepts each value exactly once and in order. The counter holds
//! the next value to use and only moves forward, except for an explicit
//! resync from the venue after a rejection.

use std::sync::atomic::{AtomicU64, Ordering};

/// Next nonce for one trade account.
#[derive(Debug, Default)]
pub struct NonceCounter {
    next: AtomicU64,
}

impl NonceCounter {
    pub fn new(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Nonce the next signed payload must carry.
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    /// Record that `used` was accepted; the counter moves to at least
    /// `used + 1`. Returns the new value.
    ///
    /// Thread-safe via CAS loop.
    pub fn commit(&self, used: u64) -> u64 {
        let target = used.saturating_add(1);
        loop {
            let current = self.next.load(Ordering::Acquire);
            if current >= target {
                return current;
            }
            match self.next.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return target,
                Err(_) => continue,
            }
        }
    }

    /// Replace the counter with the venue's value.
    pub fn resync(&self, venue_nonce: u64) {
        let previous = self.next.swap(venue_nonce, Ordering::AcqRel);
        if previous != venue_nonce {
            tracing::warn!(previous, venue_nonce, "Nonce resynced from venue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_commit_advances_by_one() {
        let counter = NonceCounter::new(5);
        assert_eq!(counter.current(), 5);
        assert_eq!(counter.commit(5), 6);
        assert_eq!(counter.current(), 6);
    }

    #[test]
    fn test_commit_never_moves_backwards() {
        let counter = NonceCounter::new(10);
        assert_eq!(counter.commit(3), 10);
        assert_eq!(counter.current(), 10);
    }

    #[test]
    fn test_resync_can_lower() {
        let counter = NonceCounter::new(10);
        counter.resync(7);
        assert_eq!(counter.current(), 7);
    }

    #[test]
    fn test_concurrent_commits_are_monotonic() {
        let counter = Arc::new(NonceCounter::new(0));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    for i in 0..100 {
                        c.commit(t * 100 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.current(), 800);
    }
}

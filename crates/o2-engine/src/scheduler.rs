//! Per-market run queue.
//!
//! A min-heap of `(due_at, market_id)` entries drained by one driving loop.
//! Rescheduling a market bumps its generation so the superseded heap entry is
//! skipped lazily instead of being searched for and removed.

use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    due_at: u64,
    market_id: String,
    generation: u64,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.market_id.cmp(&other.market_id))
            .then_with(|| self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct State {
    heap: BinaryHeap<Reverse<Entry>>,
    /// market id -> (live generation, due_at)
    live: HashMap<String, (u64, u64)>,
    next_generation: u64,
}

impl State {
    /// Drop superseded entries from the top of the heap.
    fn prune(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            match self.live.get(&top.market_id) {
                Some((generation, _)) if *generation == top.generation => return,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }
}

/// Deadline queue keyed by market id. At most one pending run per market.
#[derive(Debug, Default)]
pub struct Scheduler {
    state: Mutex<State>,
    notify: Notify,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `market_id` at `due_at`, replacing any pending run.
    pub fn schedule(&self, market_id: &str, due_at: u64) {
        {
            let mut state = self.state.lock();
            state.next_generation += 1;
            let generation = state.next_generation;
            state
                .live
                .insert(market_id.to_string(), (generation, due_at));
            state.heap.push(Reverse(Entry {
                due_at,
                market_id: market_id.to_string(),
                generation,
            }));
        }
        self.notify.notify_one();
    }

    /// Returns whether a run was pending.
    pub fn cancel(&self, market_id: &str) -> bool {
        let removed = self.state.lock().live.remove(market_id).is_some();
        if removed {
            self.notify.notify_one();
        }
        removed
    }

    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.heap.clear();
            state.live.clear();
        }
        self.notify.notify_one();
    }

    pub fn due_at(&self, market_id: &str) -> Option<u64> {
        self.state.lock().live.get(market_id).map(|(_, due)| *due)
    }

    /// Earliest pending deadline.
    pub fn next_due(&self) -> Option<u64> {
        let mut state = self.state.lock();
        state.prune();
        state.heap.peek().map(|Reverse(entry)| entry.due_at)
    }

    /// Remove and return every market due at or before `now`, earliest first.
    pub fn pop_due(&self, now: u64) -> Vec<String> {
        let mut state = self.state.lock();
        let mut due = Vec::new();
        loop {
            state.prune();
            let ready = matches!(state.heap.peek(), Some(Reverse(top)) if top.due_at <= now);
            if !ready {
                break;
            }
            if let Some(Reverse(entry)) = state.heap.pop() {
                state.live.remove(&entry.market_id);
                due.push(entry.market_id);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves after the next `schedule`, `cancel` or `clear`.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

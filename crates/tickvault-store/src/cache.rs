//! Bounded read-result cache.
//!
//! Replaces the historical unbounded query-text cache: entries are keyed by
//! the canonical (label, window, limit, direction) tuple, capacity-bounded
//! with FIFO eviction, and invalidated per label by the writer, so a read can
//! never observe ticks older than the last write to that label.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tickvault_core::Tick;

/// Canonical identity of one read request. Window bounds are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadKey {
    pub label: String,
    pub start: i64,
    pub finish: i64,
    pub limit: Option<usize>,
    pub ascending: bool,
}

struct CacheState {
    entries: HashMap<ReadKey, Vec<Tick>>,
    order: VecDeque<ReadKey>,
}

pub struct ReadCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ReadCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &ReadKey) -> Option<Vec<Tick>> {
        let state = self.state.lock().expect("read cache mutex poisoned");
        state.entries.get(key).cloned()
    }

    pub fn put(&self, key: ReadKey, ticks: Vec<Tick>) {
        let mut state = self.state.lock().expect("read cache mutex poisoned");

        if state.entries.insert(key.clone(), ticks).is_none() {
            state.order.push_back(key);
        }

        while state.entries.len() > self.capacity {
            let Some(evicted) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&evicted);
        }
    }

    /// Drop every cached result for one label; called by the writer after it
    /// touches any of the label's shards.
    pub fn invalidate_label(&self, label_key: &str) {
        let mut state = self.state.lock().expect("read cache mutex poisoned");
        state.entries.retain(|key, _| key.label != label_key);
        state.order.retain(|key| key.label != label_key);
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("read cache mutex poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Bounded dedup window over platform message ids.
//!
//! Queue delivery is at-least-once and the orchestrator is not idempotent
//! (the surrounding persistence isn't re-entrant-safe), so every event must
//! pass through here before a cycle runs. The window is bounded: the oldest
//! key falls out once capacity is reached.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

pub struct DedupWindow {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                seen: HashSet::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record a key. Returns `true` if the key was new, `false` for a replay.
    pub fn insert(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().expect("dedup lock");

        if inner.seen.contains(key) {
            return false;
        }

        if inner.order.len() >= self.capacity
            && let Some(evicted) = inner.order.pop_front()
        {
            inner.seen.remove(&evicted);
        }

        inner.seen.insert(key.to_string());
        inner.order.push_back(key.to_string());
        true
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("dedup lock").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

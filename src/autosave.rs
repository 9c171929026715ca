//! Quiescence-window coalescing for deferred writes.
//!
//! Rapid edits to the same key (a slider dragged across an attribute, say)
//! collapse into one pending entry holding the latest value. An entry is due
//! once no new value has arrived for the configured window.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Pending<V> {
    value: V,
    touched_at: Instant,
}

#[derive(Debug)]
pub struct Debouncer<K, V> {
    window: Duration,
    pending: HashMap<K, Pending<V>>,
}

impl<K: Eq + Hash + Clone, V> Debouncer<K, V> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record the latest value for `key`, restarting its quiet period.
    pub fn push(&mut self, key: K, value: V, now: Instant) {
        self.pending.insert(
            key,
            Pending {
                value,
                touched_at: now,
            },
        );
    }

    /// Drop the pending value for `key`, if any.
    pub fn cancel(&mut self, key: &K) -> Option<V> {
        self.pending.remove(key).map(|p| p.value)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every entry that has been quiet for the window.
    pub fn take_due(&mut self, now: Instant) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.touched_at) >= self.window)
            .map(|(k, _)| k.clone())
            .collect();
        due.into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|p| (k, p.value)))
            .collect()
    }

    /// Remove and return everything, due or not.
    pub fn take_all(&mut self) -> Vec<(K, V)> {
        self.pending.drain().map(|(k, p)| (k, p.value)).collect()
    }
}

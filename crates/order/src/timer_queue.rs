// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline bookkeeping for the timer
//!
//! A min-heap of fire times plus a map of the live registration per key.
//! Rescheduling or cancelling a key leaves its old heap entry behind; such
//! stale entries are skipped when they reach the top.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<K> {
    key: K,
    fire_at: Instant,
    seq: u64,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest first, registration order among equal times
        Reverse(self.fire_at)
            .cmp(&Reverse(other.fire_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending deadlines, at most one per key
#[derive(Debug)]
pub struct TimerQueue<K> {
    items: BinaryHeap<Entry<K>>,
    live: HashMap<K, (Instant, u64)>,
    next_seq: u64,
}

impl<K: Clone + Eq + Hash> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash> TimerQueue<K> {
    pub fn new() -> Self {
        Self {
            items: BinaryHeap::new(),
            live: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Register `key` to fire at `fire_at`, replacing any earlier registration
    pub fn schedule(&mut self, key: K, fire_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(key.clone(), (fire_at, seq));
        self.items.push(Entry { key, fire_at, seq });
    }

    /// Drop the registration for `key`; returns whether one existed
    pub fn cancel(&mut self, key: &K) -> bool {
        self.live.remove(key).is_some()
    }

    /// Remove and return every key due at or before `now`, earliest first
    pub fn poll(&mut self, now: Instant) -> Vec<K> {
        let mut ready = Vec::new();

        while let Some(item) = self.items.peek() {
            if item.fire_at > now {
                break;
            }

            let Some(item) = self.items.pop() else {
                break;
            };

            if !self.is_live(&item) {
                continue;
            }

            self.live.remove(&item.key);
            ready.push(item.key);
        }

        ready
    }

    /// Earliest live deadline, discarding stale entries on the way
    pub fn next_fire_time(&mut self) -> Option<Instant> {
        while let Some(item) = self.items.peek() {
            if self.is_live(item) {
                return Some(item.fire_at);
            }
            self.items.pop();
        }
        None
    }

    /// Deadline currently registered for `key`
    pub fn fire_time(&self, key: &K) -> Option<Instant> {
        self.live.get(key).map(|(fire_at, _)| *fire_at)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.live.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn is_live(&self, item: &Entry<K>) -> bool {
        self.live.get(&item.key).map(|(_, seq)| *seq) == Some(item.seq)
    }
}

#[cfg(test)]
#[path = "timer_queue_tests.rs"]
mod tests;

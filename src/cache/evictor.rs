//! Eviction policy: decides which request keys to unlink from the store.
//!
//! Each entry gets a score, highest evicted first:
//! - LRU: ticks elapsed since the entry was last touched
//! - LFU: inverse of the number of touches
//!
//! Eviction is all-or-nothing per key. An evicted entry is never patched; the
//! next search for its key starts again from a fresh seeding fetch.

use std::collections::BinaryHeap;

use crate::cache::entry::AccessStats;
use crate::config::EvictionPolicy;

/// An eviction candidate with its computed priority score.
#[derive(Debug, Clone)]
pub struct EvictionCandidate<K> {
    pub key: K,
    pub score: f64,
}

// Higher score = higher eviction priority (should be evicted first).
impl<K> PartialEq for EvictionCandidate<K> {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl<K> Eq for EvictionCandidate<K> {}

impl<K> PartialOrd for EvictionCandidate<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for EvictionCandidate<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// The eviction policy engine.
#[derive(Debug, Clone)]
pub struct Evictor {
    policy: EvictionPolicy,
}

impl Evictor {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Compute eviction priority for a single entry at store tick `now`.
    pub fn compute_priority(&self, access: AccessStats, now: u64) -> f64 {
        match self.policy {
            EvictionPolicy::Lru => now.saturating_sub(access.last_access) as f64,
            EvictionPolicy::Lfu => 1.0 / (access.access_count as f64 + 1.0),
        }
    }

    /// Select up to `count` keys to evict.
    ///
    /// Returns keys ordered by eviction priority (highest first). The
    /// `protected` key (typically the one just inserted) is never selected.
    pub fn select_victims<K: PartialEq>(
        &self,
        entries: impl Iterator<Item = (K, AccessStats)>,
        count: usize,
        now: u64,
        protected: Option<&K>,
    ) -> Vec<EvictionCandidate<K>> {
        let mut heap = BinaryHeap::new();

        for (key, access) in entries {
            if protected.is_some_and(|p| *p == key) {
                continue;
            }
            let score = self.compute_priority(access, now);
            heap.push(EvictionCandidate { key, score });
        }

        let mut victims = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(candidate) = heap.pop() {
                victims.push(candidate);
            } else {
                break;
            }
        }

        victims
    }
}

//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, updated lock-free by every operation.
#[derive(Debug, Default)]
pub struct CacheStats {
    searches: AtomicU64,
    hits: AtomicU64,
    seeds: AtomicU64,
    fetches: AtomicU64,
    fetched_items: AtomicU64,
    bypasses: AtomicU64,
    prefetches_scheduled: AtomicU64,
    prefetches_dropped: AtomicU64,
    prefetch_failures: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Searches served, blocking and best-effort.
    pub searches: u64,
    /// Searches answered without any backing fetch.
    pub hits: u64,
    /// Entries created by a seeding fetch.
    pub seeds: u64,
    /// Backing fetches issued, including seeds.
    pub fetches: u64,
    /// Identifiers returned by backing fetches.
    pub fetched_items: u64,
    /// Best-effort searches answered by an uncached fetch.
    pub bypasses: u64,
    pub prefetches_scheduled: u64,
    /// Prefetches discarded because the queue was full.
    pub prefetches_dropped: u64,
    pub prefetch_failures: u64,
    /// Entries unlinked to stay within capacity.
    pub evictions: u64,
}

impl StatsSnapshot {
    /// Fraction of searches answered without a backing fetch (0.0 - 1.0).
    pub fn hit_ratio(&self) -> f64 {
        if self.searches == 0 {
            return 0.0;
        }
        self.hits as f64 / self.searches as f64
    }
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_search(&self, fetched: bool) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        if !fetched {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_seed(&self) {
        self.seeds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self, items: usize) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.fetched_items.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_prefetch(&self, scheduled: bool) {
        if scheduled {
            self.prefetches_scheduled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.prefetches_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_prefetch_failure(&self) {
        self.prefetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            searches: self.searches.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            seeds: self.seeds.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetched_items: self.fetched_items.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            prefetches_scheduled: self.prefetches_scheduled.load(Ordering::Relaxed),
            prefetches_dropped: self.prefetches_dropped.load(Ordering::Relaxed),
            prefetch_failures: self.prefetch_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

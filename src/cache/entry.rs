//! Per-key cache entry: total count, segment index and locks.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard, OnceCell};

use crate::cache::range_index::RangeIndex;
use crate::cache::segment::{PagingWindow, Segment};
use crate::error::{RangeCacheError, Result};
use crate::searcher::SearchResult;

/// Access bookkeeping read by the evictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessStats {
    /// Store clock tick of the latest touch.
    pub last_access: u64,
    /// Number of touches since creation.
    pub access_count: u64,
}

/// Everything cached for one request key.
///
/// The entry is created empty and becomes usable once [`CacheEntry::seed`]
/// has established the total count. Blocking merges serialize on the merge
/// lock for their whole duration; the segment index itself is only locked for
/// short synchronous sections, so readers can snapshot it while a merge is
/// waiting on the backing store.
#[derive(Debug)]
pub struct CacheEntry<Id> {
    total: OnceCell<usize>,
    merge_lock: Mutex<()>,
    index: RwLock<RangeIndex<Id>>,
    last_access: AtomicU64,
    access_count: AtomicU64,
}

impl<Id> CacheEntry<Id> {
    pub fn new(tick: u64) -> Self {
        Self {
            total: OnceCell::new(),
            merge_lock: Mutex::new(()),
            index: RwLock::new(RangeIndex::new()),
            last_access: AtomicU64::new(tick),
            access_count: AtomicU64::new(0),
        }
    }

    /// Unpaged result count, once seeded.
    pub fn total(&self) -> Option<usize> {
        self.total.get().copied()
    }

    pub fn is_seeded(&self) -> bool {
        self.total.initialized()
    }

    pub fn touch(&self, tick: u64) {
        self.last_access.fetch_max(tick, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn access_stats(&self) -> AccessStats {
        AccessStats {
            last_access: self.last_access.load(Ordering::Relaxed),
            access_count: self.access_count.load(Ordering::Relaxed),
        }
    }

    /// Serialize with other blocking merges on this entry.
    pub(crate) async fn lock_merges(&self) -> MutexGuard<'_, ()> {
        self.merge_lock.lock().await
    }

    pub(crate) fn index(&self) -> &RwLock<RangeIndex<Id>> {
        &self.index
    }

    pub fn segment_count(&self) -> usize {
        self.index.read().len()
    }

    pub fn cached_items(&self) -> usize {
        self.index.read().cached_items()
    }

    /// Whether the cached segments are pairwise non-overlapping.
    pub fn is_disjoint(&self) -> bool {
        self.index.read().is_disjoint()
    }

    /// Copy of every cached segment, in start order.
    pub fn segments(&self) -> Vec<Segment<Id>> {
        self.index.read().segments().cloned().collect()
    }

    /// The segment holding all of `window`, if any.
    pub fn covering(&self, window: &PagingWindow) -> Option<Segment<Id>> {
        self.index.read().covering(window).cloned()
    }

    /// Establish the total count with a seeding fetch, exactly once.
    ///
    /// Concurrent callers wait for the first one; if its fetch fails the
    /// entry stays unseeded and the error is returned to that caller only.
    /// The seeding rows are cached as the entry's first segment, starting at
    /// `first`. Returns the total and whether this call did the seeding.
    pub async fn seed<F, Fut>(&self, first: usize, fetch: F) -> Result<(usize, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SearchResult<Id>>>,
    {
        let mut seeded_here = false;
        let total = self
            .total
            .get_or_try_init(|| {
                seeded_here = true;
                async move {
                    let _merging = self.merge_lock.lock().await;
                    let result = fetch().await?;
                    self.index
                        .write()
                        .insert(Segment::new(first, result.identifiers));
                    Ok::<usize, RangeCacheError>(result.total)
                }
            })
            .await?;
        Ok((*total, seeded_here))
    }
}

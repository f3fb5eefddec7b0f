//! The range cache engine.
//!
//! Ties the pieces together:
//! - [`CacheStore`] maps each request key to its cache entry
//! - [`CacheEntry::seed`] establishes the total count on the first miss
//! - the merge primitive grows cached segments to cover requested windows
//! - [`Prefetcher`] widens windows and [`WorkerPool`] runs prefetches in the
//!   background
//!
//! The engine must be created inside a tokio runtime.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::entry::CacheEntry;
use crate::cache::merge::{self, Backing, MergeMode};
use crate::cache::prefetcher::Prefetcher;
use crate::cache::segment::{PagingWindow, Segment};
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::cache::store::CacheStore;
use crate::config::Config;
use crate::error::Result;
use crate::pool::{ShutdownMode, WorkerPool};
use crate::searcher::{SearchResult, Searcher};

/// State shared between callers and prefetch jobs.
struct Inner<S: Searcher> {
    searcher: Arc<S>,
    store: CacheStore<S::Key, S::Id>,
    stats: CacheStats,
}

/// What a lookup produced and whether it had to go to the backing store.
struct Lookup<Id> {
    result: SearchResult<Id>,
    fetched: bool,
}

impl<S: Searcher> Inner<S> {
    fn backing(&self) -> Backing<'_, S> {
        Backing {
            searcher: self.searcher.as_ref(),
            stats: &self.stats,
        }
    }

    async fn lookup(
        &self,
        key: &S::Key,
        window: PagingWindow,
        mode: MergeMode,
    ) -> Result<Lookup<S::Id>> {
        let (entry, evicted) = self.store.get_or_insert(key);
        if evicted > 0 {
            self.stats.record_evictions(evicted);
        }

        let (total, seeded_here) = self.seed(key, &entry, window).await?;

        let window = window.clamp(total);
        if window.is_empty() {
            return Ok(Lookup {
                result: SearchResult {
                    total,
                    identifiers: Vec::new(),
                },
                fetched: seeded_here,
            });
        }

        let merged = merge::merge(&entry, &self.backing(), key, window, mode).await?;
        if mode == MergeMode::BestEffort && merged.fetches > 0 {
            self.stats.record_bypass();
        }

        Ok(Lookup {
            result: SearchResult {
                total,
                identifiers: merged.slice(&window),
            },
            fetched: seeded_here || merged.fetches > 0,
        })
    }

    /// Seed `entry` with the raw requested window if nobody has yet.
    async fn seed(
        &self,
        key: &S::Key,
        entry: &Arc<CacheEntry<S::Id>>,
        window: PagingWindow,
    ) -> Result<(usize, bool)> {
        let backing = self.backing();
        match entry
            .seed(window.first(), || backing.fetch(key, window))
            .await
        {
            Ok((total, seeded_here)) => {
                if seeded_here {
                    self.stats.record_seed();
                    debug!(key = ?key, window = %window, total, "Seeded entry");
                }
                Ok((total, seeded_here))
            }
            Err(e) => {
                // Let the next caller retry with a fresh entry.
                self.store.remove_unseeded(key, entry);
                Err(e)
            }
        }
    }
}

/// Result-range cache in front of a paginated [`Searcher`].
pub struct RangeCacheEngine<S: Searcher> {
    inner: Arc<Inner<S>>,
    prefetcher: Prefetcher,
    pool: WorkerPool,
}

impl<S: Searcher> RangeCacheEngine<S> {
    /// Create an engine and start its prefetch workers.
    pub fn new(searcher: Arc<S>, config: &Config) -> Self {
        let engine = Self {
            inner: Arc::new(Inner {
                searcher,
                store: CacheStore::new(&config.cache),
                stats: CacheStats::new(),
            }),
            prefetcher: Prefetcher::new(config.prefetch.clone()),
            pool: WorkerPool::new(config.prefetch.max_workers, config.prefetch.queue_capacity),
        };

        info!(
            max_entries = config.cache.max_entries,
            eviction = ?config.cache.eviction,
            granularity = config.prefetch.granularity,
            radius = config.prefetch.radius,
            max_workers = config.prefetch.max_workers,
            "Range cache engine started"
        );
        engine
    }

    /// Identifiers of `window` for `key`.
    ///
    /// A blocking search caches every missing sub-range before returning. A
    /// non-blocking search answers from cache when one segment already holds
    /// the window and otherwise fetches it uncached. Either mode seeds the
    /// entry on the first miss.
    pub async fn search(
        &self,
        key: &S::Key,
        window: PagingWindow,
        blocking: bool,
    ) -> Result<SearchResult<S::Id>> {
        let lookup = self
            .inner
            .lookup(key, window, MergeMode::from_blocking(blocking))
            .await?;
        self.inner.stats.record_search(lookup.fetched);
        Ok(lookup.result)
    }

    /// Same as [`search`](Self::search) for `length` items starting at `first`.
    pub async fn search_page(
        &self,
        key: &S::Key,
        first: usize,
        length: usize,
        blocking: bool,
    ) -> Result<SearchResult<S::Id>> {
        let window = PagingWindow::of_index(first, length)?;
        self.search(key, window, blocking).await
    }

    /// Warm the widened neighbourhood of `window` in the background.
    ///
    /// Returns once the prefetch is queued. A full queue drops the prefetch;
    /// failures of the background search are logged and counted, never
    /// returned.
    pub fn prefetch(&self, key: &S::Key, window: PagingWindow) -> Result<()> {
        let widened = self.prefetcher.widen(&window);
        let inner = Arc::clone(&self.inner);
        let job_key = key.clone();

        let scheduled = self.pool.submit(async move {
            if let Err(e) = inner.lookup(&job_key, widened, MergeMode::Blocking).await {
                inner.stats.record_prefetch_failure();
                warn!(key = ?job_key, window = %widened, "Prefetch failed: {e}");
            }
        })?;

        self.inner.stats.record_prefetch(scheduled);
        if scheduled {
            debug!(key = ?key, window = %window, widened = %widened, "Prefetch scheduled");
        } else {
            debug!(key = ?key, window = %widened, "Prefetch queue full, dropped");
        }
        Ok(())
    }

    /// Wait until every queued prefetch has finished.
    pub async fn wait_for_prefetches(&self) {
        self.pool.wait_idle().await;
    }

    /// Drop everything cached for `key`. Returns whether anything was cached.
    pub fn invalidate(&self, key: &S::Key) -> bool {
        let removed = self.inner.store.remove(key).is_some();
        if removed {
            debug!(key = ?key, "Invalidated entry");
        }
        removed
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        let entries = self.inner.store.len();
        self.inner.store.clear();
        info!(entries, "Cleared cache");
    }

    /// Cached segments of `key`, in start order.
    pub fn segments(&self, key: &S::Key) -> Vec<Segment<S::Id>> {
        self.inner
            .store
            .peek(key)
            .map(|entry| entry.segments())
            .unwrap_or_default()
    }

    /// Total count cached for `key`, if it has been seeded.
    pub fn total(&self, key: &S::Key) -> Option<usize> {
        self.inner.store.peek(key).and_then(|entry| entry.total())
    }

    pub fn searcher(&self) -> &Arc<S> {
        &self.inner.searcher
    }

    pub fn store(&self) -> &CacheStore<S::Key, S::Id> {
        &self.inner.store
    }

    pub fn prefetcher(&self) -> &Prefetcher {
        &self.prefetcher
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_shut_down()
    }

    /// Stop the prefetch workers. Searches keep working afterwards; new
    /// prefetches fail with [`RangeCacheError::ShutDown`](crate::error::RangeCacheError::ShutDown).
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.pool.shutdown(mode).await;
        let stats = self.stats();
        info!(
            ?mode,
            entries = self.inner.store.len(),
            searches = stats.searches,
            hit_ratio = stats.hit_ratio(),
            "Range cache engine shut down"
        );
    }
}

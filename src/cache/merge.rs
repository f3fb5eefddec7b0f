//! The merge primitive shared by blocking and best-effort searches.
//!
//! Blocking merges hold the entry's merge lock from planning to commit, fetch
//! every missing sub-range, and replace the touched segments with one
//! super-segment. Nothing is written to the index until every fetch of the
//! merge has succeeded.
//!
//! Best-effort merges never lock or mutate: a window already held by one
//! segment is served from it, anything else is fetched uncached in a single
//! call.

use tracing::debug;

use crate::cache::entry::CacheEntry;
use crate::cache::range_index::MergeStep;
use crate::cache::segment::{PagingWindow, Segment};
use crate::cache::stats::CacheStats;
use crate::error::{RangeCacheError, Result};
use crate::searcher::{SearchResult, Searcher};

/// How a search interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Fill and cache every missing sub-range before returning.
    Blocking,
    /// Serve from cache if fully present, otherwise bypass it.
    BestEffort,
}

impl MergeMode {
    pub fn from_blocking(blocking: bool) -> Self {
        if blocking {
            MergeMode::Blocking
        } else {
            MergeMode::BestEffort
        }
    }
}

/// Searcher handle that accounts every fetch it issues.
pub(crate) struct Backing<'a, S> {
    pub searcher: &'a S,
    pub stats: &'a CacheStats,
}

impl<S: Searcher> Backing<'_, S> {
    /// Fetch `window`, trimming any rows past the window.
    pub async fn fetch(&self, key: &S::Key, window: PagingWindow) -> Result<SearchResult<S::Id>> {
        let mut result = self.searcher.fetch(key, window).await?;
        result.identifiers.truncate(window.len());
        self.stats.record_fetch(result.identifiers.len());
        Ok(result)
    }
}

/// A segment holding at least the requested window.
#[derive(Debug)]
pub struct Merged<Id> {
    pub segment: Segment<Id>,
    /// Backing fetches issued to build it.
    pub fetches: usize,
}

impl<Id: Clone> Merged<Id> {
    /// Identifiers of `window`, sliced relative to the segment start.
    pub fn slice(&self, window: &PagingWindow) -> Vec<Id> {
        self.segment.slice(window)
    }
}

/// Bring `window` (already clamped to the entry's total) into one segment.
pub(crate) async fn merge<S: Searcher>(
    entry: &CacheEntry<S::Id>,
    backing: &Backing<'_, S>,
    key: &S::Key,
    window: PagingWindow,
    mode: MergeMode,
) -> Result<Merged<S::Id>> {
    match mode {
        MergeMode::Blocking => merge_blocking(entry, backing, key, window).await,
        MergeMode::BestEffort => merge_best_effort(entry, backing, key, window).await,
    }
}

async fn merge_blocking<S: Searcher>(
    entry: &CacheEntry<S::Id>,
    backing: &Backing<'_, S>,
    key: &S::Key,
    window: PagingWindow,
) -> Result<Merged<S::Id>> {
    let _merging = entry.lock_merges().await;

    let plan = entry.index().read().plan(&window);
    if plan.is_cached() {
        if let Some(anchor) = plan.anchor() {
            return Ok(Merged {
                segment: anchor.clone(),
                fetches: 0,
            });
        }
    }

    let steps = plan.steps();
    let mut fetched = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        let MergeStep::Fetch(gap) = step else {
            continue;
        };
        let rows = backing.fetch(key, *gap).await?.identifiers;

        // A gap followed by a cached segment must be filled exactly, or the
        // segment would land at the wrong offset.
        let closes_gap = matches!(steps.get(i + 1), Some(MergeStep::Cached(_)));
        if closes_gap && rows.len() != gap.len() {
            return Err(RangeCacheError::BackingDrift {
                expected: gap.len(),
                got: rows.len(),
            });
        }
        fetched.push(rows);
    }

    let fetches = fetched.len();
    let start = plan.start();
    let folded = steps
        .iter()
        .filter(|step| matches!(step, MergeStep::Cached(_)))
        .count();
    let segment = entry.index().write().commit(plan, fetched);

    debug!(
        key = ?key,
        window = %window,
        start,
        folded,
        fetches,
        cached = segment.len(),
        "Merged window"
    );

    Ok(Merged { segment, fetches })
}

async fn merge_best_effort<S: Searcher>(
    entry: &CacheEntry<S::Id>,
    backing: &Backing<'_, S>,
    key: &S::Key,
    window: PagingWindow,
) -> Result<Merged<S::Id>> {
    if let Some(segment) = entry.covering(&window) {
        return Ok(Merged {
            segment,
            fetches: 0,
        });
    }

    let rows = backing.fetch(key, window).await?.identifiers;
    debug!(key = ?key, window = %window, fetched = rows.len(), "Bypassed cache");

    Ok(Merged {
        segment: Segment::new(window.first(), rows),
        fetches: 1,
    })
}

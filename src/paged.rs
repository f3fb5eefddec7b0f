//! Paged search front end.
//!
//! Every request first schedules a prefetch of its neighbourhood and then
//! answers best-effort, so the caller never waits for more than its own page
//! while the surrounding pages are warmed for the next request. Optionally
//! every answer is checked against an uncached fetch of the backing store.

use std::fmt::Debug;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::segment::{Paging, PagingWindow};
use crate::config::PagedConfig;
use crate::engine::RangeCacheEngine;
use crate::error::{RangeCacheError, Result};
use crate::searcher::{SearchResult, Searcher};

/// One page of results with its paging descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<Id> {
    pub paging: Paging,
    pub identifiers: Vec<Id>,
}

pub struct PagedSearch<S: Searcher> {
    engine: RangeCacheEngine<S>,
    config: PagedConfig,
}

impl<S> PagedSearch<S>
where
    S: Searcher,
    S::Id: PartialEq + Debug,
{
    pub fn new(engine: RangeCacheEngine<S>, config: PagedConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &RangeCacheEngine<S> {
        &self.engine
    }

    /// Warm the cache around `window` without waiting for it.
    pub fn prime(&self, key: &S::Key, window: PagingWindow) -> Result<()> {
        self.engine.prefetch(key, window)
    }

    /// Serve one page, prefetching around it.
    pub async fn search(&self, key: &S::Key, window: PagingWindow) -> Result<Page<S::Id>> {
        match self.engine.prefetch(key, window) {
            Ok(()) => {}
            Err(RangeCacheError::ShutDown) => {
                debug!(key = ?key, window = %window, "Prefetch pool shut down, serving without prefetch");
            }
            Err(e) => return Err(e),
        }

        let result = self.engine.search(key, window, false).await?;
        if self.config.verify_against_backing {
            self.verify(key, window, &result).await;
        }

        Ok(Page {
            paging: Paging::of(window, result.total),
            identifiers: result.identifiers,
        })
    }

    /// Serve `length` items starting at `first`.
    pub async fn search_page(
        &self,
        key: &S::Key,
        first: usize,
        length: usize,
    ) -> Result<Page<S::Id>> {
        let window = PagingWindow::of_index(first, length)?;
        self.search(key, window).await
    }

    /// Compare a cached answer with a fresh uncached one, logging mismatches.
    async fn verify(&self, key: &S::Key, window: PagingWindow, cached: &SearchResult<S::Id>) {
        let backing = match self.engine.searcher().fetch(key, window).await {
            Ok(result) => result,
            Err(e) => {
                warn!(key = ?key, window = %window, "Verification fetch failed: {e}");
                return;
            }
        };

        if backing.total != cached.total {
            warn!(
                key = ?key,
                cached = cached.total,
                backing = backing.total,
                "Cached total differs from backing store"
            );
        }

        let expected = &backing.identifiers[..backing.identifiers.len().min(window.len())];
        if expected != cached.identifiers.as_slice() {
            let position = expected
                .iter()
                .zip(&cached.identifiers)
                .position(|(a, b)| a != b)
                .unwrap_or(expected.len().min(cached.identifiers.len()));
            warn!(
                key = ?key,
                window = %window,
                position = window.first() + position,
                cached = ?cached.identifiers.get(position),
                backing = ?expected.get(position),
                "Cached page differs from backing store"
            );
        }
    }
}

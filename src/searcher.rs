//! The boundary to the authoritative backing search.
//!
//! A [`Searcher`] fetches one sub-range of a query's ordered results together
//! with the full, unpaged match count. The cache never looks inside keys or
//! identifiers beyond hashing and cloning them.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::cache::segment::PagingWindow;
use crate::error::SearcherError;
use crate::key::RequestKey;

/// Total match count plus one ordered page of identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult<Id> {
    /// Number of matches ignoring paging.
    pub total: usize,

    /// Identifiers of the requested window, in result order.
    pub identifiers: Vec<Id>,
}

/// Access to the expensive paginated search being cached.
///
/// Implementations must return at most `window.len()` identifiers, ordered by
/// a total order that stays stable for a key while it is cached. Fetches are
/// expected to be free of side effects so they can be retried or discarded.
#[async_trait]
pub trait Searcher: Send + Sync + 'static {
    /// Canonical request identity, excluding the paging window.
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Opaque result identifier.
    type Id: Clone + Send + Sync + 'static;

    async fn fetch(
        &self,
        key: &Self::Key,
        window: PagingWindow,
    ) -> Result<SearchResult<Self::Id>, SearcherError>;
}

/// Backing store holding fully materialized result lists in memory.
///
/// Records every fetch it serves, can add latency to each call and can be told
/// to fail the next few calls. Keys without a result list match nothing.
pub struct InMemorySearcher<Id> {
    results: RwLock<HashMap<RequestKey, Arc<Vec<Id>>>>,
    latency: Option<Duration>,
    calls: Mutex<Vec<(RequestKey, PagingWindow)>>,
    failures: Mutex<FailurePlan>,
}

#[derive(Debug, Default)]
struct FailurePlan {
    skip: usize,
    fail: usize,
}

impl<Id> Default for InMemorySearcher<Id> {
    fn default() -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
            latency: None,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(FailurePlan::default()),
        }
    }
}

impl<Id> InMemorySearcher<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` before answering each fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the full result list of `key`.
    pub fn insert(&self, key: RequestKey, identifiers: Vec<Id>) {
        self.results.write().insert(key, Arc::new(identifiers));
    }

    /// Make the next `count` fetches fail with a backend error.
    pub fn fail_next(&self, count: usize) {
        self.fail_after(0, count);
    }

    /// Let `skip` fetches through, then fail the following `count`.
    pub fn fail_after(&self, skip: usize, count: usize) {
        *self.failures.lock() = FailurePlan { skip, fail: count };
    }

    /// Every window fetched so far, across all keys.
    pub fn calls(&self) -> Vec<PagingWindow> {
        self.calls.lock().iter().map(|(_, window)| *window).collect()
    }

    /// Windows fetched so far for `key`.
    pub fn calls_for(&self, key: &RequestKey) -> Vec<PagingWindow> {
        self.calls
            .lock()
            .iter()
            .filter(|(called, _)| called == key)
            .map(|(_, window)| *window)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn take_failure(&self) -> bool {
        let mut plan = self.failures.lock();
        if plan.skip > 0 {
            plan.skip -= 1;
            false
        } else if plan.fail > 0 {
            plan.fail -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl<Id> Searcher for InMemorySearcher<Id>
where
    Id: Clone + Send + Sync + 'static,
{
    type Key = RequestKey;
    type Id = Id;

    async fn fetch(
        &self,
        key: &RequestKey,
        window: PagingWindow,
    ) -> Result<SearchResult<Id>, SearcherError> {
        self.calls.lock().push((key.clone(), window));

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.take_failure() {
            return Err(SearcherError::Backend(format!(
                "injected failure for {key} {window}"
            )));
        }

        let results = self.results.read().get(key).cloned();
        let Some(results) = results else {
            return Ok(SearchResult {
                total: 0,
                identifiers: Vec::new(),
            });
        };

        let page = window.clamp(results.len());
        Ok(SearchResult {
            total: results.len(),
            identifiers: results[page.first()..page.last()].to_vec(),
        })
    }
}

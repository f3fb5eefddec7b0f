//! Error types for the range cache.
//!
//! - [`SearcherError`]: failures reported by a backing [`Searcher`](crate::searcher::Searcher)
//! - [`RangeCacheError`]: everything a caller of the engine can see

use std::time::Duration;

use thiserror::Error;

/// A failure of the authoritative backing search.
#[derive(Error, Debug)]
pub enum SearcherError {
    #[error("backend search failed: {0}")]
    Backend(String),

    #[error("backend search timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum RangeCacheError {
    /// The window's first item lies after its last item.
    #[error("invalid paging window: first item {first} is after last item {last}")]
    InvalidWindow { first: usize, last: usize },

    /// `first + length` does not fit in the index space.
    #[error("paging window overflows: first item {first} + length {length}")]
    WindowOverflow { first: usize, length: usize },

    #[error("searcher failure: {0}")]
    Searcher(#[from] SearcherError),

    /// A gap fill came back shorter than the gap it had to close before an
    /// already cached segment, so the cached ordering no longer lines up
    /// with the backing ordering.
    #[error("backing store drifted: expected {expected} rows for gap fill, got {got}")]
    BackingDrift { expected: usize, got: usize },

    #[error("prefetch pool has been shut down")]
    ShutDown,
}

pub type Result<T, E = RangeCacheError> = std::result::Result<T, E>;

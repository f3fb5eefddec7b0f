//! range-cache: result-range cache for paginated searches.
//!
//! Sits in front of an expensive ordered search and keeps, per distinct
//! request, the total match count plus disjoint cached runs of result
//! identifiers. Requested pages are merged into contiguous runs so repeated
//! and overlapping paging only fetches what is missing, and the neighbourhood
//! of each page can be prefetched by a bounded pool of background workers.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod paged;
pub mod pool;
pub mod searcher;

pub use cache::segment::{Paging, PagingWindow, Segment};
pub use cache::stats::StatsSnapshot;
pub use config::Config;
pub use engine::RangeCacheEngine;
pub use error::{RangeCacheError, Result, SearcherError};
pub use key::RequestKey;
pub use paged::{Page, PagedSearch};
pub use pool::ShutdownMode;
pub use searcher::{InMemorySearcher, SearchResult, Searcher};

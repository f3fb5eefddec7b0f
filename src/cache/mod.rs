//! Result-range cache internals.
//!
//! - [`segment`]: paging windows, paging descriptors and cached segments
//! - [`range_index`]: per-key segment index and the merge planner
//! - [`entry`]: per-key entry holding total count, index and locks
//! - [`merge`]: blocking and best-effort merges against the backing store
//! - [`store`]: key to entry map with capacity management
//! - [`evictor`]: LRU / LFU victim selection
//! - [`prefetcher`]: prefetch window widening
//! - [`stats`]: hit, fetch and prefetch counters

pub mod entry;
pub mod evictor;
pub mod merge;
pub mod prefetcher;
pub mod range_index;
pub mod segment;
pub mod stats;
pub mod store;

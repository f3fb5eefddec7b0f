//! Paging windows and cached segments.
//!
//! A [`PagingWindow`] is a half-open index range into a query's full ordered
//! result set. A [`Segment`] is a contiguous run of cached identifiers that
//! starts at a known index in that ordering.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RangeCacheError, Result};

/// Half-open range `[first, last)` of result indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct PagingWindow {
    first: usize,
    last: usize,
}

#[derive(Deserialize)]
struct RawWindow {
    first: usize,
    last: usize,
}

impl TryFrom<RawWindow> for PagingWindow {
    type Error = RangeCacheError;

    fn try_from(raw: RawWindow) -> Result<Self> {
        Self::of_range(raw.first, raw.last)
    }
}

impl PagingWindow {
    /// Window covering `[first, last)`.
    pub fn of_range(first: usize, last: usize) -> Result<Self> {
        if first > last {
            return Err(RangeCacheError::InvalidWindow { first, last });
        }
        Ok(Self { first, last })
    }

    /// Window of `length` items starting at `first`.
    pub fn of_index(first: usize, length: usize) -> Result<Self> {
        let last = first
            .checked_add(length)
            .ok_or(RangeCacheError::WindowOverflow { first, length })?;
        Ok(Self { first, last })
    }

    /// Infallible constructor for bounds already known to be ordered.
    pub(crate) fn from_bounds(first: usize, last: usize) -> Self {
        debug_assert!(first <= last);
        Self { first, last }
    }

    /// Window covering everything from `first` onward.
    pub fn unbounded_from(first: usize) -> Self {
        Self {
            first,
            last: usize::MAX,
        }
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn last(&self) -> usize {
        self.last
    }

    pub fn len(&self) -> usize {
        self.last - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }

    /// Restrict the window to `[0, total)`.
    ///
    /// A window starting at or past `total` collapses to the empty window
    /// `[total, total)`.
    pub fn clamp(&self, total: usize) -> Self {
        Self {
            first: self.first.min(total),
            last: self.last.min(total),
        }
    }

    /// Whether `other` lies entirely inside this window.
    pub fn contains(&self, other: &PagingWindow) -> bool {
        self.first <= other.first && other.last <= self.last
    }
}

impl fmt::Display for PagingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.first, self.last)
    }
}

/// Paging descriptor reported alongside a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Index of the first item of the requested page.
    pub first_item: usize,

    /// Requested page size (before clamping to the total).
    pub page_size: usize,

    /// Total number of results, ignoring paging.
    pub total_items: usize,
}

impl Paging {
    pub fn of(window: PagingWindow, total_items: usize) -> Self {
        Self {
            first_item: window.first(),
            page_size: window.len(),
            total_items,
        }
    }

    /// Exclusive end of the page once clamped to the total.
    pub fn last_item(&self) -> usize {
        self.first_item
            .saturating_add(self.page_size)
            .min(self.total_items)
    }

    /// Whether more results follow this page.
    pub fn has_next(&self) -> bool {
        self.last_item() < self.total_items
    }
}

/// A contiguous cached run of identifiers.
///
/// Identifiers are shared behind an `Arc` so snapshots handed to readers stay
/// valid while a merge replaces the segment in the index.
#[derive(Debug)]
pub struct Segment<Id> {
    start: usize,
    ids: Arc<[Id]>,
}

impl<Id> Clone for Segment<Id> {
    fn clone(&self) -> Self {
        Self {
            start: self.start,
            ids: Arc::clone(&self.ids),
        }
    }
}

impl<Id> Segment<Id> {
    pub fn new(start: usize, ids: impl Into<Arc<[Id]>>) -> Self {
        Self {
            start,
            ids: ids.into(),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Exclusive end implied by the start and the number of identifiers.
    pub fn end(&self) -> usize {
        self.start + self.ids.len()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Index range covered by this segment.
    pub fn window(&self) -> PagingWindow {
        PagingWindow {
            first: self.start,
            last: self.end(),
        }
    }

    /// Whether the segment holds every identifier of `window`.
    pub fn covers(&self, window: &PagingWindow) -> bool {
        self.window().contains(window)
    }
}

impl<Id: Clone> Segment<Id> {
    /// Copy out the identifiers of `window`, truncated to what the segment holds.
    pub fn slice(&self, window: &PagingWindow) -> Vec<Id> {
        let from = window.first().saturating_sub(self.start).min(self.len());
        let to = window.last().saturating_sub(self.start).min(self.len());
        if from >= to {
            return Vec::new();
        }
        self.ids[from..to].to_vec()
    }
}

//! Per-key index of cached segments.
//!
//! The index maps segment start → [`Segment`]. Segments never overlap, but
//! adjacent segments are not merged eagerly: they are folded together only
//! when a request touches them.
//!
//! Merging is split in two so the index never has to be held across a
//! backing fetch:
//!
//! 1. [`RangeIndex::plan`] walks the index for a window and describes the
//!    super-segment to build: the anchor, the cached segments to fold in and
//!    the gaps to fetch.
//! 2. [`RangeIndex::commit`] takes the plan plus the fetched gap rows,
//!    removes every folded segment and inserts the super-segment at the
//!    anchor start.
//!
//! The caller must make sure nothing else mutates the index between the two
//! steps (see [`crate::cache::merge`]).

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};

use crate::cache::segment::{PagingWindow, Segment};

/// One step in building a super-segment, in ascending index order.
#[derive(Debug, Clone)]
pub enum MergeStep<Id> {
    /// Fold an existing segment into the super-segment.
    Cached(Segment<Id>),
    /// Fetch a missing sub-range from the backing store.
    Fetch(PagingWindow),
}

/// Description of the super-segment covering a requested window.
#[derive(Debug, Clone)]
pub struct MergePlan<Id> {
    start: usize,
    anchor: Option<Segment<Id>>,
    steps: Vec<MergeStep<Id>>,
}

impl<Id> MergePlan<Id> {
    /// Index the super-segment will be anchored at.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn anchor(&self) -> Option<&Segment<Id>> {
        self.anchor.as_ref()
    }

    pub fn steps(&self) -> &[MergeStep<Id>] {
        &self.steps
    }

    /// Sub-ranges that have to be fetched, in ascending order.
    pub fn fetches(&self) -> impl Iterator<Item = PagingWindow> + '_ {
        self.steps.iter().filter_map(|step| match step {
            MergeStep::Fetch(window) => Some(*window),
            MergeStep::Cached(_) => None,
        })
    }

    /// Whether the anchor alone already satisfies the window.
    pub fn is_cached(&self) -> bool {
        self.steps.is_empty() && self.anchor.is_some()
    }
}

/// Sorted, non-overlapping segments cached for one request key.
#[derive(Debug)]
pub struct RangeIndex<Id> {
    segments: BTreeMap<usize, Segment<Id>>,
}

impl<Id> Default for RangeIndex<Id> {
    fn default() -> Self {
        Self {
            segments: BTreeMap::new(),
        }
    }
}

impl<Id> RangeIndex<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The segment with the greatest start ≤ `first` whose end reaches `first`.
    pub fn anchor(&self, first: usize) -> Option<&Segment<Id>> {
        self.segments
            .range(..=first)
            .next_back()
            .map(|(_, segment)| segment)
            .filter(|segment| segment.end() >= first)
    }

    /// The anchor segment for `window`, if it holds the whole window.
    pub fn covering(&self, window: &PagingWindow) -> Option<&Segment<Id>> {
        self.anchor(window.first())
            .filter(|segment| segment.covers(window))
    }

    /// Insert a freshly fetched segment. Empty segments are not stored.
    ///
    /// Only valid where the segment cannot overlap an existing one, i.e. when
    /// seeding an empty index.
    pub fn insert(&mut self, segment: Segment<Id>) {
        if segment.is_empty() {
            return;
        }
        debug_assert!(self.segments.is_empty() || self.is_disjoint_from(&segment));
        self.segments.insert(segment.start(), segment);
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total number of cached identifiers across all segments.
    pub fn cached_items(&self) -> usize {
        self.segments.values().map(Segment::len).sum()
    }

    /// Segments in ascending start order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment<Id>> {
        self.segments.values()
    }

    /// Whether all segments are pairwise non-overlapping.
    pub fn is_disjoint(&self) -> bool {
        self.segments
            .values()
            .zip(self.segments.values().skip(1))
            .all(|(left, right)| left.end() <= right.start())
    }

    fn is_disjoint_from(&self, segment: &Segment<Id>) -> bool {
        self.segments
            .values()
            .all(|s| s.end() <= segment.start() || segment.end() <= s.start())
    }
}

impl<Id: Clone> RangeIndex<Id> {
    /// Plan the super-segment covering `window`.
    ///
    /// The super-segment starts at the anchor (or at `window.first()` when no
    /// segment reaches it), folds every segment starting inside
    /// `(start, window.last()]` and fetches whatever lies between them.
    pub fn plan(&self, window: &PagingWindow) -> MergePlan<Id> {
        let anchor = self.anchor(window.first()).cloned();
        let start = anchor
            .as_ref()
            .map_or(window.first(), |segment| segment.start());
        let mut cursor = anchor.as_ref().map_or(window.first(), |segment| segment.end());

        let mut steps = Vec::new();
        if start < window.last() {
            for (_, candidate) in self
                .segments
                .range((Excluded(start), Included(window.last())))
            {
                if candidate.start() > cursor {
                    steps.push(MergeStep::Fetch(PagingWindow::from_bounds(
                        cursor,
                        candidate.start(),
                    )));
                }
                steps.push(MergeStep::Cached(candidate.clone()));
                cursor = candidate.end();
            }
        }

        if cursor < window.last() {
            steps.push(MergeStep::Fetch(PagingWindow::from_bounds(
                cursor,
                window.last(),
            )));
        }

        MergePlan {
            start,
            anchor,
            steps,
        }
    }

    /// Apply a plan: build the super-segment, drop the folded segments and
    /// store the result at the plan's start.
    ///
    /// `fetched` holds the rows for each [`MergeStep::Fetch`] of the plan, in
    /// order. The index must not have changed since the plan was made.
    pub fn commit(&mut self, plan: MergePlan<Id>, fetched: Vec<Vec<Id>>) -> Segment<Id> {
        let capacity = plan.anchor.as_ref().map_or(0, Segment::len)
            + plan
                .steps
                .iter()
                .map(|step| match step {
                    MergeStep::Cached(segment) => segment.len(),
                    MergeStep::Fetch(window) => window.len(),
                })
                .sum::<usize>();

        let mut ids = Vec::with_capacity(capacity);
        if let Some(anchor) = &plan.anchor {
            ids.extend_from_slice(anchor.ids());
        }

        let mut fetched = fetched.into_iter();
        for step in plan.steps {
            match step {
                MergeStep::Cached(segment) => {
                    self.segments.remove(&segment.start());
                    ids.extend_from_slice(segment.ids());
                }
                MergeStep::Fetch(_) => {
                    if let Some(rows) = fetched.next() {
                        ids.extend(rows);
                    }
                }
            }
        }

        let merged = Segment::new(plan.start, ids);
        if merged.is_empty() {
            self.segments.remove(&plan.start);
        } else {
            self.segments.insert(plan.start, merged.clone());
        }
        debug_assert!(self.is_disjoint());
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::Range<u32>) -> Vec<u32> {
        range.collect()
    }

    fn window(first: usize, last: usize) -> PagingWindow {
        PagingWindow::of_range(first, last).unwrap()
    }

    fn index_with(segments: &[(usize, usize)]) -> RangeIndex<u32> {
        let mut index = RangeIndex::new();
        for &(start, end) in segments {
            index
                .segments
                .insert(start, Segment::new(start, ids(start as u32..end as u32)));
        }
        index
    }

    /// Fill every fetch step from the identity ordering.
    fn fill(plan: &MergePlan<u32>) -> Vec<Vec<u32>> {
        plan.fetches()
            .map(|w| ids(w.first() as u32..w.last() as u32))
            .collect()
    }

    #[test]
    fn test_anchor_requires_reaching_first() {
        let index = index_with(&[(0, 50)]);
        assert_eq!(index.anchor(40).map(Segment::start), Some(0));
        assert_eq!(index.anchor(50).map(Segment::start), Some(0));
        assert!(index.anchor(51).is_none());
    }

    #[test]
    fn test_plan_fully_cached() {
        let index = index_with(&[(0, 100)]);
        let plan = index.plan(&window(10, 20));
        assert!(plan.is_cached());
        assert_eq!(plan.fetches().count(), 0);
    }

    #[test]
    fn test_plan_extends_anchor_tail() {
        let index = index_with(&[(0, 100)]);
        let plan = index.plan(&window(50, 150));
        assert_eq!(plan.start(), 0);
        assert_eq!(plan.fetches().collect::<Vec<_>>(), vec![window(100, 150)]);
    }

    #[test]
    fn test_plan_fills_gaps_between_segments() {
        let index = index_with(&[(0, 10), (20, 30), (40, 50)]);
        let plan = index.plan(&window(5, 60));
        assert_eq!(
            plan.fetches().collect::<Vec<_>>(),
            vec![window(10, 20), window(30, 40), window(50, 60)]
        );

        let mut index = index;
        let fetched = fill(&plan);
        let merged = index.commit(plan, fetched);
        assert_eq!(merged.start(), 0);
        assert_eq!(merged.ids(), ids(0..60).as_slice());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_plan_without_anchor_starts_at_first() {
        let index = index_with(&[(0, 10), (50, 60)]);
        let plan = index.plan(&window(30, 55));
        assert_eq!(plan.start(), 30);
        assert!(plan.anchor().is_none());
        assert_eq!(plan.fetches().collect::<Vec<_>>(), vec![window(30, 50)]);

        let mut index = index;
        let fetched = fill(&plan);
        let merged = index.commit(plan, fetched);
        assert_eq!(merged.window(), window(30, 60));
        assert_eq!(index.len(), 2);
        assert!(index.is_disjoint());
    }

    #[test]
    fn test_adjacent_segment_is_folded_not_refetched() {
        let index = index_with(&[(0, 50), (50, 80)]);
        let plan = index.plan(&window(40, 100));
        assert_eq!(plan.fetches().collect::<Vec<_>>(), vec![window(80, 100)]);

        let mut index = index;
        let fetched = fill(&plan);
        index.commit(plan, fetched);
        assert_eq!(index.len(), 1);
        assert_eq!(index.cached_items(), 100);
    }

    #[test]
    fn test_segment_starting_at_last_item_is_folded() {
        let index = index_with(&[(0, 10), (20, 30)]);
        let plan = index.plan(&window(0, 20));
        assert_eq!(plan.fetches().collect::<Vec<_>>(), vec![window(10, 20)]);
        assert_eq!(plan.steps().len(), 2);

        let mut index = index;
        let fetched = fill(&plan);
        let merged = index.commit(plan, fetched);
        assert_eq!(merged.window(), window(0, 30));
    }

    #[test]
    fn test_short_trailing_fetch_is_kept() {
        let mut index = index_with(&[(0, 10)]);
        let plan = index.plan(&window(0, 20));
        let merged = index.commit(plan, vec![ids(10..15)]);
        assert_eq!(merged.window(), window(0, 15));
    }

    #[test]
    fn test_empty_result_is_not_stored() {
        let mut index: RangeIndex<u32> = RangeIndex::new();
        let plan = index.plan(&window(10, 20));
        let merged = index.commit(plan, vec![Vec::new()]);
        assert!(merged.is_empty());
        assert!(index.is_empty());
    }
}

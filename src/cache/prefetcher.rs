//! Prefetching: decides which window to warm around a requested page.
//!
//! The requested window is snapped outward to whole prefetch units and
//! widened by `radius` units on each side, so a user paging forward or back
//! finds the neighbouring pages already cached.

use crate::cache::segment::PagingWindow;
use crate::config::PrefetchConfig;

/// Computes prefetch windows.
#[derive(Debug, Clone)]
pub struct Prefetcher {
    config: PrefetchConfig,
}

impl Prefetcher {
    pub fn new(config: PrefetchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// The window to warm for a request of `window`.
    ///
    /// ```text
    /// start = floor(first / g) * g - radius * g     (0 if that would go negative)
    /// end   = floor(last  / g) * g + radius * g     (saturating)
    /// ```
    ///
    /// The result always contains `window`.
    pub fn widen(&self, window: &PagingWindow) -> PagingWindow {
        let unit = self.config.granularity.max(1);
        let span = self.config.radius.saturating_mul(unit);

        let first_unit = window.first() / unit;
        let start = if first_unit >= self.config.radius {
            first_unit * unit - span
        } else {
            0
        };
        let end = ((window.last() / unit) * unit).saturating_add(span);

        PagingWindow::from_bounds(start.min(window.first()), end.max(window.last()))
    }
}

//! Integration tests for the paged search front end.

use std::sync::Arc;

use range_cache::config::{Config, PagedConfig};
use range_cache::{InMemorySearcher, PagedSearch, PagingWindow, RangeCacheEngine, RequestKey};

fn paged(total: u32, verify: bool) -> (PagedSearch<InMemorySearcher<u32>>, RequestKey) {
    let searcher = InMemorySearcher::new();
    let key = RequestKey::named("all");
    searcher.insert(key.clone(), (0..total).collect());
    let engine = RangeCacheEngine::new(Arc::new(searcher), &Config::default());
    let config = PagedConfig {
        verify_against_backing: verify,
    };
    (PagedSearch::new(engine, config), key)
}

#[tokio::test]
async fn test_walk_every_page() {
    let (paged, key) = paged(1000, false);

    let mut first = 0;
    let mut seen = Vec::new();
    loop {
        let page = paged.search_page(&key, first, 30).await.unwrap();
        assert_eq!(page.paging.total_items, 1000);
        seen.extend(page.identifiers);
        if !page.paging.has_next() {
            break;
        }
        first = page.paging.last_item();
    }

    assert_eq!(seen, (0..1000).collect::<Vec<_>>());
    paged.engine().wait_for_prefetches().await;
    assert_eq!(paged.engine().segments(&key).len(), 1);
}

#[tokio::test]
async fn test_primed_request_serves_from_cache() {
    let (paged, key) = paged(1000, false);
    paged
        .prime(&key, PagingWindow::of_range(0, 20).unwrap())
        .unwrap();
    paged.engine().wait_for_prefetches().await;

    let before = paged.engine().stats();
    let page = paged.search_page(&key, 100, 20).await.unwrap();
    assert_eq!(page.identifiers, (100..120).collect::<Vec<_>>());

    let after = paged.engine().stats();
    assert_eq!(after.hits, before.hits + 1);
}

#[tokio::test]
async fn test_verification_does_not_change_answers() {
    let (paged, key) = paged(500, true);

    let page = paged.search_page(&key, 40, 25).await.unwrap();
    assert_eq!(page.identifiers, (40..65).collect::<Vec<_>>());

    // Verification fetches bypass the cache.
    paged.engine().wait_for_prefetches().await;
    let cached = paged.engine().stats().fetches;
    let calls = paged.engine().searcher().call_count();
    paged.search_page(&key, 40, 25).await.unwrap();
    paged.engine().wait_for_prefetches().await;
    assert_eq!(paged.engine().stats().fetches, cached);
    assert_eq!(paged.engine().searcher().call_count(), calls + 1);
}

#[tokio::test]
async fn test_empty_page_past_end() {
    let (paged, key) = paged(50, false);
    let page = paged.search_page(&key, 80, 10).await.unwrap();

    assert!(page.identifiers.is_empty());
    assert_eq!(page.paging.total_items, 50);
    assert!(!page.paging.has_next());
}

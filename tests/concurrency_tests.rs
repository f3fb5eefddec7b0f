//! Concurrency tests: parallel searches and prefetches against one engine.

use std::sync::Arc;
use std::time::Duration;

use range_cache::config::{Config, PrefetchConfig};
use range_cache::{InMemorySearcher, PagingWindow, RangeCacheEngine, RequestKey, ShutdownMode};

type Engine = RangeCacheEngine<InMemorySearcher<u32>>;

fn setup(total: u32, latency: Duration, config: &Config) -> (Arc<Engine>, RequestKey) {
    let searcher = InMemorySearcher::new().with_latency(latency);
    let key = RequestKey::named("all");
    searcher.insert(key.clone(), (0..total).collect());
    (
        Arc::new(RangeCacheEngine::new(Arc::new(searcher), config)),
        key,
    )
}

fn window(first: usize, last: usize) -> PagingWindow {
    PagingWindow::of_range(first, last).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_miss_seeds_once() {
    let (engine, key) = setup(1000, Duration::from_millis(20), &Config::default());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let key = key.clone();
            tokio::spawn(async move { engine.search(&key, window(0, 50), true).await })
        })
        .collect();

    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.identifiers, (0..50).collect::<Vec<_>>());
    }

    assert_eq!(engine.stats().seeds, 1);
    assert_eq!(engine.searcher().call_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_mode_overlapping_windows_stay_disjoint() {
    let (engine, key) = setup(5000, Duration::from_millis(2), &Config::default());

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let key = key.clone();
            // Overlapping, out-of-order windows.
            let first = (i * 137) % 4800;
            tokio::spawn(async move {
                let w = window(first, first + 150);
                let result = engine.search(&key, w, i % 3 != 0).await.unwrap();
                assert_eq!(
                    result.identifiers,
                    (first as u32..first as u32 + 150).collect::<Vec<_>>()
                );
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let segments = engine.segments(&key);
    assert!(segments
        .windows(2)
        .all(|pair| pair[0].end() <= pair[1].start()));
    for segment in &segments {
        let expected: Vec<u32> = (segment.start() as u32..segment.end() as u32).collect();
        assert_eq!(segment.ids(), expected.as_slice());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_blocking_disjoint_windows() {
    let (engine, key) = setup(5000, Duration::from_millis(2), &Config::default());
    // Seed away from every window so each task merges on its own.
    engine.search(&key, window(4900, 4950), true).await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let key = key.clone();
            // Disjoint windows with gaps between them, issued in shuffled order.
            let first = ((i * 7) % 16) * 300;
            tokio::spawn(async move {
                let result = engine
                    .search(&key, window(first, first + 200), true)
                    .await
                    .unwrap();
                assert_eq!(result.total, 5000);
                assert_eq!(
                    result.identifiers,
                    (first as u32..first as u32 + 200).collect::<Vec<_>>()
                );
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let segments = engine.segments(&key);
    assert_eq!(segments.len(), 17);
    assert!(segments
        .windows(2)
        .all(|pair| pair[0].end() <= pair[1].start()));
    for segment in &segments {
        let expected: Vec<u32> = (segment.start() as u32..segment.end() as u32).collect();
        assert_eq!(segment.ids(), expected.as_slice());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_prefetch_and_search_race() {
    let (engine, key) = setup(2000, Duration::from_millis(5), &Config::default());

    for first in (0..1500).step_by(100) {
        engine.prefetch(&key, window(first, first + 20)).unwrap();
        let result = engine
            .search(&key, window(first, first + 20), false)
            .await
            .unwrap();
        assert_eq!(result.identifiers.len(), 20);
        assert_eq!(result.identifiers[0], first as u32);
    }

    engine.wait_for_prefetches().await;
    let segments = engine.segments(&key);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].window(), window(0, 1600));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_drops_prefetches() {
    let config = Config {
        prefetch: PrefetchConfig {
            max_workers: 1,
            queue_capacity: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let (engine, _) = setup(1000, Duration::from_millis(50), &config);

    for i in 0..6 {
        let key = RequestKey::named(&format!("q{i}"));
        engine.prefetch(&key, window(0, 10)).unwrap();
    }

    let stats = engine.stats();
    assert_eq!(stats.prefetches_scheduled + stats.prefetches_dropped, 6);
    assert!(stats.prefetches_dropped >= 1);

    engine.shutdown(ShutdownMode::Drain).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_discard_shutdown_returns_promptly() {
    let (engine, key) = setup(1000, Duration::from_secs(30), &Config::default());
    engine.prefetch(&key, window(0, 10)).unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        engine.shutdown(ShutdownMode::Discard),
    )
    .await
    .unwrap();
    assert!(engine.is_shut_down());
}

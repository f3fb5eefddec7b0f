use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use range_cache::config::{Cli, Config};
use range_cache::{
    InMemorySearcher, PagedSearch, PagingWindow, RangeCacheEngine, RequestKey, ShutdownMode,
};

/// How a workload operation reaches the cache.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Mode {
    Blocking,
    BestEffort,
    Prefetch,
    /// Through the paged front end: prefetch, then best-effort.
    Paged,
}

#[derive(Debug, Clone, Deserialize)]
struct Operation {
    #[serde(default = "default_query")]
    query: String,
    first: usize,
    length: usize,
    mode: Mode,
}

fn default_query() -> String {
    "*".to_string()
}

fn load_workload(path: &Path) -> anyhow::Result<Vec<Operation>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading workload {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing workload {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "range_cache=debug"
    } else {
        "range_cache=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("range-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration and workload.
    let config = Config::load(&cli.config)?;
    let workload = load_workload(&cli.workload)?;

    info!(
        operations = workload.len(),
        total = cli.total,
        latency_ms = cli.latency_ms,
        "Workload loaded"
    );

    // Synthetic backing store: one result list per distinct query.
    let mut searcher = InMemorySearcher::new();
    if cli.latency_ms > 0 {
        searcher = searcher.with_latency(Duration::from_millis(cli.latency_ms));
    }
    let queries: BTreeSet<&str> = workload.iter().map(|op| op.query.as_str()).collect();
    for query in &queries {
        let ids = (0..cli.total).map(|i| format!("{query}_{i}")).collect();
        searcher.insert(RequestKey::named(query), ids);
    }

    let engine = RangeCacheEngine::new(Arc::new(searcher), &config);
    let paged = PagedSearch::new(engine, config.paged.clone());

    // Replay.
    let started = Instant::now();
    for (i, op) in workload.iter().enumerate() {
        let key = RequestKey::named(&op.query);
        let window = match PagingWindow::of_index(op.first, op.length) {
            Ok(window) => window,
            Err(e) => {
                warn!(operation = i, "Skipping operation: {e}");
                continue;
            }
        };

        let outcome = match op.mode {
            Mode::Blocking => paged.engine().search(&key, window, true).await.map(drop),
            Mode::BestEffort => paged.engine().search(&key, window, false).await.map(drop),
            Mode::Prefetch => paged.engine().prefetch(&key, window),
            Mode::Paged => paged.search(&key, window).await.map(drop),
        };
        if let Err(e) = outcome {
            warn!(operation = i, query = %op.query, window = %window, "Operation failed: {e}");
        }
    }

    paged.engine().wait_for_prefetches().await;
    paged.engine().shutdown(ShutdownMode::Drain).await;

    let stats = paged.engine().stats();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        hit_ratio = stats.hit_ratio(),
        "Replay complete"
    );

    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

//! Runtime configuration for range-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Store capacity, eviction policy and prefetch tuning all live here; the
//! merge algorithm is parametric over them.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "range-cache",
    about = "Replay a paging workload against an in-memory backing store through the range cache"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Path to the workload file (JSON list of operations).
    #[arg(short, long)]
    pub workload: PathBuf,

    /// Number of results in the synthetic backing store.
    #[arg(long, default_value_t = 1000)]
    pub total: usize,

    /// Simulated latency of each backing fetch, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache store capacity and eviction.
    pub cache: CacheConfig,

    /// Prefetching settings.
    pub prefetch: PrefetchConfig,

    /// Paged search front settings.
    pub paged: PagedConfig,
}

/// Which entries the store unlinks first once it is over capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently touched first.
    #[default]
    Lru,
    /// Least frequently touched first.
    Lfu,
}

/// Cache store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of request keys held at once.
    pub max_entries: usize,

    /// Victim selection once `max_entries` is exceeded.
    pub eviction: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            eviction: EvictionPolicy::Lru,
        }
    }
}

/// Prefetch strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Size of one prefetch unit, in results.
    pub granularity: usize,

    /// Number of units warmed on either side of the requested page.
    pub radius: usize,

    /// Maximum number of concurrent background merges.
    pub max_workers: usize,

    /// Maximum number of queued prefetches; further requests are dropped.
    pub queue_capacity: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            granularity: 100,
            radius: 2,
            max_workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Paged search front settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PagedConfig {
    /// Re-run every page against the backing store and log mismatches.
    pub verify_against_backing: bool,
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.cache.max_entries > 0, "cache.max_entries must be positive");
        anyhow::ensure!(
            self.prefetch.granularity > 0,
            "prefetch.granularity must be positive"
        );
        anyhow::ensure!(
            self.prefetch.max_workers > 0,
            "prefetch.max_workers must be positive"
        );
        anyhow::ensure!(
            self.prefetch.queue_capacity > 0,
            "prefetch.queue_capacity must be positive"
        );
        Ok(())
    }
}

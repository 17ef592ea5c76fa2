use std::path::Path;

use crate::config::{IoStrategy, StoreConfig};
use crate::string_index::{PRIMES, StringIndex, string_hash};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default config with backing files placed under `dir`.
pub fn config_in(dir: &Path) -> StoreConfig {
    init_tracing();
    StoreConfig {
        temp_dir: dir.to_path_buf(),
        ..StoreConfig::default()
    }
}

/// Smallest possible table, so rehashes come early.
pub fn small_config_in(dir: &Path, io_strategy: IoStrategy) -> StoreConfig {
    StoreConfig {
        initial_buckets: 1,
        io_strategy,
        ..config_in(dir)
    }
}

pub fn new_index(config: &StoreConfig) -> StringIndex {
    StringIndex::new(config).unwrap()
}

/// Strings whose ideal bucket in the smallest table is one of `buckets`.
pub fn strings_landing_in(buckets: std::ops::Range<u32>, count: usize) -> Vec<String> {
    (0u32..)
        .map(|i| format!("key-{i}"))
        .filter(|s| buckets.contains(&((string_hash(s) & 0x7fff_ffff) % PRIMES[0])))
        .take(count)
        .collect()
}

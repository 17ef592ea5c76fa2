use std::path::Path;

use crate::config::{ByteOrder, IoStrategy, StoreConfig};
use crate::record_file::{self, RecordFile};
use tracing_subscriber::EnvFilter;

/// Both access strategies, for tests that must hold for each of them.
pub const STRATEGIES: [IoStrategy; 2] = [IoStrategy::Mapped, IoStrategy::Direct];

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config selecting `strategy` with native byte order.
pub fn config_for(strategy: IoStrategy) -> StoreConfig {
    init_tracing();
    StoreConfig {
        io_strategy: strategy,
        byte_order: ByteOrder::Native,
        ..StoreConfig::default()
    }
}

/// Opens `path` with the given strategy.
pub fn open_with(path: &Path, strategy: IoStrategy) -> Box<dyn RecordFile> {
    record_file::open(path, &config_for(strategy)).unwrap()
}

/// Physical length of the file at `path`.
pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

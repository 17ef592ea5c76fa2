//! # slotstore
//!
//! Persistent storage primitives for a graph store: fixed-width record
//! files, and on-disk hash indexes that turn strings into compact 64-bit
//! values and back.
//!
//! ## Quick Start
//!
//! ```rust
//! use slotstore::{InverseStringIndex, RecordFile, StoreConfig, StringIndex, record_file};
//!
//! # fn main() -> Result<(), slotstore::StoreError> {
//! let dir = tempfile::tempdir()?;
//! let config = StoreConfig {
//!     temp_dir: dir.path().to_path_buf(),
//!     ..StoreConfig::default()
//! };
//!
//! // Slots addressed as longs, ints or bytes.
//! let file = record_file::open(dir.path().join("nodes"), &config)?;
//! file.put_long(3, 42)?;
//! assert_eq!(file.get_long(3)?, 42);
//! assert_eq!(file.get_long(4)?, 0);
//!
//! // String → value.
//! let index = StringIndex::new(&config)?;
//! index.put("http://example.org/a", 17)?;
//! assert_eq!(index.get("http://example.org/a")?, 17);
//!
//! // Value → string.
//! let inverse = InverseStringIndex::new(&config)?;
//! inverse.put("http://example.org/a", 17)?;
//! assert_eq!(inverse.get(17)?.as_deref(), Some("http://example.org/a"));
//!
//! index.delete()?;
//! inverse.delete()?;
//! file.delete()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Two I/O strategies**: memory-mapped 8 MiB regions or positioned
//!   reads and writes, behind one [`RecordFile`] trait.
//! - **Zero means absent**: reads past the end return 0 and zero writes
//!   past the end never grow a file.
//! - **Open-addressing hash index**: linear probing over a record file,
//!   with in-place rehashing and a bounded LRU front cache.
//! - **Explicit configuration**: byte order, I/O strategy and temp
//!   directory travel in a [`StoreConfig`], never in global state.

pub mod config;
pub mod encoding;
pub mod heap;
pub mod inverse_index;
pub mod long_mapper;
pub mod record_file;
pub mod string_index;

pub use config::{ByteOrder, ConfigError, IoStrategy, StoreConfig};
pub use encoding::EncodingError;
pub use heap::{HeapError, HeapFile};
pub use inverse_index::InverseStringIndex;
pub use long_mapper::{FileLongMapper, LongMapper, MemLongMapper};
pub use record_file::{DirectRecordFile, MappedRecordFile, RecordFile, RecordFileError};
pub use string_index::{StringIndex, StringIndexError};

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record file failure.
    #[error("Record file error: {0}")]
    RecordFile(#[from] RecordFileError),

    /// Heap file failure.
    #[error("Heap error: {0}")]
    Heap(#[from] HeapError),

    /// String index failure.
    #[error("String index error: {0}")]
    StringIndex(#[from] StringIndexError),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// String encoding failure.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// I/O failure outside any particular file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),
}

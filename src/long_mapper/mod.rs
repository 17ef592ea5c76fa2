//! Long Mappers
//!
//! A [`LongMapper`] is the smallest possible long → long map: put, get and
//! delete. Unmapped keys read as 0. Callers hold a `Box<dyn LongMapper>`
//! and never need to know whether it lives in memory ([`MemLongMapper`])
//! or on disk ([`FileLongMapper`]).

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use tracing::debug;

use crate::StoreError;
use crate::config::StoreConfig;
use crate::record_file::{self, RecordFile};

/// A long → long map.
pub trait LongMapper: Send + Sync + std::fmt::Debug {
    /// Maps `key` to `value`. Mapping to 0 removes the key.
    fn put_long(&self, key: u64, value: u64) -> Result<(), StoreError>;

    /// Returns the value mapped to `key`, or 0.
    fn get_long(&self, key: u64) -> Result<u64, StoreError>;

    /// Discards every mapping and releases any backing storage.
    fn delete(&self) -> Result<(), StoreError>;
}

/// Opens a disk-backed mapper at `path` with the configured I/O strategy.
pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Box<dyn LongMapper>, StoreError> {
    let file = record_file::open(path, config)?;
    Ok(Box::new(FileLongMapper::new(file)))
}

// ------------------------------------------------------------------------------------------------
// In memory
// ------------------------------------------------------------------------------------------------

/// Reference mapper backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemLongMapper {
    map: Mutex<HashMap<u64, u64>>,
}

impl MemLongMapper {
    /// Creates an empty mapper.
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<u64, u64>>, StoreError> {
        self.map
            .lock()
            .map_err(|_| StoreError::Internal("Mutex poisoned".into()))
    }
}

impl LongMapper for MemLongMapper {
    fn put_long(&self, key: u64, value: u64) -> Result<(), StoreError> {
        let mut map = self.map()?;
        if value == 0 {
            map.remove(&key);
        } else {
            map.insert(key, value);
        }
        Ok(())
    }

    fn get_long(&self, key: u64) -> Result<u64, StoreError> {
        Ok(self.map()?.get(&key).copied().unwrap_or(0))
    }

    fn delete(&self) -> Result<(), StoreError> {
        self.map()?.clear();
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// On disk
// ------------------------------------------------------------------------------------------------

/// Mapper storing `value` in slot `key` of a record file.
#[derive(Debug)]
pub struct FileLongMapper {
    file: Box<dyn RecordFile>,
}

impl FileLongMapper {
    /// Wraps `file`; slot `key` holds the value for `key`.
    pub fn new(file: Box<dyn RecordFile>) -> Self {
        Self { file }
    }

    /// The backing record file.
    pub fn record_file(&self) -> &dyn RecordFile {
        self.file.as_ref()
    }
}

impl LongMapper for FileLongMapper {
    fn put_long(&self, key: u64, value: u64) -> Result<(), StoreError> {
        Ok(self.file.put_long(key, value)?)
    }

    fn get_long(&self, key: u64) -> Result<u64, StoreError> {
        Ok(self.file.get_long(key)?)
    }

    fn delete(&self) -> Result<(), StoreError> {
        debug!(path = %self.file.path().display(), "deleting long mapper");
        Ok(self.file.delete()?)
    }
}

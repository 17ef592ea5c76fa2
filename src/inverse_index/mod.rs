//! Inverse String Index
//!
//! Maps numeric ids back to strings. Each string is appended to a dedicated
//! heap, and the heap offset is recorded in an inner [`StringIndex`] keyed
//! by the decimal form of the id. The stored value is `offset + 1`, since
//! the first entry sits at offset 0 and zero marks an empty bucket.


use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, info};

use crate::config::StoreConfig;
use crate::heap::HeapFile;
use crate::string_index::{StringIndex, StringIndexError};

/// Persistent id → string map.
///
/// # Example
///
/// ```rust
/// use slotstore::{InverseStringIndex, StoreConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let config = StoreConfig {
///     temp_dir: dir.path().to_path_buf(),
///     ..StoreConfig::default()
/// };
///
/// let inverse = InverseStringIndex::new(&config)?;
/// inverse.put("one", 1)?;
/// assert_eq!(inverse.get(1)?.as_deref(), Some("one"));
/// assert_eq!(inverse.get(2)?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InverseStringIndex {
    heap: Mutex<HeapFile>,
    ids: StringIndex,
}

impl InverseStringIndex {
    /// Creates an empty inverse index with fresh backing files.
    pub fn new(config: &StoreConfig) -> Result<Self, StringIndexError> {
        let ids = StringIndex::new(config)?;
        let heap = HeapFile::create_temp(config, "inverse-index")?;
        info!(heap_path = %heap.path().display(), "created inverse string index");
        Ok(Self {
            heap: Mutex::new(heap),
            ids,
        })
    }

    fn heap(&self) -> Result<MutexGuard<'_, HeapFile>, StringIndexError> {
        self.heap
            .lock()
            .map_err(|_| StringIndexError::Internal("Mutex poisoned".into()))
    }

    /// Records `value` as the string for `id`, replacing any previous one.
    pub fn put(&self, value: &str, id: u64) -> Result<(), StringIndexError> {
        let mut heap = self.heap()?;
        let offset = heap.append(value)?;
        self.ids.put(&id.to_string(), offset + 1)
    }

    /// Returns the string recorded for `id`, if any.
    pub fn get(&self, id: u64) -> Result<Option<String>, StringIndexError> {
        // Heap guard spans both lookups; lock order is heap, then ids.
        let heap = self.heap()?;
        let stored = self.ids.get(&id.to_string())?;
        if stored == 0 {
            return Ok(None);
        }
        Ok(Some(heap.read(stored - 1)?))
    }

    /// Removes every mapping.
    pub fn clear(&self) -> Result<(), StringIndexError> {
        let mut heap = self.heap()?;
        heap.clear()?;
        self.ids.clear()?;
        debug!(heap_path = %heap.path().display(), "cleared inverse string index");
        Ok(())
    }

    /// Removes all backing files.
    pub fn delete(&self) -> Result<(), StringIndexError> {
        self.heap()?.delete()?;
        self.ids.delete()
    }

    /// Number of ids with a recorded string.
    pub fn len(&self) -> Result<u32, StringIndexError> {
        self.ids.len()
    }

    /// Returns `true` if no id has a recorded string.
    pub fn is_empty(&self) -> Result<bool, StringIndexError> {
        self.ids.is_empty()
    }
}

impl Drop for InverseStringIndex {
    fn drop(&mut self) {
        if let Ok(heap) = self.heap.get_mut() {
            if let Err(e) = heap.delete() {
                error!(path = %heap.path().display(), error = %e, "failed to delete heap on drop");
            }
        }
    }
}

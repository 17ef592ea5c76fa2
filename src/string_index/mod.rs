//! String Index
//!
//! A persistent hash table from strings to unsigned 56-bit values, built
//! from two files:
//!
//! - a **bucket table**: a [`RecordFile`] viewed as contiguous 16-byte
//!   buckets,
//! - a **heap**: a [`HeapFile`] holding the string bytes.
//!
//! Both files are created in [`StoreConfig::temp_dir`] when the index is
//! built, and removed together by [`StringIndex::delete`] (or on drop).
//!
//! # On-disk layout
//!
//! ```text
//! bucket b, 16 bytes at byte offset b * 16:
//!
//! [hash: u32][heap_offset: u32][value: u64]
//!  int b*4    int b*4+1         long b*2+1
//! ```
//!
//! A bucket whose `value` is zero is empty; zero is therefore not a storable
//! value. The `value` is always written last, so a bucket only becomes
//! visible once its hash and heap offset are in place.
//!
//! # Probing
//!
//! `hash` is the CRC-32 of the string's UTF-8 bytes. The ideal bucket is
//! `(hash & 0x7fffffff) % bucket_count`; lookups probe linearly from there,
//! wrapping around, until a confirmed match or an empty bucket. The stored
//! hash is compared first and the heap is read only when it matches.
//! Returning to the start bucket is reported as
//! [`StringIndexError::TableFull`] rather than looping.
//!
//! # Rehashing
//!
//! Once occupancy reaches [`REHASH_LIMIT`] of the bucket count, the table
//! grows in place to the next prime from [`PRIMES`] that is at least twice
//! the current count. Relocation walks `0..max(old, new)` (entries may sit
//! past the old range after wrapping) and moves each occupied bucket to the
//! first empty bucket probing from its new ideal position, clearing the
//! source only after the copy. Passes repeat until nothing moves, which
//! closes any gap a relocation opened in another entry's probe run.
//!
//! # Concurrency model
//!
//! All state, the front cache included, sits behind one `Mutex`. Every
//! operation takes `&self` and runs to completion while holding it.

mod cache;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigError, StoreConfig};
use crate::encoding::{self, MAX_ENCODED_LEN};
use crate::heap::{HeapError, HeapFile};
use crate::record_file::{self, INTS_PER_SLOT, RecordFile, RecordFileError};
use cache::FrontCache;

/// Ascending bucket counts; each is roughly twice the previous one.
pub const PRIMES: [u32; 23] = [
    503, 1009, 2027, 4057, 8117, 16249, 32503, 65011, 130027, 260081, 520193, 1040387, 2080777,
    4161557, 8323151, 16646317, 33292687, 66585377, 133170769, 266341583, 532683227, 1065366479,
    2130732959,
];

/// Occupancy ratio at which the table is rehashed.
pub const REHASH_LIMIT: f64 = 0.8;

/// Largest storable value.
pub const MAX_VALUE: u64 = (1 << 56) - 1;

/// Ints per bucket.
const INTS_PER_BUCKET: u64 = 4;

/// Longs per bucket.
const LONGS_PER_BUCKET: u64 = INTS_PER_BUCKET / INTS_PER_SLOT;

/// Returns the smallest prime in [`PRIMES`] strictly greater than `n`.
pub fn find_prime(n: u64) -> Result<u32, StringIndexError> {
    PRIMES
        .iter()
        .copied()
        .find(|&p| u64::from(p) > n)
        .ok_or(StringIndexError::TooManyBuckets(n))
}

/// Ideal bucket of `hash` in a table of `count` buckets.
#[inline]
fn bucket_for(hash: u32, count: u32) -> u32 {
    (hash & 0x7fff_ffff) % count
}

/// CRC-32 of the UTF-8 bytes of `s`.
#[inline]
pub fn string_hash(s: &str) -> u32 {
    crc32fast::hash(s.as_bytes())
}

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`StringIndex`] and [`InverseStringIndex`](crate::InverseStringIndex).
#[derive(Debug, Error)]
pub enum StringIndexError {
    /// Bucket table failure.
    #[error("bucket table error: {0}")]
    RecordFile(#[from] RecordFileError),

    /// Heap failure.
    #[error("heap error: {0}")]
    Heap(#[from] HeapError),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Probing returned to its start bucket without resolving.
    #[error("hash table full ({buckets} buckets)")]
    TableFull {
        /// Bucket count at the time.
        buckets: u32,
    },

    /// No bucket count in [`PRIMES`] is large enough.
    #[error("no bucket count larger than {0}")]
    TooManyBuckets(u64),

    /// The value does not fit in 56 bits.
    #[error("value {0} exceeds {MAX_VALUE}")]
    ValueOutOfRange(u64),

    /// The string encodes to more than [`MAX_ENCODED_LEN`] bytes.
    #[error("string encodes to {0} bytes, limit is {MAX_ENCODED_LEN}")]
    StringTooLong(usize),

    /// The index was deleted.
    #[error("index has been deleted")]
    Deleted,

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Buckets
// ------------------------------------------------------------------------------------------------

/// One row of the bucket table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Bucket {
    hash: u32,
    heap_offset: u32,
    value: u64,
}

impl Bucket {
    #[inline]
    fn is_empty(&self) -> bool {
        self.value == 0
    }

    fn read(file: &dyn RecordFile, index: u32) -> Result<Self, RecordFileError> {
        let base = u64::from(index) * INTS_PER_BUCKET;
        let value = file.get_long(u64::from(index) * LONGS_PER_BUCKET + 1)?;
        if value == 0 {
            return Ok(Self::default());
        }
        Ok(Self {
            hash: file.get_int(base)?,
            heap_offset: file.get_int(base + 1)?,
            value,
        })
    }

    fn write(&self, file: &dyn RecordFile, index: u32) -> Result<(), RecordFileError> {
        let base = u64::from(index) * INTS_PER_BUCKET;
        file.put_int(base, self.hash)?;
        file.put_int(base + 1, self.heap_offset)?;
        file.put_long(u64::from(index) * LONGS_PER_BUCKET + 1, self.value)
    }

    fn clear(file: &dyn RecordFile, index: u32) -> Result<(), RecordFileError> {
        let base = u64::from(index) * INTS_PER_BUCKET;
        file.put_long(u64::from(index) * LONGS_PER_BUCKET + 1, 0)?;
        file.put_int(base, 0)?;
        file.put_int(base + 1, 0)
    }
}

// ------------------------------------------------------------------------------------------------
// StringIndex
// ------------------------------------------------------------------------------------------------

struct IndexInner {
    buckets: Box<dyn RecordFile>,
    heap: HeapFile,
    cache: FrontCache,

    /// Current bucket count (always an entry of [`PRIMES`]).
    nr_buckets: u32,

    /// Occupied buckets.
    nr_used: u32,

    deleted: bool,
}

/// Persistent string → value hash table.
///
/// # Example
///
/// ```rust
/// use slotstore::{StoreConfig, StringIndex};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let config = StoreConfig {
///     temp_dir: dir.path().to_path_buf(),
///     ..StoreConfig::default()
/// };
///
/// let index = StringIndex::new(&config)?;
/// index.put("alpha", 7)?;
/// assert_eq!(index.get("alpha")?, 7);
/// assert_eq!(index.get("beta")?, 0);
/// index.delete()?;
/// # Ok(())
/// # }
/// ```
pub struct StringIndex {
    hash_path: PathBuf,
    heap_path: PathBuf,
    initial_buckets: u32,
    inner: Mutex<IndexInner>,
}

impl std::fmt::Debug for StringIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringIndex")
            .field("hash_path", &self.hash_path)
            .field("heap_path", &self.heap_path)
            .finish_non_exhaustive()
    }
}

impl StringIndex {
    /// Creates an empty index with fresh backing files.
    pub fn new(config: &StoreConfig) -> Result<Self, StringIndexError> {
        config.validate()?;
        let initial_buckets = find_prime(u64::from(config.initial_buckets))?;

        let buckets = record_file::open_temp(config, "string-index", ".hash")?;
        let heap = match HeapFile::create_temp(config, "string-index") {
            Ok(heap) => heap,
            Err(e) => {
                if let Err(cleanup) = buckets.delete() {
                    warn!(path = %buckets.path().display(), error = %cleanup, "failed to remove bucket table");
                }
                return Err(e.into());
            }
        };

        info!(
            hash_path = %buckets.path().display(),
            heap_path = %heap.path().display(),
            buckets = initial_buckets,
            "created string index"
        );

        Ok(Self {
            hash_path: buckets.path().to_path_buf(),
            heap_path: heap.path().to_path_buf(),
            initial_buckets,
            inner: Mutex::new(IndexInner {
                buckets,
                heap,
                cache: FrontCache::new(config.cache_capacity),
                nr_buckets: initial_buckets,
                nr_used: 0,
                deleted: false,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, IndexInner>, StringIndexError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| StringIndexError::Internal("Mutex poisoned".into()))?;
        if inner.deleted {
            return Err(StringIndexError::Deleted);
        }
        Ok(inner)
    }

    /// Maps `s` to `value`, replacing any previous value.
    ///
    /// A `value` of 0 stores nothing.
    pub fn put(&self, s: &str, value: u64) -> Result<(), StringIndexError> {
        self.get_and_put(s, value).map(|_| ())
    }

    /// Returns the value mapped to `s`, or 0 if there is none.
    pub fn get(&self, s: &str) -> Result<u64, StringIndexError> {
        self.get_and_put(s, 0)
    }

    /// Maps `s` to `new_value` and returns the previous value (0 if `s` was
    /// absent). A `new_value` of 0 is a pure read.
    pub fn get_and_put(&self, s: &str, new_value: u64) -> Result<u64, StringIndexError> {
        if new_value > MAX_VALUE {
            return Err(StringIndexError::ValueOutOfRange(new_value));
        }

        let mut guard = self.lock()?;
        let inner = &mut *guard;

        if new_value == 0 {
            if let Some(value) = inner.cache.get(s) {
                return Ok(value);
            }
        }

        let hash = string_hash(s);
        let start = bucket_for(hash, inner.nr_buckets);
        let mut index = start;

        loop {
            let bucket = Bucket::read(&*inner.buckets, index)?;
            if bucket.is_empty() {
                break;
            }

            if bucket.hash == hash && inner.heap.read(u64::from(bucket.heap_offset))? == s {
                if new_value != 0 {
                    inner
                        .buckets
                        .put_long(u64::from(index) * LONGS_PER_BUCKET + 1, new_value)?;
                    inner.cache.insert(s, new_value);
                } else {
                    inner.cache.insert(s, bucket.value);
                }
                return Ok(bucket.value);
            }

            index = (index + 1) % inner.nr_buckets;
            if index == start {
                error!(buckets = inner.nr_buckets, used = inner.nr_used, "hash table full");
                return Err(StringIndexError::TableFull {
                    buckets: inner.nr_buckets,
                });
            }
        }

        if new_value != 0 {
            Self::insert(inner, index, hash, s, new_value)?;
        }
        Ok(0)
    }

    /// Stores a new entry in the empty bucket `index`.
    fn insert(
        inner: &mut IndexInner,
        index: u32,
        hash: u32,
        s: &str,
        value: u64,
    ) -> Result<(), StringIndexError> {
        let len = encoding::encoded_len(s);
        if len > MAX_ENCODED_LEN {
            return Err(StringIndexError::StringTooLong(len));
        }

        let offset = inner.heap.append(s)?;
        let heap_offset = u32::try_from(offset)
            .map_err(|_| StringIndexError::Internal(format!("heap offset {offset} exceeds u32")))?;

        Bucket {
            hash,
            heap_offset,
            value,
        }
        .write(&*inner.buckets, index)?;
        inner.nr_used += 1;
        inner.cache.insert(s, value);
        trace!(bucket = index, heap_offset, "inserted string");

        if inner.nr_used >= (f64::from(inner.nr_buckets) * REHASH_LIMIT) as u32 {
            match find_prime(u64::from(inner.nr_buckets) * 2 - 1) {
                Ok(next) => Self::rehash(inner, next)?,
                Err(e) => warn!(buckets = inner.nr_buckets, error = %e, "cannot grow hash table"),
            }
        }
        Ok(())
    }

    /// Redistributes every occupied bucket over `new_count` buckets.
    fn rehash(inner: &mut IndexInner, new_count: u32) -> Result<(), StringIndexError> {
        let old_count = inner.nr_buckets;
        let span = old_count.max(new_count);
        inner.nr_buckets = new_count;

        let file = &*inner.buckets;
        let mut passes = 0;
        loop {
            passes += 1;
            let mut moved = 0u32;

            for index in 0..span {
                let bucket = Bucket::read(file, index)?;
                if bucket.is_empty() {
                    continue;
                }

                let ideal = bucket_for(bucket.hash, new_count);
                let mut target = ideal;
                while target != index {
                    if Bucket::read(file, target)?.is_empty() {
                        bucket.write(file, target)?;
                        Bucket::clear(file, index)?;
                        moved += 1;
                        break;
                    }
                    target = (target + 1) % new_count;
                    if target == ideal {
                        return Err(StringIndexError::TableFull { buckets: new_count });
                    }
                }
            }

            if moved == 0 {
                break;
            }
        }

        debug!(
            from = old_count,
            to = new_count,
            used = inner.nr_used,
            passes,
            "rehashed string index"
        );
        Ok(())
    }

    /// Removes every entry and shrinks the table back to its initial size.
    pub fn clear(&self) -> Result<(), StringIndexError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        inner.buckets.clear()?;
        inner.heap.clear()?;
        inner.cache.clear();
        inner.nr_buckets = self.initial_buckets;
        inner.nr_used = 0;
        debug!(path = %self.hash_path.display(), "cleared string index");
        Ok(())
    }

    /// Flushes both backing files to stable storage.
    pub fn force(&self) -> Result<(), StringIndexError> {
        let inner = self.lock()?;
        inner.buckets.force()?;
        inner.heap.force()?;
        Ok(())
    }

    /// Removes both backing files. Later operations fail with
    /// [`StringIndexError::Deleted`]; deleting twice is harmless.
    pub fn delete(&self) -> Result<(), StringIndexError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StringIndexError::Internal("Mutex poisoned".into()))?;
        if inner.deleted {
            return Ok(());
        }
        inner.deleted = true;
        inner.cache.clear();
        inner.buckets.delete()?;
        inner.heap.delete()?;
        info!(path = %self.hash_path.display(), "deleted string index");
        Ok(())
    }

    /// Number of stored strings.
    pub fn len(&self) -> Result<u32, StringIndexError> {
        Ok(self.lock()?.nr_used)
    }

    /// Returns `true` if no string is stored.
    pub fn is_empty(&self) -> Result<bool, StringIndexError> {
        Ok(self.len()? == 0)
    }

    /// Current number of buckets.
    pub fn bucket_count(&self) -> Result<u32, StringIndexError> {
        Ok(self.lock()?.nr_buckets)
    }

    /// Bucket count the index starts with and returns to on `clear`.
    pub fn initial_bucket_count(&self) -> u32 {
        self.initial_buckets
    }

    /// Path of the bucket table.
    pub fn hash_path(&self) -> &Path {
        &self.hash_path
    }

    /// Path of the string heap.
    pub fn heap_path(&self) -> &Path {
        &self.heap_path
    }

    #[cfg(test)]
    pub(crate) fn cached_entries(&self) -> usize {
        self.lock().map_or(0, |inner| inner.cache.len())
    }
}

impl Drop for StringIndex {
    fn drop(&mut self) {
        let deleted = match self.inner.get_mut() {
            Ok(inner) => inner.deleted,
            Err(_) => true,
        };
        if !deleted {
            if let Err(e) = self.delete() {
                error!(path = %self.hash_path.display(), error = %e, "failed to delete string index on drop");
            }
        }
    }
}

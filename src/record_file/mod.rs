//! Record Files
//!
//! A record file is a flat, headerless file of fixed-width **8-byte slots**
//! that can be addressed three ways over the same bytes:
//!
//! - as longs (`key` counts 8-byte slots),
//! - as ints (`key` counts 4-byte halves, two per slot),
//! - as bytes (`key` counts single bytes, eight per slot).
//!
//! ## Design Overview
//!
//! The logical `size` of a file is a count of slots. Reads beyond `size`
//! return zero rather than failing; writes beyond `size` grow the file
//! first, zero-filling the gap, unless the value written is itself zero, in
//! which case the write is dropped. Zero therefore doubles as "absent" for
//! every structure built on top of a record file.
//!
//! Two strategies implement the [`RecordFile`] contract:
//!
//! - [`MappedRecordFile`]: the default. The file is mapped in 8 MiB
//!   regions that are created on demand and kept until [`RecordFile::unmap`].
//! - [`DirectRecordFile`]: positioned `pread`/`pwrite` calls, no mapping.
//!
//! [`open`] picks one according to [`StoreConfig::io_strategy`].
//!
//! # On-disk layout
//!
//! ```text
//! [SLOT_0: 8 bytes][SLOT_1: 8 bytes] ... [SLOT_{size-1}: 8 bytes]
//! ```
//!
//! Multi-byte values use [`StoreConfig::byte_order`]. The size is derived
//! on open as `floor(file_len / 8)`; a trailing partial slot is truncated
//! away with a warning.
//!
//! # Concurrency model
//!
//! Every operation takes `&self`. Any number of readers may run
//! concurrently with at most one writer; mutating operations are serialized
//! by a per-file lock. Composing layers are responsible for not running two
//! writers at once.
//!
//! # Failure semantics
//!
//! - A short read or write is fatal and never retried.
//! - Keys whose byte offset does not fit the slot range read as zero; a
//!   non-zero write to one fails with [`RecordFileError::KeyOutOfRange`].
//! - Physical truncation (on open, `clear` and `close`) is best-effort: a
//!   failure is logged and resolved by the size computation on next open.
//! - Deletion is retried a bounded number of times with a
//!   [release hint](RecordFile::release_hint) between attempts.

mod direct;
mod mapped;

#[cfg(test)]
mod tests;

pub use direct::DirectRecordFile;
pub use mapped::MappedRecordFile;

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, trace, warn};

use crate::config::{IoStrategy, StoreConfig};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Bytes per slot.
pub const SLOT_SIZE: u64 = 8;

/// Bytes per int.
pub const INT_SIZE: u64 = 4;

/// Ints per slot.
pub const INTS_PER_SLOT: u64 = SLOT_SIZE / INT_SIZE;

/// Largest representable slot count.
pub const MAX_SLOTS: u64 = u64::MAX / SLOT_SIZE;

/// Attempts made to delete (or map) a file before giving up.
pub const RELEASE_RETRIES: usize = 10;

/// Pause inserted by a release hint.
const RELEASE_HINT_PAUSE: Duration = Duration::from_millis(5);

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by record file operations.
#[derive(Debug, Error)]
pub enum RecordFileError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// I/O error annotated with the operation and file that failed.
    #[error("{op} failed on {path} at byte {offset}: {source}")]
    IoAt {
        /// Operation being performed.
        op: &'static str,
        /// File being accessed.
        path: PathBuf,
        /// Byte offset of the access.
        offset: u64,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Fewer bytes were read than requested.
    #[error("short read of {path} at byte {offset}: wanted {expected}, got {actual}")]
    ShortRead {
        /// File being read.
        path: PathBuf,
        /// Byte offset of the read.
        offset: u64,
        /// Bytes requested.
        expected: usize,
        /// Bytes returned.
        actual: usize,
    },

    /// Fewer bytes were written than requested.
    #[error("short write of {path} at byte {offset}: wanted {expected}, wrote {actual}")]
    ShortWrite {
        /// File being written.
        path: PathBuf,
        /// Byte offset of the write.
        offset: u64,
        /// Bytes requested.
        expected: usize,
        /// Bytes written.
        actual: usize,
    },

    /// A region could not be mapped after all retries.
    #[error("cannot map region {region} of {path}: {source}")]
    Map {
        /// File being mapped.
        path: PathBuf,
        /// Region number.
        region: u64,
        /// Last mapping error.
        #[source]
        source: io::Error,
    },

    /// The file was closed or deleted.
    #[error("record file is closed: {0}")]
    Closed(PathBuf),

    /// A key whose byte offset lies beyond the addressable slot range.
    #[error("key {key} of width {width} is beyond the addressable range")]
    KeyOutOfRange {
        /// Key as passed by the caller.
        key: u64,
        /// Bytes per element addressed by `key`.
        width: u64,
    },

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// RecordFile contract
// ------------------------------------------------------------------------------------------------

/// A file of 8-byte slots addressable as longs, ints or bytes.
///
/// See the [module-level documentation](self) for size and zero semantics.
pub trait RecordFile: Send + Sync + std::fmt::Debug {
    /// Path of the backing file.
    fn path(&self) -> &Path;

    /// Number of valid slots.
    fn size(&self) -> Result<u64, RecordFileError>;

    /// Sets the number of valid slots.
    ///
    /// Growing zero-fills the new slots. Shrinking only moves the logical
    /// size; the file is physically truncated at [`close`](Self::close).
    fn set_size(&self, new_size: u64) -> Result<(), RecordFileError>;

    /// Reads the long in slot `key`, or 0 if `key >= size`.
    fn get_long(&self, key: u64) -> Result<u64, RecordFileError>;

    /// Reads the int at int-index `key`, or 0 if it lies beyond `size`.
    fn get_int(&self, key: u64) -> Result<u32, RecordFileError>;

    /// Reads the byte at byte-index `key`, or 0 if it lies beyond `size`.
    fn get_byte(&self, key: u64) -> Result<u8, RecordFileError>;

    /// Writes the long in slot `key`, growing the file if needed.
    fn put_long(&self, key: u64, value: u64) -> Result<(), RecordFileError>;

    /// Writes the int at int-index `key`, growing the file if needed.
    fn put_int(&self, key: u64, value: u32) -> Result<(), RecordFileError>;

    /// Writes the byte at byte-index `key`, growing the file if needed.
    fn put_byte(&self, key: u64, value: u8) -> Result<(), RecordFileError>;

    /// Flushes all written data to stable storage.
    fn force(&self) -> Result<(), RecordFileError>;

    /// Truncates the file to zero slots.
    fn clear(&self) -> Result<(), RecordFileError>;

    /// Releases any OS mappings of the file. Later accesses re-map lazily.
    fn unmap(&self) -> Result<(), RecordFileError> {
        Ok(())
    }

    /// Best-effort nudge for the OS to reclaim mappings of this file.
    ///
    /// Callers must not rely on its effect; it only improves the odds of a
    /// following truncate or delete succeeding on platforms that refuse
    /// those operations on mapped files.
    fn release_hint(&self) {
        if let Err(e) = self.unmap() {
            trace!(path = %self.path().display(), error = %e, "unmap during release hint failed");
        }
        pause_for_release();
    }

    /// Closes the file, physically truncating it to `size` if `truncate`.
    ///
    /// Closing twice is harmless.
    fn close(&self, truncate: bool) -> Result<(), RecordFileError>;

    /// Closes the file and removes it from disk.
    fn delete(&self) -> Result<(), RecordFileError> {
        self.close(false)?;
        remove_with_retries(self.path(), || self.release_hint());
        Ok(())
    }

    /// Reads the unsigned int at int-index `key` widened to `u64`.
    fn get_uint(&self, key: u64) -> Result<u64, RecordFileError> {
        Ok(u64::from(self.get_int(key)?))
    }

    /// Writes an unsigned int given as `u64`.
    ///
    /// Values above `u32::MAX` are rejected.
    fn put_uint(&self, key: u64, value: u64) -> Result<(), RecordFileError> {
        let value = u32::try_from(value)
            .map_err(|_| RecordFileError::Internal(format!("uint value {value} out of range")))?;
        self.put_int(key, value)
    }
}

// ------------------------------------------------------------------------------------------------
// Factories
// ------------------------------------------------------------------------------------------------

/// Opens (or creates) a record file at `path` using the configured strategy.
pub fn open(
    path: impl AsRef<Path>,
    config: &StoreConfig,
) -> Result<Box<dyn RecordFile>, RecordFileError> {
    let path = path.as_ref();
    match config.io_strategy {
        IoStrategy::Mapped => Ok(Box::new(MappedRecordFile::open(path, config.byte_order)?)),
        IoStrategy::Direct => Ok(Box::new(DirectRecordFile::open(path, config.byte_order)?)),
    }
}

/// Creates a fresh record file in [`StoreConfig::temp_dir`] whose name starts
/// with `prefix` and ends with `suffix`.
///
/// The file is not removed automatically; call [`RecordFile::delete`].
pub fn open_temp(
    config: &StoreConfig,
    prefix: &str,
    suffix: &str,
) -> Result<Box<dyn RecordFile>, RecordFileError> {
    let path = create_temp_path(config, prefix, suffix)?;
    match open(&path, config) {
        Ok(file) => Ok(file),
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %cleanup, "failed to remove temp file after open error");
            }
            Err(e)
        }
    }
}

/// Creates an empty, uniquely named file and returns its path.
pub(crate) fn create_temp_path(
    config: &StoreConfig,
    prefix: &str,
    suffix: &str,
) -> io::Result<PathBuf> {
    fs::create_dir_all(&config.temp_dir)?;
    let (_file, path) = tempfile::Builder::new()
        .prefix(&format!("{}-{prefix}-", config.file_prefix))
        .suffix(suffix)
        .tempfile_in(&config.temp_dir)?
        .keep()?;
    trace!(path = %path.display(), "created temp file");
    Ok(path)
}

// ------------------------------------------------------------------------------------------------
// Shared helpers
// ------------------------------------------------------------------------------------------------

/// Opens `path` read-write, creating it if missing, and returns the handle
/// together with the slot count implied by its length.
///
/// A length that is not a multiple of [`SLOT_SIZE`] is truncated down; if
/// that fails the trailing bytes are simply ignored.
pub(crate) fn open_slot_file(path: &Path) -> Result<(File, u64), RecordFileError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| RecordFileError::IoAt {
            op: "open",
            path: path.to_path_buf(),
            offset: 0,
            source,
        })?;

    let len = file.metadata()?.len();
    let size = len / SLOT_SIZE;
    if size * SLOT_SIZE < len {
        warn!(
            path = %path.display(),
            len,
            "file length is not a multiple of the slot size"
        );
        truncate_deferred(&file, path, size * SLOT_SIZE);
    }

    info!(path = %path.display(), size, "opened record file");
    Ok((file, size))
}

/// Truncates `file` to `len` bytes, logging instead of failing.
pub(crate) fn truncate_deferred(file: &File, path: &Path, len: u64) {
    if let Err(e) = file.set_len(len) {
        warn!(
            path = %path.display(),
            len,
            error = %e,
            "could not truncate file, deferring until next open"
        );
    }
}

/// Reads exactly `buf.len()` bytes at `offset` in a single positioned read.
pub(crate) fn read_exact_at(
    file: &File,
    path: &Path,
    buf: &mut [u8],
    offset: u64,
) -> Result<(), RecordFileError> {
    let n = file
        .read_at(buf, offset)
        .map_err(|source| RecordFileError::IoAt {
            op: "read",
            path: path.to_path_buf(),
            offset,
            source,
        })?;
    if n != buf.len() {
        return Err(RecordFileError::ShortRead {
            path: path.to_path_buf(),
            offset,
            expected: buf.len(),
            actual: n,
        });
    }
    Ok(())
}

/// Writes all of `buf` at `offset` in a single positioned write.
pub(crate) fn write_exact_at(
    file: &File,
    path: &Path,
    buf: &[u8],
    offset: u64,
) -> Result<(), RecordFileError> {
    let n = file
        .write_at(buf, offset)
        .map_err(|source| RecordFileError::IoAt {
            op: "write",
            path: path.to_path_buf(),
            offset,
            source,
        })?;
    if n != buf.len() {
        return Err(RecordFileError::ShortWrite {
            path: path.to_path_buf(),
            offset,
            expected: buf.len(),
            actual: n,
        });
    }
    Ok(())
}

/// Sleeps briefly so that asynchronously released mappings can go away.
pub(crate) fn pause_for_release() {
    thread::sleep(RELEASE_HINT_PAUSE);
}

/// Removes `path`, calling `hint` between failed attempts.
///
/// Gives up after [`RELEASE_RETRIES`] attempts and leaves the file on disk.
/// Returns whether the file is gone.
pub(crate) fn remove_with_retries(path: &Path, hint: impl Fn()) -> bool {
    for attempt in 0..=RELEASE_RETRIES {
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted file");
                return true;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => {
                trace!(path = %path.display(), attempt, error = %e, "delete failed, retrying");
                hint();
            }
        }
    }
    warn!(path = %path.display(), "failed to delete file, leaving it on disk");
    false
}

/// Byte offset of element `key` of `width` bytes.
///
/// `None` if the element lies beyond [`MAX_SLOTS`]; such a key is always past
/// the logical size.
#[inline]
pub(crate) fn element_offset(key: u64, width: u64) -> Option<u64> {
    key.checked_mul(width)
        .filter(|offset| offset / SLOT_SIZE < MAX_SLOTS)
}

/// Outcome of a write to an unaddressable key: zero is dropped like any
/// write beyond the size, anything else is rejected.
pub(crate) fn write_out_of_range(key: u64, width: u64, is_zero: bool) -> Result<(), RecordFileError> {
    if is_zero {
        Ok(())
    } else {
        Err(RecordFileError::KeyOutOfRange { key, width })
    }
}

/// Rejects slot counts whose byte length does not fit in a `u64`.
#[inline]
pub(crate) fn check_size(new_size: u64) -> Result<(), RecordFileError> {
    if new_size > MAX_SLOTS {
        return Err(RecordFileError::KeyOutOfRange {
            key: new_size,
            width: SLOT_SIZE,
        });
    }
    Ok(())
}

/// Splits a byte offset into `(region, offset within region)`.
#[inline]
pub(crate) fn locate(byte_offset: u64, region_size: u64) -> (usize, usize) {
    (
        (byte_offset / region_size) as usize,
        (byte_offset % region_size) as usize,
    )
}

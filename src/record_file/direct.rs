//! Record file accessed with positioned reads and writes.
//!
//! No mapping is involved: every access is a single `pread`/`pwrite` at
//! `key * width`. Each call marshals through its own stack buffer, so
//! positioned reads run concurrently under the shared side of the lock.
//! Writes and size changes take the exclusive side, which keeps the logical
//! size, the physical length and the written bytes consistent with each
//! other.
//!
//! The physical length may run ahead of the logical size after a shrink
//! (truncation is deferred to `close`). Growth zero-fills any such stale
//! bytes before publishing the larger size.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info, trace};

use super::{
    INT_SIZE, RecordFile, RecordFileError, SLOT_SIZE, check_size, element_offset, open_slot_file,
    read_exact_at, truncate_deferred, write_exact_at, write_out_of_range,
};
use crate::config::ByteOrder;

/// Largest zero block written at once while growing.
const ZERO_CHUNK: usize = 64 * 1024;

struct DirectInner {
    /// `None` once the file has been closed.
    file: Option<File>,

    /// Number of valid slots.
    size: u64,

    /// Physical length of the file in bytes.
    file_len: u64,
}

/// A [`RecordFile`] accessed with explicit positioned I/O.
pub struct DirectRecordFile {
    path: PathBuf,
    byte_order: ByteOrder,
    inner: RwLock<DirectInner>,
}

impl std::fmt::Debug for DirectRecordFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectRecordFile")
            .field("path", &self.path)
            .field("byte_order", &self.byte_order)
            .finish_non_exhaustive()
    }
}

impl DirectRecordFile {
    /// Opens (or creates) the file at `path`.
    pub fn open(path: impl AsRef<Path>, byte_order: ByteOrder) -> Result<Self, RecordFileError> {
        let path = path.as_ref().to_path_buf();
        let (file, size) = open_slot_file(&path)?;
        let file_len = file.metadata()?.len().max(size * SLOT_SIZE);

        Ok(Self {
            path,
            byte_order,
            inner: RwLock::new(DirectInner {
                file: Some(file),
                size,
                file_len,
            }),
        })
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, DirectInner>, RecordFileError> {
        self.inner
            .read()
            .map_err(|_| RecordFileError::Internal("RwLock poisoned".into()))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, DirectInner>, RecordFileError> {
        self.inner
            .write()
            .map_err(|_| RecordFileError::Internal("RwLock poisoned".into()))
    }

    fn file<'a>(&self, inner: &'a DirectInner) -> Result<&'a File, RecordFileError> {
        inner
            .file
            .as_ref()
            .ok_or_else(|| RecordFileError::Closed(self.path.clone()))
    }

    /// Grows the logical size to `new_size`, clearing stale bytes and
    /// extending the file as needed.
    fn grow(&self, inner: &mut DirectInner, new_size: u64) -> Result<(), RecordFileError> {
        let file = self.file(inner)?;
        let start = inner.size * SLOT_SIZE;
        let end = new_size * SLOT_SIZE;

        // Bytes between the old size and the physical end may hold data
        // from before a shrink.
        let stale_end = inner.file_len.min(end);
        if start < stale_end {
            let zeros = vec![0u8; ZERO_CHUNK.min((stale_end - start) as usize)];
            let mut offset = start;
            while offset < stale_end {
                let n = zeros.len().min((stale_end - offset) as usize);
                write_exact_at(file, &self.path, &zeros[..n], offset)?;
                offset += n as u64;
            }
        }

        if inner.file_len < end {
            file.set_len(end).map_err(|source| RecordFileError::IoAt {
                op: "extend",
                path: self.path.clone(),
                offset: end,
                source,
            })?;
            inner.file_len = end;
        }

        trace!(path = %self.path.display(), prev_size = inner.size, new_size, "grew record file");
        inner.size = new_size;
        Ok(())
    }

    fn read_bytes<const N: usize>(&self, byte_offset: u64) -> Result<[u8; N], RecordFileError> {
        let mut buf = [0u8; N];
        let inner = self.read_lock()?;
        let file = self.file(&inner)?;
        if byte_offset / SLOT_SIZE >= inner.size {
            return Ok(buf);
        }
        read_exact_at(file, &self.path, &mut buf, byte_offset)?;
        Ok(buf)
    }

    fn write_bytes<const N: usize>(
        &self,
        byte_offset: u64,
        bytes: [u8; N],
    ) -> Result<(), RecordFileError> {
        let slot = byte_offset / SLOT_SIZE;
        let mut guard = self.write_lock()?;
        let inner = &mut *guard;
        self.file(inner)?;

        if slot >= inner.size {
            if bytes.iter().all(|&b| b == 0) {
                return Ok(());
            }
            self.grow(inner, slot + 1)?;
        }

        let file = self.file(inner)?;
        write_exact_at(file, &self.path, &bytes, byte_offset)
    }
}

impl RecordFile for DirectRecordFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn size(&self) -> Result<u64, RecordFileError> {
        let inner = self.read_lock()?;
        self.file(&inner)?;
        Ok(inner.size)
    }

    fn set_size(&self, new_size: u64) -> Result<(), RecordFileError> {
        check_size(new_size)?;
        let mut guard = self.write_lock()?;
        let inner = &mut *guard;
        self.file(inner)?;

        if new_size > inner.size {
            self.grow(inner, new_size)
        } else {
            inner.size = new_size;
            Ok(())
        }
    }

    fn get_long(&self, key: u64) -> Result<u64, RecordFileError> {
        let Some(offset) = element_offset(key, SLOT_SIZE) else {
            return Ok(0);
        };
        let bytes = self.read_bytes::<8>(offset)?;
        Ok(self.byte_order.read_u64(bytes))
    }

    fn get_int(&self, key: u64) -> Result<u32, RecordFileError> {
        let Some(offset) = element_offset(key, INT_SIZE) else {
            return Ok(0);
        };
        let bytes = self.read_bytes::<4>(offset)?;
        Ok(self.byte_order.read_u32(bytes))
    }

    fn get_byte(&self, key: u64) -> Result<u8, RecordFileError> {
        let Some(offset) = element_offset(key, 1) else {
            return Ok(0);
        };
        let [byte] = self.read_bytes::<1>(offset)?;
        Ok(byte)
    }

    fn put_long(&self, key: u64, value: u64) -> Result<(), RecordFileError> {
        let Some(offset) = element_offset(key, SLOT_SIZE) else {
            return write_out_of_range(key, SLOT_SIZE, value == 0);
        };
        self.write_bytes(offset, self.byte_order.write_u64(value))
    }

    fn put_int(&self, key: u64, value: u32) -> Result<(), RecordFileError> {
        let Some(offset) = element_offset(key, INT_SIZE) else {
            return write_out_of_range(key, INT_SIZE, value == 0);
        };
        self.write_bytes(offset, self.byte_order.write_u32(value))
    }

    fn put_byte(&self, key: u64, value: u8) -> Result<(), RecordFileError> {
        let Some(offset) = element_offset(key, 1) else {
            return write_out_of_range(key, 1, value == 0);
        };
        self.write_bytes(offset, [value])
    }

    fn force(&self) -> Result<(), RecordFileError> {
        let inner = self.read_lock()?;
        let file = self.file(&inner)?;
        file.sync_all().map_err(|source| RecordFileError::IoAt {
            op: "sync",
            path: self.path.clone(),
            offset: 0,
            source,
        })
    }

    fn clear(&self) -> Result<(), RecordFileError> {
        let mut guard = self.write_lock()?;
        let inner = &mut *guard;
        let file = self.file(inner)?;

        truncate_deferred(file, &self.path, 0);
        file.sync_all()?;
        inner.file_len = file.metadata()?.len();
        inner.size = 0;
        debug!(path = %self.path.display(), "cleared record file");
        Ok(())
    }

    fn close(&self, truncate: bool) -> Result<(), RecordFileError> {
        let mut guard = self.write_lock()?;
        let inner = &mut *guard;

        if let Some(file) = inner.file.take() {
            if truncate {
                truncate_deferred(&file, &self.path, inner.size * SLOT_SIZE);
            }
            file.sync_all()?;
            info!(path = %self.path.display(), size = inner.size, "closed record file");
        }
        Ok(())
    }
}

impl Drop for DirectRecordFile {
    fn drop(&mut self) {
        let open = match self.inner.get_mut() {
            Ok(inner) => inner.file.is_some(),
            Err(_) => false,
        };
        if open {
            if let Err(e) = self.close(true) {
                error!(path = %self.path.display(), error = %e, "failed to close record file on drop");
            }
        }
    }
}

//! Memory-mapped record file.
//!
//! The file is viewed through a vector of fixed 8 MiB regions, each an
//! independent read-write mapping. Region `r` covers bytes
//! `[r * REGION_BYTES, (r + 1) * REGION_BYTES)`. Regions are appended as the
//! file grows and are never remapped individually; [`RecordFile::unmap`]
//! drops them all at once and later accesses map them back on demand.
//!
//! Growth follows a strict order: extend the file, map the new regions,
//! zero-fill the new slots, and only then publish the new size. Writers hold
//! the exclusive side of a [`ShardedLock`] for the whole sequence, so a
//! reader can never observe a size whose bytes are not mapped yet.

use std::fs::File;
use std::path::{Path, PathBuf};

use crossbeam::sync::{ShardedLock, ShardedLockReadGuard, ShardedLockWriteGuard};
use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, error, info, trace};

use super::{
    INT_SIZE, RELEASE_RETRIES, RecordFile, RecordFileError, SLOT_SIZE, check_size, element_offset,
    locate, open_slot_file, pause_for_release, truncate_deferred, write_out_of_range,
};
use crate::config::ByteOrder;

/// Bytes covered by one mapped region.
pub const REGION_BYTES: u64 = 8 * 1024 * 1024;

/// Slots covered by one mapped region.
pub const REGION_SLOTS: u64 = REGION_BYTES / SLOT_SIZE;

/// Initial capacity of the region vector.
const INITIAL_REGION_CAPACITY: usize = 1024;

/// Number of regions needed to hold `size` slots.
#[inline]
fn regions_for(size: u64) -> usize {
    size.div_ceil(REGION_SLOTS) as usize
}

struct MappedInner {
    /// `None` once the file has been closed.
    file: Option<File>,

    /// Mapped regions, in file order.
    regions: Vec<MmapMut>,

    /// Number of valid slots.
    size: u64,
}

/// A [`RecordFile`] accessed through memory-mapped regions.
pub struct MappedRecordFile {
    path: PathBuf,
    byte_order: ByteOrder,
    inner: ShardedLock<MappedInner>,
}

impl std::fmt::Debug for MappedRecordFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRecordFile")
            .field("path", &self.path)
            .field("byte_order", &self.byte_order)
            .finish_non_exhaustive()
    }
}

impl MappedRecordFile {
    /// Opens (or creates) the file at `path` and maps its existing contents.
    pub fn open(path: impl AsRef<Path>, byte_order: ByteOrder) -> Result<Self, RecordFileError> {
        let path = path.as_ref().to_path_buf();
        let (file, size) = open_slot_file(&path)?;

        let mut inner = MappedInner {
            file: Some(file),
            regions: Vec::with_capacity(INITIAL_REGION_CAPACITY.max(regions_for(size))),
            size,
        };
        Self::map_regions(&path, &mut inner, regions_for(size))?;

        Ok(Self {
            path,
            byte_order,
            inner: ShardedLock::new(inner),
        })
    }

    /// Number of regions currently mapped.
    pub fn mapped_regions(&self) -> Result<usize, RecordFileError> {
        Ok(self.read_lock()?.regions.len())
    }

    // --------------------------------------------------------------------------------------------
    // Lock helpers
    // --------------------------------------------------------------------------------------------

    fn read_lock(&self) -> Result<ShardedLockReadGuard<'_, MappedInner>, RecordFileError> {
        self.inner
            .read()
            .map_err(|_| RecordFileError::Internal("ShardedLock poisoned".into()))
    }

    fn write_lock(&self) -> Result<ShardedLockWriteGuard<'_, MappedInner>, RecordFileError> {
        self.inner
            .write()
            .map_err(|_| RecordFileError::Internal("ShardedLock poisoned".into()))
    }

    fn check_open(&self, inner: &MappedInner) -> Result<(), RecordFileError> {
        match inner.file {
            Some(_) => Ok(()),
            None => Err(RecordFileError::Closed(self.path.clone())),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Mapping
    // --------------------------------------------------------------------------------------------

    /// Extends the file to `nr_regions` whole regions and maps the missing
    /// ones.
    fn map_regions(
        path: &Path,
        inner: &mut MappedInner,
        nr_regions: usize,
    ) -> Result<(), RecordFileError> {
        let mapped = inner.regions.len();
        if nr_regions <= mapped {
            return Ok(());
        }

        let file = inner
            .file
            .as_ref()
            .ok_or_else(|| RecordFileError::Closed(path.to_path_buf()))?;

        let current_len = file.metadata()?.len();
        if current_len < mapped as u64 * REGION_BYTES {
            error!(path = %path.display(), current_len, mapped, "file shrank under its mappings");
            return Err(RecordFileError::Internal(format!(
                "file has shrunk: {}",
                path.display()
            )));
        }

        let needed_len = nr_regions as u64 * REGION_BYTES;
        if current_len < needed_len {
            file.set_len(needed_len)
                .map_err(|source| RecordFileError::IoAt {
                    op: "extend",
                    path: path.to_path_buf(),
                    offset: needed_len,
                    source,
                })?;
        }

        inner.regions.reserve(nr_regions - mapped);
        for region in mapped..nr_regions {
            let mmap = Self::map_region(file, path, region as u64)?;
            inner.regions.push(mmap);
        }

        debug!(
            path = %path.display(),
            from = mapped,
            to = nr_regions,
            "mapped regions"
        );
        Ok(())
    }

    /// Maps a single region, retrying with release hints on failure.
    fn map_region(file: &File, path: &Path, region: u64) -> Result<MmapMut, RecordFileError> {
        let mut attempt = 0;
        loop {
            // SAFETY: the mapping covers bytes that exist (the file was just
            // extended past them) and it is only reachable through the
            // enclosing lock. Nothing in this crate shrinks the file while
            // the region is mapped: `clear` and `close` drop every region
            // before truncating.
            let mapped = unsafe {
                MmapOptions::new()
                    .offset(region * REGION_BYTES)
                    .len(REGION_BYTES as usize)
                    .map_mut(file)
            };

            match mapped {
                Ok(mmap) => return Ok(mmap),
                Err(source) if attempt >= RELEASE_RETRIES => {
                    error!(path = %path.display(), region, error = %source, "giving up mapping region");
                    return Err(RecordFileError::Map {
                        path: path.to_path_buf(),
                        region,
                        source,
                    });
                }
                Err(e) => {
                    attempt += 1;
                    trace!(path = %path.display(), region, attempt, error = %e, "map failed, retrying");
                    pause_for_release();
                }
            }
        }
    }

    /// Grows the logical size to `new_size`, mapping and zero-filling first.
    fn grow(path: &Path, inner: &mut MappedInner, new_size: u64) -> Result<(), RecordFileError> {
        let prev_size = inner.size;
        Self::map_regions(path, inner, regions_for(new_size))?;

        let mut start = prev_size * SLOT_SIZE;
        let end = new_size * SLOT_SIZE;
        while start < end {
            let (region, offset) = locate(start, REGION_BYTES);
            let chunk = (end - start).min(REGION_BYTES - offset as u64) as usize;
            let mmap = Self::region_mut(path, inner, region)?;
            mmap[offset..offset + chunk].fill(0);
            start += chunk as u64;
        }

        inner.size = new_size;
        trace!(path = %path.display(), prev_size, new_size, "grew record file");
        Ok(())
    }

    fn region_mut<'a>(
        path: &Path,
        inner: &'a mut MappedInner,
        region: usize,
    ) -> Result<&'a mut MmapMut, RecordFileError> {
        inner.regions.get_mut(region).ok_or_else(|| {
            RecordFileError::Internal(format!(
                "region {region} of {} is not mapped",
                path.display()
            ))
        })
    }

    // --------------------------------------------------------------------------------------------
    // Raw access
    // --------------------------------------------------------------------------------------------

    /// Copies `N` bytes at `byte_offset`, or zeros beyond the logical size.
    fn read_bytes<const N: usize>(&self, byte_offset: u64) -> Result<[u8; N], RecordFileError> {
        let slot = byte_offset / SLOT_SIZE;
        let (region, offset) = locate(byte_offset, REGION_BYTES);
        let mut buf = [0u8; N];

        {
            let inner = self.read_lock()?;
            self.check_open(&inner)?;
            if slot >= inner.size {
                return Ok(buf);
            }
            if let Some(mmap) = inner.regions.get(region) {
                buf.copy_from_slice(&mmap[offset..offset + N]);
                return Ok(buf);
            }
        }

        // The regions were released by `unmap`; map them back.
        let mut guard = self.write_lock()?;
        let inner = &mut *guard;
        self.check_open(inner)?;
        if slot >= inner.size {
            return Ok(buf);
        }
        Self::map_regions(&self.path, inner, regions_for(inner.size))?;
        let mmap = Self::region_mut(&self.path, inner, region)?;
        buf.copy_from_slice(&mmap[offset..offset + N]);
        Ok(buf)
    }

    /// Stores `bytes` at `byte_offset`, growing the file if needed.
    fn write_bytes<const N: usize>(
        &self,
        byte_offset: u64,
        bytes: [u8; N],
    ) -> Result<(), RecordFileError> {
        let slot = byte_offset / SLOT_SIZE;
        let (region, offset) = locate(byte_offset, REGION_BYTES);

        let mut guard = self.write_lock()?;
        let inner = &mut *guard;
        self.check_open(inner)?;

        if slot >= inner.size {
            if bytes.iter().all(|&b| b == 0) {
                return Ok(());
            }
            Self::grow(&self.path, inner, slot + 1)?;
        } else if region >= inner.regions.len() {
            Self::map_regions(&self.path, inner, regions_for(inner.size))?;
        }

        let mmap = Self::region_mut(&self.path, inner, region)?;
        mmap[offset..offset + N].copy_from_slice(&bytes);
        Ok(())
    }
}

impl RecordFile for MappedRecordFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn size(&self) -> Result<u64, RecordFileError> {
        let inner = self.read_lock()?;
        self.check_open(&inner)?;
        Ok(inner.size)
    }

    fn set_size(&self, new_size: u64) -> Result<(), RecordFileError> {
        check_size(new_size)?;
        let mut guard = self.write_lock()?;
        let inner = &mut *guard;
        self.check_open(inner)?;

        if new_size > inner.size {
            Self::grow(&self.path, inner, new_size)
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
        self.check_open(&inner)?;
        for (region, mmap) in inner.regions.iter().enumerate() {
            mmap.flush().map_err(|source| RecordFileError::IoAt {
                op: "flush",
                path: self.path.clone(),
                offset: region as u64 * REGION_BYTES,
                source,
            })?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), RecordFileError> {
        let mut guard = self.write_lock()?;
        let inner = &mut *guard;
        self.check_open(inner)?;

        inner.regions.clear();
        inner.size = 0;
        if let Some(file) = inner.file.as_ref() {
            truncate_deferred(file, &self.path, 0);
            file.sync_all()?;
        }
        debug!(path = %self.path.display(), "cleared record file");
        Ok(())
    }

    fn unmap(&self) -> Result<(), RecordFileError> {
        let mut inner = self.write_lock()?;
        if !inner.regions.is_empty() {
            trace!(path = %self.path.display(), regions = inner.regions.len(), "unmapping");
            inner.regions.clear();
        }
        Ok(())
    }

    fn close(&self, truncate: bool) -> Result<(), RecordFileError> {
        let mut guard = self.write_lock()?;
        let inner = &mut *guard;

        inner.regions.clear();
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

impl Drop for MappedRecordFile {
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

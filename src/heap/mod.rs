//! Heap Files
//!
//! A heap file is an append-only sequence of length-prefixed strings. Each
//! entry is addressed by the absolute byte offset at which it starts; the
//! offset is handed back by [`HeapFile::append`] and is the only way to
//! read the entry again. Entries are never rewritten or reused, and the
//! heap only shrinks as a whole through [`HeapFile::clear`].
//!
//! # On-disk layout
//!
//! ```text
//! [ENTRY_0][ENTRY_1] ... [ENTRY_n]
//!
//! ENTRY := [len: u16 BE][modified UTF-8: len bytes]
//! ```
//!
//! See [`crate::encoding`] for the string codec. Offsets are kept at or
//! below `u32::MAX` so they fit the 32-bit offset field of a hash bucket.
//!
//! # Concurrency model
//!
//! Appends and `clear` take `&mut self`; the owning index serializes them
//! behind its own lock. Reads use positioned I/O and only need `&self`.


use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, trace};

use crate::config::StoreConfig;
use crate::encoding::{self, EncodingError, LEN_PREFIX_SIZE};
use crate::record_file::{self, create_temp_path, remove_with_retries};

/// Largest offset at which an entry may start.
pub const MAX_OFFSET: u64 = u32::MAX as u64;

/// Errors returned by heap file operations.
#[derive(Debug, Error)]
pub enum HeapError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// I/O error annotated with the heap file and offset that failed.
    #[error("{op} failed on {path} at byte {offset}: {source}")]
    IoAt {
        /// Operation being performed.
        op: &'static str,
        /// Heap file being accessed.
        path: PathBuf,
        /// Byte offset of the access.
        offset: u64,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The entry at `offset` extends past the end of the file.
    #[error("short read of {path} at byte {offset}")]
    ShortRead {
        /// Heap file being read.
        path: PathBuf,
        /// Byte offset of the read.
        offset: u64,
    },

    /// String encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The heap has grown past the addressable offset range.
    #[error("heap {path} is full: next offset {offset} exceeds {MAX_OFFSET}")]
    Full {
        /// Heap file.
        path: PathBuf,
        /// Offset the next entry would start at.
        offset: u64,
    },

    /// The heap file was deleted.
    #[error("heap file is closed: {0}")]
    Closed(PathBuf),
}

/// An append-only file of length-prefixed strings.
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,

    /// `None` once the heap has been deleted.
    file: Option<File>,

    /// Offset at which the next entry will be written.
    end: u64,
}

impl HeapFile {
    /// Creates a heap at `path`, discarding any previous contents.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, HeapError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| HeapError::IoAt {
                op: "create",
                path: path.clone(),
                offset: 0,
                source,
            })?;

        info!(path = %path.display(), "created heap file");
        Ok(Self {
            path,
            file: Some(file),
            end: 0,
        })
    }

    /// Creates an empty heap in [`StoreConfig::temp_dir`].
    pub fn create_temp(config: &StoreConfig, prefix: &str) -> Result<Self, HeapError> {
        let path = create_temp_path(config, prefix, ".str")?;
        Self::create(path)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> u64 {
        self.end
    }

    /// Returns `true` if nothing has been appended since creation or the
    /// last [`clear`](Self::clear).
    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    fn file(&self) -> Result<&File, HeapError> {
        self.file
            .as_ref()
            .ok_or_else(|| HeapError::Closed(self.path.clone()))
    }

    /// Appends `s` and returns the offset of its entry.
    ///
    /// Nothing is written if `s` is too long to encode or the heap is full.
    pub fn append(&mut self, s: &str) -> Result<u64, HeapError> {
        let offset = self.end;
        if offset > MAX_OFFSET {
            return Err(HeapError::Full {
                path: self.path.clone(),
                offset,
            });
        }

        let entry = encoding::encode_to_vec(s)?;
        self.file()?
            .write_all_at(&entry, offset)
            .map_err(|source| HeapError::IoAt {
                op: "append",
                path: self.path.clone(),
                offset,
                source,
            })?;

        self.end += entry.len() as u64;
        trace!(path = %self.path.display(), offset, len = entry.len(), "appended heap entry");
        Ok(offset)
    }

    /// Reads the entry starting at `offset`.
    pub fn read(&self, offset: u64) -> Result<String, HeapError> {
        let file = self.file()?;

        let mut prefix = [0u8; LEN_PREFIX_SIZE];
        self.read_exact(file, &mut prefix, offset)?;
        let len = u16::from_be_bytes(prefix) as usize;

        let mut entry = vec![0u8; LEN_PREFIX_SIZE + len];
        entry[..LEN_PREFIX_SIZE].copy_from_slice(&prefix);
        self.read_exact(file, &mut entry[LEN_PREFIX_SIZE..], offset + LEN_PREFIX_SIZE as u64)?;

        let (s, _) = encoding::decode_from_slice::<String>(&entry)?;
        Ok(s)
    }

    fn read_exact(&self, file: &File, buf: &mut [u8], offset: u64) -> Result<(), HeapError> {
        if offset + buf.len() as u64 > self.end {
            return Err(HeapError::ShortRead {
                path: self.path.clone(),
                offset,
            });
        }
        file.read_exact_at(buf, offset).map_err(|source| {
            if source.kind() == io::ErrorKind::UnexpectedEof {
                HeapError::ShortRead {
                    path: self.path.clone(),
                    offset,
                }
            } else {
                HeapError::IoAt {
                    op: "read",
                    path: self.path.clone(),
                    offset,
                    source,
                }
            }
        })
    }

    /// Flushes appended entries to stable storage.
    pub fn force(&self) -> Result<(), HeapError> {
        self.file()?.sync_all()?;
        Ok(())
    }

    /// Discards every entry. Previously returned offsets become invalid.
    pub fn clear(&mut self) -> Result<(), HeapError> {
        let file = self.file()?;
        file.set_len(0).map_err(|source| HeapError::IoAt {
            op: "truncate",
            path: self.path.clone(),
            offset: 0,
            source,
        })?;
        self.end = 0;
        trace!(path = %self.path.display(), "cleared heap file");
        Ok(())
    }

    /// Closes the heap and removes its file. Deleting twice is harmless.
    pub fn delete(&mut self) -> Result<(), HeapError> {
        if self.file.take().is_none() {
            return Ok(());
        }
        remove_with_retries(&self.path, record_file::pause_for_release);
        Ok(())
    }
}

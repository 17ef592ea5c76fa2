//! Storage configuration.
//!
//! Every knob that influences how record files and indexes touch the disk
//! lives in [`StoreConfig`]. The configuration is built once, at subsystem
//! initialization, and passed by reference into every constructor; nothing
//! in this crate reads process-wide state at access time.
//!
//! [`StoreConfig::from_env`] is the bridge for deployments that drive the
//! store through environment variables:
//!
//! | Variable               | Values                                      |
//! |------------------------|---------------------------------------------|
//! | `SLOTSTORE_BYTE_ORDER` | `native`, `big_endian`, `little_endian`     |
//! | `SLOTSTORE_IO_TYPE`    | `mapped`, `explicit` (alias `direct`)       |
//! | `SLOTSTORE_TMPDIR`     | directory for index backing files           |
//!
//! Unrecognized values are configuration faults: they are logged at `warn`
//! and replaced by the default rather than failing startup.

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// Environment variable selecting the on-disk byte order.
pub const ENV_BYTE_ORDER: &str = "SLOTSTORE_BYTE_ORDER";

/// Environment variable selecting the record file I/O strategy.
pub const ENV_IO_TYPE: &str = "SLOTSTORE_IO_TYPE";

/// Environment variable overriding the temporary directory root.
pub const ENV_TMPDIR: &str = "SLOTSTORE_TMPDIR";

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced while parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A byte order name was not recognised.
    #[error("invalid byte order: {0:?}")]
    InvalidByteOrder(String),

    /// An I/O strategy name was not recognised.
    #[error("invalid I/O strategy: {0:?}")]
    InvalidIoStrategy(String),

    /// A structurally invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ------------------------------------------------------------------------------------------------
// Byte order
// ------------------------------------------------------------------------------------------------

/// Byte order used for multi-byte values stored in record files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Whatever the host CPU uses.
    #[default]
    Native,
    /// Most significant byte first.
    BigEndian,
    /// Least significant byte first.
    LittleEndian,
}

impl ByteOrder {
    /// Decodes a `u64` from eight bytes.
    #[inline]
    pub fn read_u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            ByteOrder::Native => u64::from_ne_bytes(bytes),
            ByteOrder::BigEndian => u64::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u64::from_le_bytes(bytes),
        }
    }

    /// Encodes a `u64` into eight bytes.
    #[inline]
    pub fn write_u64(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::Native => value.to_ne_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        }
    }

    /// Decodes a `u32` from four bytes.
    #[inline]
    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Native => u32::from_ne_bytes(bytes),
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
        }
    }

    /// Encodes a `u32` into four bytes.
    #[inline]
    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Native => value.to_ne_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        }
    }

    /// Parses `name`, falling back to [`ByteOrder::Native`] with a warning.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|e: ConfigError| {
            warn!(error = %e, "falling back to native byte order");
            ByteOrder::default()
        })
    }
}

impl FromStr for ByteOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(ByteOrder::Native),
            "big_endian" => Ok(ByteOrder::BigEndian),
            "little_endian" => Ok(ByteOrder::LittleEndian),
            _ => Err(ConfigError::InvalidByteOrder(s.to_string())),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ByteOrder::Native => "native",
            ByteOrder::BigEndian => "big_endian",
            ByteOrder::LittleEndian => "little_endian",
        };
        f.write_str(name)
    }
}

// ------------------------------------------------------------------------------------------------
// I/O strategy
// ------------------------------------------------------------------------------------------------

/// How a record file reaches its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoStrategy {
    /// Memory-mapped 8 MiB regions.
    #[default]
    Mapped,
    /// Positioned `pread`/`pwrite` calls.
    Direct,
}

impl IoStrategy {
    /// Parses `name`, falling back to [`IoStrategy::Mapped`] with a warning.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|e: ConfigError| {
            warn!(error = %e, "falling back to mapped I/O");
            IoStrategy::default()
        })
    }
}

impl FromStr for IoStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mapped" => Ok(IoStrategy::Mapped),
            "explicit" | "direct" => Ok(IoStrategy::Direct),
            _ => Err(ConfigError::InvalidIoStrategy(s.to_string())),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// StoreConfig
// ------------------------------------------------------------------------------------------------

/// Configuration shared by record files and the indexes built on them.
///
/// # Example
///
/// ```rust
/// use slotstore::{IoStrategy, StoreConfig};
///
/// let config = StoreConfig {
///     io_strategy: IoStrategy::Direct,
///     cache_capacity: 0,
///     ..StoreConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Byte order of multi-byte slot values.
    ///
    /// Default: [`ByteOrder::Native`].
    pub byte_order: ByteOrder,

    /// Record file access strategy.
    ///
    /// Default: [`IoStrategy::Mapped`].
    pub io_strategy: IoStrategy,

    /// Directory in which indexes create their backing files.
    ///
    /// Default: [`std::env::temp_dir`].
    pub temp_dir: PathBuf,

    /// Prefix for temporary file names. Must not be empty or contain a
    /// path separator.
    ///
    /// Default: `"slotstore"`.
    pub file_prefix: String,

    /// Capacity of the string index front cache. `0` disables it.
    ///
    /// Default: 100.
    pub cache_capacity: usize,

    /// Hint for the initial number of hash buckets; rounded up to the next
    /// prime of the bucket table. Must be ≥ 1.
    ///
    /// Default: 2000.
    pub initial_buckets: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::default(),
            io_strategy: IoStrategy::default(),
            temp_dir: std::env::temp_dir(),
            file_prefix: "slotstore".to_string(),
            cache_capacity: 100,
            initial_buckets: 2000,
        }
    }
}

impl StoreConfig {
    /// Builds a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Missing keys keep their defaults; invalid values are logged and
    /// replaced by defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_BYTE_ORDER) {
            config.byte_order = ByteOrder::parse_or_default(&value);
        }
        if let Some(value) = lookup(ENV_IO_TYPE) {
            config.io_strategy = IoStrategy::parse_or_default(&value);
        }
        if let Some(value) = lookup(ENV_TMPDIR) {
            if value.trim().is_empty() {
                warn!(var = ENV_TMPDIR, "empty temp dir ignored");
            } else {
                config.temp_dir = PathBuf::from(value);
            }
        }

        config
    }

    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_prefix.is_empty() {
            return Err(ConfigError::Invalid("file_prefix must not be empty".into()));
        }
        if self.file_prefix.contains(std::path::is_separator) {
            return Err(ConfigError::Invalid(
                "file_prefix must not contain a path separator".into(),
            ));
        }
        if self.initial_buckets == 0 {
            return Err(ConfigError::Invalid("initial_buckets must be >= 1".into()));
        }
        Ok(())
    }
}

//! Byte-stable encoding of heap file entries.
//!
//! Strings stored in a [`HeapFile`](crate::heap::HeapFile) use the classic
//! length-prefixed *modified UTF-8* layout:
//!
//! ```text
//! [u16 len BE][modified UTF-8 bytes]
//! ```
//!
//! Modified UTF-8 differs from standard UTF-8 in two places:
//!
//! | Code point                  | Encoding                                      |
//! |-----------------------------|-----------------------------------------------|
//! | `U+0000`                    | `C0 80` (never a raw zero byte)               |
//! | `U+0001`..`U+007F`          | 1 byte                                        |
//! | `U+0080`..`U+07FF`          | 2 bytes                                       |
//! | `U+0800`..`U+FFFF`          | 3 bytes                                       |
//! | `U+10000`..`U+10FFFF`       | surrogate pair, 3 bytes per half (6 total)    |
//!
//! The length prefix counts encoded bytes, so a single entry holds at most
//! [`MAX_ENCODED_LEN`] bytes.
//!
//! # Zero-panic guarantee
//!
//! Decoding never indexes past the buffer: every read is preceded by
//! [`require`], and malformed sequences surface as [`EncodingError`].

#[cfg(test)]
mod tests;

use thiserror::Error;

/// Size of the big-endian length prefix.
pub const LEN_PREFIX_SIZE: usize = std::mem::size_of::<u16>();

/// Maximum number of encoded bytes a single string may occupy.
pub const MAX_ENCODED_LEN: usize = u16::MAX as usize;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during encoding or decoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A byte sequence was not valid modified UTF-8.
    #[error("malformed modified UTF-8 at byte {offset}")]
    Malformed {
        /// Offset of the offending byte within the payload.
        offset: usize,
    },

    /// A string does not fit in the 16-bit length prefix.
    #[error("encoded length {0} exceeds {MAX_ENCODED_LEN} bytes")]
    TooLong(usize),
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` into a byte buffer.
///
/// Implementations must be deterministic: the same value always yields the
/// same bytes.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

/// Deserialize a value from a byte slice.
///
/// Returns `(value, bytes_consumed)`.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

// ------------------------------------------------------------------------------------------------
// Convenience functions
// ------------------------------------------------------------------------------------------------

/// Encode a value into a freshly-allocated `Vec<u8>`.
pub fn encode_to_vec<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode a value from the beginning of `buf`.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    T::decode_from(buf)
}

/// Number of modified UTF-8 bytes `s` encodes to, excluding the prefix.
pub fn encoded_len(s: &str) -> usize {
    s.chars().map(char_len).sum()
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` has at least `needed` bytes.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

#[inline]
fn char_len(c: char) -> usize {
    match c as u32 {
        0x0001..=0x007F => 1,
        0x0000 | 0x0080..=0x07FF => 2,
        0x0800..=0xFFFF => 3,
        _ => 6,
    }
}

#[inline]
fn push_three(buf: &mut Vec<u8>, unit: u32) {
    buf.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
    buf.push(0x80 | ((unit >> 6) & 0x3F) as u8);
    buf.push(0x80 | (unit & 0x3F) as u8);
}

#[inline]
fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Reads one 3-byte unit at `pos`, returning the 16-bit code unit.
fn read_three(payload: &[u8], pos: usize) -> Result<u32, EncodingError> {
    let tail = payload
        .get(pos..pos + 3)
        .ok_or(EncodingError::Malformed { offset: pos })?;
    if tail[0] & 0xF0 != 0xE0 || !is_continuation(tail[1]) || !is_continuation(tail[2]) {
        return Err(EncodingError::Malformed { offset: pos });
    }
    Ok((u32::from(tail[0] & 0x0F) << 12)
        | (u32::from(tail[1] & 0x3F) << 6)
        | u32::from(tail[2] & 0x3F))
}

// ------------------------------------------------------------------------------------------------
// u16: 2 bytes, big-endian
// ------------------------------------------------------------------------------------------------

impl Encode for u16 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl Decode for u16 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, LEN_PREFIX_SIZE)?;
        Ok((u16::from_be_bytes([buf[0], buf[1]]), LEN_PREFIX_SIZE))
    }
}

// ------------------------------------------------------------------------------------------------
// Strings: [u16 len BE][modified UTF-8]
// ------------------------------------------------------------------------------------------------

impl Encode for str {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let len = encoded_len(self);
        let prefix = u16::try_from(len).map_err(|_| EncodingError::TooLong(len))?;
        buf.reserve(LEN_PREFIX_SIZE + len);
        prefix.encode_to(buf)?;

        for c in self.chars() {
            let cp = c as u32;
            match cp {
                0x0001..=0x007F => buf.push(cp as u8),
                0x0000 | 0x0080..=0x07FF => {
                    buf.push(0xC0 | ((cp >> 6) & 0x1F) as u8);
                    buf.push(0x80 | (cp & 0x3F) as u8);
                }
                0x0800..=0xFFFF => push_three(buf, cp),
                _ => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        push_three(buf, u32::from(*unit));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Encode for String {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.as_str().encode_to(buf)
    }
}

impl Decode for String {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (len, offset) = u16::decode_from(buf)?;
        let len = len as usize;
        require(&buf[offset..], len)?;
        let payload = &buf[offset..offset + len];

        let mut out = String::with_capacity(len);
        let mut pos = 0;
        while pos < len {
            let b = payload[pos];
            if b & 0x80 == 0 {
                out.push(char::from(b));
                pos += 1;
            } else if b & 0xE0 == 0xC0 {
                let b2 = *payload
                    .get(pos + 1)
                    .ok_or(EncodingError::Malformed { offset: pos })?;
                if !is_continuation(b2) {
                    return Err(EncodingError::Malformed { offset: pos + 1 });
                }
                let cp = (u32::from(b & 0x1F) << 6) | u32::from(b2 & 0x3F);
                let c = char::from_u32(cp).ok_or(EncodingError::Malformed { offset: pos })?;
                out.push(c);
                pos += 2;
            } else if b & 0xF0 == 0xE0 {
                let unit = read_three(payload, pos)?;
                match unit {
                    0xD800..=0xDBFF => {
                        let low = read_three(payload, pos + 3)?;
                        if !(0xDC00..=0xDFFF).contains(&low) {
                            return Err(EncodingError::Malformed { offset: pos + 3 });
                        }
                        let cp = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                        let c =
                            char::from_u32(cp).ok_or(EncodingError::Malformed { offset: pos })?;
                        out.push(c);
                        pos += 6;
                    }
                    0xDC00..=0xDFFF => return Err(EncodingError::Malformed { offset: pos }),
                    _ => {
                        let c = char::from_u32(unit)
                            .ok_or(EncodingError::Malformed { offset: pos })?;
                        out.push(c);
                        pos += 3;
                    }
                }
            } else {
                return Err(EncodingError::Malformed { offset: pos });
            }
        }

        Ok((out, offset + len))
    }
}

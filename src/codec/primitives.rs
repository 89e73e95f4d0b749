// Byte Codec Primitives
// Fixed-width integer and boolean encode/decode over byte slices, bounds-checked

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Widest integer the primitives handle, in bytes
pub const MAX_WIDTH: usize = 8;

/// Errors from encoding values into fixed-width fields
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Width {0} is outside 1..=8 bytes")]
    WidthOutOfRange(usize),

    #[error("Value {value} does not fit in {width} byte(s)")]
    ValueTooLarge { value: u64, width: usize },
}

/// Byte order for multi-byte fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

fn check_width(width: usize) -> Result<(), CodecError> {
    if width == 0 || width > MAX_WIDTH {
        return Err(CodecError::WidthOutOfRange(width));
    }
    Ok(())
}

/// Largest unsigned value representable in `width` bytes
pub fn max_uint(width: usize) -> Result<u64, CodecError> {
    check_width(width)?;
    if width == MAX_WIDTH {
        Ok(u64::MAX)
    } else {
        Ok((1u64 << (width * 8)) - 1)
    }
}

/// Read an unsigned integer of `width` bytes at `offset`.
///
/// Returns `None` when the slice is too short or the width is unsupported.
pub fn read_uint(bytes: &[u8], offset: usize, width: usize, endian: Endian) -> Option<u64> {
    if width == 0 || width > MAX_WIDTH {
        return None;
    }
    let end = offset.checked_add(width)?;
    let field = bytes.get(offset..end)?;

    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    let value = match endian {
        Endian::Big => field.iter().fold(0u64, fold),
        Endian::Little => field.iter().rev().fold(0u64, fold),
    };
    Some(value)
}

/// Read a two's-complement signed integer of `width` bytes at `offset`
pub fn read_int(bytes: &[u8], offset: usize, width: usize, endian: Endian) -> Option<i64> {
    let raw = read_uint(bytes, offset, width, endian)?;
    let shift = 64 - (width as u32 * 8);
    Some(((raw << shift) as i64) >> shift)
}

/// Read a boolean byte (any non-zero value is `true`)
pub fn read_bool(bytes: &[u8], offset: usize) -> Option<bool> {
    bytes.get(offset).map(|b| *b != 0)
}

/// Encode an unsigned integer into exactly `width` bytes
pub fn write_uint(value: u64, width: usize, endian: Endian) -> Result<Vec<u8>, CodecError> {
    if value > max_uint(width)? {
        return Err(CodecError::ValueTooLarge { value, width });
    }

    let be = value.to_be_bytes();
    let mut field = be[MAX_WIDTH - width..].to_vec();
    if endian == Endian::Little {
        field.reverse();
    }
    Ok(field)
}

/// Encode a signed integer into exactly `width` bytes (two's complement)
pub fn write_int(value: i64, width: usize, endian: Endian) -> Result<Vec<u8>, CodecError> {
    check_width(width)?;
    let bits = width as u32 * 8;
    if bits < 64 {
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << (bits - 1)) - 1;
        if value < min || value > max {
            return Err(CodecError::ValueTooLarge {
                value: value.unsigned_abs(),
                width,
            });
        }
    }
    let mask = max_uint(width)?;
    write_uint((value as u64) & mask, width, endian)
}

// ============================================================================
// CURSORS
// ============================================================================

/// Sequential, bounds-checked reader over a byte slice.
///
/// Every accessor returns `None` instead of panicking when the slice runs
/// out, and leaves the cursor untouched on failure.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn uint(&mut self, width: usize, endian: Endian) -> Option<u64> {
        let value = read_uint(self.bytes, self.position, width, endian)?;
        self.position += width;
        Some(value)
    }

    pub fn int(&mut self, width: usize, endian: Endian) -> Option<i64> {
        let value = read_int(self.bytes, self.position, width, endian)?;
        self.position += width;
        Some(value)
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.uint(1, Endian::Big).map(|v| v as u8)
    }

    pub fn u16(&mut self, endian: Endian) -> Option<u16> {
        self.uint(2, endian).map(|v| v as u16)
    }

    pub fn u32(&mut self, endian: Endian) -> Option<u32> {
        self.uint(4, endian).map(|v| v as u32)
    }

    pub fn i8(&mut self) -> Option<i8> {
        self.int(1, Endian::Big).map(|v| v as i8)
    }

    pub fn i16(&mut self, endian: Endian) -> Option<i16> {
        self.int(2, endian).map(|v| v as i16)
    }

    pub fn i32(&mut self, endian: Endian) -> Option<i32> {
        self.int(4, endian).map(|v| v as i32)
    }

    pub fn bool(&mut self) -> Option<bool> {
        let value = read_bool(self.bytes, self.position)?;
        self.position += 1;
        Some(value)
    }

    /// Take exactly `len` bytes
    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(len)?;
        let slice = self.bytes.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    /// Take everything that is left
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = self.bytes.get(self.position..).unwrap_or_default();
        self.position = self.bytes.len();
        slice
    }
}

/// Growable writer producing an owned frame
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: BytesMut,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn uint(&mut self, value: u64, width: usize, endian: Endian) -> Result<&mut Self, CodecError> {
        self.buf.put_slice(&write_uint(value, width, endian)?);
        Ok(self)
    }

    pub fn int(&mut self, value: i64, width: usize, endian: Endian) -> Result<&mut Self, CodecError> {
        self.buf.put_slice(&write_int(value, width, endian)?);
        Ok(self)
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn u16(&mut self, value: u16, endian: Endian) -> &mut Self {
        match endian {
            Endian::Big => self.buf.put_u16(value),
            Endian::Little => self.buf.put_u16_le(value),
        }
        self
    }

    pub fn u32(&mut self, value: u32, endian: Endian) -> &mut Self {
        match endian {
            Endian::Big => self.buf.put_u32(value),
            Endian::Little => self.buf.put_u32_le(value),
        }
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

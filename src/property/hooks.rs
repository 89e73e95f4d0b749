// Property Hooks
// Encode/decode hooks turning typed values into payload bytes and back

use crate::codec::{read_bool, read_int, read_uint, write_int, write_uint, CodecError, Endian};
use bytes::Bytes;

/// Turns a typed request input into payload bytes
pub trait Encode: Send + Sync {
    type Input: ?Sized;

    fn encode(&self, input: &Self::Input) -> Result<Bytes, CodecError>;
}

/// Turns payload bytes into a typed value.
///
/// Malformed or short payloads decode to `None`; decoding never fails
/// any other way.
pub trait Decode: Send + Sync {
    type Output: Clone + Send + Sync + 'static;

    fn decode(&self, payload: &[u8]) -> Option<Self::Output>;
}

/// Pass-through bytes in both directions
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl Encode for Raw {
    type Input = [u8];

    fn encode(&self, input: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(input))
    }
}

impl Decode for Raw {
    type Output = Bytes;

    fn decode(&self, payload: &[u8]) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(payload))
    }
}

/// One-byte boolean; any non-zero byte reads as true
#[derive(Debug, Clone, Copy, Default)]
pub struct Flag;

impl Encode for Flag {
    type Input = bool;

    fn encode(&self, input: &bool) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(vec![u8::from(*input)]))
    }
}

impl Decode for Flag {
    type Output = bool;

    fn decode(&self, payload: &[u8]) -> Option<bool> {
        read_bool(payload, 0)
    }
}

/// Fixed-width unsigned integer, little-endian unless stated otherwise
#[derive(Debug, Clone, Copy)]
pub struct Uint {
    pub width: usize,
    pub endian: Endian,
}

impl Uint {
    pub fn new(width: usize, endian: Endian) -> Self {
        Self { width, endian }
    }

    pub fn le(width: usize) -> Self {
        Self::new(width, Endian::Little)
    }

    pub fn be(width: usize) -> Self {
        Self::new(width, Endian::Big)
    }
}

impl Encode for Uint {
    type Input = u64;

    fn encode(&self, input: &u64) -> Result<Bytes, CodecError> {
        write_uint(*input, self.width, self.endian).map(Bytes::from)
    }
}

impl Decode for Uint {
    type Output = u64;

    fn decode(&self, payload: &[u8]) -> Option<u64> {
        read_uint(payload, 0, self.width, self.endian)
    }
}

/// Fixed-width two's-complement integer
#[derive(Debug, Clone, Copy)]
pub struct Int {
    pub width: usize,
    pub endian: Endian,
}

impl Int {
    pub fn new(width: usize, endian: Endian) -> Self {
        Self { width, endian }
    }

    pub fn le(width: usize) -> Self {
        Self::new(width, Endian::Little)
    }
}

impl Encode for Int {
    type Input = i64;

    fn encode(&self, input: &i64) -> Result<Bytes, CodecError> {
        write_int(*input, self.width, self.endian).map(Bytes::from)
    }
}

impl Decode for Int {
    type Output = i64;

    fn decode(&self, payload: &[u8]) -> Option<i64> {
        read_int(payload, 0, self.width, self.endian)
    }
}

/// UTF-8 text; invalid sequences decode to `None`
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl Encode for Utf8 {
    type Input = str;

    fn encode(&self, input: &str) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(input.as_bytes()))
    }
}

impl Decode for Utf8 {
    type Output = String;

    fn decode(&self, payload: &[u8]) -> Option<String> {
        std::str::from_utf8(payload).ok().map(str::to_string)
    }
}

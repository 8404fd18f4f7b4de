//! Cursor-style, byte-order-aware view over a [`RangeReader`].
//!
//! Header parsers read fixed and semi-fixed layouts field by field. A
//! `ByteSource` owns its cursor, so every parser (and every sniffer) works
//! on a private position and can never disturb another caller's reads.
//!
//! ```text
//!   RangeReader (offset, len)  ──►  ByteSource { pos, order }
//!                                      seek / skip / read_u16 / read_f32 / ...
//! ```

use bytes::Bytes;
use serde::Serialize;

use super::range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, RangeReader,
};
use crate::error::IoError;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the host.
    #[inline]
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }

    #[inline]
    pub const fn from_little_endian(little: bool) -> Self {
        if little {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }

    #[inline]
    pub const fn is_little_endian(self) -> bool {
        matches!(self, ByteOrder::LittleEndian)
    }

    /// The other byte order.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            ByteOrder::LittleEndian => ByteOrder::BigEndian,
            ByteOrder::BigEndian => ByteOrder::LittleEndian,
        }
    }

    /// Read a u16 from a byte slice using this byte order.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => read_u16_le(bytes),
            ByteOrder::BigEndian => read_u16_be(bytes),
        }
    }

    /// Read a u32 from a byte slice using this byte order.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => read_u32_le(bytes),
            ByteOrder::BigEndian => read_u32_be(bytes),
        }
    }

    /// Read a u64 from a byte slice using this byte order.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => read_u64_le(bytes),
            ByteOrder::BigEndian => read_u64_be(bytes),
        }
    }

    /// Write a u16 into the first two bytes of `out`.
    #[inline]
    pub fn write_u16(self, out: &mut [u8], value: u16) {
        let bytes = match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        };
        out[..2].copy_from_slice(&bytes);
    }
}

// =============================================================================
// ByteSource
// =============================================================================

/// Seekable reader with a private cursor and a fixed byte order.
pub struct ByteSource<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    pos: u64,
    order: ByteOrder,
}

impl<'a, R: RangeReader + ?Sized> ByteSource<'a, R> {
    /// Create a source positioned at offset 0.
    pub fn new(reader: &'a R, order: ByteOrder) -> Self {
        Self {
            reader,
            pos: 0,
            order,
        }
    }

    #[inline]
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Change the byte order used by subsequent scalar reads.
    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.reader.size()
    }

    /// Bytes left between the cursor and the end of the source.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.length().saturating_sub(self.pos)
    }

    pub fn identifier(&self) -> &str {
        self.reader.identifier()
    }

    pub fn seek(&mut self, offset: u64) {
        self.pos = offset;
    }

    pub fn skip(&mut self, count: u64) {
        self.pos = self.pos.saturating_add(count);
    }

    /// Run `f` and restore the cursor afterwards, whatever it returns.
    pub fn probe<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.pos;
        let result = f(self);
        self.pos = saved;
        result
    }

    /// Read `len` bytes at the cursor and advance.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, IoError> {
        let bytes = self.reader.read_exact_at(self.pos, len)?;
        self.pos += len as u64;
        Ok(bytes)
    }

    /// Read `len` bytes at an absolute offset without moving the cursor.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.reader.read_exact_at(offset, len)
    }

    pub fn read_u8(&mut self) -> Result<u8, IoError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, IoError> {
        let b = self.read_bytes(2)?;
        Ok(self.order.read_u16(&b))
    }

    pub fn read_i16(&mut self) -> Result<i16, IoError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, IoError> {
        let b = self.read_bytes(4)?;
        Ok(self.order.read_u32(&b))
    }

    pub fn read_i32(&mut self) -> Result<i32, IoError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, IoError> {
        let b = self.read_bytes(8)?;
        Ok(self.order.read_u64(&b))
    }

    pub fn read_i64(&mut self) -> Result<i64, IoError> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, IoError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, IoError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a fixed-width text field, dropping NUL padding and surrounding
    /// whitespace.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String, IoError> {
        let bytes = self.read_bytes(len)?;
        Ok(trim_text(&bytes))
    }

    /// Read a NUL-terminated string from a field of at most `max` bytes.
    ///
    /// The cursor ends just past the terminator, or after `max` bytes when
    /// no terminator was found.
    pub fn read_c_string(&mut self, max: usize) -> Result<String, IoError> {
        let available = std::cmp::min(max as u64, self.remaining()) as usize;
        let bytes = self.reader.read_exact_at(self.pos, available)?;
        let end = bytes.iter().position(|&b| b == 0);
        let text = String::from_utf8_lossy(&bytes[..end.unwrap_or(bytes.len())]).into_owned();
        self.pos += match end {
            Some(n) => n as u64 + 1,
            None => available as u64,
        };
        Ok(text)
    }
}

/// Decode a fixed-width text field: stop at the first NUL, then trim.
pub fn trim_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

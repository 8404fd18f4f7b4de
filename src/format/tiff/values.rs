//! TIFF tag value reading.
//!
//! Values are stored either inline in the IFD entry or at an offset in the
//! file. Arrays (strip offsets, byte counts) are fetched in one read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::{ByteOrder, RangeReader};

use super::parser::{Ifd, IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values respecting the file's byte order and offset width.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched from the file.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header);
            Ok(self.reader.read_exact_at(offset, size as usize)?)
        }
    }

    /// A single integer value (Byte, Short, Long or Long8).
    pub fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        self.read_u64_array(entry)?
            .first()
            .copied()
            .ok_or(TiffError::InvalidTagValue {
                tag: "unknown",
                message: "empty value".to_string(),
            })
    }

    /// Integer array, widened to u64.
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry)?;
        let order = self.header.byte_order;
        let values = match field_type {
            FieldType::Byte | FieldType::Undefined => bytes.iter().map(|&b| b as u64).collect(),
            FieldType::Short => bytes
                .chunks_exact(2)
                .map(|c| order.read_u16(c) as u64)
                .collect(),
            FieldType::Long => bytes
                .chunks_exact(4)
                .map(|c| order.read_u32(c) as u64)
                .collect(),
            FieldType::Long8 => bytes.chunks_exact(8).map(|c| order.read_u64(c)).collect(),
            other => {
                return Err(TiffError::InvalidTagValue {
                    tag: "unknown",
                    message: format!("expected an integer type, got {:?}", other),
                })
            }
        };
        Ok(values)
    }

    /// First Rational of an entry as a float. A zero denominator gives `None`.
    pub fn read_rational(&self, entry: &IfdEntry) -> Result<Option<f64>, TiffError> {
        if entry.field_type != Some(FieldType::Rational) {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Rational, got type {}", entry.field_type_raw),
            });
        }
        let bytes = self.read_bytes(entry)?;
        if bytes.len() < 8 {
            return Ok(None);
        }
        let order = self.header.byte_order;
        let num = order.read_u32(&bytes[0..4]) as f64;
        let den = order.read_u32(&bytes[4..8]) as f64;
        Ok((den != 0.0).then(|| num / den))
    }

    /// NUL-terminated ASCII string, terminator stripped.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Ascii, got type {}", entry.field_type_raw),
            });
        }
        let bytes = self.read_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    // -------------------------------------------------------------------------
    // Tag lookups on an IFD
    // -------------------------------------------------------------------------

    /// Integer value of `tag`, or `None` when the tag is absent.
    pub fn tag_u64(&self, ifd: &Ifd, tag: TiffTag) -> Result<Option<u64>, TiffError> {
        ifd.get_entry_by_tag(tag)
            .map(|entry| self.read_u64(entry))
            .transpose()
    }

    pub fn tag_u64_array(&self, ifd: &Ifd, tag: TiffTag) -> Result<Option<Vec<u64>>, TiffError> {
        ifd.get_entry_by_tag(tag)
            .map(|entry| self.read_u64_array(entry))
            .transpose()
    }

    pub fn tag_string(&self, ifd: &Ifd, tag: TiffTag) -> Result<Option<String>, TiffError> {
        ifd.get_entry_by_tag(tag)
            .map(|entry| self.read_string(entry))
            .transpose()
    }

    pub fn tag_bytes(&self, ifd: &Ifd, tag: TiffTag) -> Result<Option<Bytes>, TiffError> {
        ifd.get_entry_by_tag(tag)
            .map(|entry| self.read_bytes(entry))
            .transpose()
    }

    pub fn tag_rational(&self, ifd: &Ifd, tag: TiffTag) -> Result<Option<f64>, TiffError> {
        Ok(match ifd.get_entry_by_tag(tag) {
            Some(entry) => self.read_rational(entry)?,
            None => None,
        })
    }

    /// A required integer tag.
    pub fn require_u64(&self, ifd: &Ifd, tag: TiffTag, name: &'static str) -> Result<u64, TiffError> {
        self.tag_u64(ifd, tag)?.ok_or(TiffError::MissingTag(name))
    }
}

// =============================================================================
// Tests
// =============================================================================

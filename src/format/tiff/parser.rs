//! TIFF header and IFD chain parsing.
//!
//! # TIFF Header Structure
//!
//! ## Classic TIFF (8 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first IFD (4 bytes)
//! ```
//!
//! ## BigTIFF (16 bytes)
//! ```text
//! Bytes 0-1: Byte order
//! Bytes 2-3: Version (43 = 0x002B)
//! Bytes 4-5: Offset byte size (must be 8)
//! Bytes 6-7: Reserved
//! Bytes 8-15: Offset to first IFD (8 bytes)
//! ```
//!
//! ## IFD
//! ```text
//! entry count        u16 (u64 in BigTIFF)
//! entries            12 bytes each (20 in BigTIFF)
//!   tag u16, type u16, count u32/u64, value-or-offset 4/8 bytes
//! next IFD offset    u32 (u64 in BigTIFF), 0 ends the chain
//! ```

use std::collections::HashSet;

use tracing::debug;

use super::tags::{FieldType, TiffTag};
use crate::error::TiffError;
use crate::io::{ByteOrder, RangeReader};

// =============================================================================
// Constants
// =============================================================================

const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;
const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of BigTIFF header in bytes
pub const BIGTIFF_HEADER_SIZE: usize = 16;

/// Longest IFD chain followed before giving up.
pub const MAX_IFDS: usize = 4096;

/// Largest entry count accepted in one IFD.
const MAX_IFD_ENTRIES: u64 = 4096;

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from raw bytes.
    ///
    /// `bytes` should hold at least 16 bytes so BigTIFF headers can be read;
    /// `file_size` bounds the first IFD offset.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        let (is_bigtiff, first_ifd_offset) = match version {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            _ => return Err(TiffError::InvalidVersion(version)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Size of an IFD entry: 12 bytes, or 20 in BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry count field at the start of an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of the next-IFD offset, and of an entry's value/offset field.
    #[inline]
    pub const fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u32(bytes) as u64
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One tag entry of an IFD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag_id: u16,
    /// Decoded field type, `None` when the type code is unknown
    pub field_type: Option<FieldType>,
    pub field_type_raw: u16,
    pub count: u64,
    /// Raw value/offset field (4 or 8 significant bytes)
    pub value_offset_bytes: [u8; 8],
    /// Whether the value is stored in `value_offset_bytes`
    pub is_inline: bool,
}

impl IfdEntry {
    fn parse(bytes: &[u8], header: &TiffHeader) -> Self {
        let order = header.byte_order;
        let tag_id = order.read_u16(&bytes[0..2]);
        let field_type_raw = order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);
        let (count, value_start) = if header.is_bigtiff {
            (order.read_u64(&bytes[4..12]), 12)
        } else {
            (order.read_u32(&bytes[4..8]) as u64, 8)
        };

        let mut value_offset_bytes = [0u8; 8];
        let width = header.offset_size();
        value_offset_bytes[..width].copy_from_slice(&bytes[value_start..value_start + width]);

        let is_inline = field_type
            .map(|ft| ft.fits_inline(count, header.is_bigtiff))
            .unwrap_or(false);

        IfdEntry {
            tag_id,
            field_type,
            field_type_raw,
            count,
            value_offset_bytes,
            is_inline,
        }
    }

    /// Total size of the value in bytes, if the field type is known.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| ft.size_in_bytes() as u64 * self.count)
    }

    /// Offset of an out-of-line value.
    pub fn value_offset(&self, header: &TiffHeader) -> u64 {
        header.read_offset(&self.value_offset_bytes)
    }

    /// The single inline value as u64 (Short, Long or Long8, count 1).
    pub fn inline_u64(&self, order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Byte | FieldType::Undefined => Some(self.value_offset_bytes[0] as u64),
            FieldType::Short => Some(order.read_u16(&self.value_offset_bytes) as u64),
            FieldType::Long => Some(order.read_u32(&self.value_offset_bytes) as u64),
            FieldType::Long8 => Some(order.read_u64(&self.value_offset_bytes)),
            _ => None,
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// One Image File Directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    /// File offset this IFD was read from
    pub offset: u64,
    pub entries: Vec<IfdEntry>,
    /// Offset of the next IFD, 0 at the end of the chain
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Bytes occupied by an IFD with `entry_count` entries, excluding the
    /// count field.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> u64 {
        entry_count * header.ifd_entry_size() as u64 + header.offset_size() as u64
    }

    /// Parse the entries and next offset that follow the count field.
    pub fn parse(
        offset: u64,
        entry_count: u64,
        bytes: &[u8],
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let needed = Self::calculate_size(entry_count, header) as usize;
        if bytes.len() < needed {
            return Err(TiffError::FileTooSmall {
                required: needed as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_size = header.ifd_entry_size();
        let entries = bytes[..entry_count as usize * entry_size]
            .chunks_exact(entry_size)
            .map(|chunk| IfdEntry::parse(chunk, header))
            .collect();
        let next_ifd_offset = header.read_offset(&bytes[entry_count as usize * entry_size..]);

        Ok(Ifd {
            offset,
            entries,
            next_ifd_offset,
        })
    }

    pub fn get_entry(&self, tag_id: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag_id == tag_id)
    }

    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.get_entry(tag.as_u16())
    }

    pub fn has_tag(&self, tag: TiffTag) -> bool {
        self.get_entry_by_tag(tag).is_some()
    }
}

// =============================================================================
// TiffContainer
// =============================================================================

/// Header plus the full IFD chain of a TIFF file.
#[derive(Debug, Clone)]
pub struct TiffContainer {
    pub header: TiffHeader,
    pub ifds: Vec<Ifd>,
}

impl TiffContainer {
    /// Read the header and follow the IFD chain.
    ///
    /// The chain stops at a zero next offset, a loop, or [`MAX_IFDS`].
    pub fn open<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        let size = reader.size();
        let header = Self::read_header(reader)?;

        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if offset >= size || !seen.insert(offset) {
                if ifds.is_empty() {
                    return Err(TiffError::InvalidIfdOffset(offset));
                }
                debug!(offset, "IFD chain ends at invalid or repeated offset");
                break;
            }

            let ifd = Self::read_ifd(reader, &header, offset)?;
            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(TiffContainer { header, ifds })
    }

    /// Read the IFD at `offset`.
    pub fn read_ifd<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<Ifd, TiffError> {
        let count_size = header.ifd_count_size();
        let count_bytes = reader.read_exact_at(offset, count_size)?;
        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };
        if entry_count > MAX_IFD_ENTRIES {
            return Err(TiffError::InvalidTagValue {
                tag: "IFD",
                message: format!("{} entries at offset {}", entry_count, offset),
            });
        }

        let body_len = Ifd::calculate_size(entry_count, header) as usize;
        let body = reader.read_exact_at(offset + count_size as u64, body_len)?;
        Ifd::parse(offset, entry_count, &body, header)
    }

    /// Read the header and the first IFD only.
    pub fn open_first<R: RangeReader + ?Sized>(reader: &R) -> Result<(TiffHeader, Ifd), TiffError> {
        let header = Self::read_header(reader)?;
        if header.first_ifd_offset >= reader.size() {
            return Err(TiffError::InvalidIfdOffset(header.first_ifd_offset));
        }
        let ifd = Self::read_ifd(reader, &header, header.first_ifd_offset)?;
        Ok((header, ifd))
    }

    /// Read and parse the header alone.
    pub fn read_header<R: RangeReader + ?Sized>(reader: &R) -> Result<TiffHeader, TiffError> {
        let size = reader.size();
        if size < TIFF_HEADER_SIZE as u64 {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: size,
            });
        }
        let len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let bytes = reader.read_exact_at(0, len)?;
        TiffHeader::parse(&bytes, size)
    }

    pub fn first_ifd(&self) -> Option<&Ifd> {
        self.ifds.first()
    }
}

// =============================================================================
// Tests
// =============================================================================

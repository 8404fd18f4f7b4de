//! ARF: fixed header with a self-describing byte order.
//!
//! ```text
//! 0   2  endian pair: 01 00 little-endian, 00 01 big-endian
//! 2   2  "AR"
//! 4   2  version (1 or 2)
//! 6   2  width
//! 8   2  height
//! 10  2  bits per pixel
//! 12  2  image count (version 2 only)
//! 524    pixel data, planes back to back
//! ```

use tracing::debug;

use super::{require_span, FormatDescriptor, ParsedFormat, PixelType, SeriesLayout};
use crate::codec::PlaneCodec;
use crate::error::FormatError;
use crate::io::{ByteOrder, ByteSource, RangeReader};

pub const NAME: &str = "ARF";

const MAGIC: &[u8; 2] = b"AR";
const PIXELS_OFFSET: u64 = 524;

/// Byte order declared by a 2-byte endian pair, if it is one.
pub fn endian_from_pair(pair: [u8; 2]) -> Option<ByteOrder> {
    match pair {
        [0x01, 0x00] => Some(ByteOrder::LittleEndian),
        [0x00, 0x01] => Some(ByteOrder::BigEndian),
        _ => None,
    }
}

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    if reader.size() < 4 {
        return false;
    }
    match reader.read_exact_at(0, 4) {
        Ok(head) => endian_from_pair([head[0], head[1]]).is_some() && &head[2..4] == MAGIC,
        Err(_) => false,
    }
}

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let head = reader.read_exact_at(0, 4)?;
    let order = endian_from_pair([head[0], head[1]])
        .ok_or_else(|| FormatError::malformed(NAME, 0, "invalid endian pair"))?;

    let mut src = ByteSource::new(reader, order);
    src.seek(4);
    let version = src.read_u16()?;
    let width = src.read_u16()? as u32;
    let height = src.read_u16()? as u32;
    let bits = src.read_u16()? as u32;
    let image_count = match version {
        1 => 1,
        2 => src.read_u16()? as u32,
        other => {
            return Err(FormatError::malformed(
                NAME,
                4,
                format!("unknown version {}", other),
            ))
        }
    };

    let pixel_type = match bits {
        1..=8 => PixelType::Uint8,
        9..=16 => PixelType::Uint16,
        _ => {
            return Err(FormatError::malformed(
                NAME,
                10,
                format!("unsupported bit depth {}", bits),
            ))
        }
    };

    let mut desc = FormatDescriptor::new(width, height, pixel_type);
    desc.size_t = image_count;
    desc.bits_per_pixel = bits;
    desc.little_endian = order.is_little_endian();
    desc.dimension_order = super::DimensionOrder::XYCZT;

    require_span(NAME, PIXELS_OFFSET, desc.stored_plane_size(), reader.size())?;
    debug!(version, width, height, bits, image_count, ?order, "ARF header parsed");

    let layout = SeriesLayout::contiguous(PIXELS_OFFSET, &desc);
    let mut parsed = ParsedFormat::single(desc, layout, PlaneCodec::Direct, NAME);
    parsed.metadata.set("Version", version as i64);
    parsed.metadata.set("Width", width);
    parsed.metadata.set("Height", height);
    parsed.metadata.set("Bits per pixel", bits);
    parsed.metadata.set("Image count", image_count);
    parsed.finish(NAME)
}

//! Deltavision (MRC-derived) stacks.
//!
//! A 1024-byte header, an optional extended header, then planes back to
//! back. The byte order is inferred from a sentinel pair at offset 96.

use tracing::{debug, warn};

use super::{
    metadata::Calibration, require_span, Axis, DimensionOrder, FormatDescriptor, ParsedFormat,
    PixelType, SeriesLayout,
};
use crate::codec::PlaneCodec;
use crate::error::FormatError;
use crate::io::{ByteOrder, ByteSource, RangeReader};

pub const NAME: &str = "Deltavision";

const HEADER_SIZE: u64 = 1024;
const SENTINEL_OFFSET: u64 = 96;
/// The sentinel read as a little-endian i16 when the file is little-endian.
const LITTLE_ENDIAN_SENTINEL: i16 = -16224;

/// Byte order from the sentinel pair, `None` when the pair is neither
/// `A0 C0` nor `C0 A0`.
fn sentinel_order(pair: [u8; 2]) -> Option<ByteOrder> {
    match pair {
        [0xA0, 0xC0] | [0xC0, 0xA0] => {
            if i16::from_le_bytes(pair) == LITTLE_ENDIAN_SENTINEL {
                Some(ByteOrder::LittleEndian)
            } else {
                Some(ByteOrder::BigEndian)
            }
        }
        _ => None,
    }
}

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    if reader.size() < HEADER_SIZE {
        return false;
    }
    let Ok(head) = reader.read_exact_at(0, 98) else {
        return false;
    };
    let Some(order) = sentinel_order([head[96], head[97]]) else {
        return false;
    };
    let field = |at: usize| order.read_u32(&head[at..at + 4]) as i32;
    field(0) > 0 && field(4) > 0 && field(8) > 0
}

fn pixel_type(code: i32) -> Result<PixelType, FormatError> {
    match code {
        0 => Ok(PixelType::Uint8),
        1 => Ok(PixelType::Int16),
        2 | 4 => Ok(PixelType::Float32),
        6 => Ok(PixelType::Uint16),
        3 => Err(FormatError::unsupported(NAME, "complex 16-bit integer pixels")),
        other => Err(FormatError::unsupported(
            NAME,
            format!("pixel type code {}", other),
        )),
    }
}

fn dimension_order(sequence: i16) -> DimensionOrder {
    match sequence {
        0 => DimensionOrder::XYZTC,
        1 => DimensionOrder::XYCZT,
        2 => DimensionOrder::XYZCT,
        _ => DimensionOrder::XYZTC,
    }
}

/// Re-derive Z, C and T when fewer planes are present than declared.
///
/// The channel count is kept. A single-section stack loses timepoints, a
/// single-timepoint stack loses sections (a partial last section counts),
/// and otherwise whichever of Z and T comes first in the dimension order
/// absorbs the loss. When the recovered sizes cannot account for the
/// planes present, the declared sizes stand and the missing planes fail
/// to resolve.
fn recover_truncated(desc: &mut FormatDescriptor, real_count: u32) {
    let declared = (desc.size_z, desc.size_c, desc.size_t);
    let (mut z, c, mut t) = declared;
    let axes = desc.dimension_order.axes();
    let position = |axis: Axis| axes.iter().position(|a| *a == axis);

    if z == 1 {
        t = real_count / c;
    } else if t == 1 {
        z = real_count.div_ceil(c);
    } else if position(Axis::Z) < position(Axis::T) {
        z = real_count / (c * t);
        if z == 0 {
            t = 1;
            z = real_count.div_ceil(c);
        }
        if real_count > z * c * t {
            (z, t) = (declared.0, declared.2);
        }
    } else {
        t = real_count / (c * z);
    }

    if z == 0 || t == 0 {
        warn!(
            present = real_count,
            channels = c,
            "fewer planes than channels, treating planes as a time series"
        );
        desc.size_z = 1;
        desc.size_c = 1;
        desc.size_t = real_count;
        return;
    }
    desc.size_z = z;
    desc.size_t = t;
}

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let len = reader.size();
    let pair = reader.read_exact_at(SENTINEL_OFFSET, 2)?;
    let order = sentinel_order([pair[0], pair[1]])
        .ok_or_else(|| FormatError::malformed(NAME, SENTINEL_OFFSET, "missing byte-order sentinel"))?;
    let mut src = ByteSource::new(reader, order);

    let width = src.read_i32()?;
    let height = src.read_i32()?;
    let image_count = src.read_i32()?;
    let pixel_code = src.read_i32()?;

    src.seek(40);
    let dx = src.read_f32()?;
    let dy = src.read_f32()?;
    let dz = src.read_f32()?;

    src.seek(92);
    let extended_size = src.read_i32()?;
    src.seek(128);
    let num_ints = src.read_i16()?;
    let num_floats = src.read_i16()?;
    src.seek(180);
    let raw_t = src.read_i16()?;
    let sequence = src.read_i16()?;
    src.seek(196);
    let raw_c = src.read_i16()?;
    src.seek(224);
    let title = src.read_fixed_string(80)?;

    if width <= 0 || height <= 0 || image_count <= 0 {
        return Err(FormatError::malformed(
            NAME,
            0,
            format!("invalid geometry {}x{} with {} images", width, height, image_count),
        ));
    }
    if extended_size < 0 {
        return Err(FormatError::malformed(NAME, 92, "negative extended header size"));
    }

    let pixel_type = pixel_type(pixel_code)?;
    let size_t = raw_t.max(1) as u32;
    let size_c = raw_c.max(1) as u32;

    let mut desc = FormatDescriptor::new(width as u32, height as u32, pixel_type);
    desc.little_endian = order.is_little_endian();
    desc.dimension_order = dimension_order(sequence);
    desc.size_t = size_t;
    desc.size_c = size_c;
    desc.size_z = image_count as u32 / (size_c * size_t);
    if desc.size_z == 0 {
        return Err(FormatError::malformed(
            NAME,
            8,
            format!(
                "{} images cannot hold {} channels x {} timepoints",
                image_count, size_c, size_t
            ),
        ));
    }

    let pixels_offset = HEADER_SIZE + extended_size as u64;
    let plane_size = desc.decoded_plane_size();
    require_span(NAME, 0, pixels_offset, len)?;

    let real_count = (len - pixels_offset) / plane_size;
    if real_count < image_count as u64 {
        if real_count == 0 {
            return Err(FormatError::TruncatedData {
                format: NAME,
                offset: pixels_offset,
                needed: plane_size,
                available: len - pixels_offset,
            });
        }
        warn!(
            declared = image_count,
            present = real_count,
            "Deltavision file is truncated, keeping the planes present"
        );
        recover_truncated(&mut desc, real_count as u32);
    }

    debug!(
        width,
        height,
        z = desc.size_z,
        c = desc.size_c,
        t = desc.size_t,
        order = %desc.dimension_order,
        "Deltavision header parsed"
    );

    let layout = SeriesLayout::contiguous(pixels_offset, &desc);
    let mut parsed = ParsedFormat::single(desc, layout, PlaneCodec::Direct, NAME);
    parsed.calibration = Calibration {
        physical_size_x: Calibration::physical_size(dx as f64),
        physical_size_y: Calibration::physical_size(dy as f64),
        physical_size_z: Calibration::physical_size(dz as f64),
        timestamp: None,
    };

    let meta = &mut parsed.metadata;
    meta.set("Title", title);
    meta.set("Pixel type code", pixel_code);
    meta.set("Image count", image_count);
    meta.set("Extended header size", extended_size);
    meta.set("Integers per section", num_ints);
    meta.set("Floats per section", num_floats);
    meta.set("Image sequence", sequence);
    meta.set("Pixel size X", dx);
    meta.set("Pixel size Y", dy);
    meta.set("Pixel size Z", dz);
    parsed.finish(NAME)
}

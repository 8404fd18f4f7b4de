//! Openlab LIFF: a big-endian chain of linked tags.
//!
//! ```text
//! 0   u64  magic 0x0000ffff696d7072 ("impr" at 4)
//! 8   i32  version (2 or 5)
//! 12  i16  plane count
//! 14       2 bytes skipped
//! 16  i32  offset of the first tag
//! ```
//!
//! Every tag starts with `tag, subTag, next, fmt` and is followed by a
//! tag-specific body. Image tags (67, 68) describe one plane each; planes
//! of the same geometry and kind form a series. Version 2 stores raw
//! pixels, version 5 stores LZO1X blocks.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    Calibration, DimensionOrder, FormatDescriptor, LookupTable, ParsedFormat, PixelType,
    PlaneAddress, SeriesLayout,
};
use crate::codec::PlaneCodec;
use crate::error::FormatError;
use crate::io::{ByteOrder, ByteSource, RangeReader};

pub const NAME: &str = "Openlab LIFF";

pub const MAGIC: u64 = 0xffff_696d_7072;
/// Block marker that separates LZO blocks in version 5 planes.
pub const BLOCK_MARKER: [u8; 2] = *b"IV";

const IMAGE_TAG: i16 = 67;
const IMAGE_TAG_ALT: i16 = 68;
const CALIBRATION_TAG: i16 = 69;

const NAME_FIELD: u64 = 256;
const LZO_PREFIX: u64 = 16;
const ROW_PADDING: usize = 16;
const LUT_SPAN: u64 = 257 * 8;
const MAX_TAGS: usize = 1 << 16;

/// Planes named like this are thumbnails of the source image.
const ORIGINAL_IMAGE: &str = "Original Image";

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    if reader.size() < 8 {
        return false;
    }
    match reader.read_exact_at(0, 8) {
        Ok(b) => ByteOrder::BigEndian.read_u64(&b) == MAGIC,
        Err(_) => false,
    }
}

/// Common prefix of every tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHeader {
    pub tag: i16,
    pub sub_tag: i16,
    pub next: u64,
    pub fmt: String,
}

fn read_tag_header<R: RangeReader + ?Sized>(
    src: &mut ByteSource<'_, R>,
    version: i32,
) -> Result<TagHeader, FormatError> {
    let tag = src.read_i16()?;
    let sub_tag = src.read_i16()?;
    let next = if version == 2 {
        src.read_u32()? as u64
    } else {
        src.read_u64()?
    };
    let fmt = src.read_fixed_string(4)?;
    src.skip(if version == 2 { 4 } else { 8 });
    Ok(TagHeader {
        tag,
        sub_tag,
        next,
        fmt,
    })
}

/// Sample layout of a plane, derived from its volume type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaneKind {
    Gray8,
    Indexed,
    Rgb,
    Gray16 { bits: u32 },
}

fn plane_kind(volume_type: i16) -> Result<PlaneKind, FormatError> {
    match volume_type {
        1 | 2 | 5 => Ok(PlaneKind::Gray8),
        6 => Ok(PlaneKind::Indexed),
        4 | 7 | 8 => Ok(PlaneKind::Rgb),
        3 | 16 => Ok(PlaneKind::Gray16 { bits: 16 }),
        9..=15 => Ok(PlaneKind::Gray16 {
            bits: volume_type as u32,
        }),
        other => Err(FormatError::unsupported(
            NAME,
            format!("volume type {}", other),
        )),
    }
}

/// Grouping key for a volume type: all deep greys share one.
fn volume_group(volume_type: i16) -> i16 {
    if volume_type >= 9 {
        9
    } else {
        volume_type
    }
}

/// Mac 256 greys and Mac 256 colours store inverted intensities.
fn is_inverted(volume_type: i16) -> bool {
    matches!(volume_type, 5 | 6)
}

#[derive(Debug, Clone)]
struct PlaneInfo {
    name: String,
    volume_type: i16,
    kind: PlaneKind,
    width: u32,
    height: u32,
    address: PlaneAddress,
    lut: Option<LookupTable>,
}

impl PlaneInfo {
    fn series_key(&self) -> (u32, u32, i16) {
        (self.width, self.height, volume_group(self.volume_type))
    }

    fn descriptor(&self, version: i32) -> FormatDescriptor {
        let pixel_type = match self.kind {
            PlaneKind::Gray16 { .. } => PixelType::Uint16,
            _ => PixelType::Uint8,
        };
        let mut desc = FormatDescriptor::new(self.width, self.height, pixel_type);
        desc.little_endian = false;
        desc.dimension_order = DimensionOrder::XYCZT;
        match self.kind {
            PlaneKind::Gray16 { bits } => desc.bits_per_pixel = bits,
            PlaneKind::Rgb => {
                desc.rgb = true;
                desc.samples_per_pixel = 3;
                desc.interleaved = version == 5;
            }
            PlaneKind::Indexed => {
                desc.indexed = true;
                desc.lookup_table = self.lut.clone().map(Arc::new);
            }
            PlaneKind::Gray8 => {}
        }
        desc
    }
}

/// Read the 256-entry palette stored just before `next`, last entry first.
fn read_lut<R: RangeReader + ?Sized>(
    reader: &R,
    next: u64,
) -> Result<LookupTable, FormatError> {
    let start = next
        .checked_sub(LUT_SPAN)
        .ok_or_else(|| FormatError::malformed(NAME, next, "palette starts before the file"))?;
    let mut src = ByteSource::new(reader, ByteOrder::BigEndian);
    src.seek(start);
    let mut channels = vec![vec![0u8; 256]; 3];
    for i in 0..256 {
        src.skip(2);
        for channel in channels.iter_mut() {
            channel[255 - i] = (src.read_i16()? >> 8) as u8;
        }
    }
    LookupTable::new(channels)
        .ok_or_else(|| FormatError::malformed(NAME, start, "invalid palette"))
}

fn read_image_tag<R: RangeReader + ?Sized>(
    reader: &R,
    src: &mut ByteSource<'_, R>,
    header: &TagHeader,
    version: i32,
    end: u64,
) -> Result<PlaneInfo, FormatError> {
    if header.fmt.eq_ignore_ascii_case("pict") {
        return Err(FormatError::unsupported(NAME, "PICT-encoded planes"));
    }
    src.skip(24);
    let volume_type = src.read_i16()?;
    src.skip(16);
    let name_start = src.position();
    let name = src.read_c_string(NAME_FIELD as usize)?.trim().to_string();
    let name_end = name_start + NAME_FIELD;
    src.seek(name_end);

    let (width, height, data_start) = if version == 2 {
        src.skip(2);
        let top = src.read_i16()? as i32;
        let left = src.read_i16()? as i32;
        let bottom = src.read_i16()? as i32;
        let right = src.read_i16()? as i32;
        (right - left, bottom - top, src.position())
    } else {
        let width = src.read_i32()?;
        let height = src.read_i32()?;
        (width, height, name_end + LZO_PREFIX)
    };
    if width <= 0 || height <= 0 {
        return Err(FormatError::malformed(
            NAME,
            name_end,
            format!("invalid plane size {}x{}", width, height),
        ));
    }

    let kind = plane_kind(volume_type)?;
    let lut = match kind {
        PlaneKind::Indexed => Some(read_lut(reader, header.next)?),
        _ => None,
    };

    let mut plane = PlaneInfo {
        name,
        volume_type,
        kind,
        width: width as u32,
        height: height as u32,
        address: PlaneAddress {
            offset: data_start,
            length: 0,
        },
        lut,
    };
    plane.address.length = if version == 2 {
        plane.descriptor(version).decoded_plane_size()
    } else {
        end.saturating_sub(data_start)
    };
    Ok(plane)
}

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let len = reader.size();
    let mut src = ByteSource::new(reader, ByteOrder::BigEndian);
    let magic = src.read_u64()?;
    if magic != MAGIC {
        return Err(FormatError::malformed(NAME, 0, "missing LIFF magic"));
    }
    let version = src.read_i32()?;
    if version != 2 && version != 5 {
        return Err(FormatError::malformed(
            NAME,
            8,
            format!("unknown version {}", version),
        ));
    }
    let declared_planes = src.read_i16()?;
    src.skip(2);
    let first_tag = src.read_i32()? as u32 as u64;

    let mut planes: Vec<PlaneInfo> = Vec::new();
    let mut calibration = Calibration::default();
    let mut visited = HashSet::new();
    let mut pos = first_tag;

    while pos + 8 < len && visited.len() < MAX_TAGS {
        if !visited.insert(pos) {
            warn!(offset = pos, "LIFF tag chain loops back, stopping");
            break;
        }
        src.seek(pos);
        let header = read_tag_header(&mut src, version)?;
        let end = if header.next > pos && header.next <= len {
            header.next
        } else {
            len
        };

        match header.tag {
            IMAGE_TAG | IMAGE_TAG_ALT => {
                planes.push(read_image_tag(reader, &mut src, &header, version, end)?);
            }
            CALIBRATION_TAG => {
                src.skip(4);
                let units = src.read_i16()?;
                let scaling = if units == 3 { 0.001 } else { 1.0 };
                src.skip(12);
                let x = src.read_f32()? as f64 * scaling;
                let y = src.read_f32()? as f64 * scaling;
                calibration.physical_size_x = Calibration::physical_size(x);
                calibration.physical_size_y = Calibration::physical_size(y);
            }
            _ => {}
        }

        if header.next <= pos {
            break;
        }
        pos = header.next;
    }

    // Group planes into series in file order
    let mut keys: Vec<(u32, u32, i16)> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for (i, plane) in planes.iter().enumerate() {
        let key = plane.series_key();
        match keys.iter().position(|k| *k == key) {
            Some(s) => members[s].push(i),
            None if plane.name == ORIGINAL_IMAGE => {
                debug!(index = i, "skipping original image thumbnail");
            }
            None => {
                keys.push(key);
                members.push(vec![i]);
            }
        }
    }

    let mut descriptors = Vec::with_capacity(members.len());
    let mut layouts = Vec::with_capacity(members.len());
    let mut inverted = Vec::with_capacity(members.len());
    for indices in &members {
        let first = &planes[indices[0]];
        let mut desc = first.descriptor(version);
        desc.size_z = indices.len() as u32;
        descriptors.push(desc);
        layouts.push(SeriesLayout::Table(
            indices.iter().map(|&i| planes[i].address).collect(),
        ));
        inverted.push(is_inverted(first.volume_type));
    }

    let codec = if version == 2 {
        PlaneCodec::Direct
    } else {
        PlaneCodec::Lzo {
            marker: BLOCK_MARKER,
            row_padding: ROW_PADDING,
        }
    };

    debug!(
        version,
        planes = planes.len(),
        series = descriptors.len(),
        "LIFF tag chain parsed"
    );

    let mut metadata = super::MetadataList::new();
    metadata.set("Version", version);
    metadata.set("Declared plane count", declared_planes);
    for (s, indices) in members.iter().enumerate() {
        for (p, &i) in indices.iter().enumerate() {
            metadata.set(
                format!("Series {} plane {} name", s, p),
                planes[i].name.clone(),
            );
        }
    }

    let parsed = ParsedFormat {
        descriptors,
        layouts,
        metadata,
        calibration,
        codec,
        decoder_used: NAME,
        inverted,
    };
    parsed.finish(NAME)
}

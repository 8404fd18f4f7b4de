//! Bio-Rad PIC confocal stacks.
//!
//! ```text
//! 0   nx, ny, npic, ramp1 min, ramp1 max      i16 x 5
//! 10  notes present                            i32
//! 14  byte_format (1 = 8-bit, 0 = 16-bit)      i16
//! 16  image number                             i16
//! 18  name                                     32 chars
//! 50  merged, colour1, file id (12345),
//!     ramp2 min/max, colour2, edited, lens     i16 x 8
//! 66  magnification                            f32
//! 76  pixels, then a chain of 96-byte notes
//! ```
//!
//! Notes carry `KEY = value` text; a few keys refine the calibration and
//! the Z/C/T split.

use tracing::debug;

use super::{
    metadata::parse_number, require_span, DimensionOrder, FormatDescriptor, ParsedFormat,
    PixelType, SeriesLayout,
};
use crate::codec::PlaneCodec;
use crate::error::FormatError;
use crate::io::{ByteOrder, ByteSource, RangeReader};

pub const NAME: &str = "Bio-Rad PIC";

pub const FILE_ID: i16 = 12345;
const FILE_ID_OFFSET: u64 = 54;
const HEADER_SIZE: u64 = 76;
const NOTE_SIZE: u64 = 96;
const NOTE_TYPE_VARIABLE: i16 = 20;
const MAX_NOTE_TYPE: i16 = 21;
/// Axis type code for an RGB channel axis.
const AXIS_TYPE_RGB: &str = "11";

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    if reader.size() < HEADER_SIZE {
        return false;
    }
    match reader.read_exact_at(FILE_ID_OFFSET, 2) {
        Ok(b) => i16::from_le_bytes([b[0], b[1]]) == FILE_ID,
        Err(_) => false,
    }
}

/// One note record.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub level: i16,
    pub has_next: bool,
    pub num: i16,
    pub status: i16,
    pub note_type: i16,
    pub x: i16,
    pub y: i16,
    pub text: String,
}

/// Read the note chain starting at `offset`.
///
/// Stops after a note whose next flag is clear, at a note type outside
/// 1..=21, or at the end of the source.
pub fn read_notes<R: RangeReader + ?Sized>(
    reader: &R,
    offset: u64,
) -> Result<Vec<Note>, FormatError> {
    let mut src = ByteSource::new(reader, ByteOrder::LittleEndian);
    src.seek(offset);
    let mut notes = Vec::new();

    while src.remaining() >= NOTE_SIZE {
        let note = Note {
            level: src.read_i16()?,
            has_next: src.read_i32()? != 0,
            num: src.read_i16()?,
            status: src.read_i16()?,
            note_type: src.read_i16()?,
            x: src.read_i16()?,
            y: src.read_i16()?,
            text: src.read_fixed_string(80)?,
        };
        if !(1..=MAX_NOTE_TYPE).contains(&note.note_type) {
            debug!(offset = src.position(), "Bio-Rad note chain ends at invalid type");
            break;
        }
        let more = note.has_next;
        notes.push(note);
        if !more {
            break;
        }
    }
    Ok(notes)
}

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let mut src = ByteSource::new(reader, ByteOrder::LittleEndian);
    let nx = src.read_i16()?;
    let ny = src.read_i16()?;
    let npic = src.read_i16()?;
    let ramp1_min = src.read_i16()?;
    let ramp1_max = src.read_i16()?;
    let has_notes = src.read_i32()? != 0;
    let byte_format = src.read_i16()?;
    let image_number = src.read_i16()?;
    let name = src.read_fixed_string(32)?;
    let merged = src.read_i16()?;
    let colour1 = src.read_u16()?;
    let file_id = src.read_i16()?;
    let ramp2_min = src.read_i16()?;
    let ramp2_max = src.read_i16()?;
    let colour2 = src.read_u16()?;
    let edited = src.read_i16()?;
    let lens = src.read_i16()?;
    let magnification = src.read_f32()?;

    if file_id != FILE_ID {
        return Err(FormatError::malformed(
            NAME,
            FILE_ID_OFFSET,
            format!("file id {} is not {}", file_id, FILE_ID),
        ));
    }
    if nx <= 0 || ny <= 0 || npic <= 0 {
        return Err(FormatError::malformed(
            NAME,
            0,
            format!("invalid geometry {}x{} with {} images", nx, ny, npic),
        ));
    }

    let pixel_type = if byte_format == 1 {
        PixelType::Uint8
    } else {
        PixelType::Uint16
    };
    let mut desc = FormatDescriptor::new(nx as u32, ny as u32, pixel_type);
    desc.size_z = npic as u32;
    desc.little_endian = true;
    desc.dimension_order = DimensionOrder::XYCZT;

    let pixel_bytes = desc.decoded_plane_size() * npic as u64;
    require_span(NAME, HEADER_SIZE, pixel_bytes, reader.size())?;

    let notes = if has_notes {
        read_notes(reader, HEADER_SIZE + pixel_bytes)?
    } else {
        Vec::new()
    };

    let layout = SeriesLayout::contiguous(HEADER_SIZE, &desc);
    let mut parsed = ParsedFormat::single(desc, layout, PlaneCodec::Direct, NAME);

    let meta = &mut parsed.metadata;
    meta.set("nx", nx);
    meta.set("ny", ny);
    meta.set("npic", npic);
    meta.set("ramp1_min", ramp1_min);
    meta.set("ramp1_max", ramp1_max);
    meta.set("byte_format", byte_format);
    meta.set("image_number", image_number);
    meta.set("name", name);
    meta.set("merged", merged);
    meta.set("color1", colour1 as i64);
    meta.set("file_id", file_id);
    meta.set("ramp2_min", ramp2_min);
    meta.set("ramp2_max", ramp2_max);
    meta.set("color2", colour2 as i64);
    meta.set("edited", edited);
    meta.set("lens", lens);
    meta.set("mag_factor", magnification);

    apply_notes(&mut parsed, &notes, npic as u32);
    debug!(
        nx,
        ny,
        npic,
        notes = notes.len(),
        "Bio-Rad header parsed"
    );
    parsed.finish(NAME)
}

/// Fold variable notes into metadata, calibration and dimensions.
fn apply_notes(parsed: &mut ParsedFormat, notes: &[Note], npic: u32) {
    let mut note_index = 0usize;
    for note in notes {
        if note.note_type != NOTE_TYPE_VARIABLE {
            note_index += 1;
            parsed.metadata.set(format!("Note {}", note_index), note.text.clone());
            continue;
        }

        let Some((key, value)) = note.text.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        parsed.metadata.set(key, value);

        let tokens: Vec<&str> = note.text.split(|c: char| c == ' ' || c == '=')
            .filter(|t| !t.is_empty())
            .collect();
        let desc = &mut parsed.descriptors[0];
        match key {
            "AXIS_2" => {
                parsed.calibration.physical_size_x = tokens
                    .get(3)
                    .and_then(|t| parse_number::<f64>(t))
                    .and_then(super::Calibration::physical_size);
            }
            "AXIS_3" => {
                parsed.calibration.physical_size_y = tokens
                    .get(3)
                    .and_then(|t| parse_number::<f64>(t))
                    .and_then(super::Calibration::physical_size);
            }
            "AXIS_4" if tokens.get(1) == Some(&AXIS_TYPE_RGB) => {
                desc.size_c = npic;
                desc.size_z = 1;
                desc.size_t = 1;
            }
            "AXIS_4" => {
                desc.size_t = npic;
                desc.size_z = 1;
                desc.size_c = 1;
            }
            _ => {}
        }
    }
}

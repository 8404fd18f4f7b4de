//! Princeton Instruments SPE.
//!
//! A fixed 4100-byte little-endian header followed by frames back to back.

use tracing::{debug, warn};

use super::{require_span, DimensionOrder, FormatDescriptor, ParsedFormat, PixelType, SeriesLayout};
use crate::codec::PlaneCodec;
use crate::error::FormatError;
use crate::io::{ByteOrder, ByteSource, RangeReader};

pub const NAME: &str = "Princeton SPE";

const HEADER_SIZE: u64 = 4100;
const MAGIC_OFFSET: u64 = 4098;
const MAGIC: u16 = 0x5555;

const EXPOSURE_OFFSET: u64 = 10;
const DATE_OFFSET: u64 = 20;
const WIDTH_OFFSET: u64 = 42;
const DATATYPE_OFFSET: u64 = 108;
const ADC_OFFSET: u64 = 188;
const COMMENTS_OFFSET: u64 = 200;
const HEIGHT_OFFSET: u64 = 656;
const FRAMES_OFFSET: u64 = 1446;

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    if reader.size() < HEADER_SIZE {
        return false;
    }
    match reader.read_exact_at(MAGIC_OFFSET, 2) {
        Ok(b) => u16::from_le_bytes([b[0], b[1]]) == MAGIC,
        Err(_) => false,
    }
}

fn pixel_type(code: i16) -> Result<PixelType, FormatError> {
    match code {
        0 => Ok(PixelType::Float32),
        1 => Ok(PixelType::Int32),
        2 => Ok(PixelType::Int16),
        3 => Ok(PixelType::Uint16),
        4 => Ok(PixelType::Uint32),
        other => Err(FormatError::malformed(
            NAME,
            DATATYPE_OFFSET,
            format!("unknown data type {}", other),
        )),
    }
}

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let len = reader.size();
    require_span(NAME, 0, HEADER_SIZE, len)?;
    let mut src = ByteSource::new(reader, ByteOrder::LittleEndian);

    src.seek(EXPOSURE_OFFSET);
    let exposure = src.read_f32()?;
    src.seek(DATE_OFFSET);
    let date = src.read_fixed_string(10)?;
    src.seek(WIDTH_OFFSET);
    let width = src.read_u16()? as u32;
    src.seek(DATATYPE_OFFSET);
    let datatype = src.read_i16()?;
    src.seek(ADC_OFFSET);
    let readout_time = src.read_f32()?;
    let adc_offset = src.read_u16()?;
    let adc_rate = src.read_u16()?;
    src.seek(COMMENTS_OFFSET);
    let mut comments = Vec::with_capacity(5);
    for _ in 0..5 {
        comments.push(src.read_fixed_string(80)?);
    }
    src.seek(HEIGHT_OFFSET);
    let height = src.read_u16()? as u32;
    src.seek(FRAMES_OFFSET);
    let frames = src.read_i32()?;

    if width == 0 || height == 0 || frames <= 0 {
        return Err(FormatError::malformed(
            NAME,
            WIDTH_OFFSET,
            format!("invalid geometry {}x{} with {} frames", width, height, frames),
        ));
    }

    let mut desc = FormatDescriptor::new(width, height, pixel_type(datatype)?);
    desc.size_t = frames as u32;
    desc.little_endian = true;
    desc.dimension_order = DimensionOrder::XYZTC;

    let plane_size = desc.decoded_plane_size();
    let present = (len - HEADER_SIZE) / plane_size;
    if present < frames as u64 {
        if present == 0 {
            return Err(FormatError::TruncatedData {
                format: NAME,
                offset: HEADER_SIZE,
                needed: plane_size,
                available: len - HEADER_SIZE,
            });
        }
        warn!(
            declared = frames,
            present, "SPE file is truncated, keeping the frames present"
        );
        desc.size_t = present as u32;
    }
    debug!(width, height, frames = desc.size_t, datatype, "SPE header parsed");

    let layout = SeriesLayout::contiguous(HEADER_SIZE, &desc);
    let mut parsed = ParsedFormat::single(desc, layout, PlaneCodec::Direct, NAME);
    if !date.is_empty() {
        parsed.calibration.timestamp = Some(date.clone());
    }

    let meta = &mut parsed.metadata;
    meta.set("Exposure time", exposure);
    meta.set("Date", date);
    meta.set("Data type", datatype);
    meta.set("Readout time", readout_time);
    meta.set("ADC offset", adc_offset as u32);
    meta.set("ADC rate", adc_rate as u32);
    meta.set("Frames", frames);
    for (i, comment) in comments.into_iter().enumerate() {
        if !comment.is_empty() {
            meta.set(format!("Comment {}", i + 1), comment);
        }
    }
    parsed.finish(NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::MemoryReader;

    fn spe(width: u16, height: u16, datatype: i16, frames: i32, pixel_bytes: usize) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE as usize];
        data[10..14].copy_from_slice(&0.5f32.to_le_bytes());
        data[20..29].copy_from_slice(b"01Jan2020");
        data[42..44].copy_from_slice(&width.to_le_bytes());
        data[108..110].copy_from_slice(&datatype.to_le_bytes());
        data[200..207].copy_from_slice(b"comment");
        data[656..658].copy_from_slice(&height.to_le_bytes());
        data[1446..1450].copy_from_slice(&frames.to_le_bytes());
        data[4098..4100].copy_from_slice(&MAGIC.to_le_bytes());
        data.resize(data.len() + pixel_bytes, 0);
        data
    }

    #[test]
    fn test_sniff_needs_magic_and_length() {
        assert!(sniff(&MemoryReader::new(spe(2, 2, 3, 1, 8), "a.spe")));
        assert!(!sniff(&MemoryReader::new(vec![0u8; 4099], "short.spe")));
        let mut data = spe(2, 2, 3, 1, 8);
        data[4098] = 0;
        assert!(!sniff(&MemoryReader::new(data, "b.spe")));
    }

    #[test]
    fn test_parse_frames_as_time() {
        let parsed = parse(&MemoryReader::new(spe(4, 3, 0, 2, 4 * 3 * 4 * 2), "f.spe")).unwrap();
        let desc = &parsed.descriptors[0];
        assert_eq!(desc.pixel_type, PixelType::Float32);
        assert_eq!((desc.width, desc.height, desc.size_t), (4, 3, 2));
        assert_eq!(desc.dimension_order, DimensionOrder::XYZTC);
        assert_eq!(parsed.calibration.timestamp.as_deref(), Some("01Jan2020"));
        assert_eq!(parsed.metadata.get_text("Comment 1").as_deref(), Some("comment"));
        assert_eq!(parsed.metadata.get("Exposure time"), Some(&0.5f32.into()));
    }

    #[test]
    fn test_truncated_frames_are_dropped() {
        let parsed = parse(&MemoryReader::new(spe(2, 2, 3, 5, 8 * 3 + 2), "t.spe")).unwrap();
        assert_eq!(parsed.descriptors[0].size_t, 3);
    }

    #[test]
    fn test_unknown_datatype() {
        let err = parse(&MemoryReader::new(spe(2, 2, 7, 1, 8), "d.spe")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
    }
}

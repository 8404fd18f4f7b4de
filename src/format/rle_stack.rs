//! Delta-RLE stack: a table of run-length/delta coded 16-bit planes.
//!
//! ```text
//! 0   4  "RLDS"
//! 4   2  version (1)
//! 6   2  width
//! 8   2  height
//! 10  2  plane count
//! 12  2  run threshold
//! 14  2  reserved
//! 16     plane count x (u32 offset, u32 length)
//! ```
//!
//! All fields are little-endian. Each plane is decoded by
//! [`crate::codec::expand`].

use tracing::debug;

use super::{require_span, FormatDescriptor, ParsedFormat, PixelType, PlaneAddress, SeriesLayout};
use crate::codec::PlaneCodec;
use crate::error::FormatError;
use crate::io::{ByteOrder, ByteSource, RangeReader};

pub const NAME: &str = "Delta-RLE stack";

const MAGIC: &[u8; 4] = b"RLDS";
const VERSION: u16 = 1;
const TABLE_OFFSET: u64 = 16;
const ENTRY_SIZE: u64 = 8;

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    reader.size() >= TABLE_OFFSET
        && matches!(reader.read_exact_at(0, 4), Ok(head) if &head[..] == MAGIC)
}

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let len = reader.size();
    require_span(NAME, 0, TABLE_OFFSET, len)?;
    let mut src = ByteSource::new(reader, ByteOrder::LittleEndian);
    src.seek(4);

    let version = src.read_u16()?;
    if version != VERSION {
        return Err(FormatError::unsupported(NAME, format!("version {}", version)));
    }
    let width = src.read_u16()? as u32;
    let height = src.read_u16()? as u32;
    let count = src.read_u16()? as u32;
    let threshold = src.read_u16()?;
    let _reserved = src.read_u16()?;

    if count == 0 {
        return Err(FormatError::malformed(NAME, 10, "no planes"));
    }
    require_span(NAME, TABLE_OFFSET, count as u64 * ENTRY_SIZE, len)?;

    let mut table = Vec::with_capacity(count as usize);
    for index in 0..count as u64 {
        let offset = src.read_u32()? as u64;
        let length = src.read_u32()? as u64;
        if length % 2 != 0 {
            return Err(FormatError::malformed(
                NAME,
                TABLE_OFFSET + index * ENTRY_SIZE,
                format!("plane {} has odd length {}", index, length),
            ));
        }
        require_span(NAME, offset, length, len)?;
        table.push(PlaneAddress { offset, length });
    }

    let mut desc = FormatDescriptor::new(width, height, PixelType::Uint16);
    desc.little_endian = true;
    desc.size_z = count;
    debug!(width, height, count, threshold, "Delta-RLE stack parsed");

    let mut parsed = ParsedFormat::single(
        desc,
        SeriesLayout::Table(table),
        PlaneCodec::DeltaRle { threshold },
        NAME,
    );
    parsed.metadata.set("Version", version as u32);
    parsed.metadata.set("Run threshold", threshold as u32);
    parsed.finish(NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::MemoryReader;

    fn stack(width: u16, height: u16, threshold: u16, planes: &[Vec<u16>]) -> Vec<u8> {
        let mut data = MAGIC.to_vec();
        for field in [VERSION, width, height, planes.len() as u16, threshold, 0] {
            data.extend_from_slice(&field.to_le_bytes());
        }
        let mut offset = TABLE_OFFSET as usize + planes.len() * ENTRY_SIZE as usize;
        for words in planes {
            data.extend_from_slice(&(offset as u32).to_le_bytes());
            data.extend_from_slice(&(words.len() as u32 * 2).to_le_bytes());
            offset += words.len() * 2;
        }
        for words in planes {
            for w in words {
                data.extend_from_slice(&w.to_le_bytes());
            }
        }
        data
    }

    #[test]
    fn test_sniff() {
        let data = stack(2, 1, 100, &[vec![1, 2]]);
        assert!(sniff(&MemoryReader::new(data, "a.rlds")));
        assert!(!sniff(&MemoryReader::new(b"RLDX000000000000".to_vec(), "b")));
        assert!(!sniff(&MemoryReader::new(b"RLDS".to_vec(), "short")));
    }

    #[test]
    fn test_parse_table() {
        let data = stack(2, 2, 1000, &[vec![1, 2, 3, 4], vec![1004, 7, 0]]);
        let parsed = parse(&MemoryReader::new(data, "s.rlds")).unwrap();
        let desc = &parsed.descriptors[0];
        assert_eq!((desc.width, desc.height, desc.size_z), (2, 2, 2));
        assert_eq!(desc.pixel_type, PixelType::Uint16);
        assert_eq!(parsed.codec, PlaneCodec::DeltaRle { threshold: 1000 });
        assert_eq!(
            parsed.layouts[0],
            SeriesLayout::Table(vec![
                PlaneAddress {
                    offset: 32,
                    length: 8
                },
                PlaneAddress {
                    offset: 40,
                    length: 6
                },
            ])
        );
    }

    #[test]
    fn test_plane_past_end_is_truncated() {
        let mut data = stack(2, 2, 1000, &[vec![1, 2, 3, 4]]);
        data.truncate(data.len() - 2);
        let err = parse(&MemoryReader::new(data, "t.rlds")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);
    }

    #[test]
    fn test_unknown_version() {
        let mut data = stack(2, 2, 1000, &[vec![1, 2, 3, 4]]);
        data[4] = 9;
        let err = parse(&MemoryReader::new(data, "v.rlds")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVariant);
    }
}

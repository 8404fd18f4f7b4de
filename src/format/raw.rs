//! Headerless raw frames recognised by total file length.
//!
//! Each table entry fixes the geometry of every series in the file. Series
//! are stored back to back from offset 0, so the offset of series `n` is the
//! end of series `n - 1`.

use tracing::debug;

use super::{chain_layouts, DimensionOrder, FormatDescriptor, ParsedFormat, PixelType};
use crate::codec::{Packing, PlaneCodec};
use crate::error::FormatError;
use crate::io::RangeReader;

pub const NAME: &str = "Fixed-length raw";

/// Geometry of one series in a raw entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSeries {
    pub width: u32,
    pub height: u32,
    pub planes: u32,
}

/// One recognised raw layout.
#[derive(Debug, Clone, Copy)]
pub struct RawFormat {
    pub name: &'static str,
    pub series: &'static [RawSeries],
    pub pixel_type: PixelType,
    pub bits: u32,
    pub little_endian: bool,
    pub packing: Option<Packing>,
}

impl RawFormat {
    fn descriptors(&self) -> Vec<FormatDescriptor> {
        self.series
            .iter()
            .map(|s| {
                let mut desc = FormatDescriptor::new(s.width, s.height, self.pixel_type);
                desc.size_z = s.planes;
                desc.bits_per_pixel = self.bits;
                desc.little_endian = self.little_endian;
                desc.bit_packed = self.packing.is_some();
                desc.dimension_order = DimensionOrder::XYZCT;
                desc
            })
            .collect()
    }

    /// Total file length implied by this entry.
    pub fn total_length(&self) -> u64 {
        self.descriptors()
            .iter()
            .map(|d| d.stored_plane_size() * d.image_count() as u64)
            .sum()
    }
}

/// Known raw layouts. Lengths are pairwise distinct.
pub static RAW_FORMATS: &[RawFormat] = &[
    RawFormat {
        name: "Mono 512x512 16-bit",
        series: &[RawSeries {
            width: 512,
            height: 512,
            planes: 1,
        }],
        pixel_type: PixelType::Uint16,
        bits: 16,
        little_endian: true,
        packing: None,
    },
    RawFormat {
        name: "Packed 12-bit 640x480",
        series: &[RawSeries {
            width: 640,
            height: 480,
            planes: 1,
        }],
        pixel_type: PixelType::Uint16,
        bits: 12,
        little_endian: true,
        packing: Some(Packing::Msb12),
    },
    RawFormat {
        name: "Preview + frame 8-bit",
        series: &[
            RawSeries {
                width: 160,
                height: 120,
                planes: 1,
            },
            RawSeries {
                width: 640,
                height: 480,
                planes: 1,
            },
        ],
        pixel_type: PixelType::Uint8,
        bits: 8,
        little_endian: true,
        packing: None,
    },
];

/// The entry whose total length equals `len`.
pub fn lookup(len: u64) -> Option<&'static RawFormat> {
    RAW_FORMATS.iter().find(|f| f.total_length() == len)
}

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    lookup(reader.size()).is_some()
}

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let entry = lookup(reader.size()).ok_or_else(|| {
        FormatError::malformed(
            NAME,
            0,
            format!("no raw layout is {} bytes long", reader.size()),
        )
    })?;
    debug!(entry = entry.name, len = reader.size(), "raw layout matched by length");

    let descriptors = entry.descriptors();
    let layouts = chain_layouts(0, &descriptors);
    let codec = match entry.packing {
        Some(packing) => PlaneCodec::Unpack { packing },
        None => PlaneCodec::Direct,
    };

    let mut parsed = ParsedFormat::single(descriptors[0].clone(), layouts[0].clone(), codec, NAME);
    parsed.descriptors = descriptors;
    parsed.layouts = layouts;
    parsed.metadata.set("Layout", entry.name);
    parsed.finish(NAME)
}

//! Canonical, format-independent description of an image series.
//!
//! Every header parser ends by producing one [`FormatDescriptor`] per series.
//! The descriptor is immutable afterwards: plane resolution and sample
//! decoding only do arithmetic on it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::error::FormatError;

// =============================================================================
// PixelType
// =============================================================================

/// Storage type of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl PixelType {
    /// Bytes used to store one sample.
    #[inline]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            PixelType::Int8 | PixelType::Uint8 => 1,
            PixelType::Int16 | PixelType::Uint16 => 2,
            PixelType::Int32 | PixelType::Uint32 | PixelType::Float32 => 4,
            PixelType::Float64 => 8,
        }
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            PixelType::Int8
                | PixelType::Int16
                | PixelType::Int32
                | PixelType::Float32
                | PixelType::Float64
        )
    }

    #[inline]
    pub const fn is_floating_point(self) -> bool {
        matches!(self, PixelType::Float32 | PixelType::Float64)
    }

    pub const fn name(self) -> &'static str {
        match self {
            PixelType::Int8 => "int8",
            PixelType::Uint8 => "uint8",
            PixelType::Int16 => "int16",
            PixelType::Uint16 => "uint16",
            PixelType::Int32 => "int32",
            PixelType::Uint32 => "uint32",
            PixelType::Float32 => "float",
            PixelType::Float64 => "double",
        }
    }

    /// Smallest integer type holding `bits` bits, used by formats that only
    /// declare a bit depth.
    pub fn for_bits(bits: u32, signed: bool) -> Option<Self> {
        match (bits, signed) {
            (1..=8, false) => Some(PixelType::Uint8),
            (1..=8, true) => Some(PixelType::Int8),
            (9..=16, false) => Some(PixelType::Uint16),
            (9..=16, true) => Some(PixelType::Int16),
            (17..=32, false) => Some(PixelType::Uint32),
            (17..=32, true) => Some(PixelType::Int32),
            _ => None,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// DimensionOrder
// =============================================================================

/// Nesting order of the Z, C and T axes, fastest-varying first after XY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DimensionOrder {
    XYZCT,
    XYZTC,
    XYCZT,
    XYCTZ,
    XYTZC,
    XYTCZ,
}

/// One of the three non-spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Z,
    C,
    T,
}

impl DimensionOrder {
    pub const fn as_str(self) -> &'static str {
        match self {
            DimensionOrder::XYZCT => "XYZCT",
            DimensionOrder::XYZTC => "XYZTC",
            DimensionOrder::XYCZT => "XYCZT",
            DimensionOrder::XYCTZ => "XYCTZ",
            DimensionOrder::XYTZC => "XYTZC",
            DimensionOrder::XYTCZ => "XYTCZ",
        }
    }

    /// The three non-spatial axes, fastest-varying first.
    pub const fn axes(self) -> [Axis; 3] {
        match self {
            DimensionOrder::XYZCT => [Axis::Z, Axis::C, Axis::T],
            DimensionOrder::XYZTC => [Axis::Z, Axis::T, Axis::C],
            DimensionOrder::XYCZT => [Axis::C, Axis::Z, Axis::T],
            DimensionOrder::XYCTZ => [Axis::C, Axis::T, Axis::Z],
            DimensionOrder::XYTZC => [Axis::T, Axis::Z, Axis::C],
            DimensionOrder::XYTCZ => [Axis::T, Axis::C, Axis::Z],
        }
    }

    /// Build an order from an axis sequence (fastest first).
    pub fn from_axes(axes: [Axis; 3]) -> Option<Self> {
        [
            DimensionOrder::XYZCT,
            DimensionOrder::XYZTC,
            DimensionOrder::XYCZT,
            DimensionOrder::XYCTZ,
            DimensionOrder::XYTZC,
            DimensionOrder::XYTCZ,
        ]
        .into_iter()
        .find(|order| order.axes() == axes)
    }
}

impl FromStr for DimensionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XYZCT" => Ok(DimensionOrder::XYZCT),
            "XYZTC" => Ok(DimensionOrder::XYZTC),
            "XYCZT" => Ok(DimensionOrder::XYCZT),
            "XYCTZ" => Ok(DimensionOrder::XYCTZ),
            "XYTZC" => Ok(DimensionOrder::XYTZC),
            "XYTCZ" => Ok(DimensionOrder::XYTCZ),
            other => Err(format!("invalid dimension order: {}", other)),
        }
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LookupTable
// =============================================================================

/// Palette for indexed pixels: one byte vector per output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupTable {
    channels: Vec<Vec<u8>>,
}

impl LookupTable {
    /// Maximum number of palette entries.
    pub const MAX_ENTRIES: usize = 256;

    /// Build a table. All channels must have the same length, at most 256.
    pub fn new(channels: Vec<Vec<u8>>) -> Option<Self> {
        let len = channels.first()?.len();
        if len == 0 || len > Self::MAX_ENTRIES || channels.iter().any(|c| c.len() != len) {
            return None;
        }
        Some(Self { channels })
    }

    pub fn channels(&self) -> &[Vec<u8>] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// FormatDescriptor
// =============================================================================

/// Geometry, sample type and layout of one image series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDescriptor {
    /// Plane width in pixels
    pub width: u32,
    /// Plane height in pixels
    pub height: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    /// Number of independent series in the source
    pub series_count: usize,
    pub pixel_type: PixelType,
    /// Significant bits per sample, may be narrower than the storage type
    pub bits_per_pixel: u32,
    /// Byte order of multi-byte samples as stored in the source
    pub little_endian: bool,
    pub dimension_order: DimensionOrder,
    /// Samples of one pixel are adjacent (RGBRGB...) rather than planar
    pub interleaved: bool,
    /// Each plane carries more than one channel per pixel
    pub rgb: bool,
    /// Samples per pixel within one plane (1 unless `rgb`)
    pub samples_per_pixel: u32,
    /// Samples are bit-packed with no padding between them
    pub bit_packed: bool,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_table: Option<Arc<LookupTable>>,
}

impl FormatDescriptor {
    /// A single-plane grayscale descriptor; parsers adjust the fields they know.
    pub fn new(width: u32, height: u32, pixel_type: PixelType) -> Self {
        Self {
            width,
            height,
            size_z: 1,
            size_c: 1,
            size_t: 1,
            series_count: 1,
            pixel_type,
            bits_per_pixel: pixel_type.bytes_per_sample() as u32 * 8,
            little_endian: true,
            dimension_order: DimensionOrder::XYZCT,
            interleaved: false,
            rgb: false,
            samples_per_pixel: 1,
            bit_packed: false,
            indexed: false,
            lookup_table: None,
        }
    }

    /// Planes in this series: Z x C x T.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.size_z as usize * self.size_c as usize * self.size_t as usize
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.pixel_type.bytes_per_sample()
    }

    #[inline]
    pub fn channels_per_pixel(&self) -> usize {
        if self.rgb {
            self.samples_per_pixel as usize
        } else {
            1
        }
    }

    /// Size in bytes of one decoded plane.
    pub fn decoded_plane_size(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.channels_per_pixel() as u64
            * self.bytes_per_sample() as u64
    }

    /// Size in bytes of one plane as stored, before unpacking.
    ///
    /// Bit-packed planes take `ceil(w * h * channels * bits / 8)` bytes.
    pub fn stored_plane_size(&self) -> u64 {
        if self.bit_packed {
            let bits = self.width as u64
                * self.height as u64
                * self.channels_per_pixel() as u64
                * self.bits_per_pixel as u64;
            bits.div_ceil(8)
        } else {
            self.decoded_plane_size()
        }
    }

    /// Check the structural invariants every parser must uphold.
    pub fn validate(&self, format: &'static str) -> Result<(), FormatError> {
        if self.width == 0 || self.height == 0 {
            return Err(FormatError::malformed(
                format,
                0,
                format!("invalid plane size {}x{}", self.width, self.height),
            ));
        }
        if self.size_z == 0 || self.size_c == 0 || self.size_t == 0 {
            return Err(FormatError::malformed(
                format,
                0,
                format!(
                    "invalid dimensions Z={} C={} T={}",
                    self.size_z, self.size_c, self.size_t
                ),
            ));
        }
        let container_bits = self.bytes_per_sample() as u32 * 8;
        if self.bits_per_pixel == 0 || self.bits_per_pixel > container_bits {
            return Err(FormatError::malformed(
                format,
                0,
                format!(
                    "{} significant bits do not fit a {} sample",
                    self.bits_per_pixel, self.pixel_type
                ),
            ));
        }
        if self.indexed != self.lookup_table.is_some() {
            return Err(FormatError::malformed(
                format,
                0,
                "lookup table must be present exactly when pixels are indexed",
            ));
        }
        if self.rgb && self.samples_per_pixel < 2 {
            return Err(FormatError::malformed(
                format,
                0,
                "multi-channel plane declares fewer than 2 samples per pixel",
            ));
        }
        Ok(())
    }
}

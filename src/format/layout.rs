//! Plane address resolution across series, Z, C and T.
//!
//! Each series gets a [`SeriesLayout`], computed once during header parsing:
//!
//! ```text
//! Contiguous:  offset(i) = base + i * stride
//! Table:       offset(i), length(i) read from the header (tags, plane tables)
//! ```
//!
//! Multi-series files whose header gives only the first offset chain their
//! layouts: each series starts where the previous one ends.

use std::fmt;

use serde::Serialize;

use crate::error::FormatError;

use super::descriptor::{Axis, FormatDescriptor};

// =============================================================================
// Region / PlaneAddress
// =============================================================================

/// Sub-rectangle of a plane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole plane described by `desc`.
    pub const fn full(desc: &FormatDescriptor) -> Self {
        Self::new(0, 0, desc.width, desc.height)
    }

    /// Check the region fits inside the plane and is not empty.
    pub fn check(&self, desc: &FormatDescriptor) -> Result<(), FormatError> {
        let fits_x = (self.x as u64 + self.width as u64) <= desc.width as u64;
        let fits_y = (self.y as u64 + self.height as u64) <= desc.height as u64;
        if self.width == 0 || self.height == 0 || !fits_x || !fits_y {
            return Err(FormatError::InvalidRegion {
                region: *self,
                width: desc.width,
                height: desc.height,
            });
        }
        Ok(())
    }

    pub fn is_full(&self, desc: &FormatDescriptor) -> bool {
        *self == Self::full(desc)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

impl std::str::FromStr for Region {
    type Err = String;

    /// Parse `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid region '{}': {}", s, e))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Region::new(*x, *y, *w, *h)),
            _ => Err(format!("invalid region '{}': expected x,y,width,height", s)),
        }
    }
}

/// Location of one stored plane in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaneAddress {
    pub offset: u64,
    pub length: u64,
}

// =============================================================================
// SeriesLayout
// =============================================================================

/// How the planes of one series are placed in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesLayout {
    /// Planes follow each other at a fixed stride.
    Contiguous {
        base: u64,
        stride: u64,
        plane_length: u64,
    },
    /// Explicit per-plane addresses.
    Table(Vec<PlaneAddress>),
}

impl SeriesLayout {
    /// Headerless contiguous planes with no padding between them.
    pub fn contiguous(base: u64, desc: &FormatDescriptor) -> Self {
        let plane_length = desc.stored_plane_size();
        SeriesLayout::Contiguous {
            base,
            stride: plane_length,
            plane_length,
        }
    }

    /// Total bytes spanned by all planes of the series.
    pub fn total_length(&self, image_count: usize) -> u64 {
        match self {
            SeriesLayout::Contiguous { stride, .. } => stride * image_count as u64,
            SeriesLayout::Table(entries) => entries.iter().map(|a| a.length).sum(),
        }
    }

    /// First byte after the last plane, for chaining series.
    pub fn end(&self, image_count: usize) -> u64 {
        match self {
            SeriesLayout::Contiguous { base, .. } => base + self.total_length(image_count),
            SeriesLayout::Table(entries) => entries
                .iter()
                .map(|a| a.offset + a.length)
                .max()
                .unwrap_or(0),
        }
    }

    fn address(&self, plane: usize) -> Option<PlaneAddress> {
        match self {
            SeriesLayout::Contiguous {
                base,
                stride,
                plane_length,
            } => Some(PlaneAddress {
                offset: base + plane as u64 * stride,
                length: *plane_length,
            }),
            SeriesLayout::Table(entries) => entries.get(plane).copied(),
        }
    }
}

/// Lay out series back to back starting at `first_offset`.
///
/// Each series after the first starts at the previous series' offset plus
/// its total byte length.
pub fn chain_layouts(first_offset: u64, descriptors: &[FormatDescriptor]) -> Vec<SeriesLayout> {
    let mut layouts = Vec::with_capacity(descriptors.len());
    let mut offset = first_offset;
    for desc in descriptors {
        let layout = SeriesLayout::contiguous(offset, desc);
        offset = layout.end(desc.image_count());
        layouts.push(layout);
    }
    layouts
}

// =============================================================================
// Resolution
// =============================================================================

/// Map `(series, plane)` to a byte range in a source of `source_len` bytes.
///
/// Fails with `PlaneIndexOutOfRange` when the index is not below the
/// series' image count, or when the address runs past the source.
pub fn resolve(
    desc: &FormatDescriptor,
    layout: &SeriesLayout,
    series: usize,
    plane: usize,
    source_len: u64,
) -> Result<PlaneAddress, FormatError> {
    let image_count = desc.image_count();
    let out_of_range = || FormatError::PlaneIndexOutOfRange {
        series,
        plane,
        image_count,
    };

    if plane >= image_count {
        return Err(out_of_range());
    }

    let address = layout.address(plane).ok_or_else(out_of_range)?;
    match address.offset.checked_add(address.length) {
        Some(end) if end <= source_len => Ok(address),
        _ => Err(out_of_range()),
    }
}

/// Linear plane index for coordinates `(z, c, t)`.
pub fn plane_index(desc: &FormatDescriptor, z: u32, c: u32, t: u32) -> Option<usize> {
    if z >= desc.size_z || c >= desc.size_c || t >= desc.size_t {
        return None;
    }
    let mut index = 0usize;
    let mut scale = 1usize;
    for axis in desc.dimension_order.axes() {
        let (coord, size) = axis_value(desc, axis, z, c, t);
        index += coord as usize * scale;
        scale *= size as usize;
    }
    Some(index)
}

/// Coordinates `(z, c, t)` for a linear plane index.
pub fn plane_coords(desc: &FormatDescriptor, index: usize) -> Option<(u32, u32, u32)> {
    if index >= desc.image_count() {
        return None;
    }
    let (mut z, mut c, mut t) = (0, 0, 0);
    let mut rest = index;
    for axis in desc.dimension_order.axes() {
        let size = axis_value(desc, axis, 0, 0, 0).1 as usize;
        let coord = (rest % size) as u32;
        rest /= size;
        match axis {
            Axis::Z => z = coord,
            Axis::C => c = coord,
            Axis::T => t = coord,
        }
    }
    Some((z, c, t))
}

fn axis_value(desc: &FormatDescriptor, axis: Axis, z: u32, c: u32, t: u32) -> (u32, u32) {
    match axis {
        Axis::Z => (z, desc.size_z),
        Axis::C => (c, desc.size_c),
        Axis::T => (t, desc.size_t),
    }
}

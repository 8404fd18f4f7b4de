//! Format recognition and header parsing.
//!
//! Each supported family lives in its own module with two entry points:
//!
//! - `sniff(reader) -> bool`: a bounded, side-effect-free probe
//! - `parse(reader) -> ParsedFormat`: header to descriptors, plane layouts,
//!   metadata and the codec that turns stored planes into samples
//!
//! [`detect::detect_format`] runs the sniffers in [`detect::DETECTION_ORDER`];
//! the first match wins.

pub mod arf;
pub mod biorad;
pub mod deltavision;
pub mod descriptor;
pub mod detect;
pub mod ics;
pub mod layout;
pub mod liff;
pub mod metadata;
pub mod netcdf;
pub mod raw;
pub mod rle_stack;
pub mod spe;
pub mod tiff;
pub mod tiff_family;

pub use descriptor::{Axis, DimensionOrder, FormatDescriptor, LookupTable, PixelType};
pub use detect::{detect_format, FormatKind, DETECTION_ORDER};
pub use layout::{
    chain_layouts, plane_coords, plane_index, resolve, PlaneAddress, Region, SeriesLayout,
};
pub use metadata::{Calibration, MetadataList, MetadataValue};

use crate::codec::PlaneCodec;
use crate::error::FormatError;

/// Everything a header parser learns about a source.
#[derive(Debug, Clone)]
pub struct ParsedFormat {
    /// One descriptor per series
    pub descriptors: Vec<FormatDescriptor>,
    /// Plane placement, parallel to `descriptors`
    pub layouts: Vec<SeriesLayout>,
    pub metadata: MetadataList,
    pub calibration: Calibration,
    pub codec: PlaneCodec,
    /// Name of the decoder variant that produced this result
    pub decoder_used: &'static str,
    /// Per series: decoded bytes are complemented before delivery
    pub inverted: Vec<bool>,
}

impl ParsedFormat {
    /// A single-series result with empty metadata.
    pub fn single(
        desc: FormatDescriptor,
        layout: SeriesLayout,
        codec: PlaneCodec,
        decoder_used: &'static str,
    ) -> Self {
        Self {
            descriptors: vec![desc],
            layouts: vec![layout],
            metadata: MetadataList::new(),
            calibration: Calibration::default(),
            codec,
            decoder_used,
            inverted: vec![false],
        }
    }

    pub fn series_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Stamp the series count on every descriptor and check invariants.
    pub fn finish(mut self, format: &'static str) -> Result<Self, FormatError> {
        if self.descriptors.is_empty() {
            return Err(FormatError::malformed(format, 0, "no image series found"));
        }
        if self.layouts.len() != self.descriptors.len() {
            return Err(FormatError::malformed(
                format,
                0,
                format!(
                    "{} layouts for {} series",
                    self.layouts.len(),
                    self.descriptors.len()
                ),
            ));
        }
        self.inverted.resize(self.descriptors.len(), false);

        let series_count = self.descriptors.len();
        for desc in &mut self.descriptors {
            desc.series_count = series_count;
            desc.validate(format)?;
        }
        Ok(self)
    }
}

/// Reject a plane region that starts or ends outside the source.
pub(crate) fn require_span(
    format: &'static str,
    offset: u64,
    needed: u64,
    source_len: u64,
) -> Result<(), FormatError> {
    match offset.checked_add(needed) {
        Some(end) if end <= source_len => Ok(()),
        _ => Err(FormatError::TruncatedData {
            format,
            offset,
            needed,
            available: source_len.saturating_sub(offset),
        }),
    }
}

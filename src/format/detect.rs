//! Format detection and parser dispatch.
//!
//! Every supported family is a [`FormatKind`]. Detection runs the sniffers
//! in [`DETECTION_ORDER`] and the first positive match wins, so a file that
//! satisfies several predicates (an ARF header on a file whose length is
//! also a raw table entry, a CFA TIFF that is also a TIFF) always resolves
//! the same way.
//!
//! Sniffers never fail: a read error while sniffing counts as "no match".

use tracing::debug;

use super::{
    arf, biorad, deltavision, ics, liff, netcdf, raw, rle_stack, spe, tiff_family, ParsedFormat,
};
use crate::error::FormatError;
use crate::io::RangeReader;

// =============================================================================
// FormatKind
// =============================================================================

/// A recognised format family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Liff,
    Deltavision,
    BioRad,
    Spe,
    Ics,
    NetCdf,
    TiffCfa,
    ImageJTiff,
    Tiff,
    RleStack,
    Arf,
    RawLength,
}

/// Sniffer priority. The first kind whose sniffer matches is chosen.
pub const DETECTION_ORDER: [FormatKind; 12] = [
    FormatKind::Liff,
    FormatKind::Deltavision,
    FormatKind::BioRad,
    FormatKind::Spe,
    FormatKind::Ics,
    FormatKind::NetCdf,
    FormatKind::TiffCfa,
    FormatKind::ImageJTiff,
    FormatKind::Tiff,
    FormatKind::RleStack,
    FormatKind::Arf,
    FormatKind::RawLength,
];

impl FormatKind {
    /// Human-readable format name.
    pub const fn name(&self) -> &'static str {
        match self {
            FormatKind::Liff => liff::NAME,
            FormatKind::Deltavision => deltavision::NAME,
            FormatKind::BioRad => biorad::NAME,
            FormatKind::Spe => spe::NAME,
            FormatKind::Ics => ics::NAME,
            FormatKind::NetCdf => netcdf::NAME,
            FormatKind::TiffCfa => tiff_family::CFA_NAME,
            FormatKind::ImageJTiff => tiff_family::IMAGEJ_NAME,
            FormatKind::Tiff => tiff_family::TIFF_NAME,
            FormatKind::RleStack => rle_stack::NAME,
            FormatKind::Arf => arf::NAME,
            FormatKind::RawLength => raw::NAME,
        }
    }

    /// Cheap content check, reading at most a header's worth of bytes.
    pub fn sniff<R: RangeReader + ?Sized>(&self, reader: &R) -> bool {
        match self {
            FormatKind::Liff => liff::sniff(reader),
            FormatKind::Deltavision => deltavision::sniff(reader),
            FormatKind::BioRad => biorad::sniff(reader),
            FormatKind::Spe => spe::sniff(reader),
            FormatKind::Ics => ics::sniff(reader),
            FormatKind::NetCdf => netcdf::sniff(reader),
            FormatKind::TiffCfa => tiff_family::sniff_cfa(reader),
            FormatKind::ImageJTiff => tiff_family::sniff_imagej(reader),
            FormatKind::Tiff => tiff_family::sniff_tiff(reader),
            FormatKind::RleStack => rle_stack::sniff(reader),
            FormatKind::Arf => arf::sniff(reader),
            FormatKind::RawLength => raw::sniff(reader),
        }
    }

    /// Run the header parser for this family.
    pub fn parse<R: RangeReader + ?Sized>(&self, reader: &R) -> Result<ParsedFormat, FormatError> {
        match self {
            FormatKind::Liff => liff::parse(reader),
            FormatKind::Deltavision => deltavision::parse(reader),
            FormatKind::BioRad => biorad::parse(reader),
            FormatKind::Spe => spe::parse(reader),
            FormatKind::Ics => ics::parse(reader),
            FormatKind::NetCdf => netcdf::parse(reader),
            FormatKind::TiffCfa => tiff_family::parse_cfa(reader),
            FormatKind::ImageJTiff => tiff_family::parse_imagej(reader),
            FormatKind::Tiff => tiff_family::parse_tiff(reader),
            FormatKind::RleStack => rle_stack::parse(reader),
            FormatKind::Arf => arf::parse(reader),
            FormatKind::RawLength => raw::parse(reader),
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Detect the format of a source.
///
/// # Returns
/// * `Ok(FormatKind)` - the first family in [`DETECTION_ORDER`] whose
///   sniffer matches
/// * `Err(FormatError::UnrecognizedFormat)` - no sniffer matched
pub fn detect_format<R: RangeReader + ?Sized>(reader: &R) -> Result<FormatKind, FormatError> {
    for kind in DETECTION_ORDER {
        if kind.sniff(reader) {
            debug!(format = kind.name(), source = reader.identifier(), "format detected");
            return Ok(kind);
        }
    }
    Err(FormatError::UnrecognizedFormat {
        identifier: reader.identifier().to_string(),
    })
}

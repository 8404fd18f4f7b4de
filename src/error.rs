use thiserror::Error;

use crate::format::Region;

/// I/O errors that can occur when reading from a byte source
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system
    #[error("I/O error on {identifier}: {message}")]
    Os { identifier: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Errors raised by the sample codecs (LZO, run-length, unpack, demosaic)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Compressed stream ended before an instruction was complete
    #[error("input overrun at byte {position}")]
    InputOverrun { position: usize },

    /// Decoded output would exceed the declared plane size
    #[error("output overrun: limit is {limit} bytes")]
    OutputOverrun { limit: usize },

    /// A match refers to data before the start of the output
    #[error("lookbehind overrun at byte {position}: distance {distance}, only {available} produced")]
    LookbehindOverrun {
        position: usize,
        distance: usize,
        available: usize,
    },

    /// Stream ended before the expected number of samples was produced
    #[error("stream ended after {produced} of {expected} samples")]
    ShortStream { produced: usize, expected: usize },

    /// Forward scan for a block marker found nothing within the limit
    #[error("no block marker found within {scanned} bytes")]
    MarkerNotFound { scanned: usize },

    /// Input buffer does not match the geometry it is decoded against
    #[error("buffer of {actual} bytes does not fit geometry needing {expected}")]
    GeometryMismatch { expected: usize, actual: usize },
}

/// Coarse error classification, independent of context fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    UnrecognizedFormat,
    MalformedHeader,
    UnsupportedVariant,
    PlaneIndexOutOfRange,
    SeriesOutOfRange,
    InvalidRegion,
    TruncatedData,
    DecompressionFailure,
}

/// Errors related to format detection, header parsing and plane decoding
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// No sniffer recognised the content
    #[error("Unrecognized format: {identifier}")]
    UnrecognizedFormat { identifier: String },

    /// Header is structurally invalid
    #[error("Malformed {format} header at offset {offset}: {message}")]
    MalformedHeader {
        format: &'static str,
        offset: u64,
        message: String,
    },

    /// Recognised format using an encoding or feature that is not handled
    #[error("Unsupported {format} variant: {feature}")]
    UnsupportedVariant {
        format: &'static str,
        feature: String,
    },

    /// Plane index outside [0, imageCount) or past the end of the source
    #[error("Plane {plane} out of range for series {series} ({image_count} planes)")]
    PlaneIndexOutOfRange {
        series: usize,
        plane: usize,
        image_count: usize,
    },

    /// Series index outside [0, seriesCount)
    #[error("Series {series} out of range ({series_count} series)")]
    SeriesOutOfRange { series: usize, series_count: usize },

    /// Requested region does not fit inside the plane
    #[error("Invalid region {region} for {width}x{height} plane")]
    InvalidRegion {
        region: Region,
        width: u32,
        height: u32,
    },

    /// Declared length exceeds available bytes
    #[error("Truncated {format} data at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedData {
        format: &'static str,
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// Block or run-length decoding failed
    #[error("Decompression failure in {format} data at offset {offset}: {source}")]
    DecompressionFailure {
        format: &'static str,
        offset: u64,
        source: CodecError,
    },
}

impl FormatError {
    /// Classify this error without its context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormatError::Io(_) => ErrorKind::Io,
            FormatError::UnrecognizedFormat { .. } => ErrorKind::UnrecognizedFormat,
            FormatError::MalformedHeader { .. } => ErrorKind::MalformedHeader,
            FormatError::UnsupportedVariant { .. } => ErrorKind::UnsupportedVariant,
            FormatError::PlaneIndexOutOfRange { .. } => ErrorKind::PlaneIndexOutOfRange,
            FormatError::SeriesOutOfRange { .. } => ErrorKind::SeriesOutOfRange,
            FormatError::InvalidRegion { .. } => ErrorKind::InvalidRegion,
            FormatError::TruncatedData { .. } => ErrorKind::TruncatedData,
            FormatError::DecompressionFailure { .. } => ErrorKind::DecompressionFailure,
        }
    }

    pub(crate) fn malformed(format: &'static str, offset: u64, message: impl Into<String>) -> Self {
        FormatError::MalformedHeader {
            format,
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(format: &'static str, feature: impl Into<String>) -> Self {
        FormatError::UnsupportedVariant {
            format,
            feature: feature.into(),
        }
    }
}

/// Errors that can occur when parsing TIFF containers
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

impl From<TiffError> for FormatError {
    fn from(err: TiffError) -> Self {
        match err {
            TiffError::Io(io) => FormatError::Io(io),
            other => FormatError::MalformedHeader {
                format: "TIFF",
                offset: 0,
                message: other.to_string(),
            },
        }
    }
}

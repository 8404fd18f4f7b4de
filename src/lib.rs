//! # sciplane
//!
//! Format recognition and raw-plane decoding for microscopy and other
//! scientific image containers.
//!
//! A source is any random-access byte resource. The engine sniffs it
//! against a fixed priority list of format families, parses the header into
//! one [`FormatDescriptor`] per series, resolves `(series, plane)` to a byte
//! range, and reconstructs samples: byte-order correction, sub-byte
//! unpacking, Bayer demosaicing, run-length/delta expansion and LZO block
//! decompression.
//!
//! ## Architecture
//!
//! - [`io`] - range readers, the block cache and the cursor-style [`ByteSource`]
//! - [`mod@format`] - detection, descriptors, plane layouts and one parser per family
//! - [`codec`] - the sample decoders
//! - [`engine`] - the open-source handle tying them together
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use sciplane::{Engine, EngineOptions, FileRangeReader, Region};
//!
//! fn main() -> Result<(), sciplane::FormatError> {
//!     let reader = FileRangeReader::open("stack.pic")?;
//!     let engine = Engine::open(reader, EngineOptions::default())?;
//!
//!     let desc = engine.descriptor(0)?;
//!     println!("{}x{} {} planes", desc.width, desc.height, desc.image_count());
//!
//!     let buffer = engine.decode_plane(0, 0, Some(Region::new(0, 0, 64, 64)))?;
//!     println!("{} bytes", buffer.len());
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod io;

// Re-export commonly used types
pub use codec::{BayerPattern, Packing, PlaneCodec};
pub use config::{Cli, Command, ExtractConfig, GlobalOptions};
pub use engine::{detect, Engine, EngineOptions, SampleBuffer};
pub use error::{CodecError, ErrorKind, FormatError, IoError, TiffError};
pub use format::{
    detect_format, Axis, Calibration, DimensionOrder, FormatDescriptor, FormatKind, LookupTable,
    MetadataList, MetadataValue, ParsedFormat, PixelType, PlaneAddress, Region, SeriesLayout,
    DETECTION_ORDER,
};
pub use io::{BlockCache, ByteOrder, ByteSource, FileRangeReader, MemoryReader, RangeReader};

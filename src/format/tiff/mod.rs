//! Embedded TIFF container.
//!
//! Several formats live inside TIFF files and are told apart by a tag or a
//! value prefix in the first IFD. This module reads the container only:
//!
//! - **Byte order**: `II` (little-endian) or `MM` (big-endian) in the header.
//! - **Classic TIFF vs BigTIFF**: 32-bit or 64-bit offsets, handled alike.
//! - **IFD chain**: one directory per image, linked by next offsets.
//! - **Inline vs offset values**: small values sit in the entry itself.

mod parser;
mod tags;
mod values;

pub use parser::{
    Ifd, IfdEntry, TiffContainer, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFDS, TIFF_HEADER_SIZE,
};
pub use tags::{Compression, FieldType, TiffTag};
pub use values::ValueReader;

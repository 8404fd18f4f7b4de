//! Sample decoders.
//!
//! Every stored plane is turned into canonical sample bytes by one
//! [`PlaneCodec`], fixed per source when the header is parsed:
//!
//! ```text
//!   stored bytes ──► PlaneCodec ──► full plane (descriptor byte order)
//!                                        │
//!                         engine: reorder, crop, invert
//! ```
//!
//! Codecs other than [`PlaneCodec::Direct`] always produce the full plane,
//! which the engine keeps in its decode cache.

pub mod bayer;
pub mod direct;
pub mod lzo;
pub mod rle;
pub mod unpack;

pub use bayer::{demosaic, BayerPattern};
pub use direct::{crop, crop_band, invert, reorder, swap_in_place};
pub use lzo::{decompress, decompress_blocks, find_marker, BlockOutput};
pub use rle::{expand, unpack_deltas};
pub use unpack::{unpack, unpack_to_bytes, Packing};

use serde::Serialize;
use tracing::debug;

use crate::error::CodecError;
use crate::format::FormatDescriptor;
use crate::io::ByteOrder;

/// How a stored plane becomes sample bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "codec", rename_all = "snake_case")]
pub enum PlaneCodec {
    /// Samples are stored as-is; only byte order may differ
    Direct,
    /// Sub-byte samples widened by a packing table
    Unpack { packing: Packing },
    /// One CFA sample per pixel (1 or 2 bytes) demosaiced to 16-bit RGB
    Demosaic {
        pattern: BayerPattern,
        source_bytes: usize,
    },
    /// Little-endian 16-bit run-length/delta stream
    DeltaRle { threshold: u16 },
    /// LZO1X blocks separated by `marker`, rows possibly followed by
    /// `row_padding` bytes
    Lzo { marker: [u8; 2], row_padding: usize },
}

impl PlaneCodec {
    pub fn name(&self) -> &'static str {
        match self {
            PlaneCodec::Direct => "direct",
            PlaneCodec::Unpack { .. } => "unpack",
            PlaneCodec::Demosaic { .. } => "demosaic",
            PlaneCodec::DeltaRle { .. } => "delta-rle",
            PlaneCodec::Lzo { .. } => "lzo",
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, PlaneCodec::Direct)
    }

    /// Decode one stored plane into a full plane of `desc`, with
    /// multi-byte samples in the descriptor's byte order.
    pub fn decode(
        &self,
        stored: &[u8],
        desc: &FormatDescriptor,
        resync_limit: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let order = ByteOrder::from_little_endian(desc.little_endian);
        let pixels = desc.width as usize * desc.height as usize;
        let plane_size = desc.decoded_plane_size() as usize;

        let out = match *self {
            PlaneCodec::Direct => {
                if stored.len() < plane_size {
                    return Err(CodecError::GeometryMismatch {
                        expected: plane_size,
                        actual: stored.len(),
                    });
                }
                stored[..plane_size].to_vec()
            }
            PlaneCodec::Unpack { packing } => {
                unpack_to_bytes(stored, packing, pixels * desc.channels_per_pixel(), order)?
            }
            PlaneCodec::Demosaic {
                pattern,
                source_bytes,
            } => {
                let cfa = widen_samples(stored, source_bytes, order, pixels)?;
                demosaic(
                    &cfa,
                    desc.width as usize,
                    desc.height as usize,
                    pattern,
                    order,
                )?
            }
            PlaneCodec::DeltaRle { threshold } => {
                let words: Vec<u16> = stored
                    .chunks_exact(2)
                    .map(|w| u16::from_le_bytes([w[0], w[1]]))
                    .collect();
                let samples = expand(&words, threshold, pixels)?;
                let mut out = vec![0u8; pixels * 2];
                for (chunk, sample) in out.chunks_exact_mut(2).zip(samples) {
                    order.write_u16(chunk, sample);
                }
                out
            }
            PlaneCodec::Lzo {
                marker,
                row_padding,
            } => {
                let rows = desc.height as usize;
                let width = desc.width as usize;
                let row_bytes = plane_size / rows.max(1);
                let argb = desc.rgb && desc.samples_per_pixel == 3 && desc.bytes_per_sample() == 1;
                let mut limit = (row_bytes + row_padding) * rows;
                if argb {
                    limit = limit.max((width + ARGB_ROW_EXTRA) * 4 * rows);
                }
                let block = decompress_blocks(stored, plane_size, limit, marker, resync_limit)?;
                if block.resyncs > 0 {
                    debug!(resyncs = block.resyncs, "LZO plane recovered after resync");
                }
                if argb && block.data.len() >= pixels * 4 {
                    strip_alpha(&block.data, width, rows)
                } else {
                    strip_row_padding(block.data, row_bytes, row_padding, rows)
                }
            }
        };

        if out.len() < plane_size {
            return Err(CodecError::GeometryMismatch {
                expected: plane_size,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}

/// Read `count` 8- or 16-bit samples as u16.
fn widen_samples(
    stored: &[u8],
    source_bytes: usize,
    order: ByteOrder,
    count: usize,
) -> Result<Vec<u16>, CodecError> {
    let needed = count * source_bytes;
    if stored.len() < needed {
        return Err(CodecError::GeometryMismatch {
            expected: needed,
            actual: stored.len(),
        });
    }
    Ok(match source_bytes {
        1 => stored[..count].iter().map(|&b| b as u16).collect(),
        _ => stored[..needed]
            .chunks_exact(2)
            .map(|s| order.read_u16(s))
            .collect(),
    })
}

/// Extra pixels at the end of each stored ARGB row.
const ARGB_ROW_EXTRA: usize = 4;

/// Drop the leading alpha byte of 32-bit ARGB pixels, giving interleaved
/// RGB. Rows carry [`ARGB_ROW_EXTRA`] trailing pixels when the stream is
/// long enough to hold them.
fn strip_alpha(data: &[u8], width: usize, rows: usize) -> Vec<u8> {
    let padded = (width + ARGB_ROW_EXTRA) * 4;
    let stride = if data.len() >= padded * rows {
        padded
    } else {
        width * 4
    };
    let mut out = Vec::with_capacity(width * rows * 3);
    for row in data.chunks(stride).take(rows) {
        for pixel in row[..width * 4].chunks_exact(4) {
            out.extend_from_slice(&pixel[1..4]);
        }
    }
    out
}

/// Remove per-row padding when the decoded stride shows it is present.
fn strip_row_padding(data: Vec<u8>, row_bytes: usize, padding: usize, rows: usize) -> Vec<u8> {
    if padding == 0 || rows == 0 {
        return data;
    }
    let stride = data.len() / rows;
    if stride != row_bytes + padding {
        return data;
    }
    let mut out = Vec::with_capacity(row_bytes * rows);
    for row in data.chunks_exact(stride) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelType;

    fn gray16(width: u32, height: u32, little_endian: bool) -> FormatDescriptor {
        let mut desc = FormatDescriptor::new(width, height, PixelType::Uint16);
        desc.little_endian = little_endian;
        desc
    }

    #[test]
    fn test_direct_rejects_short_plane() {
        let desc = gray16(2, 2, true);
        let err = PlaneCodec::Direct.decode(&[0; 6], &desc, 0).unwrap_err();
        assert_eq!(
            err,
            CodecError::GeometryMismatch {
                expected: 8,
                actual: 6
            }
        );
        assert_eq!(PlaneCodec::Direct.decode(&[7; 10], &desc, 0).unwrap(), vec![7; 8]);
    }

    #[test]
    fn test_delta_rle_writes_descriptor_order() {
        let desc = gray16(2, 1, false);
        let stored: Vec<u8> = [0x0102u16, 0x0304]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        let out = PlaneCodec::DeltaRle { threshold: 0xF000 }
            .decode(&stored, &desc, 0)
            .unwrap();
        assert_eq!(out, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_lzo_strips_row_padding() {
        let mut desc = FormatDescriptor::new(2, 2, PixelType::Uint8);
        desc.little_endian = false;
        let mut block = vec![17 + 8];
        block.extend_from_slice(&[1, 2, 0xAA, 0xAA, 3, 4, 0xAA, 0xAA]);
        block.extend_from_slice(&[0x11, 0, 0]);

        let codec = PlaneCodec::Lzo {
            marker: *b"IV",
            row_padding: 2,
        };
        assert_eq!(codec.decode(&block, &desc, 64).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_strip_row_padding_leaves_unpadded_rows() {
        assert_eq!(strip_row_padding(vec![1, 2, 3, 4], 2, 16, 2), vec![1, 2, 3, 4]);
        assert_eq!(strip_row_padding(vec![1, 9, 2, 9], 1, 1, 2), vec![1, 2]);
    }

    fn rgb8(width: u32, height: u32) -> FormatDescriptor {
        let mut desc = FormatDescriptor::new(width, height, PixelType::Uint8);
        desc.size_c = 3;
        desc.samples_per_pixel = 3;
        desc.rgb = true;
        desc.interleaved = true;
        desc
    }

    #[test]
    fn test_lzo_argb_drops_alpha() {
        let desc = rgb8(2, 2);
        let argb = [
            0xFF, 0x10, 0x20, 0x30, 0xFF, 0x11, 0x21, 0x31, //
            0xFF, 0x12, 0x22, 0x32, 0xFF, 0x13, 0x23, 0x33,
        ];
        let mut block = vec![17 + argb.len() as u8];
        block.extend_from_slice(&argb);
        block.extend_from_slice(&[0x11, 0, 0]);

        let codec = PlaneCodec::Lzo {
            marker: *b"IV",
            row_padding: 16,
        };
        assert_eq!(
            codec.decode(&block, &desc, 64).unwrap(),
            vec![0x10, 0x20, 0x30, 0x11, 0x21, 0x31, 0x12, 0x22, 0x32, 0x13, 0x23, 0x33]
        );
    }

    #[test]
    fn test_strip_alpha_honours_padded_stride() {
        // 1x2 plane, each row 1 pixel plus 4 trailing pixels
        let mut data = vec![0u8; 2 * 5 * 4];
        data[..4].copy_from_slice(&[0, 1, 2, 3]);
        data[20..24].copy_from_slice(&[0, 4, 5, 6]);
        assert_eq!(strip_alpha(&data, 1, 2), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_lzo_rgb_without_alpha_is_kept() {
        let desc = rgb8(2, 1);
        let mut block = vec![17 + 6];
        block.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        block.extend_from_slice(&[0x11, 0, 0]);
        let codec = PlaneCodec::Lzo {
            marker: *b"IV",
            row_padding: 16,
        };
        assert_eq!(codec.decode(&block, &desc, 64).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_demosaic_from_8bit_cfa() {
        let mut desc = FormatDescriptor::new(2, 2, PixelType::Uint16);
        desc.size_c = 3;
        desc.samples_per_pixel = 3;
        desc.rgb = true;
        desc.interleaved = true;
        let codec = PlaneCodec::Demosaic {
            pattern: BayerPattern::RGGB,
            source_bytes: 1,
        };
        let out = codec.decode(&[10, 20, 30, 40], &desc, 0).unwrap();
        assert_eq!(out.len(), 24);
        assert_eq!(&out[..6], &[10, 0, 25, 0, 40, 0]);
    }
}

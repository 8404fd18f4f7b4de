//! Plane decoding engine.
//!
//! The engine owns one open source. Opening runs detection and the header
//! parser once; every later call reads from the immutable [`ParsedFormat`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │                                                              │
//! │  decode_plane(series, plane, region)                         │
//! │    1. descriptor(series)        SeriesOutOfRange             │
//! │    2. region.check()            InvalidRegion                │
//! │    3. resolve(series, plane)    PlaneIndexOutOfRange         │
//! │    4. direct: read region rows  | codec: PlaneCache / decode │
//! │    5. byte order, inversion                                  │
//! │                                                              │
//! │    ┌────────────┐   ┌─────────────┐   ┌──────────────────┐   │
//! │    │ BlockCache │   │ ParsedFormat│   │    PlaneCache    │   │
//! │    └────────────┘   └─────────────┘   └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod cache;

pub use cache::{PlaneCache, PlaneKey, DEFAULT_PLANE_CACHE_CAPACITY};

use bytes::Bytes;
use tracing::{debug, info};

use crate::codec::{crop, crop_band, invert, reorder, PlaneCodec};
use crate::error::{CodecError, FormatError};
use crate::format::{
    detect_format, plane_index, resolve, Calibration, FormatDescriptor, FormatKind, MetadataList,
    ParsedFormat, PlaneAddress, Region,
};
use crate::io::{
    BlockCache, ByteOrder, RangeReader, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE,
};

/// Default forward-scan limit for LZO block resynchronisation.
pub const DEFAULT_RESYNC_LIMIT: usize = 64 * 1024;

// =============================================================================
// Options
// =============================================================================

/// Tunables for one open source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Decoded planes kept for non-direct codecs
    pub cache_planes: usize,
    /// Block size of the read cache in bytes
    pub block_size: usize,
    /// Blocks kept by the read cache
    pub cache_blocks: usize,
    /// Bytes scanned for an LZO block marker after a failed block
    pub resync_limit: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cache_planes: DEFAULT_PLANE_CACHE_CAPACITY,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_BLOCK_CACHE_CAPACITY,
            resync_limit: DEFAULT_RESYNC_LIMIT,
        }
    }
}

// =============================================================================
// SampleBuffer
// =============================================================================

/// Decoded samples of one plane region.
///
/// `data` holds `width x height x channels x bytes_per_sample` bytes. With
/// `interleaved` the channels of a pixel are adjacent, otherwise each
/// channel is a full `width x height` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub bytes_per_sample: usize,
    pub interleaved: bool,
    pub byte_order: ByteOrder,
}

impl SampleBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Samples as u16, for 2-byte sample buffers.
    pub fn to_u16(&self) -> Option<Vec<u16>> {
        (self.bytes_per_sample == 2).then(|| {
            self.data
                .chunks_exact(2)
                .map(|s| self.byte_order.read_u16(s))
                .collect()
        })
    }

    /// Convert planar channel blocks to interleaved pixels.
    pub fn into_interleaved(self) -> Self {
        if self.interleaved || self.channels <= 1 {
            return Self {
                interleaved: true,
                ..self
            };
        }
        let bps = self.bytes_per_sample;
        let pixels = self.width as usize * self.height as usize;
        let block = pixels * bps;
        let mut out = Vec::with_capacity(self.data.len());
        for pixel in 0..pixels {
            for channel in 0..self.channels {
                let start = channel * block + pixel * bps;
                out.extend_from_slice(&self.data[start..start + bps]);
            }
        }
        Self {
            data: out,
            interleaved: true,
            ..self
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Run the sniffers against a source without parsing it.
pub fn detect<R: RangeReader + ?Sized>(reader: &R) -> Result<FormatKind, FormatError> {
    detect_format(reader)
}

/// One open source: detected format, parsed headers and caches.
pub struct Engine<R> {
    source: BlockCache<R>,
    kind: FormatKind,
    parsed: ParsedFormat,
    planes: PlaneCache,
    resync_limit: usize,
}

impl<R: RangeReader> Engine<R> {
    /// Detect, parse and validate a source.
    pub fn open(reader: R, options: EngineOptions) -> Result<Self, FormatError> {
        let source = BlockCache::with_capacity(reader, options.block_size, options.cache_blocks);
        let kind = detect_format(&source)?;
        let parsed = kind.parse(&source)?;
        for desc in &parsed.descriptors {
            desc.validate(kind.name())?;
        }

        info!(
            source = source.identifier(),
            format = kind.name(),
            decoder = parsed.decoder_used,
            series = parsed.series_count(),
            codec = parsed.codec.name(),
            "source opened"
        );

        Ok(Self {
            source,
            kind,
            parsed,
            planes: PlaneCache::with_capacity(options.cache_planes),
            resync_limit: options.resync_limit,
        })
    }

    pub fn format(&self) -> FormatKind {
        self.kind
    }

    /// Name of the decoder variant that parsed the source.
    pub fn decoder_used(&self) -> &'static str {
        self.parsed.decoder_used
    }

    pub fn series_count(&self) -> usize {
        self.parsed.series_count()
    }

    pub fn descriptor(&self, series: usize) -> Result<&FormatDescriptor, FormatError> {
        self.parsed
            .descriptors
            .get(series)
            .ok_or(FormatError::SeriesOutOfRange {
                series,
                series_count: self.parsed.series_count(),
            })
    }

    pub fn descriptors(&self) -> &[FormatDescriptor] {
        &self.parsed.descriptors
    }

    pub fn metadata(&self) -> &MetadataList {
        &self.parsed.metadata
    }

    pub fn calibration(&self) -> &Calibration {
        &self.parsed.calibration
    }

    pub fn codec(&self) -> PlaneCodec {
        self.parsed.codec
    }

    pub fn identifier(&self) -> &str {
        self.source.identifier()
    }

    /// Linear plane index of `(z, c, t)` in a series.
    pub fn plane_index(&self, series: usize, z: u32, c: u32, t: u32) -> Result<Option<usize>, FormatError> {
        Ok(plane_index(self.descriptor(series)?, z, c, t))
    }

    /// Byte range of a stored plane.
    pub fn resolve(&self, series: usize, plane: usize) -> Result<PlaneAddress, FormatError> {
        let desc = self.descriptor(series)?;
        resolve(
            desc,
            &self.parsed.layouts[series],
            series,
            plane,
            self.source.size(),
        )
    }

    /// Decode a plane region in host byte order. `None` selects the whole
    /// plane.
    pub fn decode_plane(
        &self,
        series: usize,
        plane: usize,
        region: Option<Region>,
    ) -> Result<SampleBuffer, FormatError> {
        self.decode_plane_as(series, plane, region, ByteOrder::native())
    }

    /// Decode a plane region with multi-byte samples in `order`.
    pub fn decode_plane_as(
        &self,
        series: usize,
        plane: usize,
        region: Option<Region>,
        order: ByteOrder,
    ) -> Result<SampleBuffer, FormatError> {
        let desc = self.descriptor(series)?;
        let region = region.unwrap_or_else(|| Region::full(desc));
        region.check(desc)?;
        let address = self.resolve(series, plane)?;

        let mut data = if self.parsed.codec.is_direct() {
            self.read_direct(desc, address, &region)?
        } else {
            let full = self.decoded_plane(series, plane, desc, address)?;
            if region.is_full(desc) {
                full[..desc.decoded_plane_size() as usize].to_vec()
            } else {
                self.crop_decoded(desc, &full, &region, address)?
            }
        };

        let bps = desc.bytes_per_sample();
        reorder(
            &mut data,
            bps,
            ByteOrder::from_little_endian(desc.little_endian),
            order,
        );
        if self.parsed.inverted.get(series).copied().unwrap_or(false) {
            invert(&mut data);
        }

        Ok(SampleBuffer {
            data,
            width: region.width,
            height: region.height,
            channels: desc.channels_per_pixel(),
            bytes_per_sample: bps,
            interleaved: desc.interleaved || desc.channels_per_pixel() == 1,
            byte_order: order,
        })
    }

    /// Release the decode cache and the source.
    pub fn close(self) {
        self.planes.clear();
        debug!(source = self.source.identifier(), "source closed");
    }

    /// Planes currently held by the decode cache.
    pub fn cached_planes(&self) -> usize {
        self.planes.len()
    }

    // -------------------------------------------------------------------------
    // Direct copy
    // -------------------------------------------------------------------------

    /// Read only the rows covered by `region`.
    fn read_direct(
        &self,
        desc: &FormatDescriptor,
        address: PlaneAddress,
        region: &Region,
    ) -> Result<Vec<u8>, FormatError> {
        let format = self.kind.name();
        let plane_size = desc.decoded_plane_size();
        if address.length < plane_size {
            return Err(FormatError::TruncatedData {
                format,
                offset: address.offset,
                needed: plane_size,
                available: address.length,
            });
        }

        let bps = desc.bytes_per_sample();
        let channels = desc.channels_per_pixel();
        let width = desc.width as usize;
        let height = desc.height as usize;
        let failure = |source| FormatError::DecompressionFailure {
            format,
            offset: address.offset,
            source,
        };

        if channels > 1 && !desc.interleaved {
            // Planar: one band per channel block
            let row_bytes = width * bps;
            let block = (row_bytes * height) as u64;
            let mut out = Vec::with_capacity(region.pixel_count() * channels * bps);
            for channel in 0..channels as u64 {
                let band = self.read_band(address.offset + channel * block, row_bytes, region)?;
                out.extend(crop_band(&band, row_bytes, bps, region).map_err(failure)?);
            }
            Ok(out)
        } else {
            let pixel_bytes = channels * bps;
            let row_bytes = width * pixel_bytes;
            let band = self.read_band(address.offset, row_bytes, region)?;
            crop_band(&band, row_bytes, pixel_bytes, region).map_err(failure)
        }
    }

    fn read_band(&self, base: u64, row_bytes: usize, region: &Region) -> Result<Bytes, FormatError> {
        let start = base + region.y as u64 * row_bytes as u64;
        let len = region.height as usize * row_bytes;
        Ok(self.source.read_exact_at(start, len)?)
    }

    // -------------------------------------------------------------------------
    // Codec planes
    // -------------------------------------------------------------------------

    fn decoded_plane(
        &self,
        series: usize,
        plane: usize,
        desc: &FormatDescriptor,
        address: PlaneAddress,
    ) -> Result<Bytes, FormatError> {
        let key = PlaneKey::new(series, plane);
        if let Some(hit) = self.planes.get(&key) {
            debug!(series, plane, "decode cache hit");
            return Ok(hit);
        }

        let stored = self
            .source
            .read_exact_at(address.offset, address.length as usize)?;
        let decoded = self
            .parsed
            .codec
            .decode(&stored, desc, self.resync_limit)
            .map_err(|err| self.codec_error(err, desc, address))?;
        let decoded = Bytes::from(decoded);
        self.planes.put(key, decoded.clone());
        Ok(decoded)
    }

    fn crop_decoded(
        &self,
        desc: &FormatDescriptor,
        full: &[u8],
        region: &Region,
        address: PlaneAddress,
    ) -> Result<Vec<u8>, FormatError> {
        let bps = desc.bytes_per_sample();
        let channels = desc.channels_per_pixel();
        let width = desc.width as usize;
        let to_format = |err| self.codec_error(err, desc, address);

        if channels > 1 && !desc.interleaved {
            let row_bytes = width * bps;
            let block = row_bytes * desc.height as usize;
            let mut out = Vec::with_capacity(region.pixel_count() * channels * bps);
            for channel in full.chunks_exact(block).take(channels) {
                out.extend(crop(channel, row_bytes, bps, region).map_err(to_format)?);
            }
            Ok(out)
        } else {
            let pixel_bytes = channels * bps;
            crop(full, width * pixel_bytes, pixel_bytes, region).map_err(to_format)
        }
    }

    /// Short run-length and unpack streams mean the stored plane is
    /// truncated; everything else is a decoding failure.
    fn codec_error(&self, err: CodecError, desc: &FormatDescriptor, address: PlaneAddress) -> FormatError {
        let format = self.kind.name();
        match (self.parsed.codec, err) {
            (
                PlaneCodec::DeltaRle { .. } | PlaneCodec::Unpack { .. },
                CodecError::ShortStream { produced, .. },
            ) => FormatError::TruncatedData {
                format,
                offset: address.offset,
                needed: desc.decoded_plane_size(),
                available: (produced * desc.bytes_per_sample()) as u64,
            },
            (_, source) => FormatError::DecompressionFailure {
                format,
                offset: address.offset,
                source,
            },
        }
    }
}

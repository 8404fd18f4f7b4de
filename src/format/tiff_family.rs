//! Formats carried in a TIFF container.
//!
//! Three families share the container parser in [`super::tiff`] and differ
//! in how they read it:
//!
//! - CFA TIFF: a raw Bayer mosaic in the first IFD, demosaiced on decode
//! - ImageJ TIFF: a hyperstack whose planes follow the first strip back to
//!   back, described by an `ImageJ=` block in ImageDescription
//! - plain TIFF: one uncompressed plane per IFD
//!
//! The sniffers only read the header and the first IFD.

use tracing::{debug, warn};

use super::metadata::{parse_key_value_lines, parse_number};
use super::tiff::{Compression, Ifd, TiffContainer, TiffHeader, TiffTag, ValueReader};
use super::{
    require_span, Calibration, DimensionOrder, FormatDescriptor, MetadataList, ParsedFormat,
    PixelType, PlaneAddress, SeriesLayout,
};
use crate::codec::{BayerPattern, PlaneCodec};
use crate::error::{FormatError, TiffError};
use crate::io::RangeReader;

pub const CFA_NAME: &str = "CFA TIFF";
pub const IMAGEJ_NAME: &str = "ImageJ TIFF";
pub const TIFF_NAME: &str = "TIFF";

/// Decoder names recorded for ImageJ files.
pub const IMAGEJ_HYPERSTACK: &str = "ImageJ hyperstack";
pub const MINIMAL_TIFF: &str = "minimal TIFF";

const IMAGEJ_MARKER: &str = "ImageJ=";

// =============================================================================
// Shared IFD reading
// =============================================================================

/// Geometry and storage of the image in one IFD.
#[derive(Debug, Clone, PartialEq)]
struct StripImage {
    width: u32,
    height: u32,
    bits: u32,
    samples: u32,
    pixel_type: PixelType,
    compression: u16,
    planar: u16,
    /// First strip offset
    offset: u64,
    /// Sum of all strip byte counts
    length: u64,
    contiguous: bool,
}

/// Narrow an image dimension to 32 bits.
fn dimension(value: u64, tag: &'static str) -> Result<u32, TiffError> {
    u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
        tag,
        message: format!("{} does not fit in 32 bits", value),
    })
}

impl StripImage {
    fn read<R: RangeReader + ?Sized>(
        values: &ValueReader<'_, R>,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let width = dimension(
            values.require_u64(ifd, TiffTag::ImageWidth, "ImageWidth")?,
            "ImageWidth",
        )?;
        let height = dimension(
            values.require_u64(ifd, TiffTag::ImageLength, "ImageLength")?,
            "ImageLength",
        )?;
        let bits = values
            .tag_u64_array(ifd, TiffTag::BitsPerSample)?
            .and_then(|b| b.first().copied())
            .unwrap_or(1) as u32;
        let samples = values.tag_u64(ifd, TiffTag::SamplesPerPixel)?.unwrap_or(1) as u32;
        let sample_format = values.tag_u64(ifd, TiffTag::SampleFormat)?.unwrap_or(1);
        let compression = values.tag_u64(ifd, TiffTag::Compression)?.unwrap_or(1) as u16;
        let planar = values.tag_u64(ifd, TiffTag::PlanarConfiguration)?.unwrap_or(1) as u16;

        let offsets = values
            .tag_u64_array(ifd, TiffTag::StripOffsets)?
            .ok_or(TiffError::MissingTag("StripOffsets"))?;
        let counts = values
            .tag_u64_array(ifd, TiffTag::StripByteCounts)?
            .ok_or(TiffError::MissingTag("StripByteCounts"))?;
        if offsets.is_empty() || offsets.len() != counts.len() {
            return Err(TiffError::InvalidTagValue {
                tag: "StripOffsets",
                message: format!(
                    "{} offsets for {} byte counts",
                    offsets.len(),
                    counts.len()
                ),
            });
        }
        let contiguous = offsets
            .windows(2)
            .zip(&counts)
            .all(|(pair, count)| pair[0] + count == pair[1]);

        let pixel_type = match (bits, sample_format) {
            (8, 1) => PixelType::Uint8,
            (8, 2) => PixelType::Int8,
            (16, 1) => PixelType::Uint16,
            (16, 2) => PixelType::Int16,
            (32, 1) => PixelType::Uint32,
            (32, 2) => PixelType::Int32,
            (32, 3) => PixelType::Float32,
            (64, 3) => PixelType::Float64,
            _ => {
                return Err(TiffError::InvalidTagValue {
                    tag: "BitsPerSample",
                    message: format!("{} bits with sample format {}", bits, sample_format),
                })
            }
        };

        Ok(Self {
            width,
            height,
            bits,
            samples,
            pixel_type,
            compression,
            planar,
            offset: offsets[0],
            length: counts.iter().sum(),
            contiguous,
        })
    }

    fn same_geometry(&self, other: &StripImage) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.samples == other.samples
            && self.pixel_type == other.pixel_type
    }

    fn descriptor(&self, header: &TiffHeader) -> FormatDescriptor {
        let mut desc = FormatDescriptor::new(self.width, self.height, self.pixel_type);
        desc.little_endian = header.byte_order.is_little_endian();
        if self.samples > 1 {
            desc.rgb = true;
            desc.interleaved = true;
            desc.samples_per_pixel = self.samples;
        }
        desc
    }

    /// Reject anything but uncompressed, chunky, contiguous strips.
    fn check_plain(&self, format: &'static str) -> Result<(), FormatError> {
        if self.compression != Compression::None as u16 {
            let name = Compression::from_u16(self.compression)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| format!("compression {}", self.compression));
            return Err(FormatError::unsupported(format, name));
        }
        if self.planar == 2 && self.samples > 1 {
            return Err(FormatError::unsupported(
                format,
                "planar configuration 2 (separate sample planes)",
            ));
        }
        if !self.contiguous {
            return Err(FormatError::unsupported(format, "non-contiguous strips"));
        }
        Ok(())
    }
}

fn first_ifd<R: RangeReader + ?Sized>(reader: &R) -> Option<(TiffHeader, Ifd)> {
    TiffContainer::open_first(reader).ok()
}

fn description<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<Option<String>, TiffError> {
    ValueReader::new(reader, header).tag_string(ifd, TiffTag::ImageDescription)
}

/// Physical pixel size in micrometres from a resolution in pixels per unit.
fn resolution_size(resolution: Option<f64>, unit: u64) -> Option<f64> {
    let per_unit = match unit {
        2 => 25_400.0,
        3 => 10_000.0,
        _ => return None,
    };
    resolution.and_then(|r| Calibration::physical_size(per_unit / r))
}

// =============================================================================
// Sniffers
// =============================================================================

pub fn sniff_cfa<R: RangeReader + ?Sized>(reader: &R) -> bool {
    first_ifd(reader).is_some_and(|(_, ifd)| ifd.has_tag(TiffTag::CfaPattern))
}

pub fn sniff_imagej<R: RangeReader + ?Sized>(reader: &R) -> bool {
    let Some((header, ifd)) = first_ifd(reader) else {
        return false;
    };
    matches!(
        description(reader, &header, &ifd),
        Ok(Some(text)) if text.starts_with(IMAGEJ_MARKER)
    )
}

pub fn sniff_tiff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    TiffContainer::read_header(reader).is_ok()
}

// =============================================================================
// CFA TIFF
// =============================================================================

pub fn parse_cfa<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let (header, ifd) = TiffContainer::open_first(reader)?;
    let values = ValueReader::new(reader, &header);
    let image = StripImage::read(&values, &ifd)?;
    image.check_plain(CFA_NAME)?;
    if image.samples != 1 || !matches!(image.pixel_type, PixelType::Uint8 | PixelType::Uint16) {
        return Err(FormatError::unsupported(
            CFA_NAME,
            format!("{} samples of {}", image.samples, image.pixel_type),
        ));
    }

    let pattern = match values.tag_bytes(&ifd, TiffTag::CfaPattern)? {
        Some(bytes) if bytes.len() == 4 => {
            BayerPattern::new([bytes[0], bytes[1], bytes[2], bytes[3]]).unwrap_or_else(|| {
                warn!(pattern = ?&bytes[..], "invalid CFA pattern, assuming RGGB");
                BayerPattern::RGGB
            })
        }
        _ => BayerPattern::RGGB,
    };
    let source_bytes = image.pixel_type.bytes_per_sample();
    let cfa_length = image.width as u64 * image.height as u64 * source_bytes as u64;
    if image.length < cfa_length {
        return Err(FormatError::TruncatedData {
            format: CFA_NAME,
            offset: image.offset,
            needed: cfa_length,
            available: image.length,
        });
    }
    require_span(CFA_NAME, image.offset, cfa_length, reader.size())?;

    let mut desc = FormatDescriptor::new(image.width, image.height, PixelType::Uint16);
    desc.little_endian = header.byte_order.is_little_endian();
    desc.bits_per_pixel = image.bits;
    desc.rgb = true;
    desc.interleaved = true;
    desc.samples_per_pixel = 3;

    debug!(
        width = image.width,
        height = image.height,
        ?pattern,
        "CFA TIFF parsed"
    );

    let layout = SeriesLayout::Table(vec![PlaneAddress {
        offset: image.offset,
        length: cfa_length,
    }]);
    let codec = PlaneCodec::Demosaic {
        pattern,
        source_bytes,
    };
    let mut parsed = ParsedFormat::single(desc, layout, codec, CFA_NAME);
    parsed.metadata.set("CFA pattern", format!("{:?}", pattern.0));
    parsed.metadata.set("Bits per sample", image.bits);
    parsed.finish(CFA_NAME)
}

// =============================================================================
// Plain TIFF
// =============================================================================

fn parse_plain_with<R: RangeReader + ?Sized>(
    reader: &R,
    container: &TiffContainer,
    format: &'static str,
    decoder: &'static str,
) -> Result<ParsedFormat, FormatError> {
    let header = &container.header;
    let values = ValueReader::new(reader, header);
    let first_ifd = container
        .first_ifd()
        .ok_or_else(|| FormatError::malformed(format, 0, "no IFDs"))?;
    let first = StripImage::read(&values, first_ifd)?;
    first.check_plain(format)?;

    let mut desc = first.descriptor(header);
    let plane_size = desc.decoded_plane_size();
    let mut addresses = Vec::with_capacity(container.ifds.len());
    for (index, ifd) in container.ifds.iter().enumerate() {
        let image = match StripImage::read(&values, ifd) {
            Ok(image) => image,
            Err(err) => {
                debug!(index, %err, "skipping unreadable IFD");
                continue;
            }
        };
        if !image.same_geometry(&first) {
            debug!(index, "skipping IFD with different geometry");
            continue;
        }
        image.check_plain(format)?;
        if image.length < plane_size {
            return Err(FormatError::TruncatedData {
                format,
                offset: image.offset,
                needed: plane_size,
                available: image.length,
            });
        }
        addresses.push(PlaneAddress {
            offset: image.offset,
            length: plane_size,
        });
    }
    require_span(format, first.offset, plane_size, reader.size())?;
    desc.size_z = addresses.len() as u32;

    let x_res = values.tag_rational(first_ifd, TiffTag::XResolution)?;
    let y_res = values.tag_rational(first_ifd, TiffTag::YResolution)?;
    let unit = values.tag_u64(first_ifd, TiffTag::ResolutionUnit)?.unwrap_or(2);

    let mut parsed = ParsedFormat::single(desc, SeriesLayout::Table(addresses), PlaneCodec::Direct, decoder);
    parsed.calibration.physical_size_x = resolution_size(x_res, unit);
    parsed.calibration.physical_size_y = resolution_size(y_res, unit);
    parsed.metadata.set("IFD count", container.ifds.len() as u32);
    parsed.metadata.set("Bits per sample", first.bits);
    if let Some(text) = description(reader, header, first_ifd)? {
        parsed.metadata.set("ImageDescription", text);
    }
    Ok(parsed)
}

pub fn parse_tiff<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let container = TiffContainer::open(reader)?;
    debug!(ifds = container.ifds.len(), "TIFF container opened");
    parse_plain_with(reader, &container, TIFF_NAME, TIFF_NAME)?.finish(TIFF_NAME)
}

// =============================================================================
// ImageJ TIFF
// =============================================================================

/// Counts declared in an ImageJ description block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJCounts {
    pub images: u32,
    pub channels: u32,
    pub slices: u32,
    pub frames: u32,
}

impl ImageJCounts {
    fn from_metadata(meta: &MetadataList) -> Self {
        let count = |key: &str| {
            meta.get_text(key)
                .and_then(|v| parse_number::<u32>(&v))
                .filter(|&n| n > 0)
        };
        let channels = count("channels").unwrap_or(1);
        let slices = count("slices").unwrap_or(1);
        let frames = count("frames").unwrap_or(1);
        let images = count("images").unwrap_or(channels * slices * frames);
        Self {
            images,
            channels,
            slices,
            frames,
        }
    }

    fn consistent(&self) -> bool {
        self.channels
            .checked_mul(self.slices)
            .and_then(|n| n.checked_mul(self.frames))
            == Some(self.images)
    }
}

/// Try the hyperstack layout: all planes contiguous from the first strip.
fn hyperstack<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    first: &StripImage,
    counts: &ImageJCounts,
) -> Result<(FormatDescriptor, SeriesLayout), String> {
    if !counts.consistent() {
        return Err(format!(
            "{} images do not match {} channels x {} slices x {} frames",
            counts.images, counts.channels, counts.slices, counts.frames
        ));
    }
    first
        .check_plain(IMAGEJ_NAME)
        .map_err(|e| e.to_string())?;

    let mut desc = first.descriptor(header);
    desc.size_c = counts.channels;
    desc.size_z = counts.slices;
    desc.size_t = counts.frames;
    desc.dimension_order = DimensionOrder::XYCZT;

    let layout = SeriesLayout::contiguous(first.offset, &desc);
    let end = layout.end(desc.image_count());
    if end > reader.size() {
        return Err(format!(
            "{} planes from offset {} need {} bytes, file has {}",
            counts.images,
            first.offset,
            end,
            reader.size()
        ));
    }
    Ok((desc, layout))
}

pub fn parse_imagej<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let container = TiffContainer::open(reader)?;
    let header = container.header;
    let first_ifd = container
        .first_ifd()
        .ok_or_else(|| FormatError::malformed(IMAGEJ_NAME, 0, "no IFDs"))?;
    let text = description(reader, &header, first_ifd)?.unwrap_or_default();
    let block = parse_key_value_lines(&text, '=');
    let counts = ImageJCounts::from_metadata(&block);

    let values = ValueReader::new(reader, &header);
    let first = StripImage::read(&values, first_ifd)?;

    let mut parsed = match hyperstack(reader, &header, &first, &counts) {
        Ok((desc, layout)) => {
            debug!(?counts, "ImageJ hyperstack layout");
            ParsedFormat::single(desc, layout, PlaneCodec::Direct, IMAGEJ_HYPERSTACK)
        }
        Err(reason) => {
            warn!(%reason, "ImageJ hyperstack layout rejected, falling back to minimal TIFF");
            let mut parsed = parse_plain_with(reader, &container, IMAGEJ_NAME, MINIMAL_TIFF)?;
            parsed.metadata.set("Fallback reason", reason);
            parsed
        }
    };

    // Calibration: ImageJ stores pixels per unit with no TIFF unit
    let unit = block.get_text("unit");
    if unit.is_some() {
        let x_res = values.tag_rational(first_ifd, TiffTag::XResolution)?;
        let y_res = values.tag_rational(first_ifd, TiffTag::YResolution)?;
        parsed.calibration.physical_size_x = x_res.and_then(|r| Calibration::physical_size(1.0 / r));
        parsed.calibration.physical_size_y = y_res.and_then(|r| Calibration::physical_size(1.0 / r));
    }
    parsed.calibration.physical_size_z = block
        .get_text("spacing")
        .and_then(|s| parse_number::<f64>(&s))
        .and_then(Calibration::physical_size);

    for (key, value) in block.iter() {
        parsed.metadata.set(key, value.clone());
    }
    parsed.metadata.set("Decoder", parsed.decoder_used);
    parsed.finish(IMAGEJ_NAME)
}

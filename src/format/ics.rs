//! Image Cytometry Standard, version 2 (header and pixels in one file).
//!
//! The header is line-oriented text. Its first line holds exactly two
//! characters, the field separator and the line separator; every later line
//! is a key made of known category words followed by values:
//!
//! ```text
//! \t\n
//! ics_version     2.0
//! layout  order   bits x y z ch t
//! layout  sizes   16 64 64 10 2 1
//! representation  byte_order  1 2
//! end
//! <pixels>
//! ```

use tracing::debug;

use super::{
    metadata::parse_number, require_span, Axis, Calibration, DimensionOrder, FormatDescriptor,
    ParsedFormat, PixelType, SeriesLayout,
};
use crate::codec::PlaneCodec;
use crate::error::FormatError;
use crate::io::RangeReader;

pub const NAME: &str = "ICS";

const MAGIC: &str = "ics_version";
/// Headers are small; refuse to hunt for `end` past this.
const MAX_HEADER: u64 = 1 << 20;

/// Words that make up keys rather than values.
const CATEGORIES: &[&str] = &[
    "ics_version",
    "filename",
    "source",
    "layout",
    "representation",
    "parameter",
    "sensor",
    "history",
    "document",
    "view",
    "end",
    "file",
    "offset",
    "parameters",
    "order",
    "sizes",
    "coordinates",
    "significant_bits",
    "format",
    "sign",
    "compression",
    "byte_order",
    "origin",
    "scale",
    "units",
    "labels",
    "type",
    "model",
    "s_params",
    "date",
    "software",
    "author",
    "label",
    "text",
];

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    let probe = (MAGIC.len() as u64 + 2).min(reader.size());
    match reader.read_exact_at(0, probe as usize) {
        Ok(head) => head.len() > 2 && head[2..].starts_with(MAGIC.as_bytes()),
        Err(_) => false,
    }
}

/// One header line split into its key and value.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderLine {
    pub key: String,
    pub value: String,
}

/// Split a header line into category words and the value that follows.
pub fn split_line(line: &str, field_sep: char) -> Option<HeaderLine> {
    let mut key = Vec::new();
    let mut tokens = line
        .split(|c: char| c == field_sep || c == ' ' || c == '\t')
        .filter(|t| !t.is_empty())
        .peekable();
    while let Some(t) = tokens.peek() {
        if !CATEGORIES.contains(t) {
            break;
        }
        key.push(*t);
        tokens.next();
    }
    if key.is_empty() {
        return None;
    }
    Some(HeaderLine {
        key: key.join(" "),
        value: tokens.collect::<Vec<_>>().join(" "),
    })
}

/// Raw header text plus the offset of the first pixel byte.
struct Header {
    lines: Vec<HeaderLine>,
    data_offset: u64,
}

fn read_header<R: RangeReader + ?Sized>(reader: &R) -> Result<Header, FormatError> {
    let len = reader.size().min(MAX_HEADER);
    let text = reader.read_exact_at(0, len as usize)?;
    if text.len() < 2 {
        return Err(FormatError::malformed(NAME, 0, "missing separator line"));
    }
    let field_sep = text[0] as char;
    let line_sep = text[1];

    let mut lines = Vec::new();
    let mut start = 2usize;
    loop {
        let Some(rel) = text[start..].iter().position(|&b| b == line_sep) else {
            return Err(FormatError::malformed(
                NAME,
                start as u64,
                "header has no end line",
            ));
        };
        let end = start + rel;
        let line = String::from_utf8_lossy(&text[start..end]);
        let next = end as u64 + 1;
        if line.trim() == "end" {
            return Ok(Header {
                lines,
                data_offset: next,
            });
        }
        if let Some(parsed) = split_line(&line, field_sep) {
            lines.push(parsed);
        }
        start = end + 1;
    }
}

fn axis_of(name: &str) -> Option<Axis> {
    match name {
        "z" => Some(Axis::Z),
        "ch" | "c" => Some(Axis::C),
        "t" => Some(Axis::T),
        _ => None,
    }
}

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let header = read_header(reader)?;

    let mut version = None;
    let mut order: Vec<String> = Vec::new();
    let mut sizes: Vec<u32> = Vec::new();
    let mut significant_bits = None;
    let mut real = false;
    let mut signed = false;
    let mut little_endian = false;
    let mut compression = String::from("uncompressed");
    let mut scale: Vec<f64> = Vec::new();
    let mut date = None;
    let mut metadata = super::MetadataList::new();

    for line in &header.lines {
        metadata.set(line.key.clone(), line.value.clone());
        let v = line.value.as_str();
        match line.key.to_ascii_lowercase().as_str() {
            "ics_version" => version = Some(v.to_string()),
            "layout order" => order = v.split_whitespace().map(str::to_string).collect(),
            "layout sizes" => {
                sizes = v
                    .split_whitespace()
                    .map(|t| parse_number(t).unwrap_or(0))
                    .collect()
            }
            "layout significant_bits" => significant_bits = parse_number::<u32>(v),
            "representation format" => real = v.eq_ignore_ascii_case("real"),
            "representation sign" => signed = v.eq_ignore_ascii_case("signed"),
            "representation byte_order" => {
                little_endian = v.split_whitespace().next() == Some("1")
            }
            "representation compression" => compression = v.to_ascii_lowercase(),
            "parameter scale" => {
                scale = v
                    .split_whitespace()
                    .map(|t| parse_number(t).unwrap_or(0.0))
                    .collect()
            }
            "history date" if !v.is_empty() => date = Some(v.to_string()),
            _ => {}
        }
    }

    match version.as_deref() {
        Some("2.0") => {}
        Some("1.0") => {
            return Err(FormatError::unsupported(
                NAME,
                "version 1.0 with a separate .ids data file",
            ))
        }
        Some(other) => {
            return Err(FormatError::unsupported(NAME, format!("version {}", other)))
        }
        None => return Err(FormatError::malformed(NAME, 2, "missing ics_version line")),
    }
    if compression != "uncompressed" {
        return Err(FormatError::unsupported(
            NAME,
            format!("{} compression", compression),
        ));
    }
    if order.len() != sizes.len() || order.first().map(String::as_str) != Some("bits") {
        return Err(FormatError::malformed(
            NAME,
            0,
            format!(
                "layout order {:?} does not match layout sizes {:?}",
                order, sizes
            ),
        ));
    }

    let bits = sizes[0];
    let pixel_type = match (real, bits) {
        (true, 32) => PixelType::Float32,
        (true, 64) => PixelType::Float64,
        (true, _) => {
            return Err(FormatError::unsupported(
                NAME,
                format!("{}-bit real samples", bits),
            ))
        }
        (false, _) => PixelType::for_bits(bits, signed).ok_or_else(|| {
            FormatError::malformed(NAME, 0, format!("unsupported sample size {} bits", bits))
        })?,
    };

    let size_of = |name: &str| {
        order
            .iter()
            .position(|a| a == name)
            .map(|i| sizes[i])
            .unwrap_or(1)
    };
    let width = size_of("x");
    let height = size_of("y");

    let mut desc = FormatDescriptor::new(width, height, pixel_type);
    desc.bits_per_pixel = significant_bits.unwrap_or(bits);
    desc.little_endian = little_endian;

    let mut axes = Vec::with_capacity(3);
    let mut channel_first = false;
    for (i, name) in order.iter().enumerate().skip(1) {
        let Some(axis) = axis_of(name) else { continue };
        let size = sizes[i].max(1);
        match axis {
            Axis::Z => desc.size_z = size,
            Axis::C => {
                desc.size_c = size;
                channel_first = order.iter().position(|a| a == "x").is_some_and(|x| i < x);
            }
            Axis::T => desc.size_t = size,
        }
        if !axes.contains(&axis) {
            axes.push(axis);
        }
    }
    for axis in [Axis::Z, Axis::C, Axis::T] {
        if !axes.contains(&axis) {
            axes.push(axis);
        }
    }
    desc.dimension_order = DimensionOrder::from_axes([axes[0], axes[1], axes[2]])
        .unwrap_or(DimensionOrder::XYZCT);

    // Channels stored ahead of x are samples of one pixel
    if channel_first && desc.size_c > 1 {
        desc.rgb = true;
        desc.interleaved = true;
        desc.samples_per_pixel = desc.size_c;
        desc.size_c = 1;
    }

    require_span(
        NAME,
        header.data_offset,
        desc.decoded_plane_size(),
        reader.size(),
    )?;
    debug!(
        width,
        height,
        z = desc.size_z,
        c = desc.size_c,
        t = desc.size_t,
        order = %desc.dimension_order,
        data_offset = header.data_offset,
        "ICS header parsed"
    );

    let physical = |name: &str| {
        order
            .iter()
            .position(|a| a == name)
            .and_then(|i| scale.get(i).copied())
            .and_then(Calibration::physical_size)
    };
    let calibration = Calibration {
        physical_size_x: physical("x"),
        physical_size_y: physical("y"),
        physical_size_z: physical("z"),
        timestamp: date,
    };

    let layout = SeriesLayout::contiguous(header.data_offset, &desc);
    let mut parsed = ParsedFormat::single(desc, layout, PlaneCodec::Direct, NAME);
    parsed.metadata = metadata;
    parsed.calibration = calibration;
    parsed.finish(NAME)
}

//! NetCDF classic: the first 2-D or higher variable as an image stack.
//!
//! ```text
//! "CDF" version(1|2) numrecs
//! dim_list   = ABSENT | 0x0A count [name length]*
//! gatt_list  = ABSENT | 0x0C count [name nc_type nelems values]*
//! var_list   = ABSENT | 0x0B count [name rank dimids vatt_list nc_type vsize begin]*
//! ```
//!
//! Names and attribute values are padded to 4 bytes. `begin` is 32-bit in
//! version 1 and 64-bit in version 2. The format is big-endian, but some
//! writers store the variable data in host order; the order of the image
//! variable is inferred from the value spread of its first plane.

use tracing::{debug, info};

use super::{
    require_span, DimensionOrder, FormatDescriptor, MetadataList, MetadataValue, ParsedFormat,
    PixelType, PlaneAddress, SeriesLayout,
};
use crate::codec::PlaneCodec;
use crate::error::FormatError;
use crate::io::{ByteOrder, ByteSource, RangeReader};

pub const NAME: &str = "NetCDF";

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;
/// Upper bound on list lengths and names, far above real headers.
const MAX_ELEMENTS: u32 = 1 << 20;

pub fn sniff<R: RangeReader + ?Sized>(reader: &R) -> bool {
    if reader.size() < 4 {
        return false;
    }
    match reader.read_exact_at(0, 4) {
        Ok(b) => &b[..3] == b"CDF" && (b[3] == 1 || b[3] == 2),
        Err(_) => false,
    }
}

// =============================================================================
// Header model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcType {
    Byte,
    Char,
    Short,
    Int,
    Float,
    Double,
}

impl NcType {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(NcType::Byte),
            2 => Some(NcType::Char),
            3 => Some(NcType::Short),
            4 => Some(NcType::Int),
            5 => Some(NcType::Float),
            6 => Some(NcType::Double),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            NcType::Byte | NcType::Char => 1,
            NcType::Short => 2,
            NcType::Int | NcType::Float => 4,
            NcType::Double => 8,
        }
    }

    pub fn pixel_type(self) -> PixelType {
        match self {
            NcType::Byte => PixelType::Int8,
            NcType::Char => PixelType::Uint8,
            NcType::Short => PixelType::Int16,
            NcType::Int => PixelType::Int32,
            NcType::Float => PixelType::Float32,
            NcType::Double => PixelType::Float64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    /// Zero for the record dimension
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: MetadataValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dim_ids: Vec<u32>,
    pub attributes: Vec<Attribute>,
    pub nc_type: NcType,
    pub vsize: u32,
    pub begin: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: u8,
    pub record_count: u32,
    pub dimensions: Vec<Dimension>,
    pub attributes: Vec<Attribute>,
    pub variables: Vec<Variable>,
}

impl Header {
    fn is_record_variable(&self, var: &Variable) -> bool {
        var.dim_ids
            .first()
            .and_then(|&id| self.dimensions.get(id as usize))
            .is_some_and(|d| d.length == 0)
    }

    /// Bytes per record across all record variables.
    fn record_size(&self) -> u64 {
        self.variables
            .iter()
            .filter(|v| self.is_record_variable(v))
            .map(|v| v.vsize as u64)
            .sum()
    }

    fn dimension_length(&self, id: u32) -> Option<u32> {
        self.dimensions.get(id as usize).map(|d| {
            if d.length == 0 {
                self.record_count
            } else {
                d.length
            }
        })
    }
}

// =============================================================================
// Header parsing
// =============================================================================

fn read_count<R: RangeReader + ?Sized>(
    src: &mut ByteSource<'_, R>,
    what: &str,
) -> Result<u32, FormatError> {
    let offset = src.position();
    let count = src.read_u32()?;
    if count > MAX_ELEMENTS {
        return Err(FormatError::malformed(
            NAME,
            offset,
            format!("{} count {} is implausible", what, count),
        ));
    }
    Ok(count)
}

fn padded(len: u64) -> u64 {
    len.div_ceil(4) * 4
}

fn read_name<R: RangeReader + ?Sized>(src: &mut ByteSource<'_, R>) -> Result<String, FormatError> {
    let len = read_count(src, "name length")? as u64;
    let start = src.position();
    let bytes = src.read_bytes(len as usize)?;
    src.seek(start + padded(len));
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a list tag, returning the element count (0 when absent).
fn read_list_tag<R: RangeReader + ?Sized>(
    src: &mut ByteSource<'_, R>,
    expected: u32,
) -> Result<u32, FormatError> {
    let offset = src.position();
    let tag = src.read_u32()?;
    let count = read_count(src, "list")?;
    if tag == 0 && count == 0 {
        return Ok(0);
    }
    if tag != expected {
        return Err(FormatError::malformed(
            NAME,
            offset,
            format!("expected list tag {:#x}, found {:#x}", expected, tag),
        ));
    }
    Ok(count)
}

fn attribute_value(nc_type: NcType, bytes: &[u8]) -> MetadataValue {
    let order = ByteOrder::BigEndian;
    let numbers: Vec<String> = match nc_type {
        NcType::Char => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            return MetadataValue::Text(String::from_utf8_lossy(&bytes[..end]).trim().to_string());
        }
        NcType::Byte => bytes.iter().map(|&b| (b as i8).to_string()).collect(),
        NcType::Short => bytes
            .chunks_exact(2)
            .map(|c| (order.read_u16(c) as i16).to_string())
            .collect(),
        NcType::Int => bytes
            .chunks_exact(4)
            .map(|c| (order.read_u32(c) as i32).to_string())
            .collect(),
        NcType::Float => bytes
            .chunks_exact(4)
            .map(|c| f32::from_bits(order.read_u32(c)).to_string())
            .collect(),
        NcType::Double => bytes
            .chunks_exact(8)
            .map(|c| f64::from_bits(order.read_u64(c)).to_string())
            .collect(),
    };
    if numbers.len() == 1 {
        let text = &numbers[0];
        if let Ok(i) = text.parse::<i64>() {
            return MetadataValue::Integer(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return MetadataValue::Float(f);
        }
    }
    MetadataValue::Text(numbers.join(" "))
}

fn read_attributes<R: RangeReader + ?Sized>(
    src: &mut ByteSource<'_, R>,
) -> Result<Vec<Attribute>, FormatError> {
    let count = read_list_tag(src, NC_ATTRIBUTE)?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_name(src)?;
        let type_offset = src.position();
        let nc_type = NcType::from_code(src.read_u32()?).ok_or_else(|| {
            FormatError::malformed(NAME, type_offset, "unknown attribute type")
        })?;
        let nelems = read_count(src, "attribute value")? as u64;
        let len = nelems * nc_type.size() as u64;
        let start = src.position();
        let bytes = src.read_bytes(len as usize)?;
        src.seek(start + padded(len));
        attributes.push(Attribute {
            name,
            value: attribute_value(nc_type, &bytes),
        });
    }
    Ok(attributes)
}

/// Parse the classic header.
pub fn read_header<R: RangeReader + ?Sized>(reader: &R) -> Result<Header, FormatError> {
    let mut src = ByteSource::new(reader, ByteOrder::BigEndian);
    let magic = src.read_bytes(4)?;
    if &magic[..3] != b"CDF" || !(magic[3] == 1 || magic[3] == 2) {
        return Err(FormatError::malformed(NAME, 0, "missing CDF magic"));
    }
    let version = magic[3];
    let record_count = src.read_u32()?;

    let dim_count = read_list_tag(&mut src, NC_DIMENSION)?;
    let mut dimensions = Vec::with_capacity(dim_count as usize);
    for _ in 0..dim_count {
        let name = read_name(&mut src)?;
        let length = src.read_u32()?;
        dimensions.push(Dimension { name, length });
    }

    let attributes = read_attributes(&mut src)?;

    let var_count = read_list_tag(&mut src, NC_VARIABLE)?;
    let mut variables = Vec::with_capacity(var_count as usize);
    for _ in 0..var_count {
        let name = read_name(&mut src)?;
        let rank = read_count(&mut src, "rank")?;
        let mut dim_ids = Vec::with_capacity(rank as usize);
        for _ in 0..rank {
            let offset = src.position();
            let id = src.read_u32()?;
            if id as usize >= dimensions.len() {
                return Err(FormatError::malformed(
                    NAME,
                    offset,
                    format!("variable {} uses unknown dimension {}", name, id),
                ));
            }
            dim_ids.push(id);
        }
        let var_attributes = read_attributes(&mut src)?;
        let type_offset = src.position();
        let nc_type = NcType::from_code(src.read_u32()?).ok_or_else(|| {
            FormatError::malformed(NAME, type_offset, format!("variable {} has unknown type", name))
        })?;
        let vsize = src.read_u32()?;
        let begin = if version == 1 {
            src.read_u32()? as u64
        } else {
            src.read_u64()?
        };
        variables.push(Variable {
            name,
            dim_ids,
            attributes: var_attributes,
            nc_type,
            vsize,
            begin,
        });
    }

    Ok(Header {
        version,
        record_count,
        dimensions,
        attributes,
        variables,
    })
}

// =============================================================================
// Byte-order inference
// =============================================================================

/// Span (max - min) of the samples in `plane` read in `order`, ignoring NaN.
fn value_span(plane: &[u8], pixel_type: PixelType, order: ByteOrder) -> Option<f64> {
    let size = pixel_type.bytes_per_sample();
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for sample in plane.chunks_exact(size) {
        let value = match pixel_type {
            PixelType::Int16 => order.read_u16(sample) as i16 as f64,
            PixelType::Uint16 => order.read_u16(sample) as f64,
            PixelType::Int32 => order.read_u32(sample) as i32 as f64,
            PixelType::Uint32 => order.read_u32(sample) as f64,
            PixelType::Float32 => f32::from_bits(order.read_u32(sample)) as f64,
            PixelType::Float64 => f64::from_bits(order.read_u64(sample)),
            PixelType::Int8 => sample[0] as i8 as f64,
            PixelType::Uint8 => sample[0] as f64,
        };
        if value.is_nan() {
            continue;
        }
        min = min.min(value);
        max = max.max(value);
    }
    (min <= max).then_some(max - min)
}

/// Pick the byte order whose first-plane values spread least.
///
/// Single-byte samples, and ties, keep big-endian.
pub fn infer_byte_order(plane: &[u8], pixel_type: PixelType) -> ByteOrder {
    if pixel_type.bytes_per_sample() == 1 {
        return ByteOrder::BigEndian;
    }
    let big = value_span(plane, pixel_type, ByteOrder::BigEndian);
    let little = value_span(plane, pixel_type, ByteOrder::LittleEndian);
    match (big, little) {
        (Some(b), Some(l)) if l < b => ByteOrder::LittleEndian,
        (None, Some(_)) => ByteOrder::LittleEndian,
        _ => ByteOrder::BigEndian,
    }
}

// =============================================================================
// Parse
// =============================================================================

pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<ParsedFormat, FormatError> {
    let header = read_header(reader)?;
    let var = header
        .variables
        .iter()
        .find(|v| v.dim_ids.len() >= 2)
        .ok_or_else(|| FormatError::malformed(NAME, 0, "no variable of rank 2 or more"))?;
    let rank = var.dim_ids.len();
    if rank > 4 {
        return Err(FormatError::unsupported(
            NAME,
            format!("variable {} has rank {}", var.name, rank),
        ));
    }

    let lengths: Vec<u32> = var
        .dim_ids
        .iter()
        .map(|&id| header.dimension_length(id).unwrap_or(0))
        .collect();
    let width = lengths[rank - 1];
    let height = lengths[rank - 2];
    let mut desc = FormatDescriptor::new(width, height, var.nc_type.pixel_type());
    desc.dimension_order = DimensionOrder::XYZTC;
    match rank {
        3 => desc.size_z = lengths[0],
        4 => {
            desc.size_t = lengths[0];
            desc.size_z = lengths[1];
        }
        _ => {}
    }

    let plane_size = desc.decoded_plane_size();
    let image_count = desc.image_count() as u64;
    let addresses: Vec<PlaneAddress> = if header.is_record_variable(var) {
        let record_size = header.record_size();
        let per_record = if rank > 2 {
            (image_count / lengths[0].max(1) as u64).max(1)
        } else {
            1
        };
        (0..image_count)
            .map(|p| PlaneAddress {
                offset: var.begin + (p / per_record) * record_size + (p % per_record) * plane_size,
                length: plane_size,
            })
            .collect()
    } else {
        (0..image_count)
            .map(|p| PlaneAddress {
                offset: var.begin + p * plane_size,
                length: plane_size,
            })
            .collect()
    };

    require_span(NAME, var.begin, plane_size, reader.size())?;
    let first_plane = reader.read_exact_at(var.begin, plane_size as usize)?;
    let order = infer_byte_order(&first_plane, desc.pixel_type);
    desc.little_endian = order.is_little_endian();
    if order.is_little_endian() {
        info!(variable = %var.name, "NetCDF data looks little-endian");
    }
    debug!(
        variable = %var.name,
        width,
        height,
        z = desc.size_z,
        t = desc.size_t,
        ?order,
        "NetCDF header parsed"
    );

    let mut metadata = MetadataList::new();
    metadata.set("Version", header.version as i64);
    metadata.set("Variable", var.name.clone());
    for attr in &header.attributes {
        metadata.set(attr.name.clone(), attr.value.clone());
    }
    for attr in &var.attributes {
        metadata.set(format!("{} {}", var.name, attr.name), attr.value.clone());
    }
    metadata.set(
        "Byte order",
        if order.is_little_endian() {
            "little-endian"
        } else {
            "big-endian"
        },
    );

    let mut parsed = ParsedFormat::single(
        desc,
        SeriesLayout::Table(addresses),
        PlaneCodec::Direct,
        NAME,
    );
    parsed.metadata = metadata;
    parsed.finish(NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::MemoryReader;

    fn name(out: &mut Vec<u8>, text: &str) {
        out.extend_from_slice(&(text.len() as u32).to_be_bytes());
        out.extend_from_slice(text.as_bytes());
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    /// A version-1 file with dims (z, y, x) and one short variable over
    /// `dims`, data appended after the header.
    fn netcdf(dims: &[(&str, u32)], var_dims: &[u32], record_count: u32, data: &[u8]) -> Vec<u8> {
        let mut out = b"CDF\x01".to_vec();
        out.extend_from_slice(&record_count.to_be_bytes());

        out.extend_from_slice(&NC_DIMENSION.to_be_bytes());
        out.extend_from_slice(&(dims.len() as u32).to_be_bytes());
        for (n, len) in dims {
            name(&mut out, n);
            out.extend_from_slice(&len.to_be_bytes());
        }

        out.extend_from_slice(&NC_ATTRIBUTE.to_be_bytes());
        out.extend_from_slice(&2u32.to_be_bytes());
        name(&mut out, "title");
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&5u32.to_be_bytes());
        out.extend_from_slice(b"cells\0\0\0");
        name(&mut out, "scale");
        out.extend_from_slice(&3u32.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&7i16.to_be_bytes());
        out.extend_from_slice(&[0, 0]);

        out.extend_from_slice(&NC_VARIABLE.to_be_bytes());
        out.extend_from_slice(&2u32.to_be_bytes());
        // A 1-D variable that must be skipped
        name(&mut out, "axis");
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&(dims.len() as u32 - 1).to_be_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&3u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());

        name(&mut out, "image");
        out.extend_from_slice(&(var_dims.len() as u32).to_be_bytes());
        for id in var_dims {
            out.extend_from_slice(&id.to_be_bytes());
        }
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&3u32.to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let begin = out.len() + 4;
        out.extend_from_slice(&(begin as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    fn shorts(values: &[i16], little: bool) -> Vec<u8> {
        values
            .iter()
            .flat_map(|v| if little { v.to_le_bytes() } else { v.to_be_bytes() })
            .collect()
    }

    #[test]
    fn test_sniff() {
        assert!(sniff(&MemoryReader::new(b"CDF\x01rest".to_vec(), "a.nc")));
        assert!(sniff(&MemoryReader::new(b"CDF\x02rest".to_vec(), "a.nc")));
        assert!(!sniff(&MemoryReader::new(b"CDF\x03rest".to_vec(), "a.nc")));
    }

    #[test]
    fn test_first_rank_two_variable_is_the_image() {
        let values: Vec<i16> = (0..24).collect();
        let data = netcdf(
            &[("z", 2), ("y", 3), ("x", 4)],
            &[0, 1, 2],
            0,
            &shorts(&values, false),
        );
        let parsed = parse(&MemoryReader::new(data, "s.nc")).unwrap();
        let desc = &parsed.descriptors[0];
        assert_eq!((desc.width, desc.height, desc.size_z), (4, 3, 2));
        assert_eq!(desc.pixel_type, PixelType::Int16);
        assert!(!desc.little_endian);
        assert_eq!(parsed.metadata.get_text("Variable").as_deref(), Some("image"));
        assert_eq!(parsed.metadata.get_text("title").as_deref(), Some("cells"));
        assert_eq!(parsed.metadata.get("scale"), Some(&MetadataValue::Integer(7)));
        assert_eq!(
            parsed.metadata.get_text("Byte order").as_deref(),
            Some("big-endian")
        );
        match &parsed.layouts[0] {
            SeriesLayout::Table(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].offset - entries[0].offset, 24);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_little_endian_data_is_detected() {
        let values: Vec<i16> = (100..112).collect();
        let data = netcdf(&[("y", 3), ("x", 4)], &[0, 1], 0, &shorts(&values, true));
        let parsed = parse(&MemoryReader::new(data, "le.nc")).unwrap();
        assert!(parsed.descriptors[0].little_endian);
        assert_eq!(
            parsed.metadata.get_text("Byte order").as_deref(),
            Some("little-endian")
        );
    }

    #[test]
    fn test_rank_four_puts_time_outermost() {
        let data = netcdf(
            &[("t", 2), ("z", 3), ("y", 1), ("x", 2)],
            &[0, 1, 2, 3],
            0,
            &[0u8; 2 * 3 * 2 * 2],
        );
        let parsed = parse(&MemoryReader::new(data, "t.nc")).unwrap();
        let desc = &parsed.descriptors[0];
        assert_eq!((desc.size_z, desc.size_t), (3, 2));
        assert_eq!(desc.dimension_order, DimensionOrder::XYZTC);
    }

    #[test]
    fn test_record_dimension_uses_record_count() {
        let data = netcdf(&[("t", 0), ("y", 2), ("x", 2)], &[0, 1, 2], 3, &[0u8; 8 * 3]);
        let parsed = parse(&MemoryReader::new(data, "r.nc")).unwrap();
        assert_eq!(parsed.descriptors[0].size_z, 3);
    }

    #[test]
    fn test_no_image_variable() {
        let data = netcdf(&[("x", 4)], &[0], 0, &[0u8; 8]);
        let err = parse(&MemoryReader::new(data, "n.nc")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
    }

    // -------------------------------------------------------------------------
    // Byte-order inference
    // -------------------------------------------------------------------------

    #[test]
    fn test_value_span_ignores_nan() {
        let plane: Vec<u8> = [f32::NAN, 1.0, 3.0]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        assert_eq!(
            value_span(&plane, PixelType::Float32, ByteOrder::BigEndian),
            Some(2.0)
        );
        let all_nan = f32::NAN.to_be_bytes();
        assert_eq!(value_span(&all_nan, PixelType::Float32, ByteOrder::BigEndian), None);
    }

    #[test]
    fn test_tie_keeps_big_endian() {
        assert_eq!(
            infer_byte_order(&[0u8; 8], PixelType::Int16),
            ByteOrder::BigEndian
        );
        assert_eq!(
            infer_byte_order(&[1, 2, 3], PixelType::Uint8),
            ByteOrder::BigEndian
        );
    }
}

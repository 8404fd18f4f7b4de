//! Test utilities for integration tests.
//!
//! A request-tracking reader plus builders that synthesise every supported
//! format in memory. Builders write the smallest header the parser accepts
//! followed by caller-supplied pixel bytes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use sciplane::error::IoError;
use sciplane::io::RangeReader;

// =============================================================================
// Mock Range Reader with Request Tracking
// =============================================================================

/// A reader over in-memory bytes that records every request.
pub struct TrackingMockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl TrackingMockReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn get_requests(&self) -> Vec<(u64, usize)> {
        self.requests.lock().unwrap().clone()
    }

    /// Total bytes requested since the last reset.
    pub fn bytes_requested(&self) -> usize {
        self.get_requests().iter().map(|(_, len)| len).sum()
    }

    pub fn reset_tracking(&self) {
        self.request_count.store(0, Ordering::SeqCst);
        self.requests.lock().unwrap().clear();
    }
}

impl Clone for TrackingMockReader {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            identifier: self.identifier.clone(),
            request_count: Arc::clone(&self.request_count),
            requests: Arc::clone(&self.requests),
        }
    }
}

impl RangeReader for TrackingMockReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((offset, len));

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Sample helpers
// =============================================================================

pub fn u16_bytes(values: &[u16], little_endian: bool) -> Vec<u8> {
    values
        .iter()
        .flat_map(|v| {
            if little_endian {
                v.to_le_bytes()
            } else {
                v.to_be_bytes()
            }
        })
        .collect()
}

/// Deterministic byte pattern of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

// =============================================================================
// ARF
// =============================================================================

pub const ARF_PIXELS_OFFSET: usize = 524;

/// ARF with `count` planes; version 2 when `count > 1`.
pub fn create_arf(little_endian: bool, width: u16, height: u16, bits: u16, count: u16, pixels: &[u8]) -> Vec<u8> {
    let put = |v: u16| {
        if little_endian {
            v.to_le_bytes()
        } else {
            v.to_be_bytes()
        }
    };
    let mut data = if little_endian {
        vec![0x01, 0x00]
    } else {
        vec![0x00, 0x01]
    };
    data.extend_from_slice(b"AR");
    let version = if count > 1 { 2 } else { 1 };
    for field in [version, width, height, bits] {
        data.extend_from_slice(&put(field));
    }
    if version == 2 {
        data.extend_from_slice(&put(count));
    }
    data.resize(ARF_PIXELS_OFFSET, 0);
    data.extend_from_slice(pixels);
    data
}

// =============================================================================
// Deltavision
// =============================================================================

pub const DELTAVISION_HEADER: usize = 1024;

pub fn create_deltavision(
    little_endian: bool,
    width: i32,
    height: i32,
    images: i32,
    pixel_code: i32,
    channels: i16,
    timepoints: i16,
    pixels: &[u8],
) -> Vec<u8> {
    let mut data = vec![0u8; DELTAVISION_HEADER];
    let put32 = |data: &mut Vec<u8>, at: usize, v: [u8; 4]| data[at..at + 4].copy_from_slice(&v);
    let i32b = |v: i32| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
    let f32b = |v: f32| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
    let i16b = |v: i16| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };

    put32(&mut data, 0, i32b(width));
    put32(&mut data, 4, i32b(height));
    put32(&mut data, 8, i32b(images));
    put32(&mut data, 12, i32b(pixel_code));
    put32(&mut data, 40, f32b(0.1));
    put32(&mut data, 44, f32b(0.1));
    put32(&mut data, 48, f32b(0.3));
    let sentinel = if little_endian { [0xA0, 0xC0] } else { [0xC0, 0xA0] };
    data[96..98].copy_from_slice(&sentinel);
    data[180..182].copy_from_slice(&i16b(timepoints));
    data[196..198].copy_from_slice(&i16b(channels));
    data[224..229].copy_from_slice(b"cells");
    data.extend_from_slice(pixels);
    data
}

// =============================================================================
// Bio-Rad PIC
// =============================================================================

pub const BIORAD_HEADER: usize = 76;
pub const BIORAD_NOTE: usize = 96;

pub fn create_biorad(nx: i16, ny: i16, npic: i16, byte_format: i16, pixels: &[u8], notes: &[(i16, &str)]) -> Vec<u8> {
    let mut data = vec![0u8; BIORAD_HEADER];
    data[0..2].copy_from_slice(&nx.to_le_bytes());
    data[2..4].copy_from_slice(&ny.to_le_bytes());
    data[4..6].copy_from_slice(&npic.to_le_bytes());
    data[10..14].copy_from_slice(&(!notes.is_empty() as i32).to_le_bytes());
    data[14..16].copy_from_slice(&byte_format.to_le_bytes());
    data[18..23].copy_from_slice(b"cells");
    data[54..56].copy_from_slice(&12345i16.to_le_bytes());
    data.extend_from_slice(pixels);
    for (i, (note_type, text)) in notes.iter().enumerate() {
        let mut note = vec![0u8; BIORAD_NOTE];
        let has_next = i + 1 < notes.len();
        note[2..6].copy_from_slice(&(has_next as i32).to_le_bytes());
        note[10..12].copy_from_slice(&note_type.to_le_bytes());
        note[16..16 + text.len()].copy_from_slice(text.as_bytes());
        data.extend_from_slice(&note);
    }
    data
}

// =============================================================================
// Princeton SPE
// =============================================================================

pub const SPE_HEADER: usize = 4100;

pub fn create_spe(width: u16, height: u16, datatype: i16, frames: i32, pixels: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; SPE_HEADER];
    data[20..29].copy_from_slice(b"05Feb2008");
    data[42..44].copy_from_slice(&width.to_le_bytes());
    data[108..110].copy_from_slice(&datatype.to_le_bytes());
    data[656..658].copy_from_slice(&height.to_le_bytes());
    data[1446..1450].copy_from_slice(&frames.to_le_bytes());
    data[4098..4100].copy_from_slice(&0x5555u16.to_le_bytes());
    data.extend_from_slice(pixels);
    data
}

// =============================================================================
// ICS
// =============================================================================

/// ICS v2 header lines (tab separated) followed by `end` and the pixels.
pub fn create_ics(lines: &[&str], pixels: &[u8]) -> Vec<u8> {
    let mut data = b"\t\n".to_vec();
    data.extend_from_slice(b"ics_version\t2.0\n");
    for line in lines {
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
    }
    data.extend_from_slice(b"end\n");
    data.extend_from_slice(pixels);
    data
}

// =============================================================================
// NetCDF
// =============================================================================

fn netcdf_name(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(&(text.len() as u32).to_be_bytes());
    out.extend_from_slice(text.as_bytes());
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// Classic NetCDF with dims `(z, y, x)` and one short variable over them.
pub fn create_netcdf(z: u32, y: u32, x: u32, data: &[u8]) -> Vec<u8> {
    let mut out = b"CDF\x01".to_vec();
    out.extend_from_slice(&0u32.to_be_bytes());

    out.extend_from_slice(&0x0Au32.to_be_bytes());
    out.extend_from_slice(&3u32.to_be_bytes());
    for (name, len) in [("z", z), ("y", y), ("x", x)] {
        netcdf_name(&mut out, name);
        out.extend_from_slice(&len.to_be_bytes());
    }

    // No global attributes
    out.extend_from_slice(&[0u8; 8]);

    out.extend_from_slice(&0x0Bu32.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    netcdf_name(&mut out, "image");
    out.extend_from_slice(&3u32.to_be_bytes());
    for id in [0u32, 1, 2] {
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

// =============================================================================
// Openlab LIFF
// =============================================================================

const LIFF_MAGIC: u64 = 0xffff_696d_7072;
const LIFF_NAME_FIELD: usize = 256;

/// One tag of a LIFF file.
pub struct LiffTag {
    pub tag: i16,
    pub fmt: [u8; 4],
    pub body: Vec<u8>,
}

pub fn create_liff(version: i32, tags: &[LiffTag]) -> Vec<u8> {
    let header_len = if version == 2 { 16 } else { 24 };
    let mut data = Vec::new();
    data.extend_from_slice(&LIFF_MAGIC.to_be_bytes());
    data.extend_from_slice(&version.to_be_bytes());
    data.extend_from_slice(&(tags.len() as i16).to_be_bytes());
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(&20i32.to_be_bytes());

    for tag in tags {
        let start = data.len();
        let next = start + header_len + tag.body.len();
        data.extend_from_slice(&tag.tag.to_be_bytes());
        data.extend_from_slice(&0i16.to_be_bytes());
        if version == 2 {
            data.extend_from_slice(&(next as u32).to_be_bytes());
        } else {
            data.extend_from_slice(&(next as u64).to_be_bytes());
        }
        data.extend_from_slice(&tag.fmt);
        data.resize(start + header_len, 0);
        data.extend_from_slice(&tag.body);
    }
    data
}

fn liff_image_prefix(volume_type: i16, name: &str) -> Vec<u8> {
    let mut body = vec![0u8; 24];
    body.extend_from_slice(&volume_type.to_be_bytes());
    body.extend_from_slice(&[0u8; 16]);
    let mut field = vec![0u8; LIFF_NAME_FIELD];
    field[..name.len()].copy_from_slice(name.as_bytes());
    body.extend_from_slice(&field);
    body
}

/// Version 2 image tag with uncompressed pixels.
pub fn liff_v2_image(volume_type: i16, name: &str, width: i16, height: i16, pixels: &[u8]) -> LiffTag {
    let mut body = liff_image_prefix(volume_type, name);
    body.extend_from_slice(&[0, 0]);
    for v in [0i16, 0, height, width] {
        body.extend_from_slice(&v.to_be_bytes());
    }
    body.extend_from_slice(pixels);
    LiffTag {
        tag: 67,
        fmt: *b"RAW ",
        body,
    }
}

/// Version 5 image tag carrying an LZO stream.
pub fn liff_v5_image(volume_type: i16, width: i32, height: i32, stream: &[u8]) -> LiffTag {
    let mut body = liff_image_prefix(volume_type, "plane");
    body.extend_from_slice(&width.to_be_bytes());
    body.extend_from_slice(&height.to_be_bytes());
    body.extend_from_slice(&[0u8; 8]);
    body.extend_from_slice(stream);
    LiffTag {
        tag: 68,
        fmt: *b"LZO ",
        body,
    }
}

/// An LZO1X block holding `payload` as literals.
pub fn lzo_literal_block(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= 238);
    let mut block = vec![17 + payload.len() as u8];
    block.extend_from_slice(payload);
    block.extend_from_slice(&[0x11, 0, 0]);
    block
}

// =============================================================================
// TIFF
// =============================================================================

/// A TIFF field value.
pub enum TiffValue {
    Short(u16),
    Long(u32),
    Ascii(String),
    Rational(u32, u32),
    Bytes(Vec<u8>),
}

fn encode_tiff_value(value: &TiffValue) -> (u16, u32, Vec<u8>) {
    match value {
        TiffValue::Short(v) => (3, 1, v.to_le_bytes().to_vec()),
        TiffValue::Long(v) => (4, 1, v.to_le_bytes().to_vec()),
        TiffValue::Ascii(s) => {
            let mut b = s.as_bytes().to_vec();
            b.push(0);
            (2, b.len() as u32, b)
        }
        TiffValue::Rational(n, d) => {
            let mut b = n.to_le_bytes().to_vec();
            b.extend_from_slice(&d.to_le_bytes());
            (5, 1, b)
        }
        TiffValue::Bytes(b) => (1, b.len() as u32, b.clone()),
    }
}

/// Basic tags of an uncompressed chunky image.
pub fn tiff_image_tags(width: u16, height: u16, bits: u16, samples: u16) -> Vec<(u16, TiffValue)> {
    vec![
        (256, TiffValue::Short(width)),
        (257, TiffValue::Short(height)),
        (258, TiffValue::Short(bits)),
        (259, TiffValue::Short(1)),
        (277, TiffValue::Short(samples)),
    ]
}

/// Little-endian TIFF: pixel blobs first, then one IFD per plane with
/// single-strip StripOffsets/StripByteCounts added.
pub fn create_tiff(planes: Vec<(Vec<(u16, TiffValue)>, Vec<u8>)>) -> Vec<u8> {
    let mut data = b"II\x2A\x00\0\0\0\0".to_vec();
    let mut strips = Vec::new();
    for (_, pixels) in &planes {
        strips.push((data.len() as u32, pixels.len() as u32));
        data.extend_from_slice(pixels);
    }
    if data.len() % 2 == 1 {
        data.push(0);
    }
    let first_ifd = data.len() as u32;
    data[4..8].copy_from_slice(&first_ifd.to_le_bytes());

    let count = planes.len();
    for (i, (mut entries, _)) in planes.into_iter().enumerate() {
        entries.push((273, TiffValue::Long(strips[i].0)));
        entries.push((279, TiffValue::Long(strips[i].1)));
        entries.sort_by_key(|(tag, _)| *tag);

        let ifd_start = data.len();
        let ifd_size = 2 + 12 * entries.len() + 4;
        let encoded: Vec<_> = entries
            .iter()
            .map(|(t, v)| (*t, encode_tiff_value(v)))
            .collect();
        let extras: usize = encoded
            .iter()
            .filter(|(_, (_, _, b))| b.len() > 4)
            .map(|(_, (_, _, b))| b.len().div_ceil(2) * 2)
            .sum();
        let next = if i + 1 < count {
            (ifd_start + ifd_size + extras) as u32
        } else {
            0
        };

        let mut extra_at = ifd_start + ifd_size;
        let mut extra_data = Vec::new();
        data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, (field, n, bytes)) in &encoded {
            data.extend_from_slice(&tag.to_le_bytes());
            data.extend_from_slice(&field.to_le_bytes());
            data.extend_from_slice(&n.to_le_bytes());
            if bytes.len() <= 4 {
                let mut inline = bytes.clone();
                inline.resize(4, 0);
                data.extend_from_slice(&inline);
            } else {
                data.extend_from_slice(&(extra_at as u32).to_le_bytes());
                let mut padded = bytes.clone();
                padded.resize(bytes.len().div_ceil(2) * 2, 0);
                extra_at += padded.len();
                extra_data.extend_from_slice(&padded);
            }
        }
        data.extend_from_slice(&next.to_le_bytes());
        data.extend_from_slice(&extra_data);
    }
    data
}

// =============================================================================
// Delta-RLE stack
// =============================================================================

pub fn create_rle_stack(width: u16, height: u16, threshold: u16, planes: &[Vec<u16>]) -> Vec<u8> {
    let mut data = b"RLDS".to_vec();
    for field in [1u16, width, height, planes.len() as u16, threshold, 0] {
        data.extend_from_slice(&field.to_le_bytes());
    }
    let mut offset = 16 + planes.len() * 8;
    for words in planes {
        data.extend_from_slice(&(offset as u32).to_le_bytes());
        data.extend_from_slice(&(words.len() as u32 * 2).to_le_bytes());
        offset += words.len() * 2;
    }
    for words in planes {
        data.extend_from_slice(&u16_bytes(words, true));
    }
    data
}

/// Pack three signed 5-bit deltas into one word.
pub fn pack_deltas(deltas: [i16; 3]) -> u16 {
    deltas
        .iter()
        .enumerate()
        .fold(0u16, |word, (i, &d)| word | (((d as u16) & 0x1F) << (i * 5)))
}

// =============================================================================
// Raw
// =============================================================================

/// Pack 12-bit samples most significant bits first, two per three bytes.
pub fn pack_msb12(samples: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 3 / 2);
    for pair in samples.chunks(2) {
        let a = pair[0] & 0x0FFF;
        let b = pair.get(1).copied().unwrap_or(0) & 0x0FFF;
        out.push((a >> 4) as u8);
        out.push((((a & 0x0F) << 4) | (b >> 8)) as u8);
        out.push((b & 0xFF) as u8);
    }
    out
}

//! Direct copy: byte-order correction and sub-rectangle extraction.

use crate::error::CodecError;
use crate::format::Region;
use crate::io::ByteOrder;

/// Reverse the bytes of every `bytes_per_sample`-wide sample in place.
pub fn swap_in_place(buf: &mut [u8], bytes_per_sample: usize) {
    if bytes_per_sample <= 1 {
        return;
    }
    for sample in buf.chunks_exact_mut(bytes_per_sample) {
        sample.reverse();
    }
}

/// Convert samples from one byte order to another.
pub fn reorder(buf: &mut [u8], bytes_per_sample: usize, from: ByteOrder, to: ByteOrder) {
    if from != to {
        swap_in_place(buf, bytes_per_sample);
    }
}

/// Copy `region` out of a full plane whose rows are `row_bytes` long and
/// whose pixels are `pixel_bytes` wide.
pub fn crop(
    plane: &[u8],
    row_bytes: usize,
    pixel_bytes: usize,
    region: &Region,
) -> Result<Vec<u8>, CodecError> {
    let needed = (region.y as usize + region.height as usize) * row_bytes;
    if plane.len() < needed {
        return Err(CodecError::GeometryMismatch {
            expected: needed,
            actual: plane.len(),
        });
    }

    let out_row = region.width as usize * pixel_bytes;
    let start_col = region.x as usize * pixel_bytes;
    let mut out = Vec::with_capacity(out_row * region.height as usize);
    for row in region.y as usize..(region.y + region.height) as usize {
        let start = row * row_bytes + start_col;
        out.extend_from_slice(&plane[start..start + out_row]);
    }
    Ok(out)
}

/// Gather one row-strided sub-rectangle from a band of rows that starts at
/// the region's first row.
pub fn crop_band(
    band: &[u8],
    row_bytes: usize,
    pixel_bytes: usize,
    region: &Region,
) -> Result<Vec<u8>, CodecError> {
    let shifted = Region::new(region.x, 0, region.width, region.height);
    crop(band, row_bytes, pixel_bytes, &shifted)
}

/// Replace every byte with its complement.
pub fn invert(buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b = !*b;
    }
}

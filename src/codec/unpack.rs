//! Table-driven sub-byte unpacking.
//!
//! A packing layout is a group of `group_bytes` bytes holding a fixed number
//! of samples. Each sample is assembled from bit fields of the group:
//!
//! ```text
//! sample |= ((group[byte] & mask) >> shift_right) << shift_left
//! ```
//!
//! ```text
//! Msb12          b0=AAAAAAAA b1=AAAABBBB b2=BBBBBBBB
//! NibbleFirst12  b0=AAAABBBB b1=aaaaaaaa b2=bbbbbbbb   (A/B high nibbles)
//! Nibble4        b0=AAAABBBB
//! ```

use serde::Serialize;

use crate::error::CodecError;
use crate::io::ByteOrder;

/// One bit field copied from a group byte into a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub byte: usize,
    pub mask: u8,
    pub shift_right: u8,
    pub shift_left: u8,
}

const fn field(byte: usize, mask: u8, shift_right: u8, shift_left: u8) -> BitField {
    BitField {
        byte,
        mask,
        shift_right,
        shift_left,
    }
}

/// Bit layout of one packing group.
#[derive(Debug)]
pub struct PackingTable {
    pub bits: u32,
    pub group_bytes: usize,
    pub samples: &'static [&'static [BitField]],
}

static MSB_12: PackingTable = PackingTable {
    bits: 12,
    group_bytes: 3,
    samples: &[
        &[field(0, 0xFF, 0, 4), field(1, 0xF0, 4, 0)],
        &[field(1, 0x0F, 0, 8), field(2, 0xFF, 0, 0)],
    ],
};

static NIBBLE_FIRST_12: PackingTable = PackingTable {
    bits: 12,
    group_bytes: 3,
    samples: &[
        &[field(0, 0xF0, 4, 8), field(1, 0xFF, 0, 0)],
        &[field(0, 0x0F, 0, 8), field(2, 0xFF, 0, 0)],
    ],
};

static NIBBLE_4: PackingTable = PackingTable {
    bits: 4,
    group_bytes: 1,
    samples: &[&[field(0, 0xF0, 4, 0)], &[field(0, 0x0F, 0, 0)]],
};

/// Supported packing layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Packing {
    /// 12-bit samples, most significant bits first, two per three bytes
    Msb12,
    /// 12-bit samples as a shared byte of high nibbles, then one full byte each
    NibbleFirst12,
    /// 4-bit samples, high nibble first
    Nibble4,
}

impl Packing {
    pub fn table(self) -> &'static PackingTable {
        match self {
            Packing::Msb12 => &MSB_12,
            Packing::NibbleFirst12 => &NIBBLE_FIRST_12,
            Packing::Nibble4 => &NIBBLE_4,
        }
    }

    pub fn bits(self) -> u32 {
        self.table().bits
    }

    /// Bytes needed to hold `count` samples.
    pub fn packed_len(self, count: usize) -> usize {
        (count * self.bits() as usize).div_ceil(8)
    }
}

/// Unpack `count` samples from `src`.
pub fn unpack(src: &[u8], packing: Packing, count: usize) -> Result<Vec<u16>, CodecError> {
    let table = packing.table();
    let per_group = table.samples.len();
    let mut out = Vec::with_capacity(count);

    for i in 0..count {
        let base = (i / per_group) * table.group_bytes;
        let mut sample = 0u16;
        for f in table.samples[i % per_group] {
            let byte = *src.get(base + f.byte).ok_or(CodecError::ShortStream {
                produced: out.len(),
                expected: count,
            })?;
            sample |= (((byte & f.mask) >> f.shift_right) as u16) << f.shift_left;
        }
        out.push(sample);
    }

    Ok(out)
}

/// Unpack into 16-bit samples serialised in `order`, or bytes for 4-bit data.
pub fn unpack_to_bytes(
    src: &[u8],
    packing: Packing,
    count: usize,
    order: ByteOrder,
) -> Result<Vec<u8>, CodecError> {
    let samples = unpack(src, packing, count)?;
    if packing.bits() <= 8 {
        return Ok(samples.into_iter().map(|s| s as u8).collect());
    }
    let mut out = vec![0u8; count * 2];
    for (chunk, sample) in out.chunks_exact_mut(2).zip(samples) {
        order.write_u16(chunk, sample);
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn pack(samples: &[u16], packing: Packing) -> Vec<u8> {
    let table = packing.table();
    let per_group = table.samples.len();
    let mut out = vec![0u8; packing.packed_len(samples.len())];

    for (i, &sample) in samples.iter().enumerate() {
        let base = (i / per_group) * table.group_bytes;
        for f in table.samples[i % per_group] {
            let bits = ((sample >> f.shift_left) as u8) << f.shift_right;
            out[base + f.byte] |= bits & f.mask;
        }
    }
    out
}

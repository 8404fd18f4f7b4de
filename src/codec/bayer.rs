//! Bayer demosaic by neighbour averaging.
//!
//! The colour filter array stores one sample per pixel. A 2x2 pattern,
//! indexed by `(row % 2) * 2 + col % 2`, says which channel (0 red,
//! 1 green, 2 blue) each site measured:
//!
//! ```text
//!   RGGB = [0, 1, 1, 2]      col 0  col 1
//!                    row 0     R      G
//!                    row 1     G      B
//! ```
//!
//! Samples are first scattered into three full-size channel planes. Each
//! missing component is then filled with:
//! - green: the mean of the up/down/left/right neighbours
//! - red/blue at a site that measured the other of the two: the mean of
//!   the four diagonal corners
//! - otherwise: the horizontal pair if the pattern holds that channel in
//!   the same row, else the vertical pair
//!
//! Means use signed 16-bit sample values and integer division truncated
//! toward zero. The output is interleaved RGB, 16 bits per component.

use serde::Serialize;

use crate::error::CodecError;
use crate::io::ByteOrder;

const RED: u8 = 0;
const GREEN: u8 = 1;
const BLUE: u8 = 2;

/// 2x2 colour filter layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BayerPattern(pub [u8; 4]);

impl BayerPattern {
    pub const RGGB: BayerPattern = BayerPattern([RED, GREEN, GREEN, BLUE]);
    pub const BGGR: BayerPattern = BayerPattern([BLUE, GREEN, GREEN, RED]);
    pub const GRBG: BayerPattern = BayerPattern([GREEN, RED, BLUE, GREEN]);
    pub const GBRG: BayerPattern = BayerPattern([GREEN, BLUE, RED, GREEN]);

    /// Build a pattern, rejecting channel codes other than 0, 1 and 2.
    pub fn new(sites: [u8; 4]) -> Option<Self> {
        sites.iter().all(|&c| c <= BLUE).then_some(BayerPattern(sites))
    }

    #[inline]
    fn at(&self, index: usize) -> u8 {
        self.0[index]
    }
}

/// Demosaic `width x height` CFA samples into interleaved 16-bit RGB.
pub fn demosaic(
    cfa: &[u16],
    width: usize,
    height: usize,
    pattern: BayerPattern,
    order: ByteOrder,
) -> Result<Vec<u8>, CodecError> {
    let plane = width * height;
    if cfa.len() < plane || plane == 0 {
        return Err(CodecError::GeometryMismatch {
            expected: plane,
            actual: cfa.len(),
        });
    }

    let mut buf = vec![0u8; plane * 6];

    if plane == 1 {
        buf.fill(cfa[0] as u8);
        return Ok(buf);
    }

    // Scatter into R, G, B planes; unmeasured sites stay 0
    let mut s = vec![0i16; plane * 3];
    for row in 0..height {
        for col in 0..width {
            let channel = pattern.at((row % 2) * 2 + col % 2) as usize;
            s[channel * plane + row * width + col] = cfa[row * width + col] as i16;
        }
    }

    let sample = |channel: usize, row: usize, col: usize| -> i32 {
        s[channel * plane + row * width + col] as i32
    };
    let put = |buf: &mut [u8], row: usize, col: usize, component: usize, value: i16| {
        let at = row * width * 6 + col * 6 + component * 2;
        order.write_u16(&mut buf[at..at + 2], value as u16);
    };

    for row in 0..height {
        for col in 0..width {
            let even_col = col % 2 == 0;
            let index = (row % 2) * 2 + col % 2;
            let need_green = pattern.at(index) != GREEN;
            let need_red = pattern.at(index) != RED;
            let need_blue = pattern.at(index) != BLUE;
            let neighbour = if even_col { index + 1 } else { index - 1 };

            let green = if need_green {
                let mut acc = Mean::default();
                if row > 0 {
                    acc.add(sample(1, row - 1, col));
                }
                if row < height - 1 {
                    acc.add(sample(1, row + 1, col));
                }
                if col > 0 {
                    acc.add(sample(1, row, col - 1));
                }
                if col < width - 1 {
                    acc.add(sample(1, row, col + 1));
                }
                acc.value()
            } else {
                sample(1, row, col) as i16
            };
            put(&mut buf, row, col, 1, green);

            for (channel, needed, other_needed) in
                [(RED, need_red, need_blue), (BLUE, need_blue, need_red)]
            {
                let c = channel as usize;
                let value = if !needed {
                    sample(c, row, col) as i16
                } else if !other_needed {
                    corners(&sample, c, row, col, width, height)
                } else if pattern.at(neighbour) == channel {
                    let mut acc = Mean::default();
                    if col > 0 {
                        acc.add(sample(c, row, col - 1));
                    }
                    if col < width - 1 {
                        acc.add(sample(c, row, col + 1));
                    }
                    acc.value()
                } else {
                    let mut acc = Mean::default();
                    if row > 0 {
                        acc.add(sample(c, row - 1, col));
                    }
                    if row < height - 1 {
                        acc.add(sample(c, row + 1, col));
                    }
                    acc.value()
                };
                put(&mut buf, row, col, c, value);
            }
        }
    }

    Ok(buf)
}

fn corners(
    sample: &impl Fn(usize, usize, usize) -> i32,
    channel: usize,
    row: usize,
    col: usize,
    width: usize,
    height: usize,
) -> i16 {
    let mut acc = Mean::default();
    if row > 0 {
        if col > 0 {
            acc.add(sample(channel, row - 1, col - 1));
        }
        if col < width - 1 {
            acc.add(sample(channel, row - 1, col + 1));
        }
    }
    if row < height - 1 {
        if col > 0 {
            acc.add(sample(channel, row + 1, col - 1));
        }
        if col < width - 1 {
            acc.add(sample(channel, row + 1, col + 1));
        }
    }
    acc.value()
}

#[derive(Default)]
struct Mean {
    sum: i32,
    count: i32,
}

impl Mean {
    fn add(&mut self, value: i32) {
        self.sum += value;
        self.count += 1;
    }

    /// Truncating mean; a site with no neighbours reads as 0.
    fn value(&self) -> i16 {
        if self.count == 0 {
            0
        } else {
            (self.sum / self.count) as i16
        }
    }
}

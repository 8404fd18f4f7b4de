//! LZO1X block decompression with marker resynchronisation.
//!
//! One LZO1X block is a sequence of literal runs and back-references,
//! terminated by the end-of-stream match `11 00 00`. Instructions:
//!
//! ```text
//! first byte > 17      literal run of (byte - 17)
//! 0..=15               literal run of byte + 3   (0: 18 + run length)
//!   after a run:       0..=15 is a 3-byte match at distance 0x801 + ...
//! 16..=31   M4         distance 0x4000 + ..., length (t & 7) + 2
//! 32..=63   M3         distance up to 0x4000, length (t & 31) + 2
//! 64..=255  M2         distance up to 0x800, length (t >> 5) + 1
//! 0..=15    M1         2-byte match after a match
//! ```
//!
//! The low two bits of the byte two positions back from the end of a
//! match say how many literals (0-3) trail it.
//!
//! Some writers concatenate blocks and a damaged block leaves the stream
//! unusable from that point. [`decompress_blocks`] recovers by scanning
//! forward for a 2-byte block marker and resuming right after it.

use tracing::{debug, warn};

use crate::error::CodecError;

const M2_MAX_OFFSET: usize = 0x0800;
const M4_BASE_OFFSET: usize = 0x4000;

#[derive(Debug, Clone, Copy)]
enum State {
    /// Read the next instruction byte
    Instruction,
    /// Just finished a literal run
    FirstLiteralRun,
    /// Match instruction already read
    Match(usize),
    /// Decide trailing literals from the byte two back
    MatchDone,
    /// Copy `t` trailing literals, then read a match
    MatchNext(usize),
}

struct Decoder<'a> {
    src: &'a [u8],
    ip: usize,
    out: Vec<u8>,
    limit: usize,
}

impl<'a> Decoder<'a> {
    fn byte(&mut self) -> Result<u8, CodecError> {
        let b = *self
            .src
            .get(self.ip)
            .ok_or(CodecError::InputOverrun { position: self.ip })?;
        self.ip += 1;
        Ok(b)
    }

    fn le16(&mut self) -> Result<usize, CodecError> {
        let lo = self.byte()? as usize;
        let hi = self.byte()? as usize;
        Ok(lo | (hi << 8))
    }

    /// Extended length: zero bytes add 255 each, the first non-zero byte ends it.
    fn run_length(&mut self, base: usize) -> Result<usize, CodecError> {
        let mut extra = 0usize;
        loop {
            match self.byte()? {
                0 => extra += 255,
                b => return Ok(extra + base + b as usize),
            }
        }
    }

    fn need_output(&self, n: usize) -> Result<(), CodecError> {
        if self.out.len() + n > self.limit {
            return Err(CodecError::OutputOverrun { limit: self.limit });
        }
        Ok(())
    }

    fn copy_literals(&mut self, n: usize) -> Result<(), CodecError> {
        self.need_output(n)?;
        let end = self.ip + n;
        if end > self.src.len() {
            return Err(CodecError::InputOverrun { position: self.ip });
        }
        self.out.extend_from_slice(&self.src[self.ip..end]);
        self.ip = end;
        Ok(())
    }

    /// Byte-by-byte copy so overlapping matches repeat their pattern.
    fn copy_match(&mut self, distance: usize, len: usize) -> Result<(), CodecError> {
        if distance == 0 || distance > self.out.len() {
            return Err(CodecError::LookbehindOverrun {
                position: self.ip,
                distance,
                available: self.out.len(),
            });
        }
        self.need_output(len)?;
        let mut from = self.out.len() - distance;
        for _ in 0..len {
            let b = self.out[from];
            self.out.push(b);
            from += 1;
        }
        Ok(())
    }

    fn run(mut self) -> Result<(Vec<u8>, usize), CodecError> {
        let mut state = State::Instruction;

        if self.src.first().is_some_and(|&b| b > 17) {
            let t = (self.byte()? - 17) as usize;
            if t < 4 {
                state = State::MatchNext(t);
            } else {
                self.copy_literals(t)?;
                state = State::FirstLiteralRun;
            }
        }

        loop {
            state = match state {
                State::Instruction => {
                    let t = self.byte()? as usize;
                    if t >= 16 {
                        State::Match(t)
                    } else {
                        let t = if t == 0 { self.run_length(15)? } else { t };
                        self.copy_literals(t + 3)?;
                        State::FirstLiteralRun
                    }
                }
                State::FirstLiteralRun => {
                    let t = self.byte()? as usize;
                    if t >= 16 {
                        State::Match(t)
                    } else {
                        let b = self.byte()? as usize;
                        let distance = 1 + M2_MAX_OFFSET + (t >> 2) + (b << 2);
                        self.copy_match(distance, 3)?;
                        State::MatchDone
                    }
                }
                State::Match(t) => {
                    if t >= 64 {
                        let b = self.byte()? as usize;
                        let distance = 1 + ((t >> 2) & 7) + (b << 3);
                        self.copy_match(distance, (t >> 5) + 1)?;
                    } else if t >= 32 {
                        let len = match t & 31 {
                            0 => self.run_length(31)?,
                            n => n,
                        };
                        let distance = 1 + (self.le16()? >> 2);
                        self.copy_match(distance, len + 2)?;
                    } else if t >= 16 {
                        let high = (t & 8) << 11;
                        let len = match t & 7 {
                            0 => self.run_length(7)?,
                            n => n,
                        };
                        let distance = high + (self.le16()? >> 2);
                        if distance == 0 {
                            return Ok((self.out, self.ip));
                        }
                        self.copy_match(distance + M4_BASE_OFFSET, len + 2)?;
                    } else {
                        let b = self.byte()? as usize;
                        let distance = 1 + (t >> 2) + (b << 2);
                        self.copy_match(distance, 2)?;
                    }
                    State::MatchDone
                }
                State::MatchDone => match self.src[self.ip - 2] & 3 {
                    0 => State::Instruction,
                    t => State::MatchNext(t as usize),
                },
                State::MatchNext(t) => {
                    self.copy_literals(t)?;
                    State::Match(self.byte()? as usize)
                }
            };
        }
    }
}

/// Decompress one LZO1X block, producing at most `limit` bytes.
///
/// Returns the output and the number of input bytes consumed through the
/// end-of-stream marker.
pub fn decompress(src: &[u8], limit: usize) -> Result<(Vec<u8>, usize), CodecError> {
    Decoder {
        src,
        ip: 0,
        out: Vec::with_capacity(limit.min(src.len().saturating_mul(4))),
        limit,
    }
    .run()
}

/// Output of [`decompress_blocks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutput {
    pub data: Vec<u8>,
    /// Number of times decoding resumed after a marker
    pub resyncs: usize,
}

/// Find `marker` in `src[from..]`, looking at no more than `scan_limit` bytes.
pub fn find_marker(src: &[u8], from: usize, marker: [u8; 2], scan_limit: usize) -> Option<usize> {
    let end = from.saturating_add(scan_limit).min(src.len());
    if from >= end {
        return None;
    }
    src[from..end]
        .windows(2)
        .position(|w| w == marker)
        .map(|i| from + i)
}

/// Decode consecutive LZO1X blocks until `needed` bytes are produced.
///
/// A block that fails to decode is abandoned and decoding resumes after
/// the next `marker` found within `scan_limit` bytes. A block that decodes
/// cleanly but leaves the output short continues the same way. When no
/// marker is found, the original failure (or [`CodecError::ShortStream`])
/// is returned.
pub fn decompress_blocks(
    src: &[u8],
    needed: usize,
    limit: usize,
    marker: [u8; 2],
    scan_limit: usize,
) -> Result<BlockOutput, CodecError> {
    let mut data = Vec::with_capacity(needed);
    let mut pos = 0usize;
    let mut resyncs = 0usize;

    while data.len() < needed {
        let remaining = limit.saturating_sub(data.len());
        match decompress(&src[pos.min(src.len())..], remaining) {
            Ok((block, consumed)) => {
                data.extend_from_slice(&block);
                pos += consumed;
                if data.len() >= needed {
                    break;
                }
                match find_marker(src, pos, marker, scan_limit) {
                    Some(at) => {
                        debug!(offset = at, produced = data.len(), "LZO block short, continuing at marker");
                        pos = at + 2;
                        resyncs += 1;
                    }
                    None => {
                        return Err(CodecError::ShortStream {
                            produced: data.len(),
                            expected: needed,
                        })
                    }
                }
            }
            Err(err) => match find_marker(src, pos + 1, marker, scan_limit) {
                Some(at) => {
                    warn!(offset = pos, marker_at = at, error = %err, "LZO block failed, resynchronising");
                    pos = at + 2;
                    resyncs += 1;
                }
                None => return Err(err),
            },
        }
    }

    Ok(BlockOutput { data, resyncs })
}

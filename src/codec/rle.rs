//! Run-length/delta expansion of 16-bit sample streams.
//!
//! ```text
//! w <= threshold           literal sample w
//! w >  threshold           run of (w - threshold) entries:
//!   base                   first entry = base + d0
//!   ceil(count / 3) words  three signed 5-bit deltas each
//!                          bits 0-4 -> d0, 5-9 -> d1, 10-14 -> d2
//! ```
//!
//! Each run entry is the previous entry plus its delta, starting from the
//! base value. Arithmetic wraps at 16 bits.

use crate::error::CodecError;

const DELTAS_PER_WORD: usize = 3;

/// Decode the three signed 5-bit deltas packed into one word.
pub fn unpack_deltas(word: u16) -> [i16; 3] {
    let field = |shift: u16| -> i16 {
        let raw = ((word >> shift) & 0x1F) as i16;
        if raw >= 16 {
            raw - 32
        } else {
            raw
        }
    };
    [field(0), field(5), field(10)]
}

/// Expand `words` until `expected` samples exist. Samples past `expected`
/// are discarded.
pub fn expand(words: &[u16], threshold: u16, expected: usize) -> Result<Vec<u16>, CodecError> {
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0usize;

    let next = |pos: &mut usize, produced: usize| -> Result<u16, CodecError> {
        let word = *words.get(*pos).ok_or(CodecError::ShortStream {
            produced,
            expected,
        })?;
        *pos += 1;
        Ok(word)
    };

    while out.len() < expected {
        let control = next(&mut pos, out.len())?;
        if control <= threshold {
            out.push(control);
            continue;
        }

        let count = (control - threshold) as usize;
        let mut value = next(&mut pos, out.len())?;
        for group in 0..count.div_ceil(DELTAS_PER_WORD) {
            let deltas = unpack_deltas(next(&mut pos, out.len())?);
            let in_group = (count - group * DELTAS_PER_WORD).min(DELTAS_PER_WORD);
            for &delta in &deltas[..in_group] {
                value = value.wrapping_add(delta as u16);
                out.push(value);
            }
        }
    }

    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
pub(crate) fn pack_deltas(deltas: [i16; 3]) -> u16 {
    deltas
        .iter()
        .enumerate()
        .fold(0u16, |word, (i, &d)| word | (((d as u16) & 0x1F) << (i * 5)))
}

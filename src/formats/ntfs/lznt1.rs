//! LZNT1, the compression of NTFS compression units.
//!
//! A unit is a sequence of chunks, each a 16-bit header followed by at most
//! 4 KiB of data. Compressed chunks interleave flag bytes with literals and
//! back references whose offset/length split widens as the chunk fills.

use crate::format::reader::le_u16;
use crate::{Error, Result};

/// Uncompressed size of a full chunk.
pub const CHUNK_SIZE: usize = 4096;

const HEADER_COMPRESSED: u16 = 0x8000;
const HEADER_SIZE_MASK: u16 = 0x0FFF;

fn decompress_chunk(data: &[u8], out: &mut Vec<u8>, at: usize) -> Result<()> {
    let start = out.len();
    let mut i = 0;
    while i < data.len() {
        let flags = data[i];
        i += 1;
        for bit in 0..8 {
            if i >= data.len() {
                break;
            }
            if flags >> bit & 1 == 0 {
                out.push(data[i]);
                i += 1;
            } else {
                let token = le_u16(data, i)
                    .ok_or_else(|| Error::corrupt_header((at + i) as u64, "truncated back reference"))?;
                i += 2;
                let pos = out.len() - start;
                if pos == 0 {
                    return Err(Error::corrupt_header(
                        (at + i) as u64,
                        "back reference at chunk start",
                    ));
                }
                let mut shift = 12u32;
                let mut mask = 0x0FFFu16;
                let mut p = pos - 1;
                while p >= 0x10 {
                    shift -= 1;
                    mask >>= 1;
                    p >>= 1;
                }
                let offset = (token >> shift) as usize + 1;
                let length = (token & mask) as usize + 3;
                if offset > pos {
                    return Err(Error::corrupt_header(
                        (at + i) as u64,
                        "back reference before chunk start",
                    ));
                }
                for _ in 0..length {
                    let b = out[out.len() - offset];
                    out.push(b);
                }
            }
            if out.len() - start > CHUNK_SIZE {
                return Err(Error::corrupt_header((at + i) as u64, "chunk overflows 4 KiB"));
            }
        }
    }
    Ok(())
}

/// Decompresses one unit to `output_len` bytes.
///
/// Real images sometimes decode short; that is padded with zeros unless
/// `strict` is set, in which case it is an error.
pub fn decompress(input: &[u8], output_len: usize, strict: bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(output_len);
    let mut pos = 0usize;
    while out.len() < output_len {
        let Some(header) = le_u16(input, pos) else {
            break;
        };
        if header == 0 {
            break;
        }
        let size = (header & HEADER_SIZE_MASK) as usize + 1;
        let data = input
            .get(pos + 2..pos + 2 + size)
            .ok_or_else(|| Error::corrupt_header(pos as u64, "chunk extends past the unit"))?;
        let start = out.len();
        if header & HEADER_COMPRESSED != 0 {
            decompress_chunk(data, &mut out, pos + 2)?;
        } else {
            out.extend_from_slice(data);
        }
        pos += 2 + size;

        let produced = out.len() - start;
        let more = le_u16(input, pos).is_some_and(|h| h != 0);
        if produced < CHUNK_SIZE && more && out.len() < output_len {
            if strict {
                return Err(Error::corrupt_header(
                    pos as u64,
                    format!("chunk decoded to {produced} bytes"),
                ));
            }
            out.resize(start + CHUNK_SIZE, 0);
        }
    }
    if out.len() < output_len {
        if strict {
            return Err(Error::corrupt_header(
                pos as u64,
                format!("unit decoded to {} of {output_len} bytes", out.len()),
            ));
        }
        log::debug!("LZNT1 unit short by {} bytes", output_len - out.len());
        out.resize(output_len, 0);
    }
    out.truncate(output_len);
    Ok(out)
}

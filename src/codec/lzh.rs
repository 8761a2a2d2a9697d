//! LHA sliding-window methods (`-lh1-`, `-lh4-`..`-lh7-`, `-lhx-`, `-lzs-`, `-lz5-`).
//!
//! The bit-level work is done by `delharc`; this wrapper stops after the
//! unpacked size recorded in the item header, since LHA streams carry no
//! end marker of their own.

use std::io::{self, BufReader, Read};

use delharc::CompressionMethod;
use delharc::decode::{Decoder as _, DecoderAny};

use super::Decoder;

/// Method ids with a decoding transform, paired with the `delharc` method.
pub const METHODS: &[(&str, CompressionMethod)] = &[
    ("-lh1-", CompressionMethod::Lh1),
    ("-lh4-", CompressionMethod::Lh4),
    ("-lh5-", CompressionMethod::Lh5),
    ("-lh6-", CompressionMethod::Lh6),
    ("-lh7-", CompressionMethod::Lh7),
    ("-lhx-", CompressionMethod::Lhx),
    ("-lzs-", CompressionMethod::Lzs),
    ("-lz5-", CompressionMethod::Lz5),
];

/// Decodes one LHA member payload.
pub struct LhaDecoder<'a> {
    inner: DecoderAny<BufReader<Box<dyn Read + 'a>>>,
    name: &'static str,
    remaining: u64,
}

impl<'a> LhaDecoder<'a> {
    /// Returns `None` when `method` is not one of [`METHODS`].
    pub fn new(input: Box<dyn Read + 'a>, method: &str, unpacked_size: u64) -> Option<Self> {
        let &(name, compression) = METHODS.iter().find(|(m, _)| *m == method)?;
        Some(Self {
            inner: DecoderAny::new_from_compression(compression, BufReader::new(input)),
            name,
            remaining: unpacked_size,
        })
    }

    /// Bytes still to be produced.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Read for LhaDecoder<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = self.remaining.min(buf.len() as u64) as usize;
        self.inner
            .fill_buffer(&mut buf[..n])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{e:?}")))?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl Decoder for LhaDecoder<'_> {
    fn method_name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// MSB-first bit packer matching the LHA bit reader.
    #[derive(Default)]
    struct Bits {
        out: Vec<u8>,
        acc: u32,
        used: u32,
    }

    impl Bits {
        fn put(&mut self, value: u32, width: u32) {
            for i in (0..width).rev() {
                self.acc = (self.acc << 1) | ((value >> i) & 1);
                self.used += 1;
                if self.used == 8 {
                    self.out.push(self.acc as u8);
                    self.acc = 0;
                    self.used = 0;
                }
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.used > 0 {
                self.out.push((self.acc << (8 - self.used)) as u8);
            }
            // Slack for the reader's lookahead.
            self.out.extend_from_slice(&[0; 4]);
            self.out
        }
    }

    /// One `-lh4-`/`-lh5-` block of `count` copies of `byte`, built from
    /// single-symbol tables so every code is zero bits long.
    pub(crate) fn lh5_run(byte: u8, count: u16) -> Vec<u8> {
        run_block(byte, count, 4)
    }

    fn run_block(byte: u8, count: u16, position_bits: u32) -> Vec<u8> {
        let mut bits = Bits::default();
        bits.put(u32::from(count), 16);
        // Code-length table: empty, single value 0.
        bits.put(0, 5);
        bits.put(0, 5);
        // Literal/length table: empty, single literal.
        bits.put(0, 9);
        bits.put(u32::from(byte), 9);
        // Offset table: empty, single value 0.
        bits.put(0, position_bits);
        bits.put(0, position_bits);
        bits.finish()
    }

    fn decode(method: &str, packed: Vec<u8>, size: u64) -> io::Result<Vec<u8>> {
        let mut decoder = LhaDecoder::new(Box::new(io::Cursor::new(packed)), method, size).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_lh5_literal_run() {
        let out = decode("-lh5-", lh5_run(b'A', 40), 40).unwrap();
        assert_eq!(out, vec![b'A'; 40]);
    }

    #[test]
    fn test_lh4_shares_lh5_layout() {
        let out = decode("-lh4-", lh5_run(b'z', 7), 7).unwrap();
        assert_eq!(out, b"zzzzzzz");
    }

    #[test]
    fn test_lh7_uses_wider_offset_table() {
        let out = decode("-lh7-", run_block(0x10, 12, 5), 12).unwrap();
        assert_eq!(out, vec![0x10; 12]);
    }

    #[test]
    fn test_output_stops_at_unpacked_size() {
        let mut decoder =
            LhaDecoder::new(Box::new(io::Cursor::new(lh5_run(b'q', 100))), "-lh5-", 3).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"qqq");
        assert_eq!(decoder.remaining(), 0);
        assert_eq!(decoder.method_name(), "-lh5-");
    }

    #[test]
    fn test_unknown_method_id() {
        assert!(LhaDecoder::new(Box::new(io::empty()), "-lh9-", 1).is_none());
        assert!(LhaDecoder::new(Box::new(io::empty()), "-lh0-", 1).is_none());
    }
}

//! Raw deflate streams.

use std::io::{self, BufRead, Read};

use flate2::bufread::DeflateDecoder as FlateDecoder;

use super::{Decoder, method};

/// Raw deflate decoder.
pub struct DeflateDecoder<R> {
    inner: FlateDecoder<R>,
}

impl<R> std::fmt::Debug for DeflateDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateDecoder").finish_non_exhaustive()
    }
}

impl<R: BufRead> DeflateDecoder<R> {
    /// Creates a new deflate decoder over buffered input.
    pub fn new(input: R) -> Self {
        Self {
            inner: FlateDecoder::new(input),
        }
    }

    /// Number of packed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.inner.total_in()
    }
}

impl<R: BufRead> Read for DeflateDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: BufRead> Decoder for DeflateDecoder<R> {
    fn method_name(&self) -> &'static str {
        method::DEFLATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_decode_raw_stream() {
        let mut enc = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(b"abcabcabcabc").unwrap();
        let packed = enc.finish().unwrap();
        let mut decoder = DeflateDecoder::new(&packed[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcabcabcabc");
        assert_eq!(decoder.total_in(), packed.len() as u64);
    }

    #[test]
    fn test_garbage_is_invalid_data() {
        let mut decoder = DeflateDecoder::new(&[0xFFu8, 0xFF, 0xFF][..]);
        let mut out = Vec::new();
        assert!(decoder.read_to_end(&mut out).is_err());
    }
}

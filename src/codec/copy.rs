//! Stored (uncompressed) data.

use std::io::{self, Read};

use super::{Decoder, method};

/// Passes data through unchanged, stopping after `size` bytes.
pub struct CopyDecoder<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> CopyDecoder<R> {
    /// Creates a copy decoder producing at most `size` bytes.
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }

    /// Bytes still allowed through.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read> Read for CopyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let max_read = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max_read])?;
        self.remaining = self.remaining.saturating_sub(n as u64);
        Ok(n)
    }
}

impl<R: Read> Decoder for CopyDecoder<R> {
    fn method_name(&self) -> &'static str {
        method::COPY
    }
}

//! Low-level binary reading utilities shared by every format parser.
//!
//! On-disk structures are decoded one field at a time from byte slices.
//! Nothing is reinterpreted in place, so parsing is independent of the host
//! endianness and every access is bounds-checked.

use std::io::{self, Read, Seek, SeekFrom};

use crate::safety::ResourceLimits;
use crate::{Error, Result};

/// A bounds-checked sequential reader over a byte slice.
///
/// Every read returns [`Error::NeedMoreInput`] instead of panicking when the
/// slice is too short. The `base` offset is only used for error reporting so
/// that offsets point into the original source.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Creates a cursor whose error offsets are reported relative to `base`.
    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Returns the current position within the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the underlying slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Moves to an absolute position within the slice.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::NeedMoreInput {
                offset: self.base + self.data.len() as u64,
                needed: (pos - self.data.len()) as u64,
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Skips `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn need(&self, n: usize) -> Error {
        Error::NeedMoreInput {
            offset: self.base + self.pos as u64,
            needed: n as u64,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.need(n));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Returns the next `n` bytes without consuming them.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.need(n));
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Reads `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian u16.
    pub fn read_u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian u32.
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian u64.
    pub fn read_u64_le(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a big-endian u16.
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian 24-bit value.
    pub fn read_u24_be(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    /// Reads a big-endian u32.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Reads a little-endian u16 at `offset`.
pub fn le_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let b = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

/// Reads a little-endian u32 at `offset`.
pub fn le_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let b = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Reads a little-endian u64 at `offset`.
pub fn le_u64(buf: &[u8], offset: usize) -> Option<u64> {
    let b = buf.get(offset..offset.checked_add(8)?)?;
    let mut tmp = [0u8; 8];
    tmp.copy_from_slice(b);
    Some(u64::from_le_bytes(tmp))
}

/// Reads a big-endian 24-bit value at `offset`.
pub fn be_u24(buf: &[u8], offset: usize) -> Option<u32> {
    let b = buf.get(offset..offset.checked_add(3)?)?;
    Some(u32::from_be_bytes([0, b[0], b[1], b[2]]))
}

/// Reads a big-endian u32 at `offset`.
pub fn be_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let b = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Reads a little-endian u32 from a reader.
pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Fills `buf` from `reader`, reporting a short read as [`Error::NeedMoreInput`].
pub fn read_exact_or_need_more<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    offset: u64,
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::NeedMoreInput {
                    offset: offset + filled as u64,
                    needed: (buf.len() - filled) as u64,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Reads as many bytes as available up to `buf.len()`.
///
/// Returns the number of bytes read; only I/O errors are reported.
pub fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads `len` bytes starting at `offset` into a new buffer.
///
/// The allocation is checked against `limits.max_header_bytes` first, and a
/// source shorter than requested yields [`Error::NeedMoreInput`].
pub fn read_region<R: Read + Seek + ?Sized>(
    reader: &mut R,
    offset: u64,
    len: u64,
    limits: &ResourceLimits,
) -> Result<Vec<u8>> {
    limits.check_header_bytes(len)?;
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    read_exact_or_need_more(reader, &mut buf, offset)?;
    Ok(buf)
}

/// Decodes a UTF-16LE byte slice, replacing invalid sequences.
pub fn utf16le_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

//! Cyclic redundancy checks used by the archive formats.
//!
//! | Type | Algorithm | Used by |
//! |------|-----------|---------|
//! | [`Crc16`] | CRC-16/ARC | LZH item data and level-2 header CRC |
//! | [`Crc32`] | CRC-32/ISO-HDLC | hash engine, NSIS installer check |
//! | [`Crc64`] | CRC-64/XZ | hash engine |
//! | [`Cksum`] | POSIX `cksum` (CRC-32 with length suffix) | checksum files in cksum form |
//!
//! # Example
//!
//! ```rust
//! use archkit::checksum::{Checksum, Crc16, Crc32};
//!
//! assert_eq!(Crc16::compute(b"123456789"), 0xBB3D);
//! assert_eq!(Crc32::compute(b"123456789"), 0xCBF43926);
//! ```

use std::io::{self, Read};

use crate::READ_BUFFER_SIZE;

static CRC16_ARC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_ARC);
static CRC32_CKSUM: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_CKSUM);

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Returns the checksum of all data seen so far.
    fn finalize(&self) -> Self::Output;

    /// Resets the checksum to its initial state.
    fn reset(&mut self);

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Computes the checksum by reading from a reader until EOF.
    fn compute_reader<R: Read>(reader: &mut R) -> io::Result<Self::Output> {
        let mut hasher = Self::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }
}

/// CRC-16/ARC (polynomial 0x8005, reflected, zero init), the LHA checksum.
#[derive(Clone)]
pub struct Crc16 {
    digest: crc::Digest<'static, u16>,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc16 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc16")
            .field("current", &self.finalize())
            .finish()
    }
}

impl Checksum for Crc16 {
    type Output = u16;

    fn new() -> Self {
        Self {
            digest: CRC16_ARC.digest(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn finalize(&self) -> u16 {
        self.digest.clone().finalize()
    }

    fn reset(&mut self) {
        self.digest = CRC16_ARC.digest();
    }
}

/// CRC-32 with the IEEE polynomial.
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.hasher.clone().finalize())
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn reset(&mut self) {
        self.hasher.reset();
    }
}

/// CRC-64 as used by xz and 7-Zip's `CRC64` hash method.
#[derive(Clone)]
pub struct Crc64 {
    hasher: crc64fast::Digest,
}

impl Default for Crc64 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc64")
            .field("current", &self.hasher.sum64())
            .finish()
    }
}

impl Checksum for Crc64 {
    type Output = u64;

    fn new() -> Self {
        Self {
            hasher: crc64fast::Digest::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.write(data);
    }

    fn finalize(&self) -> u64 {
        self.hasher.sum64()
    }

    fn reset(&mut self) {
        self.hasher = crc64fast::Digest::new();
    }
}

/// POSIX `cksum`: CRC-32/CKSUM over the data followed by its length.
///
/// The length is appended least-significant byte first using only as many
/// bytes as needed.
#[derive(Clone)]
pub struct Cksum {
    digest: crc::Digest<'static, u32>,
    len: u64,
}

impl Default for Cksum {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cksum").field("len", &self.len).finish()
    }
}

impl Cksum {
    /// Number of bytes seen so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if no data has been seen.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Checksum for Cksum {
    type Output = u32;

    fn new() -> Self {
        Self {
            digest: CRC32_CKSUM.digest(),
            len: 0,
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.len += data.len() as u64;
    }

    fn finalize(&self) -> u32 {
        let mut digest = self.digest.clone();
        let mut n = self.len;
        while n != 0 {
            digest.update(&[n as u8]);
            n >>= 8;
        }
        digest.finalize()
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_arc_check_value() {
        assert_eq!(Crc16::compute(b"123456789"), 0xBB3D);
        let mut crc = Crc16::new();
        crc.update(b"1234");
        crc.update(b"56789");
        assert_eq!(crc.finalize(), 0xBB3D);
        crc.reset();
        assert_eq!(crc.finalize(), 0);
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(Crc32::compute(b"123456789"), 0xCBF43926);
        assert_eq!(Crc32::compute(b""), 0);
    }

    #[test]
    fn test_crc64_check_value() {
        assert_eq!(Crc64::compute(b"123456789"), 0x995D_C9BB_DF19_39FA);
    }

    #[test]
    fn test_cksum_matches_posix() {
        // `printf '' | cksum` -> 4294967295 0
        assert_eq!(Cksum::compute(b""), 4_294_967_295);
        // `printf '123456789' | cksum` -> 930766865 9
        assert_eq!(Cksum::compute(b"123456789"), 930_766_865);
        let mut split = Cksum::new();
        split.update(b"12345");
        split.update(b"6789");
        assert_eq!(split.finalize(), 930_766_865);
        assert_eq!(split.len(), 9);
    }

    #[test]
    fn test_compute_reader() {
        let mut data: &[u8] = b"123456789";
        assert_eq!(Crc32::compute_reader(&mut data).unwrap(), 0xCBF43926);
    }
}

//! Digest values, their text form, and per-method hashing state.

use std::fmt;

use sha2::Digest as _;

use super::HashMethod;
use crate::checksum::{Checksum, Cksum, Crc32, Crc64};

/// Size of the carry area kept next to summed digests.
pub const EXTRA_SIZE: usize = 8;

/// A digest, or a carrying sum of digests.
///
/// Bytes are kept in the order the algorithm produces them; CRCs store
/// their value little-endian. Sums add digests byte-wise from index 0 with
/// carry, and overflow out of the last byte lands in an 8-byte extra area.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    bytes: Vec<u8>,
    extra: [u8; EXTRA_SIZE],
    count: u64,
}

impl Digest {
    /// An all-zero digest of `size` bytes.
    pub fn zero(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
            extra: [0; EXTRA_SIZE],
            count: 0,
        }
    }

    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            extra: [0; EXTRA_SIZE],
            count: 1,
        }
    }

    /// Digest bytes in stored order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The carry area.
    pub fn extra(&self) -> &[u8; EXTRA_SIZE] {
        &self.extra
    }

    /// Number of digests summed into this value.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Adds `other` into this value with byte-wise carry.
    pub fn add(&mut self, other: &[u8]) {
        let mut carry = 0u32;
        for (i, dst) in self.bytes.iter_mut().enumerate() {
            carry += *dst as u32 + other.get(i).copied().unwrap_or(0) as u32;
            *dst = carry as u8;
            carry >>= 8;
        }
        for dst in self.extra.iter_mut() {
            if carry == 0 {
                break;
            }
            carry += *dst as u32;
            *dst = carry as u8;
            carry >>= 8;
        }
        self.count += 1;
    }

    /// Hex text: at most 8 bytes print as an upper-case number, longer
    /// digests as lower-case bytes in stored order.
    pub fn to_hex(&self) -> String {
        hex_digest(&self.bytes)
    }

    /// Hex text with a `-extra` suffix when the sum overflowed.
    ///
    /// The suffix is 4 bytes wide when the carry fits, 8 otherwise.
    pub fn to_hex_with_extra(&self) -> String {
        let mut out = self.to_hex();
        if self.extra.iter().any(|&b| b != 0) {
            let width = if self.extra[4..].iter().all(|&b| b == 0) { 4 } else { 8 };
            out.push('-');
            out.push_str(&hex_number(&self.extra[..width]));
        }
        out
    }

    /// Parses text produced by [`to_hex_with_extra`](Self::to_hex_with_extra).
    pub fn parse_hex(text: &str, size: usize) -> Option<Self> {
        let (base, extra) = match text.split_once('-') {
            Some((b, e)) => (b, Some(e)),
            None => (text, None),
        };
        let bytes = parse_hex_digest(base, size)?;
        let mut digest = Self::from_bytes(bytes);
        if let Some(extra) = extra {
            if extra.len() != 8 && extra.len() != 16 {
                return None;
            }
            let mut raw = hex::decode(extra).ok()?;
            raw.reverse();
            digest.extra[..raw.len()].copy_from_slice(&raw);
        }
        Some(digest)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_with_extra())
    }
}

fn hex_number(bytes: &[u8]) -> String {
    let mut rev = bytes.to_vec();
    rev.reverse();
    hex::encode_upper(rev)
}

/// Formats digest bytes following the size rule.
pub fn hex_digest(bytes: &[u8]) -> String {
    if bytes.len() <= 8 {
        hex_number(bytes)
    } else {
        hex::encode(bytes)
    }
}

/// Parses digest text of a `size`-byte digest, either case.
pub fn parse_hex_digest(text: &str, size: usize) -> Option<Vec<u8>> {
    if text.len() != size * 2 {
        return None;
    }
    let mut bytes = hex::decode(text).ok()?;
    if size <= 8 {
        bytes.reverse();
    }
    Some(bytes)
}

/// Running state of one hash method.
#[derive(Clone)]
pub enum HashState {
    /// CRC-32.
    Crc32(Crc32),
    /// CRC-64.
    Crc64(Crc64),
    /// MD5.
    Md5(md5::Context),
    /// SHA-1.
    Sha1(sha1::Sha1),
    /// SHA-256.
    Sha256(sha2::Sha256),
    /// SHA-512.
    Sha512(sha2::Sha512),
    /// POSIX cksum.
    Cksum(Cksum),
}

impl fmt::Debug for HashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HashState").field(&self.method()).finish()
    }
}

impl HashState {
    /// Fresh state for `method`.
    pub fn new(method: HashMethod) -> Self {
        match method {
            HashMethod::Crc32 => Self::Crc32(Crc32::new()),
            HashMethod::Crc64 => Self::Crc64(Crc64::new()),
            HashMethod::Md5 => Self::Md5(md5::Context::new()),
            HashMethod::Sha1 => Self::Sha1(sha1::Sha1::new()),
            HashMethod::Sha256 => Self::Sha256(sha2::Sha256::new()),
            HashMethod::Sha512 => Self::Sha512(sha2::Sha512::new()),
            HashMethod::Cksum => Self::Cksum(Cksum::new()),
        }
    }

    /// The method this state computes.
    pub fn method(&self) -> HashMethod {
        match self {
            Self::Crc32(_) => HashMethod::Crc32,
            Self::Crc64(_) => HashMethod::Crc64,
            Self::Md5(_) => HashMethod::Md5,
            Self::Sha1(_) => HashMethod::Sha1,
            Self::Sha256(_) => HashMethod::Sha256,
            Self::Sha512(_) => HashMethod::Sha512,
            Self::Cksum(_) => HashMethod::Cksum,
        }
    }

    /// Feeds bytes.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Crc32(h) => h.update(data),
            Self::Crc64(h) => h.update(data),
            Self::Md5(h) => h.consume(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Cksum(h) => h.update(data),
        }
    }

    /// Digest of everything fed so far; the state is left unchanged.
    pub fn digest(&self) -> Digest {
        let bytes = match self {
            Self::Crc32(h) => h.finalize().to_le_bytes().to_vec(),
            Self::Crc64(h) => h.finalize().to_le_bytes().to_vec(),
            Self::Md5(h) => h.clone().compute().0.to_vec(),
            Self::Sha1(h) => h.clone().finalize().to_vec(),
            Self::Sha256(h) => h.clone().finalize().to_vec(),
            Self::Sha512(h) => h.clone().finalize().to_vec(),
            Self::Cksum(h) => h.finalize().to_le_bytes().to_vec(),
        };
        Digest::from_bytes(bytes)
    }

    /// Resets to the initial state.
    pub fn reset(&mut self) {
        *self = Self::new(self.method());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        let cases = [
            (HashMethod::Crc32, "CBF43926"),
            (HashMethod::Crc64, "995DC9BBDF1939FA"),
            (HashMethod::Md5, "25f9e794323b453885f5181f1b624d0b"),
            (HashMethod::Sha1, "f7c3bc1d808e04732adf679965ccc34ca7ae3441"),
            (
                HashMethod::Sha256,
                "15e2b0d3c33891ebb0f1ef609ec419420c20e320ce94c65fbc8c3312448eb225",
            ),
        ];
        for (method, expected) in cases {
            let mut state = HashState::new(method);
            state.update(b"123456789");
            assert_eq!(state.digest().to_hex(), expected, "{method}");
        }
    }

    #[test]
    fn test_add_carries_into_extra() {
        let mut sum = Digest::zero(4);
        sum.add(&[0xFF, 0xFF, 0xFF, 0xFF]);
        sum.add(&[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(sum.as_bytes(), &[0, 0, 0, 0]);
        assert_eq!(sum.extra()[0], 1);
        assert_eq!(sum.count(), 2);
        assert_eq!(sum.to_hex_with_extra(), "00000000-00000001");
    }

    #[test]
    fn test_hex_parse_inverts_format() {
        let mut sum = Digest::zero(4);
        sum.add(&[0xFF, 0xFF, 0xFF, 0xFF]);
        sum.add(&[0xFF, 0xFF, 0xFF, 0xFF]);
        let text = sum.to_hex_with_extra();
        let parsed = Digest::parse_hex(&text, 4).unwrap();
        assert_eq!(parsed.as_bytes(), sum.as_bytes());
        assert_eq!(parsed.extra(), sum.extra());
        assert!(parse_hex_digest("xyz", 4).is_none());
    }

    #[test]
    fn test_digest_does_not_consume_state() {
        let mut state = HashState::new(HashMethod::Sha256);
        state.update(b"ab");
        let first = state.digest();
        assert_eq!(first, state.digest());
        state.update(b"c");
        assert_ne!(first, state.digest());
        state.reset();
        assert_eq!(state.digest(), HashState::new(HashMethod::Sha256).digest());
    }
}

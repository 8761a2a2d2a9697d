//! LZMA streams prefixed by their 5-byte properties header.

use std::io::{self, Read};

use super::{Decoder, method};
use crate::{Error, Result};

/// Size of the LZMA properties header (`lc/lp/pb` byte + dictionary size).
pub const PROPERTIES_SIZE: usize = 5;

/// LZMA decoder.
pub struct LzmaDecoder<R> {
    inner: lzma_rust2::LzmaReader<R>,
}

impl<R> std::fmt::Debug for LzmaDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzmaDecoder").finish_non_exhaustive()
    }
}

impl<R: Read> LzmaDecoder<R> {
    /// Creates a decoder from separate properties.
    ///
    /// `properties` is the `lc/lp/pb` byte followed by the little-endian
    /// dictionary size. `uncompressed_size` of `None` expects an end marker
    /// or a reader that stops consuming before the packed data ends.
    pub fn new(input: R, properties: &[u8], uncompressed_size: Option<u64>) -> Result<Self> {
        if properties.len() < PROPERTIES_SIZE {
            return Err(Error::corrupt_header(0, "LZMA properties too short"));
        }
        let props_byte = properties[0];
        let dict_size =
            u32::from_le_bytes([properties[1], properties[2], properties[3], properties[4]]);
        if props_byte >= 9 * 5 * 5 {
            return Err(Error::corrupt_header(0, "invalid LZMA properties byte"));
        }
        let reader = lzma_rust2::LzmaReader::new_with_props(
            input,
            uncompressed_size.unwrap_or(u64::MAX),
            props_byte,
            dict_size,
            None,
        )
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
        Ok(Self { inner: reader })
    }

    /// Reads the properties header from the front of `input`.
    pub fn with_inline_properties(mut input: R, uncompressed_size: Option<u64>) -> Result<Self> {
        let mut props = [0u8; PROPERTIES_SIZE];
        input.read_exact(&mut props)?;
        Self::new(input, &props, uncompressed_size)
    }
}

impl<R: Read> Read for LzmaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Decoder for LzmaDecoder<R> {
    fn method_name(&self) -> &'static str {
        method::LZMA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_properties() {
        let err = LzmaDecoder::new(&b""[..], &[0x5D, 0, 0], None).err().unwrap();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn test_rejects_bad_properties_byte() {
        let err = LzmaDecoder::new(&b""[..], &[225, 0, 0, 1, 0], None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn test_roundtrip_with_inline_properties() {
        use std::io::Write;
        let data = b"archkit lzma archkit lzma archkit lzma".repeat(4);
        let options = lzma_rust2::LzmaOptions::with_preset(6);
        let mut packed = Vec::new();
        {
            let mut writer = lzma_rust2::LzmaWriter::new_no_header(&mut packed, &options, true)
                .unwrap();
            writer.write_all(&data).unwrap();
            writer.finish().unwrap();
        }
        let mut stream = vec![options.get_props()];
        stream.extend_from_slice(&options.dict_size.to_le_bytes());
        stream.extend_from_slice(&packed);

        let mut decoder =
            LzmaDecoder::with_inline_properties(&stream[..], None).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }
}

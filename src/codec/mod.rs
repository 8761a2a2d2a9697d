//! Decode transforms for compressed item payloads.
//!
//! Parsers never decompress directly. They name a method (`lzma`,
//! `deflate`, `-lh5-`, ...) and hand the packed bytes to a
//! [`DecoderRegistry`], which either returns a reader over the unpacked data
//! or fails with [`Error::UnsupportedMethod`]. The registry is an explicit
//! value owned by the [`FormatRegistry`](crate::format::detect::FormatRegistry),
//! so callers can plug in additional methods without global state.
//!
//! # Example
//!
//! ```rust
//! use archkit::codec::{DecodeParams, DecoderRegistry, method};
//! use std::io::Read;
//!
//! let registry = DecoderRegistry::default();
//! let mut reader = registry
//!     .decode(method::COPY, Box::new(&b"plain"[..]), &DecodeParams::sized(5))
//!     .unwrap();
//! let mut out = Vec::new();
//! reader.read_to_end(&mut out).unwrap();
//! assert_eq!(out, b"plain");
//! ```

#[cfg(feature = "lzma")]
pub mod lzma;

#[cfg(feature = "deflate")]
pub mod deflate;

#[cfg(feature = "bzip2")]
pub mod bzip2;

#[cfg(feature = "lzh")]
pub mod lzh;

mod copy;

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use crate::{Error, Result};

pub use copy::CopyDecoder;

#[cfg(feature = "lzma")]
pub use lzma::LzmaDecoder;

#[cfg(feature = "deflate")]
pub use deflate::DeflateDecoder;

#[cfg(feature = "bzip2")]
pub use bzip2::Bzip2Decoder;

#[cfg(feature = "lzh")]
pub use lzh::LhaDecoder;

/// A decoder that reads packed data and produces unpacked output.
pub trait Decoder: Read {
    /// Returns the registry name of the method.
    fn method_name(&self) -> &'static str;
}

/// Method names understood by the built-in transforms.
pub mod method {
    /// Stored data.
    pub const COPY: &str = "copy";
    /// LZMA with a 5-byte properties header in front of the stream.
    pub const LZMA: &str = "lzma";
    /// Raw deflate (no zlib or gzip wrapper).
    pub const DEFLATE: &str = "deflate";
    /// Standard `BZh` bzip2 streams.
    pub const BZIP2: &str = "bzip2";
    /// The NSIS bzip2 variant without a stream header. No built-in transform.
    pub const NSIS_BZIP2: &str = "nsis-bzip2";
}

/// Parameters passed along with the packed stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeParams {
    /// Expected unpacked size, when the container records it.
    pub unpacked_size: Option<u64>,
    /// Method properties that are not part of the stream itself.
    pub properties: Vec<u8>,
    /// Dictionary size as a power of two (LZH `-lh4-`..`-lh7-`).
    pub dict_log: Option<u8>,
}

impl DecodeParams {
    /// Parameters carrying only the unpacked size.
    pub fn sized(unpacked_size: u64) -> Self {
        Self {
            unpacked_size: Some(unpacked_size),
            ..Self::default()
        }
    }

    /// Sets the dictionary size exponent.
    pub fn dict_log(mut self, log: u8) -> Self {
        self.dict_log = Some(log);
        self
    }
}

/// A pluggable decode transform.
pub trait MethodDecoder: Send + Sync {
    /// Wraps `input` in a reader producing the unpacked bytes.
    fn open<'a>(
        &self,
        input: Box<dyn Read + 'a>,
        params: &DecodeParams,
    ) -> Result<Box<dyn Read + 'a>>;
}

struct CopyMethod;

impl MethodDecoder for CopyMethod {
    fn open<'a>(
        &self,
        input: Box<dyn Read + 'a>,
        params: &DecodeParams,
    ) -> Result<Box<dyn Read + 'a>> {
        Ok(Box::new(CopyDecoder::new(
            input,
            params.unpacked_size.unwrap_or(u64::MAX),
        )))
    }
}

#[cfg(feature = "lzma")]
struct LzmaMethod;

#[cfg(feature = "lzma")]
impl MethodDecoder for LzmaMethod {
    fn open<'a>(
        &self,
        input: Box<dyn Read + 'a>,
        params: &DecodeParams,
    ) -> Result<Box<dyn Read + 'a>> {
        Ok(Box::new(LzmaDecoder::with_inline_properties(
            input,
            params.unpacked_size,
        )?))
    }
}

#[cfg(feature = "deflate")]
struct DeflateMethod;

#[cfg(feature = "deflate")]
impl MethodDecoder for DeflateMethod {
    fn open<'a>(
        &self,
        input: Box<dyn Read + 'a>,
        _params: &DecodeParams,
    ) -> Result<Box<dyn Read + 'a>> {
        Ok(Box::new(DeflateDecoder::new(std::io::BufReader::new(input))))
    }
}

#[cfg(feature = "bzip2")]
struct Bzip2Method;

#[cfg(feature = "bzip2")]
impl MethodDecoder for Bzip2Method {
    fn open<'a>(
        &self,
        input: Box<dyn Read + 'a>,
        _params: &DecodeParams,
    ) -> Result<Box<dyn Read + 'a>> {
        Ok(Box::new(Bzip2Decoder::new(input)))
    }
}

#[cfg(feature = "lzh")]
struct LhaMethod(&'static str);

#[cfg(feature = "lzh")]
impl MethodDecoder for LhaMethod {
    fn open<'a>(
        &self,
        input: Box<dyn Read + 'a>,
        params: &DecodeParams,
    ) -> Result<Box<dyn Read + 'a>> {
        let size = params
            .unpacked_size
            .ok_or_else(|| Error::corrupt_header(0, "LHA stream without an unpacked size"))?;
        match LhaDecoder::new(input, self.0, size) {
            Some(decoder) => Ok(Box::new(decoder)),
            None => Err(Error::unsupported_method(self.0)),
        }
    }
}

/// Name-keyed set of decode transforms.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: BTreeMap<String, Arc<dyn MethodDecoder>>,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("methods", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for DecoderRegistry {
    /// The built-in transforms enabled by crate features.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(method::COPY, CopyMethod);
        #[cfg(feature = "lzma")]
        registry.register(method::LZMA, LzmaMethod);
        #[cfg(feature = "deflate")]
        registry.register(method::DEFLATE, DeflateMethod);
        #[cfg(feature = "bzip2")]
        registry.register(method::BZIP2, Bzip2Method);
        #[cfg(feature = "lzh")]
        for &(name, _) in lzh::METHODS {
            registry.register(name, LhaMethod(name));
        }
        registry
    }
}

impl DecoderRegistry {
    /// A registry without any transform, not even `copy`.
    pub fn empty() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// Adds or replaces the transform for `name`.
    pub fn register(&mut self, name: impl Into<String>, decoder: impl MethodDecoder + 'static) {
        self.decoders.insert(name.into(), Arc::new(decoder));
    }

    /// Returns true if a transform is registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    /// Registered method names in sorted order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Opens a decoding reader for `name`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedMethod`] when nothing is registered under `name`,
    /// or whatever the transform reports for malformed properties.
    pub fn decode<'a>(
        &self,
        name: &str,
        input: Box<dyn Read + 'a>,
        params: &DecodeParams,
    ) -> Result<Box<dyn Read + 'a>> {
        match self.decoders.get(name) {
            Some(decoder) => decoder.open(input, params),
            None => Err(Error::unsupported_method(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(mut r: Box<dyn Read + '_>) -> Vec<u8> {
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_copy_limits_to_size() {
        let registry = DecoderRegistry::default();
        let r = registry
            .decode(method::COPY, Box::new(&b"abcdef"[..]), &DecodeParams::sized(3))
            .unwrap();
        assert_eq!(read_all(r), b"abc");
    }

    #[test]
    fn test_unknown_method() {
        let registry = DecoderRegistry::default();
        let err = registry
            .decode("-lh9-", Box::new(&b""[..]), &DecodeParams::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedMethod { ref method } if method == "-lh9-"));
        assert!(!registry.contains(method::NSIS_BZIP2));
    }

    struct Upper;

    impl MethodDecoder for Upper {
        fn open<'a>(
            &self,
            mut input: Box<dyn Read + 'a>,
            _params: &DecodeParams,
        ) -> Result<Box<dyn Read + 'a>> {
            let mut buf = Vec::new();
            input.read_to_end(&mut buf)?;
            buf.make_ascii_uppercase();
            Ok(Box::new(std::io::Cursor::new(buf)))
        }
    }

    #[test]
    fn test_register_custom() {
        let mut registry = DecoderRegistry::empty();
        assert!(!registry.contains(method::COPY));
        registry.register("upper", Upper);
        let r = registry
            .decode("upper", Box::new(&b"abc"[..]), &DecodeParams::default())
            .unwrap();
        assert_eq!(read_all(r), b"ABC");
        assert_eq!(registry.methods().collect::<Vec<_>>(), vec!["upper"]);
    }

    #[cfg(feature = "lzh")]
    #[test]
    fn test_lha_methods_registered() {
        let registry = DecoderRegistry::default();
        for name in ["-lh1-", "-lh4-", "-lh5-", "-lh6-", "-lh7-", "-lhx-", "-lzs-", "-lz5-"] {
            assert!(registry.contains(name), "{name}");
        }
        let r = registry
            .decode(
                "-lh5-",
                Box::new(std::io::Cursor::new(lzh::tests::lh5_run(b'x', 5))),
                &DecodeParams::sized(5).dict_log(13),
            )
            .unwrap();
        assert_eq!(read_all(r), b"xxxxx");
        let err = registry
            .decode("-lh5-", Box::new(&b""[..]), &DecodeParams::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_deflate_roundtrip() {
        use std::io::Write;
        let mut enc =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"hello hello hello").unwrap();
        let packed = enc.finish().unwrap();
        let registry = DecoderRegistry::default();
        let r = registry
            .decode(method::DEFLATE, Box::new(&packed[..]), &DecodeParams::default())
            .unwrap();
        assert_eq!(read_all(r), b"hello hello hello");
    }
}

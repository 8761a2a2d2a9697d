//! Item payloads of an installer.
//!
//! Non-solid installers store every file as its own block:
//! `u32 size` (bit 31 set when compressed) followed by the bytes. Solid
//! installers compress the header and all blocks as one stream, so reaching
//! a file means decoding everything before it. Decoded blocks are kept in an
//! LRU cache keyed by data position; positions shared by several items or
//! passed on the way to a requested one are decoded once. Blocks above
//! [`CACHE_BLOCK_LIMIT`] stay out of the LRU; the last one requested by
//! several items is held in a single slot of its own.

use std::collections::BTreeSet;
use std::io::{self, Cursor, Read, SeekFrom};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::codec::{DecodeParams, DecoderRegistry};
use crate::format::locator::{DataLocator, ReadSeek, StreamSource};
use crate::format::reader::read_exact_or_need_more;
use crate::item::Item;
use crate::{Error, Result};

use super::NsisMethod;

/// Blocks up to this size are cached after decoding.
pub const CACHE_BLOCK_LIMIT: u64 = 4 << 20;

const COMPRESSED_BIT: u32 = 0x8000_0000;

/// Where the blocks live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One compressed stream starting at `start`.
    Solid {
        /// Method of the stream.
        method: NsisMethod,
        /// Source offset of the stream.
        start: u64,
        /// Packed length.
        len: u64,
        /// Decoded bytes before the first file block (size field and header).
        skip: u64,
    },
    /// Independent blocks; positions are relative to `blocks_start`.
    NonSolid {
        /// Source offset of position 0.
        blocks_start: u64,
        /// End of the data region.
        end: u64,
    },
}

/// Maps an end-of-input error from an unsized LZMA stream to end of data.
struct TolerantEnd<R>(R);

impl<R: Read> Read for TolerantEnd<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
            other => other,
        }
    }
}

#[derive(Clone)]
struct Shared(Arc<Vec<u8>>);

impl AsRef<[u8]> for Shared {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Opens a decoder for `method` over `input`.
pub(super) fn decoder<'a>(
    decoders: &DecoderRegistry,
    method: NsisMethod,
    input: Box<dyn Read + 'a>,
) -> Result<Box<dyn Read + 'a>> {
    let reader = decoders.decode(method.registry_name(), input, &DecodeParams::default())?;
    Ok(match method {
        NsisMethod::Lzma => Box::new(TolerantEnd(reader)),
        _ => reader,
    })
}

/// Reads the `u32` size prefix of a block from a decoded stream.
pub(super) fn read_block_size<R: Read + ?Sized>(reader: &mut R, at: u64) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    match read_exact_or_need_more(reader, &mut buf, at) {
        Ok(()) => Ok(Some(u32::from_le_bytes(buf) & !COMPRESSED_BIT)),
        Err(Error::NeedMoreInput { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Discards exactly `n` bytes.
pub(super) fn skip<R: Read + ?Sized>(reader: &mut R, n: u64) -> io::Result<()> {
    let copied = io::copy(&mut reader.take(n), &mut io::sink())?;
    if copied == n {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "installer stream ended inside a block",
        ))
    }
}

fn read_block<R: Read + ?Sized>(reader: &mut R, size: u64) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(size.min(CACHE_BLOCK_LIMIT) as usize);
    reader.take(size).read_to_end(&mut data)?;
    if data.len() as u64 != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "installer stream ended inside a block",
        ));
    }
    Ok(data)
}

/// Payload resolver for installer items.
pub struct NsisSource {
    decoders: Arc<DecoderRegistry>,
    layout: Layout,
    cache: LruCache<u32, Shared>,
    /// Positions referenced by some item.
    wanted: BTreeSet<u32>,
    /// Positions referenced by more than one item.
    shared: BTreeSet<u32>,
    /// Largest block size kept in the LRU.
    block_limit: u64,
    /// Last oversized block that several items share.
    oversized: Option<(u32, Shared)>,
}

impl NsisSource {
    /// Creates a source for items at `positions`.
    pub fn new(
        decoders: Arc<DecoderRegistry>,
        layout: Layout,
        positions: impl IntoIterator<Item = u32>,
        cache_capacity: usize,
    ) -> Self {
        let mut wanted = BTreeSet::new();
        let mut shared = BTreeSet::new();
        for pos in positions {
            if !wanted.insert(pos) {
                shared.insert(pos);
            }
        }
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            decoders,
            layout,
            cache: LruCache::new(capacity),
            wanted,
            shared,
            block_limit: CACHE_BLOCK_LIMIT,
            oversized: None,
        }
    }

    /// Sets the largest block size kept in the LRU.
    pub fn block_limit(mut self, limit: u64) -> Self {
        self.block_limit = limit;
        self
    }

    /// Number of cached blocks.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn cached_reader<'a>(&mut self, pos: u32) -> Option<Box<dyn Read + 'a>> {
        let data = match &self.oversized {
            Some((at, data)) if *at == pos => Some(data.clone()),
            _ => self.cache.get(&pos).cloned(),
        };
        data.map(|data| Box::new(Cursor::new(data)) as Box<dyn Read + 'a>)
    }

    fn open_non_solid<'a>(
        &mut self,
        index: usize,
        pos: u32,
        blocks_start: u64,
        end: u64,
        source: &'a mut dyn ReadSeek,
    ) -> Result<Box<dyn Read + 'a>> {
        let at = blocks_start + pos as u64;
        source.seek(SeekFrom::Start(at))?;
        let mut head = [0u8; 4];
        read_exact_or_need_more(source, &mut head, at)
            .map_err(|e| Error::data_error(index, e.to_string()))?;
        let raw = u32::from_le_bytes(head);
        let len = (raw & !COMPRESSED_BIT) as u64;
        if at + 4 + len > end {
            return Err(Error::data_error(index, "data block runs past the installer"));
        }
        let body = source.take(len);
        if raw & COMPRESSED_BIT == 0 {
            return Ok(Box::new(body));
        }

        let mut body = body;
        let mut sig = vec![0u8; len.min(8) as usize];
        body.read_exact(&mut sig)?;
        let method = NsisMethod::detect(&sig);
        let input: Box<dyn Read + 'a> = Box::new(Cursor::new(sig).chain(body));
        let reader = decoder(&self.decoders, method, input)
            .map_err(|e| match e {
                Error::UnsupportedMethod { .. } => e,
                other => Error::data_error(index, other.to_string()),
            })?;
        if !self.shared.contains(&pos) {
            return Ok(reader);
        }
        let mut reader = reader;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let shared = Shared(Arc::new(data));
        self.cache.put(pos, shared.clone());
        Ok(Box::new(Cursor::new(shared)))
    }

    fn open_solid<'a>(
        &mut self,
        index: usize,
        pos: u32,
        layout: (NsisMethod, u64, u64, u64),
        source: &'a mut dyn ReadSeek,
    ) -> Result<Box<dyn Read + 'a>> {
        let (method, start, len, skip_bytes) = layout;
        source.seek(SeekFrom::Start(start))?;
        let mut stream = decoder(&self.decoders, method, Box::new(source.take(len)))?;
        skip(&mut stream, skip_bytes)?;

        let mut logical = 0u64;
        while logical < pos as u64 {
            let size = read_block_size(&mut stream, logical)?
                .ok_or_else(|| Error::data_error(index, "solid stream ended early"))?
                as u64;
            let at = logical as u32;
            if size <= self.block_limit && self.wanted.contains(&at) && !self.cache.contains(&at) {
                let data = read_block(&mut stream, size)?;
                self.cache.put(at, Shared(Arc::new(data)));
            } else {
                skip(&mut stream, size)?;
            }
            logical += 4 + size;
        }
        if logical != pos as u64 {
            return Err(Error::data_error(index, "position is not at a block boundary"));
        }
        let size = read_block_size(&mut stream, logical)?
            .ok_or_else(|| Error::data_error(index, "solid stream ended early"))?
            as u64;
        if size > self.block_limit {
            if !self.shared.contains(&pos) {
                return Ok(Box::new(stream.take(size)));
            }
            let data = Shared(Arc::new(read_block(&mut stream, size)?));
            self.oversized = Some((pos, data.clone()));
            return Ok(Box::new(Cursor::new(data)));
        }
        let data = Shared(Arc::new(read_block(&mut stream, size)?));
        self.cache.put(pos, data.clone());

        // Prefetch the next wanted blocks while the decoder is warm.
        logical += 4 + size;
        let room = self.cache.cap().get().saturating_sub(1);
        let mut fetched = 0;
        while fetched < room && self.wanted.range(logical as u32..).next().is_some() {
            let Some(next) = read_block_size(&mut stream, logical)? else {
                break;
            };
            let next = next as u64;
            let at = logical as u32;
            if next <= self.block_limit && self.wanted.contains(&at) {
                self.cache.put(at, Shared(Arc::new(read_block(&mut stream, next)?)));
                fetched += 1;
            } else {
                skip(&mut stream, next)?;
            }
            logical += 4 + next;
        }
        Ok(Box::new(Cursor::new(data)))
    }
}

impl StreamSource for NsisSource {
    fn open_stream<'a>(
        &'a mut self,
        index: usize,
        item: &'a Item,
        source: &'a mut dyn ReadSeek,
    ) -> Result<Box<dyn Read + 'a>> {
        let DataLocator::Position(pos) = item.locator else {
            return crate::format::locator::open_locator(index, &item.locator, source);
        };
        let pos = u32::try_from(pos).map_err(|_| Error::data_error(index, "bad data position"))?;
        if let Some(reader) = self.cached_reader(pos) {
            log::trace!("nsis cache hit at {pos:#x}");
            return Ok(reader);
        }
        match self.layout {
            Layout::NonSolid { blocks_start, end } => {
                self.open_non_solid(index, pos, blocks_start, end, source)
            }
            Layout::Solid {
                method,
                start,
                len,
                skip,
            } => self.open_solid(index, pos, (method, start, len, skip), source),
        }
    }
}

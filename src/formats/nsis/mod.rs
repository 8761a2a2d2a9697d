//! Nullsoft installers.
//!
//! An installer is a PE stub followed, at a 512-byte aligned offset, by the
//! first header:
//!
//! ```text
//! u32 flags | u32 0xDEADBEEF | "NullsoftInst" | u32 header size | u32 data size
//! ```
//!
//! The install header (script entries, string table) and the file blocks
//! follow, either compressed as one solid stream or as separate blocks. The
//! script is replayed to name the files; see [`header::script_items`].

pub mod header;
pub mod source;
pub mod strings;

use std::io::{Read, SeekFrom};
use std::sync::Arc;

use crate::codec::{DecoderRegistry, method};
use crate::format::detect::{FormatHandler, OpenContext, Opened, Probe};
use crate::format::locator::{DataLocator, ReadSeek};
use crate::format::reader::{le_u32, read_exact_or_need_more, read_region, read_up_to};
use crate::format::{ArchiveInfo, FormatKind};
use crate::item::Item;
use crate::{Error, Result};

use header::{InstallHeader, script_items};
use source::{Layout, NsisSource, decoder, read_block_size, skip};
use strings::StringTable;

/// Size of the first header.
pub const FIRST_HEADER_SIZE: usize = 28;
/// Signature word of the first header.
pub const SIGNATURE: u32 = 0xDEAD_BEEF;
/// Magic following the signature word.
pub const MAGIC: &[u8; 12] = b"NullsoftInst";

const FLAG_NO_CRC: u32 = 4;
const FLAGS_MASK: u32 = 0xF;
const ALIGNMENT: usize = 512;
/// How far into the file the first header may start.
const SEARCH_LIMIT: u64 = 32 << 20;
const PROBE_LIMIT: usize = 1 << 20;

/// Compression of the install data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsisMethod {
    /// Stored.
    Copy,
    /// Raw deflate.
    Deflate,
    /// LZMA with five property bytes in front.
    Lzma,
    /// The installer's headerless bzip2 variant.
    Bzip2,
}

impl NsisMethod {
    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            NsisMethod::Copy => "Copy",
            NsisMethod::Deflate => "Deflate",
            NsisMethod::Lzma => "LZMA",
            NsisMethod::Bzip2 => "BZip2",
        }
    }

    /// Decoder registry key.
    pub fn registry_name(&self) -> &'static str {
        match self {
            NsisMethod::Copy => method::COPY,
            NsisMethod::Deflate => method::DEFLATE,
            NsisMethod::Lzma => method::LZMA,
            NsisMethod::Bzip2 => method::NSIS_BZIP2,
        }
    }

    /// Guesses the method from the first bytes of a compressed stream.
    pub fn detect(sig: &[u8]) -> Self {
        if is_lzma(sig) {
            NsisMethod::Lzma
        } else if is_bzip2(sig) {
            NsisMethod::Bzip2
        } else {
            NsisMethod::Deflate
        }
    }
}

fn is_lzma(p: &[u8]) -> bool {
    p.len() >= 6 && p[0] == 0x5D && p[1] == 0 && p[2] == 0 && p[5] == 0
}

fn is_bzip2(p: &[u8]) -> bool {
    p.starts_with(&[0x31, 0x41, 0x59])
}

/// The first header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstHeader {
    /// Offset of the header in the file.
    pub offset: u64,
    /// Installer flags.
    pub flags: u32,
    /// Uncompressed size of the install header.
    pub header_size: u32,
    /// Size of everything from the first header on, CRC included.
    pub data_size: u32,
}

impl FirstHeader {
    /// Decodes a first header at the start of `buf`.
    pub fn parse(buf: &[u8], offset: u64) -> Option<Self> {
        if buf.len() < FIRST_HEADER_SIZE
            || le_u32(buf, 4)? != SIGNATURE
            || &buf[8..20] != MAGIC
        {
            return None;
        }
        let flags = le_u32(buf, 0)?;
        if flags & !FLAGS_MASK != 0 {
            return None;
        }
        Some(Self {
            offset,
            flags,
            header_size: le_u32(buf, 20)?,
            data_size: le_u32(buf, 24)?,
        })
    }

    fn has_crc(&self) -> bool {
        self.flags & FLAG_NO_CRC == 0
    }
}

fn find_in(buf: &[u8], base: u64) -> Option<FirstHeader> {
    (0..buf.len())
        .step_by(ALIGNMENT)
        .find_map(|i| FirstHeader::parse(&buf[i..], base + i as u64))
}

fn find_first_header(reader: &mut dyn ReadSeek, source_len: u64) -> Result<Option<FirstHeader>> {
    const CHUNK: usize = 64 * 1024;
    let mut buf = vec![0u8; CHUNK];
    let mut pos = 0u64;
    while pos < source_len.min(SEARCH_LIMIT) {
        reader.seek(SeekFrom::Start(pos))?;
        let got = read_up_to(reader, &mut buf)?;
        if let Some(found) = find_in(&buf[..got], pos) {
            return Ok(Some(found));
        }
        if got < CHUNK {
            break;
        }
        pos += CHUNK as u64;
    }
    Ok(None)
}

/// Reads a decoded stream to exactly `len` bytes.
fn read_decoded<R: Read + ?Sized>(reader: &mut R, len: usize, at: u64) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    read_exact_or_need_more(reader, &mut out, at)
        .map_err(|e| Error::corrupt_header(at, format!("install header: {e}")))?;
    Ok(out)
}

fn map_decode_error(e: Error, at: u64) -> Error {
    match e {
        Error::UnsupportedMethod { .. } | Error::ResourceLimitExceeded(_) => e,
        other => Error::corrupt_header(at, other.to_string()),
    }
}

struct Loaded {
    layout: Layout,
    header: Vec<u8>,
    method: NsisMethod,
}

fn load(
    reader: &mut dyn ReadSeek,
    first: &FirstHeader,
    end: u64,
    decoders: &DecoderRegistry,
) -> Result<Loaded> {
    let data_start = first.offset + FIRST_HEADER_SIZE as u64;
    let header_len = first.header_size as usize;
    let mut sig = [0u8; 10];
    reader.seek(SeekFrom::Start(data_start))?;
    read_exact_or_need_more(reader, &mut sig, data_start)?;
    let word = le_u32(&sig, 0).unwrap_or(0);

    let solid_method = if is_lzma(&sig) {
        Some(NsisMethod::Lzma)
    } else if is_bzip2(&sig) {
        Some(NsisMethod::Bzip2)
    } else if word == first.header_size || word & 0x8000_0000 != 0 {
        None
    } else {
        Some(NsisMethod::Deflate)
    };

    if let Some(method) = solid_method {
        reader.seek(SeekFrom::Start(data_start))?;
        let input = Box::new(Read::take(&mut *reader, end.saturating_sub(data_start)));
        let mut stream =
            decoder(decoders, method, input).map_err(|e| map_decode_error(e, data_start))?;
        let size = read_block_size(&mut stream, 0)
            .map_err(|e| map_decode_error(e, data_start))?
            .ok_or_else(|| Error::corrupt_header(data_start, "empty solid stream"))?;
        if size != first.header_size {
            return Err(Error::corrupt_header(
                data_start,
                format!("header size {size} differs from {}", first.header_size),
            ));
        }
        let header = read_decoded(&mut stream, header_len, data_start)?;
        return Ok(Loaded {
            layout: Layout::Solid {
                method,
                start: data_start,
                len: end.saturating_sub(data_start),
                skip: 4 + header_len as u64,
            },
            header,
            method,
        });
    }

    let body = data_start + 4;
    if word == first.header_size {
        let header = read_region(reader, body, header_len as u64, &Default::default())
            .map_err(|e| map_decode_error(e, body))?;
        return Ok(Loaded {
            layout: Layout::NonSolid {
                blocks_start: body + header_len as u64,
                end,
            },
            header,
            method: NsisMethod::Copy,
        });
    }

    let packed = (word & 0x7FFF_FFFF) as u64;
    if body + packed > end {
        return Err(Error::corrupt_header(data_start, "compressed header past the data"));
    }
    let method = NsisMethod::detect(&sig[4..]);
    reader.seek(SeekFrom::Start(body))?;
    let input = Box::new(Read::take(&mut *reader, packed));
    let mut stream = decoder(decoders, method, input).map_err(|e| map_decode_error(e, body))?;
    let header = read_decoded(&mut stream, header_len, body)?;
    Ok(Loaded {
        layout: Layout::NonSolid {
            blocks_start: body + packed,
            end,
        },
        header,
        method,
    })
}

/// What is known about one data block before extraction.
#[derive(Debug, Clone, Copy, Default)]
struct BlockInfo {
    size: Option<u64>,
    packed: Option<u64>,
    /// Method of the block's bytes; `None` when unknown.
    method: Option<NsisMethod>,
}

fn non_solid_blocks(
    reader: &mut dyn ReadSeek,
    blocks_start: u64,
    end: u64,
    positions: &[u32],
) -> Result<Vec<BlockInfo>> {
    positions
        .iter()
        .map(|&pos| {
            let at = blocks_start + pos as u64;
            if at + 4 > end {
                return Err(Error::corrupt_header(at, "data position past the installer"));
            }
            reader.seek(SeekFrom::Start(at))?;
            let mut head = [0u8; 4];
            read_exact_or_need_more(reader, &mut head, at)?;
            let raw = u32::from_le_bytes(head);
            let len = (raw & 0x7FFF_FFFF) as u64;
            if raw & 0x8000_0000 == 0 {
                return Ok(BlockInfo {
                    size: Some(len),
                    packed: Some(len),
                    method: Some(NsisMethod::Copy),
                });
            }
            // A block running past the data fails when it is read.
            let method = if at + 4 + len <= end {
                let mut sig = vec![0u8; len.min(8) as usize];
                read_exact_or_need_more(reader, &mut sig, at + 4)?;
                Some(NsisMethod::detect(&sig))
            } else {
                None
            };
            Ok(BlockInfo {
                size: None,
                packed: Some(len),
                method,
            })
        })
        .collect()
}

/// Walks the solid stream once to learn the size of every wanted block.
fn solid_blocks(
    reader: &mut dyn ReadSeek,
    layout: Layout,
    decoders: &DecoderRegistry,
    positions: &[u32],
) -> Result<Vec<BlockInfo>> {
    let Layout::Solid {
        method,
        start,
        len,
        skip: header_bytes,
    } = layout
    else {
        return Ok(vec![BlockInfo::default(); positions.len()]);
    };
    let mut sizes = std::collections::BTreeMap::new();
    let last = positions.iter().copied().max().unwrap_or(0) as u64;
    reader.seek(SeekFrom::Start(start))?;
    let mut stream = decoder(decoders, method, Box::new(Read::take(&mut *reader, len)))?;
    skip(&mut stream, header_bytes)?;
    let mut logical = 0u64;
    while logical <= last {
        let Some(size) = read_block_size(&mut stream, logical)? else {
            break;
        };
        sizes.insert(logical, size as u64);
        skip(&mut stream, size as u64)?;
        logical += 4 + size as u64;
    }
    Ok(positions
        .iter()
        .map(|&p| BlockInfo {
            size: sizes.get(&(p as u64)).copied(),
            packed: None,
            method: Some(method),
        })
        .collect())
}

/// NSIS installer handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct NsisHandler;

impl FormatHandler for NsisHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Nsis
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["exe", "nsis"]
    }

    fn probe_limit(&self) -> usize {
        PROBE_LIMIT
    }

    fn probe(&self, prefix: &[u8]) -> Probe {
        if prefix.len() < FIRST_HEADER_SIZE {
            return Probe::NeedMore;
        }
        if FirstHeader::parse(prefix, 0).is_some() {
            return Probe::Yes;
        }
        if !prefix.starts_with(b"MZ") {
            return Probe::No;
        }
        match find_in(prefix, 0) {
            Some(_) => Probe::Yes,
            None if prefix.len() < PROBE_LIMIT => Probe::NeedMore,
            None => Probe::No,
        }
    }

    fn open(&self, reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened> {
        let first = find_first_header(reader, ctx.source_len)?
            .ok_or_else(|| Error::not_an_archive("no installer header"))?;
        let total_end = first.offset + first.data_size as u64;
        if first.data_size < FIRST_HEADER_SIZE as u32 || total_end > ctx.source_len {
            return Err(Error::not_an_archive("installer data is truncated"));
        }
        let end = if first.has_crc() {
            total_end.saturating_sub(4)
        } else {
            total_end
        };
        ctx.options
            .limits
            .check_header_bytes(first.header_size as u64)?;
        log::debug!(
            "installer header at {:#x}, {} header bytes",
            first.offset,
            first.header_size
        );

        let loaded = load(reader, &first, end, ctx.decoders)?;
        let install = InstallHeader::parse(&loaded.header)?;
        let entries = install.entries(&loaded.header);
        let strings = StringTable::new(install.string_bytes(&loaded.header));
        let script = script_items(&entries, &strings)?;
        ctx.options.limits.check_items(script.len())?;

        let positions: Vec<u32> = script.iter().filter_map(|s| s.position).collect();
        let blocks = match loaded.layout {
            Layout::NonSolid { blocks_start, end } => {
                non_solid_blocks(reader, blocks_start, end, &positions)?
            }
            solid => solid_blocks(reader, solid, ctx.decoders, &positions)
                .map_err(|e| map_decode_error(e, first.offset))?,
        };

        let mut info = ArchiveInfo::new(FormatKind::Nsis);
        info.physical_size = total_end;
        info.is_solid = matches!(loaded.layout, Layout::Solid { .. });
        // A stored header says nothing about the data; name the first
        // compressed block's method instead.
        let data_method = blocks
            .iter()
            .filter_map(|b| b.method)
            .find(|m| *m != NsisMethod::Copy);
        let archive_method = match (loaded.method, data_method) {
            (NsisMethod::Copy, Some(m)) => m,
            (m, _) => m,
        };
        info.method = Some(archive_method.name().to_string());
        info.flags.data_after_end = total_end < ctx.source_len;
        if strings.code_set() == strings::CodeSet::Nsis3 {
            info.comment = Some("NSIS-3".to_string());
        }

        let mut block_iter = blocks.into_iter();
        let items: Vec<Item> = script
            .into_iter()
            .map(|entry| match entry.position {
                None => Item::directory(entry.path),
                Some(pos) => {
                    let block = block_iter.next().unwrap_or_default();
                    let mut item = Item::file(
                        entry.path,
                        block.size.unwrap_or(0),
                        DataLocator::Position(pos as u64),
                    );
                    item.size = block.size;
                    item.packed_size = block.packed;
                    item.modified = entry.modified;
                    item.method = block.method.map(|m| m.name().to_string());
                    item
                }
            })
            .collect();
        info.item_count = items.len();

        let source = NsisSource::new(
            Arc::clone(ctx.decoders),
            loaded.layout,
            positions,
            ctx.options.nsis_cache_capacity,
        );
        Ok(Opened {
            items,
            info,
            source: Box::new(source),
        })
    }
}

//! Intel HEX images.
//!
//! Each `:`-prefixed line is one record: byte count, 16-bit address, type,
//! payload and a checksum making the byte sum zero. Data records at
//! adjacent absolute addresses are merged into one block; every block
//! becomes an item named by its 8-digit upper-case start address.

use std::io::Read;

use crate::archive_path::ItemPath;
use crate::format::detect::{FormatHandler, OpenContext, Opened, Probe};
use crate::format::locator::{DataLocator, PlainSource, ReadSeek};
use crate::format::reader::read_region;
use crate::format::{ArchiveInfo, FormatKind};
use crate::item::Item;
use crate::{Error, Result};

/// Record type: data.
pub const REC_DATA: u8 = 0;
/// Record type: end of file.
pub const REC_EOF: u8 = 1;
/// Record type: extended segment address.
pub const REC_EXT_SEGMENT: u8 = 2;
/// Record type: start segment address.
pub const REC_START_SEGMENT: u8 = 3;
/// Record type: extended linear address.
pub const REC_EXT_LINEAR: u8 = 4;
/// Record type: start linear address.
pub const REC_START_LINEAR: u8 = 5;

const PROBE_RECORDS: usize = 3;

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record type.
    pub kind: u8,
    /// 16-bit address field.
    pub address: u16,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// A run of contiguous data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Absolute start address.
    pub offset: u64,
    /// Bytes.
    pub data: Vec<u8>,
}

/// A parsed image.
#[derive(Debug, Clone, Default)]
pub struct IhexImage {
    /// Blocks in file order.
    pub blocks: Vec<Block>,
    /// Whether an end-of-file record was found.
    pub has_eof: bool,
    /// Bytes up to and including the end-of-file line.
    pub physical_size: u64,
    /// Non-blank text follows the end-of-file record.
    pub data_after_end: bool,
    /// Entry point from a start-address record.
    pub start_address: Option<u32>,
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

fn is_blank(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

/// Decodes one line (without terminator) into a record.
///
/// Returns `None` for malformed hex, a wrong count, a bad checksum or a
/// record whose fixed fields do not fit its type.
pub fn parse_record(line: &[u8]) -> Option<Record> {
    let line = line.strip_prefix(b":")?;
    let mut end = line.len();
    while end > 0 && is_blank(line[end - 1]) {
        end -= 1;
    }
    let line = &line[..end];
    if line.len() < 10 || line.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(line.len() / 2);
    for pair in line.chunks_exact(2) {
        bytes.push(hex_value(pair[0])? << 4 | hex_value(pair[1])?);
    }
    let count = bytes[0] as usize;
    if bytes.len() != count + 5 {
        return None;
    }
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    if sum != 0 {
        return None;
    }
    let address = u16::from_be_bytes([bytes[1], bytes[2]]);
    let kind = bytes[3];
    let valid = match kind {
        REC_DATA => true,
        REC_EOF => count == 0,
        REC_EXT_SEGMENT | REC_EXT_LINEAR => count == 2 && address == 0,
        REC_START_SEGMENT | REC_START_LINEAR => count == 4 && address == 0,
        _ => false,
    };
    if !valid {
        return None;
    }
    Some(Record {
        kind,
        address,
        data: bytes[4..4 + count].to_vec(),
    })
}

/// Splits off the next non-blank line. Returns `(line, next_pos, complete)`.
fn next_line(text: &[u8], mut pos: usize) -> Option<(&[u8], usize, bool)> {
    while pos < text.len() && is_blank(text[pos]) {
        pos += 1;
    }
    if pos >= text.len() {
        return None;
    }
    match text[pos..].iter().position(|&c| c == b'\n' || c == b'\r') {
        Some(len) => Some((&text[pos..pos + len], pos + len, true)),
        None => Some((&text[pos..], text.len(), false)),
    }
}

/// Parses a whole image.
///
/// # Errors
///
/// [`Error::NotAnArchive`] for the first invalid record or when no record
/// is present at all.
pub fn parse(text: &[u8]) -> Result<IhexImage> {
    let mut image = IhexImage::default();
    let mut base: u64 = 0;
    let mut pos = 0;
    let mut records = 0usize;

    while let Some((line, next, _)) = next_line(text, pos) {
        if image.has_eof {
            image.data_after_end = true;
            break;
        }
        let record = parse_record(line).ok_or_else(|| {
            Error::not_an_archive(format!("invalid Intel HEX record at offset {pos:#x}"))
        })?;
        records += 1;
        pos = next;
        match record.kind {
            REC_DATA => {
                let offset = base + record.address as u64;
                if record.data.is_empty() {
                    continue;
                }
                match image.blocks.last_mut() {
                    Some(block) if block.offset + block.data.len() as u64 == offset => {
                        block.data.extend_from_slice(&record.data);
                    }
                    _ => image.blocks.push(Block {
                        offset,
                        data: record.data,
                    }),
                }
            }
            REC_EOF => {
                image.has_eof = true;
                image.physical_size = pos as u64;
                while image.physical_size < text.len() as u64
                    && matches!(text[image.physical_size as usize], b'\r' | b'\n')
                {
                    image.physical_size += 1;
                }
            }
            REC_EXT_SEGMENT => {
                base = (u16::from_be_bytes([record.data[0], record.data[1]]) as u64) << 4;
            }
            REC_EXT_LINEAR => {
                base = (u16::from_be_bytes([record.data[0], record.data[1]]) as u64) << 16;
            }
            _ => {
                image.start_address = Some(u32::from_be_bytes([
                    record.data[0],
                    record.data[1],
                    record.data[2],
                    record.data[3],
                ]));
            }
        }
    }

    if records == 0 {
        return Err(Error::not_an_archive("no Intel HEX records"));
    }
    if !image.has_eof {
        image.physical_size = text.len() as u64;
    }
    Ok(image)
}

/// Intel HEX handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct IhexHandler;

impl FormatHandler for IhexHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Ihex
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["hex", "ihex", "ihx"]
    }

    fn probe(&self, prefix: &[u8]) -> Probe {
        if prefix.is_empty() {
            return Probe::NeedMore;
        }
        if prefix[0] != b':' {
            return Probe::No;
        }
        let mut pos = 0;
        let mut checked = 0;
        while checked < PROBE_RECORDS {
            let Some((line, next, complete)) = next_line(prefix, pos) else {
                return Probe::NeedMore;
            };
            if !complete {
                return Probe::NeedMore;
            }
            match parse_record(line) {
                Some(record) if record.kind == REC_EOF => return Probe::Yes,
                Some(_) => checked += 1,
                None => return Probe::No,
            }
            pos = next;
        }
        Probe::Yes
    }

    fn open(&self, reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened> {
        let text = read_region(reader, 0, ctx.source_len, &ctx.options.limits)?;
        let image = parse(&text)?;
        ctx.options.limits.check_items(image.blocks.len())?;

        let mut info = ArchiveInfo::new(FormatKind::Ihex);
        info.physical_size = image.physical_size;
        if !image.has_eof {
            info.flags.unexpected_end = true;
            info.warn("missing end-of-file record");
        }
        info.flags.data_after_end = image.data_after_end;

        let items: Vec<Item> = image
            .blocks
            .into_iter()
            .map(|block| {
                let len = block.data.len() as u64;
                let mut item = Item::file(
                    ItemPath::new([format!("{:08X}", block.offset)]),
                    len,
                    DataLocator::Resident(block.data),
                );
                item.packed_size = Some(len);
                item.offset = Some(block.offset);
                item
            })
            .collect();
        info.item_count = items.len();
        Ok(Opened {
            items,
            info,
            source: Box::new(PlainSource),
        })
    }
}

/// Reads an Intel HEX image from any reader.
pub fn read_image<R: Read>(mut reader: R) -> Result<IhexImage> {
    let mut text = Vec::new();
    reader.read_to_end(&mut text)?;
    parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &[u8] = b":0300300002337A1E\n:00000001FF\n";

    #[test]
    fn test_single_record_image() {
        let image = parse(SCENARIO).unwrap();
        assert!(image.has_eof);
        assert!(!image.data_after_end);
        assert_eq!(image.physical_size, SCENARIO.len() as u64);
        assert_eq!(
            image.blocks,
            vec![Block {
                offset: 0x30,
                data: vec![0x02, 0x33, 0x7A]
            }]
        );
    }

    #[test]
    fn test_records_sum_to_zero() {
        for line in SCENARIO.split(|&c| c == b'\n').filter(|l| !l.is_empty()) {
            assert!(parse_record(line).is_some());
        }
    }

    #[test]
    fn test_single_byte_corruption_rejected() {
        for i in 1..17 {
            let mut bad = SCENARIO.to_vec();
            bad[i] = if bad[i] == b'0' { b'1' } else { b'0' };
            assert!(parse(&bad).is_err(), "corruption at {i} accepted");
        }
    }

    #[test]
    fn test_coalescing_and_extended_address() {
        let text = b":02000000AABB99\n:02000200CCDD53\n:02000800EEFF09\n\
:020000040001F9\n:0100000011EE\n:00000001FF\n";
        let image = parse(text).unwrap();
        assert_eq!(image.blocks.len(), 3);
        assert_eq!(image.blocks[0].offset, 0);
        assert_eq!(image.blocks[0].data, vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(image.blocks[1].offset, 8);
        assert_eq!(image.blocks[1].data, vec![0xEE, 0xFF]);
        assert_eq!(image.blocks[2].offset, 0x10000);
        assert_eq!(image.blocks[2].data, vec![0x11]);
    }

    #[test]
    fn test_trailing_text_flagged() {
        let mut text = SCENARIO.to_vec();
        text.extend_from_slice(b"garbage\n");
        let image = parse(&text).unwrap();
        assert!(image.data_after_end);
        assert_eq!(image.physical_size, SCENARIO.len() as u64);
    }

    #[test]
    fn test_missing_eof_is_partial() {
        let image = parse(b":0300300002337A1E\n").unwrap();
        assert!(!image.has_eof);
        assert_eq!(image.blocks.len(), 1);
    }

    #[test]
    fn test_probe() {
        let h = IhexHandler;
        assert_eq!(h.probe(SCENARIO), Probe::Yes);
        assert_eq!(h.probe(b":03003000"), Probe::NeedMore);
        assert_eq!(h.probe(b"hello"), Probe::No);
        assert_eq!(h.probe(b":0300300002337A1F\n"), Probe::No);
    }
}

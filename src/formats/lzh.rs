//! LHA / LZH archives.
//!
//! An archive is a sequence of headers, each followed by its packed data,
//! terminated by a zero byte. Three header levels are understood:
//!
//! | Level | Size field | Check | Time |
//! |-------|------------|-------|------|
//! | 0 | 1 byte | byte sum | DOS |
//! | 1 | 1 byte | byte sum, extensions follow | DOS |
//! | 2 | 2 bytes, total | CRC-16 extension | Unix |
//!
//! A header that fails validation after at least one good item ends the
//! listing with [`ArchiveFlags::headers_error`](crate::format::ArchiveFlags);
//! a truncated one with `unexpected_end`.

use std::io::{Read, SeekFrom};
use std::sync::Arc;

use crate::archive_path::ItemPath;
use crate::checksum::{Checksum, Crc16};
use crate::codec::{DecodeParams, DecoderRegistry};
use crate::format::detect::{FormatHandler, OpenContext, Opened, Probe};
use crate::format::locator::{open_locator, DataLocator, ReadSeek, StreamSource};
use crate::format::reader::{le_u16, le_u32, le_u64, read_exact_or_need_more, read_up_to};
use crate::format::{ArchiveInfo, FormatKind};
use crate::item::{Attributes, Item, ItemChecksum, LinkInfo};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Fixed part of a level 0/1 header before the name.
const BASE_FIXED: usize = 22;
/// Fixed size of a level-2 header before its extensions.
const LEVEL2_FIXED: usize = 26;

const EXT_HEADER_CRC: u8 = 0x00;
const EXT_FILENAME: u8 = 0x01;
const EXT_DIRNAME: u8 = 0x02;
const EXT_DOS_ATTR: u8 = 0x40;
const EXT_WINDOWS_TIMES: u8 = 0x41;
const EXT_UNIX_MODE: u8 = 0x50;
const EXT_UNIX_MTIME: u8 = 0x54;

/// Upper bound on extension records per header.
const MAX_EXTENSIONS: usize = 256;

/// Method ids stored without compression.
const COPY_METHODS: [&[u8; 5]; 3] = [b"-lh0-", b"-lz4-", b"-pm0-"];
const DIRECTORY_METHOD: &[u8; 5] = b"-lhd-";

/// Dictionary size log2 for an LZSS-family method id.
pub fn dictionary_log(method: &[u8]) -> Option<u8> {
    match method {
        b"-lh4-" => Some(12),
        b"-lh5-" => Some(13),
        b"-lh6-" => Some(15),
        b"-lh7-" => Some(16),
        b"-lzs-" => Some(11),
        b"-lz5-" => Some(12),
        _ => None,
    }
}

/// Returns true if `method` stores data verbatim.
pub fn is_copy_method(method: &[u8]) -> bool {
    COPY_METHODS.iter().any(|m| m.as_slice() == method)
}

fn looks_like_method(m: &[u8]) -> bool {
    m.len() == 5
        && m[0] == b'-'
        && m[4] == b'-'
        && m[1].is_ascii_lowercase()
        && m[2].is_ascii_alphanumeric()
        && m[3].is_ascii_alphanumeric()
}

/// One decoded header.
#[derive(Debug, Clone, Default)]
pub struct LzhHeader {
    /// Header level (0, 1 or 2).
    pub level: u8,
    /// Five-byte method id such as `-lh5-`.
    pub method: [u8; 5],
    /// Packed size, extensions excluded.
    pub packed_size: u64,
    /// Original size.
    pub size: u64,
    /// CRC-16/ARC of the original data.
    pub crc: u16,
    /// Operating system id.
    pub os: u8,
    /// File name bytes (may contain `\` or `0xFF` separators).
    pub name: Vec<u8>,
    /// Directory bytes from extension 0x02.
    pub dir: Vec<u8>,
    /// DOS date and time.
    pub dos_time: Option<(u16, u16)>,
    /// Unix modification time.
    pub unix_mtime: Option<u32>,
    /// Windows creation, modification and access times.
    pub windows_times: Option<[u64; 3]>,
    /// DOS attribute bits.
    pub dos_attributes: Option<u16>,
    /// Unix permission bits.
    pub unix_mode: Option<u16>,
    /// Bytes from the header start to the first data byte.
    pub header_len: u64,
}

impl LzhHeader {
    /// The method id as text.
    pub fn method_str(&self) -> String {
        String::from_utf8_lossy(&self.method).into_owned()
    }

    /// Returns true for `-lhd-` entries.
    pub fn is_directory(&self) -> bool {
        &self.method == DIRECTORY_METHOD
    }

    fn modified(&self) -> Option<Timestamp> {
        if let Some(times) = self.windows_times {
            if times[1] != 0 {
                return Some(Timestamp::from_filetime(times[1]));
            }
        }
        if let Some(secs) = self.unix_mtime {
            return Timestamp::from_unix_secs(secs as i64);
        }
        self.dos_time
            .and_then(|(date, time)| Timestamp::from_dos_datetime(date, time))
    }

    fn attributes(&self) -> Attributes {
        let mut bits = self.dos_attributes.unwrap_or(0) as u32;
        if let Some(mode) = self.unix_mode {
            bits |= Attributes::from_unix_mode(mode as u32).bits();
        }
        if self.is_directory() {
            bits |= Attributes::DIRECTORY;
        }
        Attributes(bits)
    }

    /// Splits the stored name into path segments and an optional symlink target.
    pub fn path_and_link(&self) -> (ItemPath, Option<String>) {
        let mut segments: Vec<String> = split_name(&self.dir);
        let name = String::from_utf8_lossy(&self.name).into_owned();
        let (name, target) = match name.split_once('|') {
            Some((n, t)) => (n.to_string(), Some(t.to_string())),
            None => (name, None),
        };
        segments.extend(split_name(name.as_bytes()));
        (ItemPath::new(segments), target)
    }
}

fn split_name(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == 0xFF || b == b'\\' || b == b'/')
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

/// Checks a level 0/1 base header. `buf` must hold the whole base header.
fn parse_base_01(buf: &[u8], offset: u64) -> Result<(LzhHeader, u16)> {
    let base_len = buf[0] as usize + 2;
    if base_len < BASE_FIXED + 2 {
        return Err(Error::corrupt_header(offset, "header size too small"));
    }
    if buf.len() < base_len {
        return Err(Error::NeedMoreInput {
            offset,
            needed: (base_len - buf.len()) as u64,
        });
    }
    let buf = &buf[..base_len];
    let sum = buf[2..].iter().fold(0u8, |a, &b| a.wrapping_add(b));
    if sum != buf[1] {
        return Err(Error::corrupt_header(offset, "header checksum mismatch"));
    }
    let level = buf[20];
    let name_len = buf[21] as usize;
    let min = BASE_FIXED + name_len + 2 + if level == 1 { 3 } else { 0 };
    if base_len < min {
        return Err(Error::corrupt_header(offset, "header too short for its name"));
    }
    let mut header = LzhHeader {
        level,
        packed_size: le_u32(buf, 7).unwrap_or(0) as u64,
        size: le_u32(buf, 11).unwrap_or(0) as u64,
        dos_time: Some((le_u16(buf, 17).unwrap_or(0), le_u16(buf, 15).unwrap_or(0))),
        dos_attributes: Some(buf[19] as u16),
        name: buf[BASE_FIXED..BASE_FIXED + name_len].to_vec(),
        crc: le_u16(buf, BASE_FIXED + name_len).unwrap_or(0),
        header_len: base_len as u64,
        ..LzhHeader::default()
    };
    header.method.copy_from_slice(&buf[2..7]);

    let extra = &buf[BASE_FIXED + name_len + 2..];
    let mut next_ext = 0;
    if level == 1 {
        header.os = extra[0];
        next_ext = le_u16(buf, base_len - 2).unwrap_or(0);
    } else if let Some((&os, rest)) = extra.split_first() {
        header.os = os;
        // Level-0 Unix extension: mtime, mode, uid, gid.
        if os == b'U' && rest.len() >= 7 {
            header.unix_mtime = le_u32(rest, 1);
            header.unix_mode = le_u16(rest, 5);
        }
    }
    Ok((header, next_ext))
}

fn parse_base_2(buf: &[u8], offset: u64) -> Result<(LzhHeader, u16)> {
    if buf.len() < LEVEL2_FIXED {
        return Err(Error::NeedMoreInput {
            offset,
            needed: (LEVEL2_FIXED - buf.len()) as u64,
        });
    }
    let total = le_u16(buf, 0).unwrap_or(0) as u64;
    if total < LEVEL2_FIXED as u64 {
        return Err(Error::corrupt_header(offset, "level-2 header size too small"));
    }
    let mut header = LzhHeader {
        level: 2,
        packed_size: le_u32(buf, 7).unwrap_or(0) as u64,
        size: le_u32(buf, 11).unwrap_or(0) as u64,
        unix_mtime: le_u32(buf, 15),
        crc: le_u16(buf, 21).unwrap_or(0),
        os: buf[23],
        header_len: total,
        ..LzhHeader::default()
    };
    header.method.copy_from_slice(&buf[2..7]);
    Ok((header, le_u16(buf, 24).unwrap_or(0)))
}

fn apply_extension(header: &mut LzhHeader, kind: u8, data: &[u8]) {
    match kind {
        EXT_FILENAME => header.name = data.to_vec(),
        EXT_DIRNAME => header.dir = data.to_vec(),
        EXT_DOS_ATTR => header.dos_attributes = le_u16(data, 0),
        EXT_WINDOWS_TIMES => {
            if let (Some(c), Some(m), Some(a)) = (le_u64(data, 0), le_u64(data, 8), le_u64(data, 16)) {
                header.windows_times = Some([c, m, a]);
            }
        }
        EXT_UNIX_MODE => header.unix_mode = le_u16(data, 0),
        EXT_UNIX_MTIME => header.unix_mtime = le_u32(data, 0),
        _ => {}
    }
}

/// Result of reading at one position.
enum Next {
    End,
    Header(LzhHeader),
}

/// Reads the header at `pos`, including its extension chain.
fn read_header(reader: &mut dyn ReadSeek, pos: u64) -> Result<Next> {
    reader.seek(SeekFrom::Start(pos))?;
    let mut first = [0u8; BASE_FIXED];
    let got = read_up_to(reader, &mut first)?;
    if got == 0 || first[0] == 0 {
        return Ok(Next::End);
    }
    if got < BASE_FIXED {
        return Err(Error::NeedMoreInput {
            offset: pos + got as u64,
            needed: (BASE_FIXED - got) as u64,
        });
    }
    if !looks_like_method(&first[2..7]) {
        return Err(Error::corrupt_header(pos, "invalid method id"));
    }
    let level = first[20];
    let (mut raw, (mut header, mut next)) = match level {
        0 | 1 => {
            if (first[0] as usize) < BASE_FIXED {
                return Err(Error::corrupt_header(pos, "header size too small"));
            }
            let mut raw = vec![0u8; first[0] as usize + 2];
            raw[..BASE_FIXED].copy_from_slice(&first);
            read_exact_or_need_more(reader, &mut raw[BASE_FIXED..], pos + BASE_FIXED as u64)?;
            let parsed = parse_base_01(&raw, pos)?;
            (raw, parsed)
        }
        2 => {
            let mut raw = vec![0u8; LEVEL2_FIXED];
            raw[..BASE_FIXED].copy_from_slice(&first);
            read_exact_or_need_more(reader, &mut raw[BASE_FIXED..], pos + BASE_FIXED as u64)?;
            let parsed = parse_base_2(&raw, pos)?;
            (raw, parsed)
        }
        other => {
            return Err(Error::corrupt_header(pos, format!("unsupported header level {other}")));
        }
    };

    let mut crc_field = None;
    let mut ext_bytes = 0u64;
    let mut count = 0;
    while next != 0 {
        count += 1;
        if count > MAX_EXTENSIONS || next < 3 {
            return Err(Error::corrupt_header(pos, "malformed extension chain"));
        }
        let start = raw.len();
        raw.resize(start + next as usize, 0);
        read_exact_or_need_more(reader, &mut raw[start..], pos + start as u64)?;
        let ext = &raw[start..];
        let kind = ext[0];
        let data_end = ext.len() - 2;
        if kind == EXT_HEADER_CRC && data_end >= 3 {
            crc_field = Some(start + 1);
        }
        let data = ext[1..data_end].to_vec();
        let following = le_u16(ext, data_end).unwrap_or(0);
        apply_extension(&mut header, kind, &data);
        ext_bytes += next as u64;
        next = following;
    }

    match header.level {
        1 => {
            header.packed_size = header
                .packed_size
                .checked_sub(ext_bytes)
                .ok_or_else(|| Error::corrupt_header(pos, "extensions exceed packed size"))?;
            header.header_len += ext_bytes;
        }
        2 => {
            if (raw.len() as u64) > header.header_len {
                return Err(Error::corrupt_header(pos, "extensions exceed header size"));
            }
            if let Some(at) = crc_field {
                let stored = le_u16(&raw, at).unwrap_or(0);
                // Padding between the last extension and the data is part of the CRC.
                let pad = header.header_len as usize - raw.len();
                if pad > 0 {
                    let start = raw.len();
                    raw.resize(start + pad, 0);
                    read_exact_or_need_more(reader, &mut raw[start..], pos + start as u64)?;
                }
                raw[at] = 0;
                raw[at + 1] = 0;
                if Crc16::compute(&raw) != stored {
                    return Err(Error::corrupt_header(pos, "header CRC mismatch"));
                }
            }
        }
        _ => {}
    }
    Ok(Next::Header(header))
}

/// Payloads: copy methods straight through, the rest via the decoder registry.
struct LzhSource {
    decoders: Arc<DecoderRegistry>,
}

impl StreamSource for LzhSource {
    fn open_stream<'a>(
        &'a mut self,
        index: usize,
        item: &'a Item,
        source: &'a mut dyn ReadSeek,
    ) -> Result<Box<dyn Read + 'a>> {
        let raw = open_locator(index, &item.locator, source)?;
        let method = match item.method.as_deref() {
            Some(m) if !item.is_directory && !is_copy_method(m.as_bytes()) => m,
            _ => return Ok(raw),
        };
        let mut params = DecodeParams::sized(item.size_or_zero());
        if let Some(log) = dictionary_log(method.as_bytes()) {
            params = params.dict_log(log);
        }
        self.decoders.decode(method, raw, &params)
    }
}

/// LZH handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct LzhHandler;

impl FormatHandler for LzhHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Lzh
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["lzh", "lha"]
    }

    fn probe(&self, prefix: &[u8]) -> Probe {
        if prefix.len() < BASE_FIXED {
            return Probe::NeedMore;
        }
        if prefix[0] == 0 || !looks_like_method(&prefix[2..7]) {
            return Probe::No;
        }
        match prefix[20] {
            0 | 1 => match parse_base_01(prefix, 0) {
                Ok(_) => Probe::Yes,
                Err(Error::NeedMoreInput { .. }) => Probe::NeedMore,
                Err(_) => Probe::No,
            },
            2 if prefix.len() < LEVEL2_FIXED => Probe::NeedMore,
            2 if le_u16(prefix, 0).unwrap_or(0) as usize >= LEVEL2_FIXED => Probe::Yes,
            _ => Probe::No,
        }
    }

    fn open(&self, reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened> {
        let mut info = ArchiveInfo::new(FormatKind::Lzh);
        let mut items = Vec::new();
        let mut pos = 0u64;

        loop {
            let header = match read_header(reader, pos) {
                Ok(Next::End) => {
                    if pos < ctx.source_len {
                        pos += 1;
                    }
                    break;
                }
                Ok(Next::Header(h)) => h,
                Err(e) if items.is_empty() && e.is_recoverable() => {
                    return Err(Error::not_an_archive(e.to_string()));
                }
                Err(e @ Error::NeedMoreInput { .. }) => {
                    info.flags.unexpected_end = true;
                    info.warn(format!("truncated header: {e}"));
                    break;
                }
                Err(e @ Error::CorruptHeader { .. }) => {
                    info.flags.headers_error = true;
                    info.warn(e.to_string());
                    break;
                }
                Err(e) => return Err(e),
            };
            ctx.options.limits.check_items(items.len() + 1)?;

            let data_pos = pos + header.header_len;
            let (path, target) = header.path_and_link();
            let is_dir = header.is_directory();
            let mut item = if is_dir {
                Item::directory(path)
            } else {
                Item::file(
                    path,
                    header.size,
                    DataLocator::range(data_pos, header.packed_size),
                )
            };
            item.packed_size = Some(header.packed_size);
            item.modified = header.modified();
            if let Some(times) = header.windows_times {
                item.created = Timestamp::from_filetime_parts(times[0] as u32, (times[0] >> 32) as u32);
                item.accessed = Timestamp::from_filetime_parts(times[2] as u32, (times[2] >> 32) as u32);
            }
            item.attributes = header.attributes();
            item.method = Some(header.method_str());
            item.offset = Some(pos);
            if !is_dir {
                item.checksum = Some(ItemChecksum::Crc16(header.crc));
                if let Some(target) = target {
                    item.link = Some(LinkInfo::symlink(target));
                }
            }
            items.push(item);

            pos = data_pos + header.packed_size;
            if pos > ctx.source_len {
                info.flags.unexpected_end = true;
                info.warn("last item's data extends past the end of the input");
                pos = ctx.source_len;
                break;
            }
        }

        info.physical_size = pos;
        if pos < ctx.source_len {
            info.flags.data_after_end = true;
        }
        info.item_count = items.len();
        info.method = most_common_method(&items);
        Ok(Opened {
            items,
            info,
            source: Box::new(LzhSource {
                decoders: Arc::clone(ctx.decoders),
            }),
        })
    }
}

fn most_common_method(items: &[Item]) -> Option<String> {
    let mut counts: std::collections::BTreeMap<&str, usize> = Default::default();
    for item in items.iter().filter(|i| !i.is_directory) {
        if let Some(m) = item.method.as_deref() {
            *counts.entry(m).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(_, n)| n)
        .map(|(m, _)| m.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::OpenOptions;
    use std::io::Cursor;

    fn level0(method: &[u8; 5], name: &[u8], data: &[u8], crc: u16) -> Vec<u8> {
        let mut h = vec![0u8, 0];
        h.extend_from_slice(method);
        h.extend_from_slice(&(data.len() as u32).to_le_bytes());
        h.extend_from_slice(&(data.len() as u32).to_le_bytes());
        h.extend_from_slice(&0x6000u16.to_le_bytes());
        h.extend_from_slice(&0x5821u16.to_le_bytes());
        h.push(0x20);
        h.push(0);
        h.push(name.len() as u8);
        h.extend_from_slice(name);
        h.extend_from_slice(&crc.to_le_bytes());
        h[0] = (h.len() - 2) as u8;
        h[1] = h[2..].iter().fold(0u8, |a, &b| a.wrapping_add(b));
        h.extend_from_slice(data);
        h
    }

    fn level2(name: &[u8], data: &[u8]) -> Vec<u8> {
        let mut h = vec![0u8; LEVEL2_FIXED];
        h[2..7].copy_from_slice(b"-lh0-");
        h[7..11].copy_from_slice(&(data.len() as u32).to_le_bytes());
        h[11..15].copy_from_slice(&(data.len() as u32).to_le_bytes());
        h[15..19].copy_from_slice(&1_000_000_000u32.to_le_bytes());
        h[19] = 0x20;
        h[20] = 2;
        h[21..23].copy_from_slice(&Crc16::compute(data).to_le_bytes());
        h[23] = b'U';
        // CRC extension, then filename extension, then terminator.
        h[24..26].copy_from_slice(&5u16.to_le_bytes());
        h.extend_from_slice(&[EXT_HEADER_CRC, 0, 0]);
        h.extend_from_slice(&((name.len() + 3) as u16).to_le_bytes());
        h.push(EXT_FILENAME);
        h.extend_from_slice(name);
        h.extend_from_slice(&0u16.to_le_bytes());
        let total = h.len() as u16;
        h[0..2].copy_from_slice(&total.to_le_bytes());
        let crc = Crc16::compute(&h);
        h[LEVEL2_FIXED + 1..LEVEL2_FIXED + 3].copy_from_slice(&crc.to_le_bytes());
        h.extend_from_slice(data);
        h
    }

    fn open(bytes: Vec<u8>) -> Result<Opened> {
        let decoders = Arc::new(DecoderRegistry::default());
        let options = OpenOptions::default();
        let ctx = OpenContext {
            options: &options,
            decoders: &decoders,
            name_hint: None,
            source_len: bytes.len() as u64,
        };
        LzhHandler.open(&mut Cursor::new(bytes), &ctx)
    }

    fn read_item(opened: &mut Opened, bytes: &[u8], index: usize) -> Result<Vec<u8>> {
        let mut src = Cursor::new(bytes.to_vec());
        let item = opened.items[index].clone();
        let mut r = opened.source.open_stream(index, &item, &mut src)?;
        let mut out = Vec::new();
        r.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_stored_item_crc_matches() {
        let data = b"0123456789";
        let crc = Crc16::compute(data);
        let mut bytes = level0(b"-lh0-", b"dir\\ten.txt", data, crc);
        bytes.push(0);
        let mut opened = open(bytes.clone()).unwrap();
        assert!(opened.info.flags.is_clean());
        assert_eq!(opened.items.len(), 1);
        let item = &opened.items[0];
        assert_eq!(item.path.to_slash_string(), "dir/ten.txt");
        assert_eq!(item.size, Some(10));
        assert_eq!(item.packed_size, Some(10));
        assert_eq!(item.method.as_deref(), Some("-lh0-"));
        assert_eq!(item.checksum, Some(ItemChecksum::Crc16(crc)));
        let out = read_item(&mut opened, &bytes, 0).unwrap();
        assert_eq!(out, data);
        assert_eq!(Crc16::compute(&out), crc);
    }

    #[test]
    fn test_header_sum_invariant() {
        let bytes = level0(b"-lh0-", b"a", b"x", 0);
        let len = bytes[0] as usize + 2;
        let sum = bytes[2..len].iter().fold(0u8, |a, &b| a.wrapping_add(b));
        assert_eq!(sum, bytes[1]);
        for i in 2..len {
            let mut bad = bytes.clone();
            bad[i] ^= 0x01;
            assert!(open(bad).is_err(), "corruption at {i} accepted");
        }
    }

    #[test]
    fn test_truncated_second_header_keeps_first() {
        let mut bytes = level0(b"-lh0-", b"a", b"abc", Crc16::compute(b"abc"));
        let second = level0(b"-lh0-", b"b", b"def", Crc16::compute(b"def"));
        bytes.extend_from_slice(&second[..10]);
        let opened = open(bytes).unwrap();
        assert_eq!(opened.items.len(), 1);
        assert!(opened.info.flags.unexpected_end);
    }

    #[test]
    fn test_corrupt_second_header_sets_headers_error() {
        let mut bytes = level0(b"-lh0-", b"a", b"abc", Crc16::compute(b"abc"));
        let mut second = level0(b"-lh0-", b"b", b"def", Crc16::compute(b"def"));
        second[1] ^= 0xFF;
        bytes.extend_from_slice(&second);
        let opened = open(bytes).unwrap();
        assert_eq!(opened.items.len(), 1);
        assert!(opened.info.flags.headers_error);
    }

    #[test]
    fn test_level2_with_crc_extension() {
        let data = b"level two";
        let mut bytes = level2(b"two.txt", data);
        bytes.push(0);
        let mut opened = open(bytes.clone()).unwrap();
        assert_eq!(opened.items[0].name(), "two.txt");
        assert_eq!(
            opened.items[0].modified,
            Timestamp::from_unix_secs(1_000_000_000)
        );
        assert_eq!(read_item(&mut opened, &bytes, 0).unwrap(), data);

        let mut bad = bytes.clone();
        bad[LEVEL2_FIXED + 8] ^= 0x20;
        assert!(open(bad).is_err());
    }

    #[cfg(feature = "lzh")]
    #[test]
    fn test_lh5_member_decodes() {
        let packed = crate::codec::lzh::tests::lh5_run(b'A', 16);
        let plain = [b'A'; 16];
        let mut header = level0(b"-lh5-", b"packed", &packed, Crc16::compute(&plain));
        // Unpacked size differs from the packed length.
        header[11..15].copy_from_slice(&16u32.to_le_bytes());
        header[1] = header[2..header[0] as usize + 2]
            .iter()
            .fold(0u8, |a, &b| a.wrapping_add(b));
        let mut bytes = header;
        bytes.push(0);
        let mut opened = open(bytes.clone()).unwrap();
        assert_eq!(opened.items[0].method.as_deref(), Some("-lh5-"));
        assert_eq!(opened.items[0].size, Some(16));
        assert_eq!(opened.items[0].packed_size, Some(packed.len() as u64));
        assert_eq!(read_item(&mut opened, &bytes, 0).unwrap(), plain);
    }

    #[test]
    fn test_unknown_method_is_unsupported() {
        let mut bytes = level0(b"-lh9-", b"packed", b"\x00\x01\x02", 0);
        bytes.push(0);
        let mut opened = open(bytes.clone()).unwrap();
        let err = read_item(&mut opened, &bytes, 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { .. }));
    }

    #[test]
    fn test_directory_and_symlink() {
        let mut bytes = level0(b"-lhd-", b"folder", b"", 0);
        bytes.extend(level0(b"-lh0-", b"link|../target", b"", 0));
        bytes.push(0);
        let opened = open(bytes).unwrap();
        assert!(opened.items[0].is_directory);
        assert_eq!(opened.items[1].name(), "link");
        assert_eq!(opened.items[1].link, Some(LinkInfo::symlink("../target")));
    }

    #[test]
    fn test_probe() {
        let bytes = level0(b"-lh0-", b"a", b"", 0);
        assert_eq!(LzhHandler.probe(&bytes), Probe::Yes);
        assert_eq!(LzhHandler.probe(&bytes[..10]), Probe::NeedMore);
        assert_eq!(LzhHandler.probe(&[0x42; 32]), Probe::No);
        assert_eq!(dictionary_log(b"-lh5-"), Some(13));
        assert_eq!(dictionary_log(b"-lh7-"), Some(16));
    }
}

//! Flash Video demuxing.
//!
//! The tag walk groups audio and video tags into streams keyed by tag type
//! and codec. A file with a single audio/video stream yields it raw, codec
//! headers stripped. Several streams are each rewrapped as a standalone FLV
//! behind a synthetic file header. Script tags form `meta.bin`.
//!
//! Any malformed tag rejects the whole file.

use std::io::{Read, Seek, SeekFrom};

use crate::archive_path::ItemPath;
use crate::format::detect::{FormatHandler, OpenContext, Opened, Probe};
use crate::format::locator::{DataLocator, Piece, PlainSource, ReadSeek};
use crate::format::reader::{be_u24, be_u32, read_exact_or_need_more};
use crate::format::{ArchiveInfo, FormatKind};
use crate::item::Item;
use crate::{Error, Result};

const SIGNATURE: &[u8; 3] = b"FLV";
const HEADER_SIZE: u32 = 9;
const TAG_HEADER_SIZE: u64 = 11;

/// Tag type: audio.
pub const TAG_AUDIO: u8 = 8;
/// Tag type: video.
pub const TAG_VIDEO: u8 = 9;
/// Tag type: script data.
pub const TAG_SCRIPT: u8 = 18;

const FLAG_AUDIO: u8 = 4;
const FLAG_VIDEO: u8 = 1;

const AUDIO_MP3: u8 = 2;
const AUDIO_AAC: u8 = 10;
const VIDEO_AVC: u8 = 7;

/// Codec id of a tag from its first data byte.
fn codec_of(tag_type: u8, first: u8) -> u8 {
    match tag_type {
        TAG_AUDIO => first >> 4,
        TAG_VIDEO => first & 0x0F,
        _ => 0,
    }
}

/// Bytes of per-tag codec header removed in raw output.
fn raw_header_len(tag_type: u8, codec: u8) -> u64 {
    match (tag_type, codec) {
        (TAG_AUDIO, AUDIO_AAC) => 2,
        (TAG_VIDEO, VIDEO_AVC) => 5,
        (TAG_AUDIO | TAG_VIDEO, _) => 1,
        _ => 0,
    }
}

fn raw_extension(tag_type: u8, codec: u8) -> &'static str {
    match (tag_type, codec) {
        (TAG_AUDIO, AUDIO_MP3) => "mp3",
        (TAG_AUDIO, AUDIO_AAC) => "aac",
        (TAG_VIDEO, VIDEO_AVC) => "h264",
        _ => "bin",
    }
}

/// Human-readable codec name.
pub fn codec_name(tag_type: u8, codec: u8) -> String {
    let known = match (tag_type, codec) {
        (TAG_AUDIO, 0) => "PCM",
        (TAG_AUDIO, 1) => "ADPCM",
        (TAG_AUDIO, AUDIO_MP3) => "MP3",
        (TAG_AUDIO, 3) => "PCM_LE",
        (TAG_AUDIO, 4..=6) => "Nellymoser",
        (TAG_AUDIO, AUDIO_AAC) => "AAC",
        (TAG_AUDIO, 11) => "Speex",
        (TAG_VIDEO, 2) => "H263",
        (TAG_VIDEO, 3) => "Screen",
        (TAG_VIDEO, 4) => "VP6",
        (TAG_VIDEO, 5) => "VP6A",
        (TAG_VIDEO, 6) => "Screen2",
        (TAG_VIDEO, VIDEO_AVC) => "AVC",
        (TAG_SCRIPT, _) => "Meta",
        _ => "",
    };
    if known.is_empty() {
        format!("{}{}", if tag_type == TAG_AUDIO { "A" } else { "V" }, codec)
    } else {
        known.to_string()
    }
}

/// One tag found by the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Tag type.
    pub tag_type: u8,
    /// Codec id (0 for script tags).
    pub codec: u8,
    /// Offset of the tag header.
    pub offset: u64,
    /// Data size.
    pub size: u32,
    /// Timestamp in milliseconds.
    pub timestamp: u32,
}

impl Tag {
    fn data_offset(&self) -> u64 {
        self.offset + TAG_HEADER_SIZE
    }

    /// Header, data and trailing `PreviousTagSize`.
    fn full_len(&self) -> u64 {
        TAG_HEADER_SIZE + self.size as u64 + 4
    }
}

/// Result of walking a file.
#[derive(Debug, Clone, Default)]
pub struct FlvScan {
    /// Header flags byte.
    pub flags: u8,
    /// Every non-empty tag in file order.
    pub tags: Vec<Tag>,
    /// End of the last tag's `PreviousTagSize`.
    pub physical_size: u64,
}

/// Walks the tags, validating each `PreviousTagSize`.
pub fn scan<R: Read + Seek + ?Sized>(reader: &mut R, source_len: u64) -> Result<FlvScan> {
    reader.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; HEADER_SIZE as usize + 4];
    read_exact_or_need_more(reader, &mut header, 0)
        .map_err(|e| Error::not_an_archive(e.to_string()))?;
    if &header[..3] != SIGNATURE || header[3] != 1 {
        return Err(Error::not_an_archive("missing FLV signature"));
    }
    let data_offset = be_u32(&header, 5).unwrap_or(0);
    if data_offset < HEADER_SIZE {
        return Err(Error::not_an_archive("FLV header size too small"));
    }
    let mut pos = data_offset as u64;
    reader.seek(SeekFrom::Start(pos))?;
    let mut prev = [0u8; 4];
    read_exact_or_need_more(reader, &mut prev, pos)
        .map_err(|e| Error::not_an_archive(e.to_string()))?;
    if u32::from_be_bytes(prev) != 0 {
        return Err(Error::not_an_archive("first PreviousTagSize is not zero"));
    }
    pos += 4;

    let mut out = FlvScan {
        flags: header[4],
        ..FlvScan::default()
    };
    while pos < source_len {
        let mut th = [0u8; TAG_HEADER_SIZE as usize + 1];
        let avail = (source_len - pos).min(th.len() as u64) as usize;
        if (avail as u64) < TAG_HEADER_SIZE {
            return Err(Error::not_an_archive(format!("truncated tag at {pos:#x}")));
        }
        reader.seek(SeekFrom::Start(pos))?;
        read_exact_or_need_more(reader, &mut th[..avail], pos)?;
        let tag_type = th[0] & 0x1F;
        if th[0] & 0x20 != 0 {
            return Err(Error::not_an_archive("encrypted FLV tags"));
        }
        if !matches!(tag_type, TAG_AUDIO | TAG_VIDEO | TAG_SCRIPT) {
            return Err(Error::not_an_archive(format!(
                "unknown tag type {tag_type} at {pos:#x}"
            )));
        }
        let size = be_u24(&th, 1).unwrap_or(0);
        let timestamp = be_u24(&th, 4).unwrap_or(0) | (th[7] as u32) << 24;
        let tag = Tag {
            tag_type,
            codec: if size > 0 { codec_of(tag_type, th[11]) } else { 0 },
            offset: pos,
            size,
            timestamp,
        };
        let end = pos + tag.full_len();
        if end > source_len {
            return Err(Error::not_an_archive(format!("tag at {pos:#x} runs past the end")));
        }
        reader.seek(SeekFrom::Start(end - 4))?;
        read_exact_or_need_more(reader, &mut prev, end - 4)?;
        if u32::from_be_bytes(prev) as u64 != TAG_HEADER_SIZE + size as u64 {
            return Err(Error::not_an_archive(format!(
                "PreviousTagSize mismatch after tag at {pos:#x}"
            )));
        }
        if size > 0 {
            out.tags.push(tag);
        }
        pos = end;
    }
    out.physical_size = pos;
    Ok(out)
}

#[derive(Debug)]
struct Stream {
    tag_type: u8,
    codec: u8,
    tags: Vec<Tag>,
}

fn group_streams(tags: &[Tag]) -> Vec<Stream> {
    let mut streams: Vec<Stream> = Vec::new();
    for tag in tags {
        match streams
            .iter_mut()
            .find(|s| s.tag_type == tag.tag_type && s.codec == tag.codec)
        {
            Some(s) => s.tags.push(*tag),
            None => streams.push(Stream {
                tag_type: tag.tag_type,
                codec: tag.codec,
                tags: vec![*tag],
            }),
        }
    }
    streams
}

fn synthetic_header(tag_type: u8) -> Vec<u8> {
    let flags = if tag_type == TAG_AUDIO { FLAG_AUDIO } else { FLAG_VIDEO };
    let mut header = Vec::with_capacity(HEADER_SIZE as usize + 4);
    header.extend_from_slice(SIGNATURE);
    header.push(1);
    header.push(flags);
    header.extend_from_slice(&HEADER_SIZE.to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes());
    header
}

fn raw_pieces(stream: &Stream) -> Vec<Piece> {
    let strip = raw_header_len(stream.tag_type, stream.codec);
    stream
        .tags
        .iter()
        .filter(|t| t.size as u64 > strip)
        .map(|t| Piece::Source {
            offset: t.data_offset() + strip,
            len: t.size as u64 - strip,
        })
        .collect()
}

fn muxed_pieces(stream: &Stream) -> Vec<Piece> {
    let mut pieces = vec![Piece::Inline(synthetic_header(stream.tag_type))];
    pieces.extend(stream.tags.iter().map(|t| Piece::Source {
        offset: t.offset,
        len: t.full_len(),
    }));
    pieces
}

fn stream_item(name: String, pieces: Vec<Piece>, packed: u64, method: String) -> Item {
    let size = pieces.iter().map(Piece::len).sum();
    let mut item = Item::file(ItemPath::from_slash_str(&name), size, DataLocator::Pieces(pieces));
    item.packed_size = Some(packed);
    item.method = Some(method);
    item
}

/// FLV handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlvHandler;

impl FormatHandler for FlvHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Flv
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["flv"]
    }

    fn probe(&self, prefix: &[u8]) -> Probe {
        let magic = b"FLV\x01";
        let n = prefix.len().min(magic.len());
        if prefix[..n] != magic[..n] {
            return Probe::No;
        }
        if prefix.len() < HEADER_SIZE as usize {
            return Probe::NeedMore;
        }
        match be_u32(prefix, 5) {
            Some(offset) if offset >= HEADER_SIZE && prefix[4] & !(FLAG_AUDIO | FLAG_VIDEO) == 0 => {
                Probe::Yes
            }
            _ => Probe::No,
        }
    }

    fn open(&self, reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened> {
        let scan = scan(reader, ctx.source_len)?;
        let streams = group_streams(&scan.tags);
        let av_count = streams.iter().filter(|s| s.tag_type != TAG_SCRIPT).count();
        let raw = av_count <= 1;
        ctx.options.limits.check_items(streams.len())?;

        let mut items = Vec::new();
        let mut methods = Vec::new();
        for (index, stream) in streams.iter().enumerate() {
            let packed = stream.tags.iter().map(Tag::full_len).sum();
            let method = codec_name(stream.tag_type, stream.codec);
            methods.push(method.clone());
            let item = if stream.tag_type == TAG_SCRIPT {
                let pieces = stream
                    .tags
                    .iter()
                    .map(|t| Piece::Source {
                        offset: t.data_offset(),
                        len: t.size as u64,
                    })
                    .collect();
                stream_item("meta.bin".to_string(), pieces, packed, method)
            } else if raw {
                let ext = raw_extension(stream.tag_type, stream.codec);
                stream_item(format!("{index}.{ext}"), raw_pieces(stream), packed, method)
            } else {
                stream_item(format!("{index}.flv"), muxed_pieces(stream), packed, method)
            };
            items.push(item);
        }
        log::debug!(
            "flv: {} tags in {} streams ({})",
            scan.tags.len(),
            streams.len(),
            if raw { "raw" } else { "muxed" }
        );

        let mut info = ArchiveInfo::new(FormatKind::Flv);
        info.physical_size = scan.physical_size;
        info.item_count = items.len();
        info.method = Some(methods.join(" "));
        if scan.physical_size < ctx.source_len {
            info.flags.data_after_end = true;
        }
        Ok(Opened {
            items,
            info,
            source: Box::new(PlainSource),
        })
    }
}

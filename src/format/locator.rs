//! Where an item's bytes live and how to read them back.
//!
//! Parsers describe payloads with a [`DataLocator`] instead of copying them.
//! The common shapes (byte ranges of the source, cluster extents, resident
//! bytes) are resolved here by [`open_locator`]; formats whose payloads need
//! decoding implement [`StreamSource`] and fall back to the generic path for
//! everything else.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use crate::item::Item;
use crate::{Error, Result};

/// A seekable byte source that can move between threads.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send + ?Sized> ReadSeek for T {}

/// One part of a payload assembled from several places.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// `len` bytes of the source starting at `offset`.
    Source {
        /// Absolute offset in the source.
        offset: u64,
        /// Number of bytes.
        len: u64,
    },
    /// Bytes produced by the parser itself (synthetic headers).
    Inline(Vec<u8>),
}

impl Piece {
    /// Number of bytes this piece contributes.
    pub fn len(&self) -> u64 {
        match self {
            Piece::Source { len, .. } => *len,
            Piece::Inline(bytes) => bytes.len() as u64,
        }
    }

    /// Returns true if the piece contributes nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A run of clusters mapped to a logical position in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// First virtual cluster number covered.
    pub vcn: u64,
    /// First logical cluster on the volume, `None` for a sparse run.
    pub lcn: Option<u64>,
    /// Number of clusters.
    pub clusters: u64,
}

/// Cluster extents of a non-resident stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentMap {
    /// Runs in ascending `vcn` order.
    pub extents: Vec<Extent>,
    /// Bytes per cluster.
    pub cluster_size: u64,
    /// Byte offset of cluster 0 in the source.
    pub base_offset: u64,
    /// Logical size of the stream.
    pub data_size: u64,
    /// Bytes past this offset read as zeros.
    pub initialized_size: u64,
    /// Log2 of the compression unit in clusters; 0 for plain streams.
    pub compression_unit: u8,
}

impl ExtentMap {
    /// Creates a plain map where every byte is initialised.
    pub fn new(extents: Vec<Extent>, cluster_size: u64, base_offset: u64, data_size: u64) -> Self {
        Self {
            extents,
            cluster_size,
            base_offset,
            data_size,
            initialized_size: data_size,
            compression_unit: 0,
        }
    }

    /// Total clusters covered by the runs.
    pub fn total_clusters(&self) -> u64 {
        self.extents
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.clusters))
    }

    /// Checks that the runs are contiguous from `vcn` 0 and cover exactly
    /// `allocated_size` bytes, and that the logical size fits inside.
    pub fn check_conservation(&self, allocated_size: u64) -> Result<()> {
        let mut next_vcn = 0u64;
        for extent in &self.extents {
            if extent.vcn != next_vcn {
                return Err(Error::corrupt_header(
                    0,
                    format!("run list gap at vcn {} (expected {})", extent.vcn, next_vcn),
                ));
            }
            next_vcn = next_vcn
                .checked_add(extent.clusters)
                .ok_or_else(|| Error::corrupt_header(0, "run list length overflow"))?;
        }
        let covered = next_vcn
            .checked_mul(self.cluster_size)
            .ok_or_else(|| Error::corrupt_header(0, "run list size overflow"))?;
        if covered != allocated_size {
            return Err(Error::corrupt_header(
                0,
                format!("runs cover {covered} bytes, allocated size is {allocated_size}"),
            ));
        }
        if self.data_size > covered || self.initialized_size > self.data_size {
            return Err(Error::corrupt_header(0, "stream sizes exceed allocation"));
        }
        Ok(())
    }

    /// Finds the run covering `vcn`.
    pub fn find(&self, vcn: u64) -> Option<&Extent> {
        let idx = self
            .extents
            .partition_point(|e| e.vcn.saturating_add(e.clusters) <= vcn);
        self.extents.get(idx).filter(|e| e.vcn <= vcn)
    }

    /// Returns true if the stream is stored compressed.
    pub fn is_compressed(&self) -> bool {
        self.compression_unit != 0
    }
}

/// Address of an item's payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataLocator {
    /// No payload (directories, empty files).
    #[default]
    Empty,
    /// Concatenation of source ranges and inline bytes.
    Pieces(Vec<Piece>),
    /// Cluster extents of a filesystem stream.
    Extents(ExtentMap),
    /// Bytes already held in memory.
    Resident(Vec<u8>),
    /// A format-specific position resolved by the format's [`StreamSource`].
    Position(u64),
    /// The payload cannot be produced; the string says why.
    Broken(String),
}

impl DataLocator {
    /// A single source range.
    pub fn range(offset: u64, len: u64) -> Self {
        DataLocator::Pieces(vec![Piece::Source { offset, len }])
    }
}

/// Reads a list of [`Piece`]s in order.
pub struct PieceReader<'a> {
    source: &'a mut dyn ReadSeek,
    pieces: &'a [Piece],
    index: usize,
    consumed: u64,
}

impl<'a> PieceReader<'a> {
    /// Creates a reader over `pieces`.
    pub fn new(source: &'a mut dyn ReadSeek, pieces: &'a [Piece]) -> Self {
        Self {
            source,
            pieces,
            index: 0,
            consumed: 0,
        }
    }
}

impl Read for PieceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(piece) = self.pieces.get(self.index) {
            let left = piece.len() - self.consumed;
            if left == 0 {
                self.index += 1;
                self.consumed = 0;
                continue;
            }
            let want = left.min(buf.len() as u64) as usize;
            let n = match piece {
                Piece::Inline(bytes) => {
                    let start = self.consumed as usize;
                    buf[..want].copy_from_slice(&bytes[start..start + want]);
                    want
                }
                Piece::Source { offset, .. } => {
                    self.source.seek(SeekFrom::Start(offset + self.consumed))?;
                    let n = self.source.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "item data extends past the end of the source",
                        ));
                    }
                    n
                }
            };
            self.consumed += n as u64;
            return Ok(n);
        }
        Ok(0)
    }
}

/// Reads a stream through its cluster extents.
///
/// Sparse runs and the region past the initialised size read as zeros.
pub struct ExtentReader<'a> {
    source: &'a mut dyn ReadSeek,
    map: &'a ExtentMap,
    pos: u64,
}

impl<'a> ExtentReader<'a> {
    /// Creates a reader positioned at the start of the stream.
    pub fn new(source: &'a mut dyn ReadSeek, map: &'a ExtentMap) -> Self {
        Self { source, map, pos: 0 }
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

impl Read for ExtentReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let map = self.map;
        if self.pos >= map.data_size || buf.is_empty() {
            return Ok(0);
        }
        let want = (map.data_size - self.pos).min(buf.len() as u64);
        if self.pos >= map.initialized_size {
            let n = want as usize;
            buf[..n].fill(0);
            self.pos += want;
            return Ok(n);
        }
        let want = want.min(map.initialized_size - self.pos);
        if map.cluster_size == 0 {
            return Err(invalid("zero cluster size"));
        }
        let vcn = self.pos / map.cluster_size;
        let extent = map.find(vcn).ok_or_else(|| invalid("no run covers the read position"))?;
        let run_end = (extent.vcn + extent.clusters)
            .checked_mul(map.cluster_size)
            .ok_or_else(|| invalid("run end overflow"))?;
        let n = want.min(run_end - self.pos) as usize;
        match extent.lcn {
            None => buf[..n].fill(0),
            Some(lcn) => {
                let disk = (lcn + (vcn - extent.vcn))
                    .checked_mul(map.cluster_size)
                    .and_then(|b| b.checked_add(map.base_offset))
                    .and_then(|b| b.checked_add(self.pos % map.cluster_size))
                    .ok_or_else(|| invalid("cluster offset overflow"))?;
                self.source.seek(SeekFrom::Start(disk))?;
                let got = self.source.read(&mut buf[..n])?;
                if got == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "cluster lies past the end of the image",
                    ));
                }
                self.pos += got as u64;
                return Ok(got);
            }
        }
        self.pos += n as u64;
        Ok(n)
    }
}

/// Opens a reader for the generic locator shapes.
///
/// [`DataLocator::Position`] has no generic meaning and yields a data error;
/// formats that use it resolve it in their own [`StreamSource`].
pub fn open_locator<'a>(
    index: usize,
    locator: &'a DataLocator,
    source: &'a mut dyn ReadSeek,
) -> Result<Box<dyn Read + 'a>> {
    match locator {
        DataLocator::Empty => Ok(Box::new(io::empty())),
        DataLocator::Pieces(pieces) => Ok(Box::new(PieceReader::new(source, pieces))),
        DataLocator::Extents(map) if map.is_compressed() => Err(Error::data_error(
            index,
            "compressed stream needs a format decoder",
        )),
        DataLocator::Extents(map) => Ok(Box::new(ExtentReader::new(source, map))),
        DataLocator::Resident(bytes) => Ok(Box::new(Cursor::new(bytes.as_slice()))),
        DataLocator::Position(pos) => Err(Error::data_error(
            index,
            format!("no decoder for stream position {pos}"),
        )),
        DataLocator::Broken(reason) => Err(Error::data_error(index, reason.clone())),
    }
}

/// Produces item payload readers for one opened archive.
pub trait StreamSource: Send {
    /// Opens the payload of item `index`.
    fn open_stream<'a>(
        &'a mut self,
        index: usize,
        item: &'a Item,
        source: &'a mut dyn ReadSeek,
    ) -> Result<Box<dyn Read + 'a>> {
        open_locator(index, &item.locator, source)
    }
}

/// A source that only understands the generic locators.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSource;

impl StreamSource for PlainSource {}

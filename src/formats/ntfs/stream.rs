//! Reading NTFS streams, including compressed ones.

use std::io::{self, Read, SeekFrom};

use super::lznt1;
use crate::format::locator::{DataLocator, ExtentMap, ReadSeek, StreamSource, open_locator};
use crate::item::Item;
use crate::{Error, Result};

/// Stream source of an opened NTFS image.
#[derive(Debug, Clone, Copy, Default)]
pub struct NtfsSource {
    strict: bool,
}

impl NtfsSource {
    /// `strict` makes short LZNT1 units an error instead of zero padding.
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }
}

impl StreamSource for NtfsSource {
    fn open_stream<'a>(
        &'a mut self,
        index: usize,
        item: &'a Item,
        source: &'a mut dyn ReadSeek,
    ) -> Result<Box<dyn Read + 'a>> {
        match &item.locator {
            DataLocator::Extents(map) if map.is_compressed() => Ok(Box::new(CompressedReader::new(
                source,
                map,
                self.strict,
            )?)),
            other => open_locator(index, other, source),
        }
    }
}

/// Reads a compressed stream one compression unit at a time.
///
/// A unit whose clusters are all sparse reads as zeros, one with no sparse
/// cluster is stored as is, and anything in between holds LZNT1 data in
/// its allocated clusters.
pub struct CompressedReader<'a> {
    source: &'a mut dyn ReadSeek,
    map: &'a ExtentMap,
    unit_clusters: u64,
    strict: bool,
    pos: u64,
    unit: Option<(u64, Vec<u8>)>,
}

impl<'a> CompressedReader<'a> {
    /// Creates a reader at the start of the stream.
    pub fn new(source: &'a mut dyn ReadSeek, map: &'a ExtentMap, strict: bool) -> Result<Self> {
        if map.compression_unit > 16 || map.cluster_size == 0 {
            return Err(Error::corrupt_header(
                0,
                format!("compression unit of 2^{} clusters", map.compression_unit),
            ));
        }
        Ok(Self {
            source,
            map,
            unit_clusters: 1u64 << map.compression_unit,
            strict,
            pos: 0,
            unit: None,
        })
    }

    fn unit_bytes(&self) -> u64 {
        self.unit_clusters * self.map.cluster_size
    }

    fn load_unit(&mut self, unit: u64) -> io::Result<Vec<u8>> {
        let map = self.map;
        let unit_start = unit * self.unit_bytes();
        let output_len = self.unit_bytes().min(map.data_size - unit_start) as usize;
        let first_vcn = unit * self.unit_clusters;

        let mut packed = Vec::new();
        let mut sparse = 0u64;
        let mut vcn = first_vcn;
        while vcn < first_vcn + self.unit_clusters {
            let Some(extent) = map.find(vcn) else {
                sparse += first_vcn + self.unit_clusters - vcn;
                break;
            };
            let take = (extent.vcn + extent.clusters).min(first_vcn + self.unit_clusters) - vcn;
            match extent.lcn {
                None => sparse += take,
                Some(lcn) if sparse == 0 => {
                    let offset = (lcn + (vcn - extent.vcn)) * map.cluster_size + map.base_offset;
                    self.source.seek(SeekFrom::Start(offset))?;
                    let start = packed.len();
                    packed.resize(start + (take * map.cluster_size) as usize, 0);
                    self.source.read_exact(&mut packed[start..])?;
                }
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "allocated cluster after a sparse one inside a compression unit",
                    ));
                }
            }
            vcn += take;
        }

        if packed.is_empty() {
            return Ok(vec![0; output_len]);
        }
        if sparse == 0 {
            packed.truncate(output_len);
            return Ok(packed);
        }
        lznt1::decompress(&packed, output_len, self.strict)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl Read for CompressedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let map = self.map;
        if self.pos >= map.data_size || buf.is_empty() {
            return Ok(0);
        }
        let unit = self.pos / self.unit_bytes();
        let loaded = matches!(&self.unit, Some((u, _)) if *u == unit);
        if !loaded {
            let data = self.load_unit(unit)?;
            self.unit = Some((unit, data));
        }
        let Some((_, data)) = &self.unit else {
            return Ok(0);
        };
        let within = (self.pos - unit * self.unit_bytes()) as usize;
        let n = (data.len() - within).min(buf.len());
        buf[..n].copy_from_slice(&data[within..within + n]);
        // Bytes past the initialised size read as zeros.
        let init_end = map.initialized_size.saturating_sub(self.pos).min(n as u64) as usize;
        buf[init_end..n].fill(0);
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::locator::Extent;
    use crate::formats::ntfs::lznt1::tests::literal_chunk;
    use std::io::Cursor;

    fn compressed_map(extents: Vec<Extent>, data_size: u64) -> ExtentMap {
        let mut map = ExtentMap::new(extents, 512, 0, data_size);
        map.compression_unit = 2;
        map
    }

    #[test]
    fn test_units_of_each_kind() {
        // clusters of 512, units of 4 clusters (2048 bytes)
        let mut image = vec![0u8; 16 * 512];
        image[512..1024].fill(b'r');
        image[1024..2560].fill(b's');
        let chunk = literal_chunk(b"packed!");
        image[4096..4096 + chunk.len()].copy_from_slice(&chunk);
        let map = compressed_map(
            vec![
                // unit 0: stored across four allocated clusters (1..5)
                Extent { vcn: 0, lcn: Some(1), clusters: 4 },
                // unit 1: one cluster of LZNT1 then three sparse
                Extent { vcn: 4, lcn: Some(8), clusters: 1 },
                Extent { vcn: 5, lcn: None, clusters: 3 },
                // unit 2: entirely sparse
                Extent { vcn: 8, lcn: None, clusters: 4 },
            ],
            3 * 2048,
        );
        let mut src = Cursor::new(image);
        let mut out = Vec::new();
        CompressedReader::new(&mut src, &map, false)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out.len(), 3 * 2048);
        assert!(out[..512].iter().all(|&b| b == b'r'));
        assert!(out[512..2048].iter().all(|&b| b == b's'));
        assert_eq!(&out[2048..2055], b"packed!");
        assert!(out[2055..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_strict_rejects_short_units() {
        let mut image = vec![0u8; 8 * 512];
        let chunk = literal_chunk(b"tiny");
        image[..chunk.len()].copy_from_slice(&chunk);
        let map = compressed_map(
            vec![
                Extent { vcn: 0, lcn: Some(0), clusters: 1 },
                Extent { vcn: 1, lcn: None, clusters: 3 },
            ],
            1000,
        );
        let mut src = Cursor::new(image);
        let mut out = Vec::new();
        let err = CompressedReader::new(&mut src, &map, true)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut out = Vec::new();
        CompressedReader::new(&mut src, &map, false)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(&out[..4], b"tiny");
        assert_eq!(out.len(), 1000);
    }
}

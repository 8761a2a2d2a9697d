//! The file allocation table.

use std::io::Read;

use super::boot::BootSector;
use crate::format::locator::{Extent, ReadSeek};
use crate::format::reader::{le_u16, le_u32, read_region};
use crate::safety::ResourceLimits;
use crate::{Error, Result};

/// Set on entries of clusters that belong to a walked directory.
const DIR_TAG: u32 = 0x8000_0000;
const VALUE_MASK: u32 = 0x0FFF_FFFF;
const END_OF_CHAIN: u32 = 0x0FFF_FFFF;
const BAD_CLUSTER: u32 = 0x0FFF_FFF7;

/// Decoded meaning of one table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Not allocated.
    Free,
    /// Allocated, continues at the given cluster.
    Next(u32),
    /// Allocated, last cluster of its chain.
    End,
    /// Marked unusable.
    Bad,
}

/// The first FAT, widened to 32-bit entries.
#[derive(Debug, Clone)]
pub struct AllocationTable {
    entries: Vec<u32>,
    num_clusters: u32,
}

impl AllocationTable {
    /// Reads the first FAT of the volume.
    pub fn load<R: Read + std::io::Seek + ?Sized>(
        reader: &mut R,
        boot: &BootSector,
        limits: &ResourceLimits,
    ) -> Result<Self> {
        let needed = ((boot.num_clusters as u64 + 2) * boot.fat_bits as u64).div_ceil(8);
        let raw = read_region(reader, boot.fat_offset(), needed.min(boot.fat_len()), limits)?;
        Self::decode(&raw, boot.fat_bits, boot.num_clusters)
    }

    /// Decodes `num_clusters + 2` entries of `bits` width from `raw`.
    pub fn decode(raw: &[u8], bits: u8, num_clusters: u32) -> Result<Self> {
        let count = num_clusters as usize + 2;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let (value, end, bad) = match bits {
                12 => {
                    let word = le_u16(raw, i * 3 / 2);
                    let v = word.map(|w| if i & 1 == 1 { w >> 4 } else { w & 0x0FFF });
                    (v.map(u32::from), 0x0FF8, 0x0FF7)
                }
                16 => (le_u16(raw, i * 2).map(u32::from), 0xFFF8, 0xFFF7),
                32 => (le_u32(raw, i * 4).map(|v| v & VALUE_MASK), 0x0FFF_FFF8, 0x0FFF_FFF7),
                _ => return Err(Error::corrupt_header(0, format!("{bits}-bit FAT"))),
            };
            let value = value.ok_or_else(|| Error::corrupt_header(0, "FAT shorter than the volume"))?;
            entries.push(if value >= end {
                END_OF_CHAIN
            } else if value == bad {
                BAD_CLUSTER
            } else {
                value
            });
        }
        Ok(Self {
            entries,
            num_clusters,
        })
    }

    /// Number of data clusters.
    pub fn num_clusters(&self) -> u32 {
        self.num_clusters
    }

    /// Returns true if `cluster` addresses the data area.
    pub fn is_valid(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster < self.num_clusters + 2
    }

    /// The entry of `cluster`.
    pub fn link(&self, cluster: u32) -> Link {
        let Some(&raw) = self.entries.get(cluster as usize) else {
            return Link::Bad;
        };
        match raw & !DIR_TAG {
            0 => Link::Free,
            END_OF_CHAIN => Link::End,
            BAD_CLUSTER => Link::Bad,
            next => Link::Next(next),
        }
    }

    /// Returns true if `cluster` is allocated.
    pub fn is_allocated(&self, cluster: u32) -> bool {
        !matches!(self.link(cluster), Link::Free)
    }

    /// Returns true if a walked directory owns `cluster`.
    pub fn is_dir_tagged(&self, cluster: u32) -> bool {
        self.entries
            .get(cluster as usize)
            .is_some_and(|e| e & DIR_TAG != 0)
    }

    /// Tags `cluster` as directory data. Fails if it already was, which
    /// means two directories (or one directory twice) share it.
    pub fn tag_dir(&mut self, cluster: u32) -> Result<()> {
        let entry = self
            .entries
            .get_mut(cluster as usize)
            .ok_or_else(|| Error::corrupt_header(0, format!("cluster {cluster} out of range")))?;
        if *entry & DIR_TAG != 0 {
            return Err(Error::corrupt_header(
                0,
                format!("directory cluster {cluster} is used twice"),
            ));
        }
        *entry |= DIR_TAG;
        Ok(())
    }

    /// Follows the chain from `start`, allowing at most `max_steps` clusters.
    pub fn chain(&self, start: u32, max_steps: u64) -> Result<Vec<u32>> {
        let mut clusters = Vec::new();
        let mut cluster = start;
        loop {
            if !self.is_valid(cluster) {
                return Err(Error::corrupt_header(
                    0,
                    format!("cluster {cluster} out of range"),
                ));
            }
            if clusters.len() as u64 >= max_steps {
                return Err(Error::corrupt_header(
                    0,
                    format!("chain from {start} is longer than {max_steps} clusters"),
                ));
            }
            clusters.push(cluster);
            match self.link(cluster) {
                Link::Next(next) => cluster = next,
                Link::End => return Ok(clusters),
                Link::Free => {
                    return Err(Error::corrupt_header(
                        0,
                        format!("chain from {start} runs into free cluster {cluster}"),
                    ));
                }
                Link::Bad => {
                    return Err(Error::corrupt_header(
                        0,
                        format!("chain from {start} runs into bad cluster {cluster}"),
                    ));
                }
            }
        }
    }
}

/// Merges consecutive clusters into extents numbered from cluster 2.
pub fn extents(clusters: &[u32]) -> Vec<Extent> {
    let mut out: Vec<Extent> = Vec::new();
    for (vcn, &cluster) in clusters.iter().enumerate() {
        let lcn = cluster as u64 - 2;
        if let Some(last) = out.last_mut() {
            if last.lcn.map(|l| l + last.clusters) == Some(lcn) {
                last.clusters += 1;
                continue;
            }
        }
        out.push(Extent {
            vcn: vcn as u64,
            lcn: Some(lcn),
            clusters: 1,
        });
    }
    out
}

/// Reads whole clusters into one buffer.
pub fn read_clusters(
    reader: &mut dyn ReadSeek,
    boot: &BootSector,
    clusters: &[u32],
    limits: &ResourceLimits,
) -> Result<Vec<u8>> {
    let cluster_size = boot.cluster_size() as u64;
    limits.check_header_bytes(clusters.len() as u64 * cluster_size)?;
    let mut data = Vec::with_capacity(clusters.len() * cluster_size as usize);
    for &cluster in clusters {
        data.extend(read_region(
            reader,
            boot.cluster_offset(cluster),
            cluster_size,
            limits,
        )?);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat12(entries: &[u16]) -> Vec<u8> {
        let mut raw = vec![0u8; entries.len() * 3 / 2 + 2];
        for (i, &e) in entries.iter().enumerate() {
            let off = i * 3 / 2;
            if i & 1 == 0 {
                raw[off] = e as u8;
                raw[off + 1] = (raw[off + 1] & 0xF0) | (e >> 8) as u8;
            } else {
                raw[off] = (raw[off] & 0x0F) | ((e & 0x0F) << 4) as u8;
                raw[off + 1] = (e >> 4) as u8;
            }
        }
        raw
    }

    #[test]
    fn test_fat12_chain() {
        // 2 -> 3 -> 5 -> end, 4 free, 6 bad
        let raw = fat12(&[0xFF8, 0xFFF, 3, 5, 0, 0xFFF, 0xFF7, 0]);
        let table = AllocationTable::decode(&raw, 12, 6).unwrap();
        assert_eq!(table.chain(2, 10).unwrap(), vec![2, 3, 5]);
        assert_eq!(table.link(4), Link::Free);
        assert_eq!(table.link(6), Link::Bad);
        assert!(table.chain(2, 2).is_err());
        assert!(table.chain(4, 10).is_err());
        assert!(table.chain(9, 10).is_err());
        assert_eq!(
            extents(&[2, 3, 5]),
            vec![
                Extent { vcn: 0, lcn: Some(0), clusters: 2 },
                Extent { vcn: 2, lcn: Some(3), clusters: 1 },
            ]
        );
    }

    #[test]
    fn test_cycle_is_bounded() {
        let mut raw = Vec::new();
        for e in [0xFFF8u16, 0xFFFF, 3, 2] {
            raw.extend_from_slice(&e.to_le_bytes());
        }
        let table = AllocationTable::decode(&raw, 16, 2).unwrap();
        assert!(table.chain(2, table.num_clusters() as u64).is_err());
    }

    #[test]
    fn test_dir_tag() {
        let raw = fat12(&[0xFF8, 0xFFF, 0xFFF, 0]);
        let mut table = AllocationTable::decode(&raw, 12, 2).unwrap();
        table.tag_dir(2).unwrap();
        assert!(table.is_dir_tagged(2));
        assert_eq!(table.link(2), Link::End);
        assert!(table.tag_dir(2).is_err());
    }
}

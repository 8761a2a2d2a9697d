//! The FAT boot sector (BIOS parameter block).

use crate::format::reader::{le_u16, le_u32};
use crate::{Error, Result};

/// Bytes examined by [`BootSector::parse`].
pub const BOOT_SECTOR_SIZE: usize = 512;

/// Highest cluster count of a FAT12 volume, exclusive.
pub const FAT12_LIMIT: u32 = 0xFF5;
/// Highest cluster count of a FAT16 volume, exclusive.
pub const FAT16_LIMIT: u32 = 0xFFF5;
/// Highest cluster count of a FAT32 volume, exclusive.
pub const FAT32_LIMIT: u32 = 0x0FFF_FFF5;

/// Largest total cluster size, as a power of two.
const MAX_CLUSTER_LOG: u8 = 24;

/// Validated boot sector fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    /// Log2 of the sector size.
    pub sector_log: u8,
    /// Log2 of sectors per cluster.
    pub cluster_log: u8,
    /// Reserved sectors before the first FAT.
    pub reserved_sectors: u16,
    /// Number of FAT copies.
    pub num_fats: u8,
    /// Root directory entries (FAT12/16).
    pub root_entries: u16,
    /// Sectors per FAT.
    pub fat_sectors: u32,
    /// Sectors on the volume.
    pub total_sectors: u32,
    /// First cluster of the root directory (FAT32).
    pub root_cluster: u32,
    /// Media descriptor.
    pub media: u8,
    /// Entry width: 12, 16 or 32.
    pub fat_bits: u8,
    /// Usable clusters, numbered from 2.
    pub num_clusters: u32,
    /// Volume serial number, if the extended block is present.
    pub serial: Option<u32>,
    /// Volume label from the extended block.
    pub label: Option<String>,
    /// OEM name.
    pub oem: String,
}

fn log2_exact(v: u32) -> Option<u8> {
    v.is_power_of_two().then(|| v.trailing_zeros() as u8)
}

fn trimmed_label(bytes: &[u8]) -> Option<String> {
    let text: String = bytes.iter().map(|&b| b as char).collect();
    let text = text.trim_end_matches([' ', '\0']).to_string();
    (!text.is_empty() && text != "NO NAME").then_some(text)
}

impl BootSector {
    /// Decodes and validates the first sector of a volume.
    ///
    /// Fails with [`Error::NeedMoreInput`] for a short buffer and
    /// [`Error::CorruptHeader`] for anything that is not a FAT boot sector.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < BOOT_SECTOR_SIZE {
            return Err(Error::NeedMoreInput {
                offset: buf.len() as u64,
                needed: (BOOT_SECTOR_SIZE - buf.len()) as u64,
            });
        }
        let bad = |offset: u64, reason: &str| Error::corrupt_header(offset, reason.to_string());

        if !matches!(buf[0], 0xEB | 0xE9) {
            return Err(bad(0, "no jump instruction"));
        }
        if buf[510] != 0x55 || buf[511] != 0xAA {
            return Err(bad(510, "missing 55 AA signature"));
        }
        let sector_size = le_u16(buf, 11).unwrap_or(0) as u32;
        let sector_log = log2_exact(sector_size)
            .filter(|l| (9..=12).contains(l))
            .ok_or_else(|| bad(11, "bad sector size"))?;
        let cluster_log = log2_exact(buf[13] as u32).ok_or_else(|| bad(13, "bad cluster size"))?;
        if sector_log + cluster_log > MAX_CLUSTER_LOG {
            return Err(bad(13, "cluster too large"));
        }
        let reserved_sectors = le_u16(buf, 14).unwrap_or(0);
        if reserved_sectors == 0 {
            return Err(bad(14, "no reserved sectors"));
        }
        let num_fats = buf[16];
        if !(1..=4).contains(&num_fats) {
            return Err(bad(16, "bad number of FATs"));
        }
        let root_entries = le_u16(buf, 17).unwrap_or(0);
        let media = buf[21];
        let total16 = le_u16(buf, 19).unwrap_or(0) as u32;
        let total_sectors = if total16 != 0 {
            total16
        } else {
            le_u32(buf, 32).unwrap_or(0)
        };
        let fat16_sectors = le_u16(buf, 22).unwrap_or(0) as u32;
        let is_fat32_layout = fat16_sectors == 0;
        let (fat_sectors, root_cluster, ext) = if is_fat32_layout {
            if root_entries != 0 {
                return Err(bad(17, "FAT32 volume with a fixed root directory"));
            }
            (
                le_u32(buf, 36).unwrap_or(0),
                le_u32(buf, 44).unwrap_or(0),
                64usize,
            )
        } else {
            (fat16_sectors, 0, 36usize)
        };
        if fat_sectors == 0 {
            return Err(bad(22, "empty FAT"));
        }

        let root_sectors = ((root_entries as u64 * 32) + sector_size as u64 - 1) >> sector_log;
        let data_sector = reserved_sectors as u64 + num_fats as u64 * fat_sectors as u64 + root_sectors;
        if data_sector >= total_sectors as u64 {
            return Err(bad(19, "no data area"));
        }
        let num_clusters = ((total_sectors as u64 - data_sector) >> cluster_log) as u32;
        if num_clusters == 0 {
            return Err(bad(19, "no clusters"));
        }
        let fat_bits = if num_clusters < FAT12_LIMIT {
            12
        } else if num_clusters < FAT16_LIMIT {
            16
        } else {
            32
        };
        if (fat_bits == 32) != is_fat32_layout {
            return Err(bad(22, "cluster count does not match the FAT layout"));
        }
        let num_clusters = num_clusters.min(FAT32_LIMIT - 1);
        let fat_bytes = (fat_sectors as u64) << sector_log;
        if fat_bytes * 8 < (num_clusters as u64 + 2) * fat_bits as u64 {
            return Err(bad(22, "FAT too small for the cluster count"));
        }
        if is_fat32_layout && !(2..num_clusters + 2).contains(&root_cluster) {
            return Err(bad(44, "root cluster out of range"));
        }

        let (serial, label) = if buf[ext + 2] == 0x29 {
            (
                le_u32(buf, ext + 3),
                trimmed_label(&buf[ext + 7..ext + 18]),
            )
        } else {
            (None, None)
        };
        Ok(Self {
            sector_log,
            cluster_log,
            reserved_sectors,
            num_fats,
            root_entries,
            fat_sectors,
            total_sectors,
            root_cluster,
            media,
            fat_bits,
            num_clusters,
            serial,
            label,
            oem: String::from_utf8_lossy(&buf[3..11]).trim_end().to_string(),
        })
    }

    /// Bytes per sector.
    pub fn sector_size(&self) -> u32 {
        1 << self.sector_log
    }

    /// Bytes per cluster.
    pub fn cluster_size(&self) -> u32 {
        1 << (self.sector_log + self.cluster_log)
    }

    /// Byte offset of the first FAT.
    pub fn fat_offset(&self) -> u64 {
        (self.reserved_sectors as u64) << self.sector_log
    }

    /// Byte length of one FAT.
    pub fn fat_len(&self) -> u64 {
        (self.fat_sectors as u64) << self.sector_log
    }

    /// Byte offset of the fixed root directory (FAT12/16).
    pub fn root_dir_offset(&self) -> u64 {
        self.fat_offset() + self.num_fats as u64 * self.fat_len()
    }

    /// Byte length of the fixed root directory.
    pub fn root_dir_len(&self) -> u64 {
        self.root_entries as u64 * 32
    }

    /// Byte offset of cluster 2.
    pub fn data_offset(&self) -> u64 {
        let root_sectors =
            (self.root_dir_len() + self.sector_size() as u64 - 1) >> self.sector_log;
        self.root_dir_offset() + (root_sectors << self.sector_log)
    }

    /// Byte offset of `cluster`.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.data_offset() + ((cluster as u64 - 2) << (self.sector_log + self.cluster_log))
    }

    /// Bytes the volume occupies.
    pub fn volume_size(&self) -> u64 {
        (self.total_sectors as u64) << self.sector_log
    }

    /// Whether the root directory is a cluster chain.
    pub fn is_fat32(&self) -> bool {
        self.fat_bits == 32
    }
}

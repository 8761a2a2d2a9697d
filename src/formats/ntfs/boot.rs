//! The NTFS boot sector.

use crate::format::reader::{le_u16, le_u64};
use crate::{Error, Result};

/// Bytes examined by [`NtfsBoot::parse`].
pub const BOOT_SECTOR_SIZE: usize = 512;

const OEM_ID: &[u8; 8] = b"NTFS    ";
/// Largest cluster, as a power of two.
const MAX_CLUSTER_LOG: u8 = 21;

/// Validated boot sector fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtfsBoot {
    /// Log2 of the sector size.
    pub sector_log: u8,
    /// Log2 of the cluster size.
    pub cluster_log: u8,
    /// Log2 of the MFT record size.
    pub record_log: u8,
    /// Sectors on the volume, excluding the backup boot sector.
    pub total_sectors: u64,
    /// First cluster of `$MFT`.
    pub mft_lcn: u64,
    /// First cluster of `$MFTMirr`.
    pub mirror_lcn: u64,
    /// Volume serial number.
    pub serial: u64,
}

/// Decodes the size byte used for MFT and index records: positive values
/// count clusters, negative ones give the size as `2^-value` bytes.
fn decode_record_log(raw: u8, cluster_log: u8) -> Option<u8> {
    let signed = raw as i8;
    if signed < 0 {
        Some(signed.unsigned_abs())
    } else if signed > 0 && (signed as u8).is_power_of_two() {
        Some(cluster_log + (signed as u8).trailing_zeros() as u8)
    } else {
        None
    }
}

impl NtfsBoot {
    /// Decodes and validates the first sector of a volume.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < BOOT_SECTOR_SIZE {
            return Err(Error::NeedMoreInput {
                offset: buf.len() as u64,
                needed: (BOOT_SECTOR_SIZE - buf.len()) as u64,
            });
        }
        let bad = |offset: u64, reason: &str| Error::corrupt_header(offset, reason.to_string());

        if &buf[3..11] != OEM_ID {
            return Err(bad(3, "no NTFS OEM id"));
        }
        if buf[510] != 0x55 || buf[511] != 0xAA {
            return Err(bad(510, "missing 55 AA signature"));
        }
        let sector_size = le_u16(buf, 11).unwrap_or(0);
        if !sector_size.is_power_of_two() {
            return Err(bad(11, "bad sector size"));
        }
        let sector_log = sector_size.trailing_zeros() as u8;
        if !(9..=12).contains(&sector_log) {
            return Err(bad(11, "bad sector size"));
        }
        let spc = buf[13];
        let cluster_log: u16 = if spc <= 0x80 {
            if !spc.is_power_of_two() {
                return Err(bad(13, "bad cluster size"));
            }
            sector_log as u16 + spc.trailing_zeros() as u16
        } else {
            // Newer formatters store large clusters as 2^(256 - value) sectors.
            sector_log as u16 + (256 - spc as u16)
        };
        if cluster_log > MAX_CLUSTER_LOG as u16 {
            return Err(bad(13, "cluster too large"));
        }
        let cluster_log = cluster_log as u8;
        if buf[21] != 0xF8 && buf[21] != 0xF0 {
            log::debug!("NTFS: unusual media descriptor {:#x}", buf[21]);
        }
        let total_sectors = le_u64(buf, 40).unwrap_or(0);
        if total_sectors == 0 {
            return Err(bad(40, "empty volume"));
        }
        let mft_lcn = le_u64(buf, 48).unwrap_or(0);
        let mirror_lcn = le_u64(buf, 56).unwrap_or(0);
        let record_log = decode_record_log(buf[64], cluster_log)
            .filter(|l| (10..=16).contains(l))
            .ok_or_else(|| bad(64, "bad MFT record size"))?;
        let clusters = total_sectors >> (cluster_log - sector_log);
        if mft_lcn == 0 || mft_lcn >= clusters {
            return Err(bad(48, "MFT outside the volume"));
        }
        Ok(Self {
            sector_log,
            cluster_log,
            record_log,
            total_sectors,
            mft_lcn,
            mirror_lcn,
            serial: le_u64(buf, 72).unwrap_or(0),
        })
    }

    /// Bytes per sector.
    pub fn sector_size(&self) -> u32 {
        1 << self.sector_log
    }

    /// Bytes per cluster.
    pub fn cluster_size(&self) -> u64 {
        1 << self.cluster_log
    }

    /// Bytes per MFT record.
    pub fn record_size(&self) -> usize {
        1 << self.record_log
    }

    /// Byte offset of the first MFT record.
    pub fn mft_offset(&self) -> u64 {
        self.mft_lcn << self.cluster_log
    }

    /// Clusters on the volume.
    pub fn total_clusters(&self) -> u64 {
        self.total_sectors >> (self.cluster_log - self.sector_log)
    }

    /// Bytes the volume occupies.
    pub fn volume_size(&self) -> u64 {
        self.total_sectors << self.sector_log
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 512-byte sectors and clusters, 1 KiB records, `$MFT` at cluster 4.
    pub(crate) fn ntfs_boot(total_sectors: u64) -> Vec<u8> {
        let mut b = vec![0u8; 512];
        b[0..3].copy_from_slice(&[0xEB, 0x52, 0x90]);
        b[3..11].copy_from_slice(OEM_ID);
        b[11..13].copy_from_slice(&512u16.to_le_bytes());
        b[13] = 1;
        b[21] = 0xF8;
        b[40..48].copy_from_slice(&total_sectors.to_le_bytes());
        b[48..56].copy_from_slice(&4u64.to_le_bytes());
        b[56..64].copy_from_slice(&2u64.to_le_bytes());
        b[64] = 0xF6;
        b[68] = 1;
        b[72..80].copy_from_slice(&0x0123_4567_89AB_CDEFu64.to_le_bytes());
        b[510] = 0x55;
        b[511] = 0xAA;
        b
    }

    #[test]
    fn test_geometry() {
        let boot = NtfsBoot::parse(&ntfs_boot(128)).unwrap();
        assert_eq!(boot.sector_size(), 512);
        assert_eq!(boot.cluster_size(), 512);
        assert_eq!(boot.record_size(), 1024);
        assert_eq!(boot.mft_offset(), 2048);
        assert_eq!(boot.total_clusters(), 128);
        assert_eq!(boot.serial, 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn test_record_size_encodings() {
        assert_eq!(decode_record_log(0xF6, 12), Some(10));
        assert_eq!(decode_record_log(2, 9), Some(10));
        assert_eq!(decode_record_log(3, 9), None);
        assert_eq!(decode_record_log(0, 9), None);
    }

    #[test]
    fn test_rejections() {
        let good = ntfs_boot(128);
        assert!(matches!(
            NtfsBoot::parse(&good[..64]),
            Err(Error::NeedMoreInput { .. })
        ));
        let mut b = good.clone();
        b[3] = b'X';
        assert!(NtfsBoot::parse(&b).is_err());
        let mut b = good.clone();
        b[13] = 3;
        assert!(NtfsBoot::parse(&b).is_err());
        let mut b = good.clone();
        b[64] = 0xE0;
        assert!(NtfsBoot::parse(&b).is_err());
        let mut b = good;
        b[48..56].copy_from_slice(&1000u64.to_le_bytes());
        assert!(NtfsBoot::parse(&b).is_err());
    }
}

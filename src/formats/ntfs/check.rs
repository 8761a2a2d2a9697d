//! Volume consistency checking.
//!
//! Opening an image tolerates damage; this path looks for it instead. It
//! compares every record's in-use flag with the `$MFT` bitmap, validates
//! each stream's run list and decompresses compressed streams with strict
//! LZNT1 so that short units are reported rather than padded.

use std::io::{self, Read};

use super::attr::{ATTR_BITMAP, AttrBody, Attribute, FLAG_ENCRYPTED};
use super::boot::{BOOT_SECTOR_SIZE, NtfsBoot};
use super::record::{Mft, MftRecord};
use super::runlist::stream_map;
use super::stream::CompressedReader;
use crate::format::locator::{ExtentReader, ReadSeek};
use crate::format::reader::read_region;
use crate::read::OpenOptions;
use crate::{Error, Result};

/// Findings of [`check_volume`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of MFT slots examined.
    pub records: u64,
    /// Records that failed to parse.
    pub corrupt_records: Vec<u64>,
    /// Records whose in-use flag disagrees with the `$MFT` bitmap.
    pub bitmap_mismatches: Vec<u64>,
    /// Streams that cannot be read, by record.
    pub stream_errors: Vec<(u64, String)>,
    pub warnings: Vec<String>,
    /// The image ends inside the MFT.
    pub truncated: bool,
}

impl ConsistencyReport {
    /// Returns true if nothing was found.
    pub fn is_consistent(&self) -> bool {
        self.corrupt_records.is_empty()
            && self.bitmap_mismatches.is_empty()
            && self.stream_errors.is_empty()
            && self.warnings.is_empty()
            && !self.truncated
    }
}

/// Checks an NTFS image.
///
/// # Errors
///
/// Fails only when the volume cannot be examined at all: a bad boot sector,
/// an unreadable `$MFT` record 0, or I/O errors. Damage below that level is
/// reported in the returned [`ConsistencyReport`].
pub fn check_volume(reader: &mut dyn ReadSeek, options: &OpenOptions) -> Result<ConsistencyReport> {
    let sector = read_region(reader, 0, BOOT_SECTOR_SIZE as u64, &options.limits)?;
    let boot = NtfsBoot::parse(&sector)?;
    let mut mft = Mft::load(reader, &boot, &options.limits)?;

    let mut report = ConsistencyReport {
        records: mft.records.len() as u64,
        corrupt_records: mft.corrupt.clone(),
        truncated: mft.truncated,
        ..ConsistencyReport::default()
    };

    match mft_bitmap(reader, &mft, boot.cluster_size(), options) {
        Ok(bitmap) => report.bitmap_mismatches = compare_bitmap(&mft, &bitmap),
        Err(e) => report.warnings.push(format!("$MFT bitmap unreadable: {e}")),
    }

    report.warnings.extend(mft.merge_extensions());

    for record in mft.records.iter().flatten().filter(|r| r.in_use()) {
        for (name, parts) in record.data_streams() {
            if let Err(e) = check_stream(reader, &parts, boot.cluster_size()) {
                let stream = if name.is_empty() { "$DATA" } else { name };
                report.stream_errors.push((record.index, format!("{stream}: {e}")));
            }
        }
    }

    if report.is_consistent() {
        log::info!("NTFS: {} records consistent", report.records);
    } else {
        log::warn!(
            "NTFS: {} corrupt records, {} bitmap mismatches, {} stream errors",
            report.corrupt_records.len(),
            report.bitmap_mismatches.len(),
            report.stream_errors.len()
        );
    }
    Ok(report)
}

/// The unnamed `$BITMAP` of `$MFT`, one bit per record.
fn mft_bitmap(
    reader: &mut dyn ReadSeek,
    mft: &Mft,
    cluster_size: u64,
    options: &OpenOptions,
) -> Result<Vec<u8>> {
    let record0 = mft
        .get(0)
        .ok_or_else(|| Error::corrupt_header(0, "$MFT record missing"))?;
    if let Some(value) = record0.resident_value(ATTR_BITMAP) {
        return Ok(value.to_vec());
    }
    let parts: Vec<_> = record0
        .attrs(ATTR_BITMAP)
        .filter(|a| a.name.is_empty())
        .filter_map(|a| match &a.body {
            AttrBody::NonResident(nr) => Some(nr),
            AttrBody::Resident(_) => None,
        })
        .collect();
    if parts.is_empty() {
        return Err(Error::corrupt_header(0, "$MFT has no $BITMAP"));
    }
    let map = stream_map(&parts, cluster_size)?;
    options.limits.check_header_bytes(map.data_size)?;
    let mut bitmap = Vec::with_capacity(map.data_size as usize);
    ExtentReader::new(reader, &map).read_to_end(&mut bitmap)?;
    Ok(bitmap)
}

fn compare_bitmap(mft: &Mft, bitmap: &[u8]) -> Vec<u64> {
    let mut mismatches = Vec::new();
    for (index, slot) in mft.records.iter().enumerate() {
        let index = index as u64;
        if mft.corrupt.contains(&index) {
            continue;
        }
        let marked = bitmap
            .get((index / 8) as usize)
            .is_some_and(|&byte| byte >> (index % 8) & 1 != 0);
        let in_use = slot.as_ref().is_some_and(MftRecord::in_use);
        if marked != in_use {
            log::debug!("NTFS: record {index} in use {in_use}, bitmap says {marked}");
            mismatches.push(index);
        }
    }
    mismatches
}

fn check_stream(reader: &mut dyn ReadSeek, parts: &[&Attribute], cluster_size: u64) -> Result<()> {
    if parts.iter().all(|p| matches!(p.body, AttrBody::Resident(_))) {
        return if parts.len() == 1 {
            Ok(())
        } else {
            Err(Error::corrupt_header(0, "resident stream split into parts"))
        };
    }
    if parts.iter().any(|p| p.flags & FLAG_ENCRYPTED != 0) {
        return Ok(());
    }
    let non_resident: Vec<_> = parts
        .iter()
        .filter_map(|p| match &p.body {
            AttrBody::NonResident(nr) => Some(nr),
            AttrBody::Resident(_) => None,
        })
        .collect();
    if non_resident.len() != parts.len() {
        return Err(Error::corrupt_header(0, "stream mixes resident and non-resident parts"));
    }
    let map = stream_map(&non_resident, cluster_size)?;
    if map.is_compressed() {
        let mut stream = CompressedReader::new(reader, &map, true)?;
        io::copy(&mut stream, &mut io::sink())?;
    }
    Ok(())
}

//! MFT records and the table they form.

use std::collections::BTreeMap;
use std::io::{self, Read};

use super::attr::{ATTR_DATA, AttrBody, Attribute, FileRef, parse_attributes};
use super::boot::NtfsBoot;
use super::runlist::stream_map;
use crate::format::locator::{ExtentMap, ExtentReader, ReadSeek};
use crate::format::reader::{le_u16, le_u32, le_u64, read_region};
use crate::safety::ResourceLimits;
use crate::{Error, Result};

/// Stride of the update sequence array, independent of the sector size.
pub const FIXUP_STRIDE: usize = 512;

/// Record header flag: the record is in use.
pub const FLAG_IN_USE: u16 = 0x0001;
/// Record header flag: the record describes a directory.
pub const FLAG_DIRECTORY: u16 = 0x0002;

/// Verifies and undoes the update sequence fixups of a multi-sector record.
///
/// The last two bytes of every `stride`-sized block were replaced with the
/// update sequence number when written; each must match it and is restored
/// from the array.
pub fn apply_fixups(record: &mut [u8], stride: usize) -> Result<()> {
    let usa_offset = le_u16(record, 4).unwrap_or(0) as usize;
    let usa_count = le_u16(record, 6).unwrap_or(0) as usize;
    let blocks = record.len() / stride;
    if usa_count < 2 || usa_count - 1 > blocks || usa_offset + 2 * usa_count > record.len() {
        return Err(Error::corrupt_header(4, "bad update sequence array"));
    }
    let usn = [record[usa_offset], record[usa_offset + 1]];
    for block in 0..usa_count - 1 {
        let end = (block + 1) * stride;
        if record[end - 2..end] != usn {
            return Err(Error::corrupt_header(
                (end - 2) as u64,
                "update sequence mismatch",
            ));
        }
        let saved = usa_offset + 2 * (block + 1);
        record[end - 2] = record[saved];
        record[end - 1] = record[saved + 1];
    }
    Ok(())
}

/// A parsed MFT record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MftRecord {
    /// Index in the MFT.
    pub index: u64,
    pub sequence: u16,
    pub link_count: u16,
    pub flags: u16,
    /// The base record if this is an extension record.
    pub base: Option<FileRef>,
    pub attributes: Vec<Attribute>,
}

impl MftRecord {
    /// Parses record `index` in place.
    ///
    /// Returns `None` for a never-used (zeroed) slot; a `BAAD` record, a
    /// fixup mismatch or malformed attributes are errors.
    pub fn parse(buf: &mut [u8], index: u64) -> Result<Option<Self>> {
        match buf.get(..4) {
            Some(b"FILE") => {}
            Some(b"BAAD") => {
                return Err(Error::corrupt_header(0, "record marked BAAD"));
            }
            Some([0, 0, 0, 0]) => return Ok(None),
            _ => return Err(Error::corrupt_header(0, "no FILE signature")),
        }
        apply_fixups(buf, FIXUP_STRIDE)?;
        let attrs_offset = le_u16(buf, 0x14).unwrap_or(0) as usize;
        let bytes_in_use = le_u32(buf, 0x18).unwrap_or(0) as usize;
        if attrs_offset < 0x30 || bytes_in_use > buf.len() || attrs_offset >= bytes_in_use {
            return Err(Error::corrupt_header(0x14, "bad record layout"));
        }
        let base_raw = le_u64(buf, 0x20).unwrap_or(0);
        Ok(Some(Self {
            index,
            sequence: le_u16(buf, 0x10).unwrap_or(0),
            link_count: le_u16(buf, 0x12).unwrap_or(0),
            flags: le_u16(buf, 0x16).unwrap_or(0),
            base: (base_raw != 0).then(|| FileRef::from_raw(base_raw)),
            attributes: parse_attributes(buf, attrs_offset, bytes_in_use)?,
        }))
    }

    /// Returns true if the record is allocated.
    pub fn in_use(&self) -> bool {
        self.flags & FLAG_IN_USE != 0
    }

    /// Returns true if the record describes a directory.
    pub fn is_dir(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// Attributes of one type.
    pub fn attrs(&self, type_code: u32) -> impl Iterator<Item = &Attribute> {
        self.attributes
            .iter()
            .filter(move |a| a.type_code == type_code)
    }

    /// The first resident value of an unnamed attribute.
    pub fn resident_value(&self, type_code: u32) -> Option<&[u8]> {
        self.attrs(type_code)
            .filter(|a| a.name.is_empty())
            .find_map(|a| a.resident())
    }

    /// `$DATA` attributes grouped by stream name; the unnamed stream is `""`.
    pub fn data_streams(&self) -> BTreeMap<&str, Vec<&Attribute>> {
        let mut by_name: BTreeMap<&str, Vec<&Attribute>> = BTreeMap::new();
        for attr in self.attrs(ATTR_DATA) {
            by_name.entry(attr.name.as_str()).or_default().push(attr);
        }
        by_name
    }
}

/// The loaded master file table.
#[derive(Debug, Default)]
pub struct Mft {
    /// Records by index; `None` for unused, corrupt or merged slots.
    pub records: Vec<Option<MftRecord>>,
    /// Indices of records that failed to parse.
    pub corrupt: Vec<u64>,
    /// The image ended inside the MFT.
    pub truncated: bool,
    /// Where `$MFT` itself lives.
    pub map: Option<ExtentMap>,
}

impl Mft {
    /// Reads every record through the run list of `$MFT`'s own data stream.
    pub fn load(reader: &mut dyn ReadSeek, boot: &NtfsBoot, limits: &ResourceLimits) -> Result<Self> {
        let record_size = boot.record_size();
        let mut first = read_region(reader, boot.mft_offset(), record_size as u64, limits)?;
        let record0 = MftRecord::parse(&mut first, 0)?
            .ok_or_else(|| Error::corrupt_header(boot.mft_offset(), "$MFT record is empty"))?;
        let parts: Vec<_> = record0
            .attrs(ATTR_DATA)
            .filter(|a| a.name.is_empty())
            .filter_map(|a| match &a.body {
                AttrBody::NonResident(nr) => Some(nr),
                AttrBody::Resident(_) => None,
            })
            .collect();
        let map = stream_map(&parts, boot.cluster_size())?;
        let count = map.data_size / record_size as u64;
        limits.check_items(count as usize)?;
        log::debug!("NTFS: MFT holds {count} records of {record_size} bytes");

        let mut mft = Mft::default();
        let mut stream = ExtentReader::new(reader, &map);
        let mut buf = vec![0u8; record_size];
        for index in 0..count {
            match stream.read_exact(&mut buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    log::warn!("NTFS: image ends inside the MFT at record {index}");
                    mft.truncated = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            match MftRecord::parse(&mut buf, index) {
                Ok(record) => mft.records.push(record),
                Err(e) => {
                    log::warn!("NTFS: skipping MFT record {index}: {e}");
                    mft.corrupt.push(index);
                    mft.records.push(None);
                }
            }
        }
        mft.map = Some(map);
        Ok(mft)
    }

    /// The record at `index`, if it parsed.
    pub fn get(&self, index: u64) -> Option<&MftRecord> {
        self.records.get(index as usize).and_then(Option::as_ref)
    }

    /// Moves the attributes of extension records into their base records.
    ///
    /// An extension is merged only if its base reference names the base
    /// record's current sequence number; otherwise the slot was reused and
    /// the extension is dropped. Returns one warning per dropped extension.
    pub fn merge_extensions(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        for index in 0..self.records.len() {
            let Some(base) = self.records[index].as_ref().and_then(|r| r.base) else {
                continue;
            };
            let Some(ext) = self.records[index].take() else {
                continue;
            };
            let target = self
                .records
                .get_mut(base.record as usize)
                .and_then(Option::as_mut)
                .filter(|b| b.base.is_none() && b.sequence == base.sequence);
            match target {
                Some(target) => target.attributes.extend(ext.attributes),
                None => {
                    let message = format!(
                        "extension record {index} does not match base record {} (sequence {})",
                        base.record, base.sequence
                    );
                    log::warn!("NTFS: {message}");
                    warnings.push(message);
                }
            }
        }
        warnings
    }
}

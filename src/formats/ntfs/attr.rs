//! Typed MFT attributes.

use crate::format::reader::{le_u16, le_u32, le_u64, utf16le_to_string};
use crate::item::LinkInfo;
use crate::timestamp::Timestamp;
use crate::{Error, Result};

pub const ATTR_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_ATTRIBUTE_LIST: u32 = 0x20;
pub const ATTR_FILE_NAME: u32 = 0x30;
pub const ATTR_VOLUME_NAME: u32 = 0x60;
pub const ATTR_VOLUME_INFORMATION: u32 = 0x70;
pub const ATTR_DATA: u32 = 0x80;
pub const ATTR_BITMAP: u32 = 0xB0;
pub const ATTR_REPARSE_POINT: u32 = 0xC0;
const ATTR_END: u32 = 0xFFFF_FFFF;

/// Attribute flag: the stream is LZNT1 compressed.
pub const FLAG_COMPRESSED: u16 = 0x0001;
/// Attribute flag: the stream is EFS encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x4000;

const REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
const REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;
const SYMLINK_FLAG_RELATIVE: u32 = 1;

/// Namespace of a file name attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Posix,
    Win32,
    Dos,
    Win32AndDos,
}

impl Namespace {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Namespace::Win32,
            2 => Namespace::Dos,
            3 => Namespace::Win32AndDos,
            _ => Namespace::Posix,
        }
    }
}

/// A reference to an MFT record: 48-bit index and 16-bit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRef {
    pub record: u64,
    pub sequence: u16,
}

impl FileRef {
    pub fn from_raw(raw: u64) -> Self {
        Self {
            record: raw & 0x0000_FFFF_FFFF_FFFF,
            sequence: (raw >> 48) as u16,
        }
    }
}

/// Header fields and mapping pairs of a non-resident attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonResident {
    pub lowest_vcn: u64,
    pub highest_vcn: u64,
    /// Log2 of the compression unit in clusters.
    pub compression_unit: u8,
    pub allocated_size: u64,
    pub data_size: u64,
    pub initialized_size: u64,
    /// Undecoded run list.
    pub mapping: Vec<u8>,
    /// Attribute flags.
    pub flags: u16,
}

impl NonResident {
    /// Returns true if the stream is stored in compression units.
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0 && self.compression_unit != 0
    }
}

/// Where an attribute's value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrBody {
    Resident(Vec<u8>),
    NonResident(NonResident),
}

/// One attribute of an MFT record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub type_code: u32,
    /// Stream name; empty for the unnamed stream.
    pub name: String,
    pub flags: u16,
    pub body: AttrBody,
}

impl Attribute {
    /// The resident value, if any.
    pub fn resident(&self) -> Option<&[u8]> {
        match &self.body {
            AttrBody::Resident(v) => Some(v),
            AttrBody::NonResident(_) => None,
        }
    }
}

fn corrupt(offset: usize, reason: &str) -> Error {
    Error::corrupt_header(offset as u64, reason.to_string())
}

/// Parses the attribute sequence of a record between `first` and `end`.
pub fn parse_attributes(record: &[u8], first: usize, end: usize) -> Result<Vec<Attribute>> {
    let end = end.min(record.len());
    let mut attrs = Vec::new();
    let mut pos = first;
    loop {
        let type_code = le_u32(record, pos).ok_or_else(|| corrupt(pos, "attribute list truncated"))?;
        if type_code == ATTR_END {
            return Ok(attrs);
        }
        let length = le_u32(record, pos + 4).unwrap_or(0) as usize;
        if length < 0x18 || length % 8 != 0 || pos + length > end {
            return Err(corrupt(pos, "bad attribute length"));
        }
        let raw = &record[pos..pos + length];
        attrs.push(parse_one(raw, type_code).map_err(|e| match e {
            Error::CorruptHeader { offset, reason } => {
                Error::corrupt_header(offset + pos as u64, reason)
            }
            other => other,
        })?);
        pos += length;
    }
}

fn parse_one(raw: &[u8], type_code: u32) -> Result<Attribute> {
    let non_resident = raw[8] != 0;
    let name_len = raw[9] as usize;
    let name_off = le_u16(raw, 0x0A).unwrap_or(0) as usize;
    let flags = le_u16(raw, 0x0C).unwrap_or(0);
    let name = if name_len == 0 {
        String::new()
    } else {
        let bytes = raw
            .get(name_off..name_off + 2 * name_len)
            .ok_or_else(|| corrupt(name_off, "attribute name out of bounds"))?;
        utf16le_to_string(bytes)
    };
    let body = if non_resident {
        if raw.len() < 0x40 {
            return Err(corrupt(0, "non-resident header truncated"));
        }
        let mapping_off = le_u16(raw, 0x20).unwrap_or(0) as usize;
        let mapping = raw
            .get(mapping_off..)
            .filter(|_| mapping_off >= 0x40)
            .ok_or_else(|| corrupt(0x20, "mapping pairs out of bounds"))?;
        AttrBody::NonResident(NonResident {
            lowest_vcn: le_u64(raw, 0x10).unwrap_or(0),
            highest_vcn: le_u64(raw, 0x18).unwrap_or(0),
            compression_unit: raw[0x22],
            allocated_size: le_u64(raw, 0x28).unwrap_or(0),
            data_size: le_u64(raw, 0x30).unwrap_or(0),
            initialized_size: le_u64(raw, 0x38).unwrap_or(0),
            mapping: mapping.to_vec(),
            flags,
        })
    } else {
        let value_len = le_u32(raw, 0x10).unwrap_or(0) as usize;
        let value_off = le_u16(raw, 0x14).unwrap_or(0) as usize;
        let value = value_off
            .checked_add(value_len)
            .and_then(|value_end| raw.get(value_off..value_end))
            .ok_or_else(|| corrupt(0x10, "resident value out of bounds"))?;
        AttrBody::Resident(value.to_vec())
    };
    Ok(Attribute {
        type_code,
        name,
        flags,
        body,
    })
}

fn filetime_at(raw: &[u8], offset: usize) -> Option<Timestamp> {
    let v = le_u64(raw, offset)?;
    Timestamp::from_filetime_parts(v as u32, (v >> 32) as u32)
}

/// `$STANDARD_INFORMATION`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandardInformation {
    pub created: Option<Timestamp>,
    pub modified: Option<Timestamp>,
    pub accessed: Option<Timestamp>,
    /// Windows file attribute bits.
    pub attributes: u32,
}

impl StandardInformation {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 0x24 {
            return None;
        }
        Some(Self {
            created: filetime_at(raw, 0),
            modified: filetime_at(raw, 0x08),
            accessed: filetime_at(raw, 0x18),
            attributes: le_u32(raw, 0x20)?,
        })
    }
}

/// `$FILE_NAME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    pub parent: FileRef,
    pub created: Option<Timestamp>,
    pub modified: Option<Timestamp>,
    pub accessed: Option<Timestamp>,
    pub data_size: u64,
    pub attributes: u32,
    pub namespace: Namespace,
    pub name: String,
}

impl FileName {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let name_len = *raw.get(0x40)? as usize;
        let name = raw.get(0x42..0x42 + 2 * name_len)?;
        Some(Self {
            parent: FileRef::from_raw(le_u64(raw, 0)?),
            created: filetime_at(raw, 0x08),
            modified: filetime_at(raw, 0x10),
            accessed: filetime_at(raw, 0x20),
            data_size: le_u64(raw, 0x30)?,
            attributes: le_u32(raw, 0x38)?,
            namespace: Namespace::from_raw(raw[0x41]),
            name: utf16le_to_string(name),
        })
    }
}

fn strip_nt_prefix(target: &str) -> &str {
    target
        .strip_prefix("\\??\\UNC\\")
        .or_else(|| target.strip_prefix("\\??\\"))
        .unwrap_or(target)
}

/// Decodes a `$REPARSE_POINT` value into a link.
///
/// Only symbolic links and mount points (junctions) are links; other tags
/// (deduplication, cloud files, ...) yield `None`.
pub fn parse_reparse(raw: &[u8]) -> Option<LinkInfo> {
    let tag = le_u32(raw, 0)?;
    let (path_base, relative) = match tag {
        REPARSE_TAG_SYMLINK => (20, le_u32(raw, 16)? & SYMLINK_FLAG_RELATIVE != 0),
        REPARSE_TAG_MOUNT_POINT => (16, false),
        _ => return None,
    };
    let name = |off_at: usize| -> Option<String> {
        let off = path_base + le_u16(raw, off_at)? as usize;
        let len = le_u16(raw, off_at + 2)? as usize;
        raw.get(off..off + len).map(utf16le_to_string)
    };
    let substitute = name(8)?;
    let print = name(12).unwrap_or_default();
    let target = if print.is_empty() {
        strip_nt_prefix(&substitute).to_string()
    } else {
        print
    };
    if target.is_empty() {
        return None;
    }
    let mut link = if tag == REPARSE_TAG_MOUNT_POINT {
        LinkInfo::junction(target)
    } else {
        LinkInfo::symlink(target)
    };
    if tag == REPARSE_TAG_SYMLINK {
        link.is_relative = relative;
    }
    Some(link)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::item::LinkKind;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn pad8(v: &mut Vec<u8>) {
        while v.len() % 8 != 0 {
            v.push(0);
        }
    }

    /// Encodes a resident attribute.
    pub(crate) fn resident(type_code: u32, name: &str, value: &[u8]) -> Vec<u8> {
        let name = utf16(name);
        let value_off = (0x18 + name.len() + 7) & !7;
        let mut a = vec![0u8; value_off];
        a[0..4].copy_from_slice(&type_code.to_le_bytes());
        a[9] = (name.len() / 2) as u8;
        a[0x0A..0x0C].copy_from_slice(&0x18u16.to_le_bytes());
        a[0x10..0x14].copy_from_slice(&(value.len() as u32).to_le_bytes());
        a[0x14..0x16].copy_from_slice(&(value_off as u16).to_le_bytes());
        a[0x18..0x18 + name.len()].copy_from_slice(&name);
        a.extend_from_slice(value);
        pad8(&mut a);
        let len = a.len() as u32;
        a[4..8].copy_from_slice(&len.to_le_bytes());
        a
    }

    /// Encodes a non-resident attribute.
    pub(crate) fn non_resident(
        type_code: u32,
        name: &str,
        mapping: &[u8],
        sizes: (u64, u64, u64),
        flags: u16,
        compression_unit: u8,
    ) -> Vec<u8> {
        let name = utf16(name);
        let mapping_off = (0x40 + name.len() + 7) & !7;
        let mut a = vec![0u8; mapping_off];
        a[0..4].copy_from_slice(&type_code.to_le_bytes());
        a[8] = 1;
        a[9] = (name.len() / 2) as u8;
        a[0x0A..0x0C].copy_from_slice(&0x40u16.to_le_bytes());
        a[0x0C..0x0E].copy_from_slice(&flags.to_le_bytes());
        let clusters = sizes.0 / 512;
        a[0x18..0x20].copy_from_slice(&clusters.saturating_sub(1).to_le_bytes());
        a[0x20..0x22].copy_from_slice(&(mapping_off as u16).to_le_bytes());
        a[0x22] = compression_unit;
        a[0x28..0x30].copy_from_slice(&sizes.0.to_le_bytes());
        a[0x30..0x38].copy_from_slice(&sizes.1.to_le_bytes());
        a[0x38..0x40].copy_from_slice(&sizes.2.to_le_bytes());
        a[0x40..0x40 + name.len()].copy_from_slice(&name);
        a.extend_from_slice(mapping);
        pad8(&mut a);
        let len = a.len() as u32;
        a[4..8].copy_from_slice(&len.to_le_bytes());
        a
    }

    /// A `$FILE_NAME` value.
    pub(crate) fn file_name(parent: u64, parent_seq: u16, name: &str, ns: u8, mtime: u64) -> Vec<u8> {
        let name16 = utf16(name);
        let mut v = vec![0u8; 0x42];
        v[0..8].copy_from_slice(&(parent | (parent_seq as u64) << 48).to_le_bytes());
        v[0x10..0x18].copy_from_slice(&mtime.to_le_bytes());
        v[0x40] = (name16.len() / 2) as u8;
        v[0x41] = ns;
        v.extend_from_slice(&name16);
        v
    }

    /// A `$STANDARD_INFORMATION` value.
    pub(crate) fn standard_info(mtime: u64, attributes: u32) -> Vec<u8> {
        let mut v = vec![0u8; 0x48];
        v[0x08..0x10].copy_from_slice(&mtime.to_le_bytes());
        v[0x20..0x24].copy_from_slice(&attributes.to_le_bytes());
        v
    }

    /// A symbolic link reparse value.
    pub(crate) fn symlink_reparse(target: &str, relative: bool) -> Vec<u8> {
        let t = utf16(target);
        let mut v = Vec::new();
        v.extend_from_slice(&REPARSE_TAG_SYMLINK.to_le_bytes());
        v.extend_from_slice(&((12 + 2 * t.len()) as u16).to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&(t.len() as u16).to_le_bytes());
        v.extend_from_slice(&(t.len() as u16).to_le_bytes());
        v.extend_from_slice(&(t.len() as u16).to_le_bytes());
        v.extend_from_slice(&(relative as u32).to_le_bytes());
        v.extend_from_slice(&t);
        v.extend_from_slice(&t);
        v
    }

    #[test]
    fn test_attribute_sequence() {
        let mut rec = vec![0u8; 0x10];
        rec.extend(resident(ATTR_FILE_NAME, "", &file_name(5, 5, "a.txt", 1, 0)));
        rec.extend(resident(ATTR_DATA, "ads", b"hidden"));
        rec.extend(non_resident(ATTR_DATA, "", &[0x11, 0x02, 0x20, 0], (1024, 1000, 1000), 0, 0));
        rec.extend(ATTR_END.to_le_bytes());
        let attrs = parse_attributes(&rec, 0x10, rec.len()).unwrap();
        assert_eq!(attrs.len(), 3);
        let name = FileName::parse(attrs[0].resident().unwrap()).unwrap();
        assert_eq!(name.name, "a.txt");
        assert_eq!(name.parent, FileRef { record: 5, sequence: 5 });
        assert_eq!(name.namespace, Namespace::Win32);
        assert_eq!(attrs[1].name, "ads");
        assert_eq!(attrs[1].resident(), Some(&b"hidden"[..]));
        match &attrs[2].body {
            AttrBody::NonResident(nr) => {
                assert_eq!(nr.allocated_size, 1024);
                assert_eq!(nr.mapping[..4], [0x11, 0x02, 0x20, 0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bounds_are_checked() {
        let mut rec = resident(ATTR_DATA, "", b"abc");
        rec.extend(ATTR_END.to_le_bytes());
        // value length past the attribute
        rec[0x10] = 0xFF;
        assert!(parse_attributes(&rec, 0, rec.len()).is_err());
        let mut rec = resident(ATTR_DATA, "", b"abc");
        rec[4] = 0x08;
        assert!(parse_attributes(&rec, 0, rec.len()).is_err());
        // no end marker
        let rec = resident(ATTR_DATA, "", b"abc");
        assert!(parse_attributes(&rec, 0, rec.len()).is_err());
    }

    #[test]
    fn test_reparse_targets() {
        let link = parse_reparse(&symlink_reparse("..\\x\\y", true)).unwrap();
        assert_eq!(link.kind, LinkKind::Symbolic);
        assert_eq!(link.target, "../x/y");
        assert!(link.is_relative);
        let link = parse_reparse(&symlink_reparse("C:\\Windows", false)).unwrap();
        assert!(!link.is_relative);
        assert_eq!(strip_nt_prefix("\\??\\C:\\dir"), "C:\\dir");
        assert!(parse_reparse(&[0x13, 0, 0, 0x80, 0, 0, 0, 0]).is_none());
    }
}

//! 32-byte directory entries and VFAT long names.

use crate::format::reader::{le_u16, le_u32};
use crate::timestamp::Timestamp;

/// Size of one directory entry.
pub const ENTRY_SIZE: usize = 32;

/// Read-only.
pub const ATTR_READONLY: u8 = 0x01;
/// Volume label.
pub const ATTR_VOLUME: u8 = 0x08;
/// Directory.
pub const ATTR_DIRECTORY: u8 = 0x10;
/// Long-name fragment marker (all four low bits).
pub const ATTR_LONG_NAME: u8 = 0x0F;

const DELETED: u8 = 0xE5;
const LAST_FRAGMENT: u8 = 0x40;
const CHARS_PER_FRAGMENT: usize = 13;
/// Offsets of the UTF-16 units inside a long-name fragment.
const FRAGMENT_UNITS: [usize; 13] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

/// A decoded short-name entry, with its long name when one validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Raw 11-byte DOS name (after the `0x05` escape is undone).
    pub dos_name: [u8; 11],
    /// `NAME.EXT` rendering of the DOS name.
    pub short_name: String,
    /// Long name assembled from preceding fragments.
    pub long_name: Option<String>,
    /// Attribute byte.
    pub attributes: u8,
    /// First cluster.
    pub cluster: u32,
    /// File size.
    pub size: u32,
    /// Modification time.
    pub modified: Option<Timestamp>,
    /// Creation time, with the 10 ms field applied.
    pub created: Option<Timestamp>,
    /// Access date.
    pub accessed: Option<Timestamp>,
    /// The entry starts with `0xE5`.
    pub deleted: bool,
    /// Byte offset of the entry within the directory data.
    pub offset: usize,
}

impl DirEntry {
    /// The long name if present, else the short one.
    pub fn name(&self) -> &str {
        self.long_name.as_deref().unwrap_or(&self.short_name)
    }

    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// Returns true for volume labels.
    pub fn is_volume_label(&self) -> bool {
        self.attributes & ATTR_VOLUME != 0
    }

    /// Returns true for the `.` and `..` entries.
    pub fn is_dot(&self) -> bool {
        &self.dos_name == b".          " || &self.dos_name == b"..         "
    }
}

/// Checksum of a DOS name that long-name fragments must carry.
pub fn name_checksum(dos_name: &[u8; 11]) -> u8 {
    dos_name
        .iter()
        .fold(0u8, |sum, &c| (sum >> 1 | sum << 7).wrapping_add(c))
}

fn dos_part(bytes: &[u8], lower: bool) -> String {
    let text: String = bytes.iter().map(|&b| b as char).collect();
    let text = text.trim_end_matches(' ');
    if lower {
        text.to_ascii_lowercase()
    } else {
        text.to_string()
    }
}

fn short_name(dos_name: &[u8; 11], case_flags: u8) -> String {
    let base = dos_part(&dos_name[..8], case_flags & 0x08 != 0);
    let ext = dos_part(&dos_name[8..], case_flags & 0x10 != 0);
    if ext.is_empty() {
        base
    } else {
        format!("{base}.{ext}")
    }
}

/// Collects long-name fragments in descending sequence order.
#[derive(Debug, Default)]
struct LongName {
    units: Vec<u16>,
    expected: u8,
    checksum: u8,
    active: bool,
}

impl LongName {
    fn reset(&mut self) {
        self.active = false;
        self.units.clear();
    }

    fn fragment(&mut self, raw: &[u8]) {
        let seq = raw[0];
        let number = seq & 0x1F;
        let checksum = raw[13];
        if seq & LAST_FRAGMENT != 0 {
            if number == 0 {
                self.reset();
                return;
            }
            self.active = true;
            self.expected = number;
            self.checksum = checksum;
            self.units = vec![0xFFFF; number as usize * CHARS_PER_FRAGMENT];
        } else if !self.active || number + 1 != self.expected || checksum != self.checksum {
            log::debug!("discarding long name: fragment {number} out of order");
            self.reset();
            return;
        }
        let base = (number as usize - 1) * CHARS_PER_FRAGMENT;
        for (i, &at) in FRAGMENT_UNITS.iter().enumerate() {
            self.units[base + i] = le_u16(raw, at).unwrap_or(0xFFFF);
        }
        self.expected = number;
    }

    /// The assembled name if the fragments are complete and belong to
    /// `dos_name`.
    fn take(&mut self, dos_name: &[u8; 11]) -> Option<String> {
        if !self.active {
            return None;
        }
        let complete = self.expected == 1;
        let matches = self.checksum == name_checksum(dos_name);
        let units = std::mem::take(&mut self.units);
        self.reset();
        if !complete || !matches {
            log::debug!("discarding long name: incomplete or checksum mismatch");
            return None;
        }
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        let name = String::from_utf16_lossy(&units[..end]);
        let name = name.trim_end_matches('\u{FFFF}').to_string();
        (!name.is_empty()).then_some(name)
    }
}

/// Result of decoding one directory's data.
#[derive(Debug, Default)]
pub struct Listing {
    /// Entries in on-disk order, `.`/`..` included.
    pub entries: Vec<DirEntry>,
    /// Volume label entry found in this directory.
    pub label: Option<String>,
}

/// Decodes the entries of a directory.
///
/// Decoding stops at the first entry starting with `0x00`. Deleted entries
/// are kept only with `show_deleted`; their long names are not recovered.
pub fn parse_directory(data: &[u8], is_fat32: bool, show_deleted: bool) -> Listing {
    let mut listing = Listing::default();
    let mut long = LongName::default();
    for (index, raw) in data.chunks_exact(ENTRY_SIZE).enumerate() {
        let first = raw[0];
        if first == 0 {
            break;
        }
        let attributes = raw[11];
        if attributes & 0x3F == ATTR_LONG_NAME {
            if first == DELETED {
                long.reset();
            } else {
                long.fragment(raw);
            }
            continue;
        }

        let mut dos_name = [0u8; 11];
        dos_name.copy_from_slice(&raw[..11]);
        let deleted = first == DELETED;
        if first == 0x05 {
            dos_name[0] = DELETED;
        }
        let long_name = if deleted {
            long.reset();
            None
        } else {
            long.take(&dos_name)
        };

        if attributes & ATTR_VOLUME != 0 && attributes & ATTR_DIRECTORY == 0 {
            if !deleted && listing.label.is_none() {
                let label = dos_part(&dos_name, false);
                listing.label = (!label.is_empty()).then_some(label);
            }
            continue;
        }
        if deleted && !show_deleted {
            continue;
        }
        if deleted {
            dos_name[0] = b'_';
        }

        let hi = if is_fat32 {
            le_u16(raw, 20).unwrap_or(0) as u32
        } else {
            0
        };
        let cluster = hi << 16 | le_u16(raw, 26).unwrap_or(0) as u32;
        let ctime_10ms = raw[13].min(199) as u64;
        let created = Timestamp::from_dos_datetime(
            le_u16(raw, 16).unwrap_or(0),
            le_u16(raw, 14).unwrap_or(0),
        )
        .map(|t| Timestamp::from_filetime(t.as_filetime() + ctime_10ms * 100_000));

        listing.entries.push(DirEntry {
            dos_name,
            short_name: short_name(&dos_name, raw[12]),
            long_name,
            attributes,
            cluster,
            size: le_u32(raw, 28).unwrap_or(0),
            modified: Timestamp::from_dos_datetime(
                le_u16(raw, 24).unwrap_or(0),
                le_u16(raw, 22).unwrap_or(0),
            ),
            created,
            accessed: Timestamp::from_dos_date(le_u16(raw, 18).unwrap_or(0)),
            deleted,
            offset: index * ENTRY_SIZE,
        });
    }
    listing
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A short-name entry.
    pub(crate) fn short_entry(name: &[u8; 11], attr: u8, cluster: u32, size: u32) -> [u8; 32] {
        let mut e = [0u8; 32];
        e[..11].copy_from_slice(name);
        e[11] = attr;
        e[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
        e[22..24].copy_from_slice(&0x6000u16.to_le_bytes());
        e[24..26].copy_from_slice(&0x5A21u16.to_le_bytes());
        e[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
        e[28..32].copy_from_slice(&size.to_le_bytes());
        e
    }

    /// Long-name fragments for `name`, last fragment first.
    pub(crate) fn long_entries(name: &str, dos_name: &[u8; 11]) -> Vec<[u8; 32]> {
        let mut units: Vec<u16> = name.encode_utf16().collect();
        if units.len() % CHARS_PER_FRAGMENT != 0 {
            units.push(0);
        }
        while units.len() % CHARS_PER_FRAGMENT != 0 {
            units.push(0xFFFF);
        }
        let count = units.len() / CHARS_PER_FRAGMENT;
        let checksum = name_checksum(dos_name);
        (1..=count)
            .rev()
            .map(|n| {
                let mut e = [0u8; 32];
                e[0] = n as u8 | if n == count { LAST_FRAGMENT } else { 0 };
                e[11] = ATTR_LONG_NAME;
                e[13] = checksum;
                for (i, &at) in FRAGMENT_UNITS.iter().enumerate() {
                    let unit = units[(n - 1) * CHARS_PER_FRAGMENT + i];
                    e[at..at + 2].copy_from_slice(&unit.to_le_bytes());
                }
                e
            })
            .collect()
    }

    fn concat(entries: &[[u8; 32]]) -> Vec<u8> {
        entries.iter().flatten().copied().collect()
    }

    #[test]
    fn test_long_name_with_checksum() {
        let dos = *b"LONGFI~1TXT";
        let mut entries = long_entries("Long file name.txt", &dos);
        entries.push(short_entry(&dos, 0x20, 5, 100));
        let listing = parse_directory(&concat(&entries), false, false);
        assert_eq!(listing.entries.len(), 1);
        let e = &listing.entries[0];
        assert_eq!(e.name(), "Long file name.txt");
        assert_eq!(e.short_name, "LONGFI~1.TXT");
        assert_eq!(e.cluster, 5);
        assert!(e.modified.is_some());
    }

    #[test]
    fn test_checksum_mismatch_falls_back() {
        let mut entries = long_entries("Other name", b"OTHERN~1   ");
        entries.push(short_entry(b"SHORT   TXT", 0x20, 3, 1));
        let listing = parse_directory(&concat(&entries), false, false);
        assert_eq!(listing.entries[0].name(), "SHORT.TXT");
    }

    #[test]
    fn test_deleted_label_and_end() {
        let mut deleted = short_entry(b"GONE    BIN", 0x20, 7, 10);
        deleted[0] = DELETED;
        let mut escaped = short_entry(b"XABC    DAT", 0x20, 8, 1);
        escaped[0] = 0x05;
        let entries = [
            short_entry(b"MYDISK     ", ATTR_VOLUME, 0, 0),
            deleted,
            escaped,
            [0u8; 32],
            short_entry(b"AFTER   END", 0x20, 9, 1),
        ];
        let data = concat(&entries);
        let hidden = parse_directory(&data, false, false);
        assert_eq!(hidden.label.as_deref(), Some("MYDISK"));
        assert_eq!(hidden.entries.len(), 1);
        assert_eq!(hidden.entries[0].short_name, "\u{e5}ABC.DAT");

        let shown = parse_directory(&data, false, true);
        assert_eq!(shown.entries.len(), 2);
        assert!(shown.entries[0].deleted);
        assert_eq!(shown.entries[0].short_name, "_ONE.BIN");
    }

    #[test]
    fn test_fat32_high_cluster_word() {
        let e = short_entry(b"BIG     BIN", 0x20, 0x0001_0002, 1);
        assert_eq!(parse_directory(&e, true, false).entries[0].cluster, 0x0001_0002);
        assert_eq!(parse_directory(&e, false, false).entries[0].cluster, 2);
    }
}

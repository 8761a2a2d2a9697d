//! Shared builders for integration tests.
//!
//! Every image is synthesised in memory so the tests need no fixtures.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};

use archkit::checksum::{Checksum, Crc16};
use archkit::read::Archive;

/// Opens in-memory bytes as an archive.
pub fn open(bytes: Vec<u8>) -> Archive<Cursor<Vec<u8>>> {
    Archive::open(Cursor::new(bytes)).expect("failed to open test archive")
}

/// Writes `bytes` under `name` in a fresh temporary directory.
pub fn write_temp(name: &str, bytes: &[u8]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("failed to write test file");
    (dir, path)
}

/// Relative paths of every file and directory below `root`, sorted.
pub fn tree(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            out.push(rel);
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                walk(root, &path, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

// =============================================================================
// Intel HEX
// =============================================================================

/// One `:llaaaatt<data>cc` record.
pub fn ihex_record(kind: u8, address: u16, data: &[u8]) -> String {
    let mut bytes = vec![data.len() as u8, (address >> 8) as u8, address as u8, kind];
    bytes.extend_from_slice(data);
    let sum = bytes.iter().fold(0u8, |a, &b| a.wrapping_add(b));
    bytes.push(sum.wrapping_neg());
    let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    format!(":{hex}\n")
}

/// Data records at `(address, bytes)` followed by an end-of-file record.
pub fn ihex(blocks: &[(u16, &[u8])]) -> Vec<u8> {
    let mut text = String::new();
    for (address, data) in blocks {
        text.push_str(&ihex_record(0, *address, data));
    }
    text.push_str(&ihex_record(1, 0, &[]));
    text.into_bytes()
}

// =============================================================================
// LZH
// =============================================================================

/// A level-0 header followed by its stored data.
pub fn lzh_level0(method: &[u8; 5], name: &[u8], data: &[u8], crc: u16) -> Vec<u8> {
    let mut h = vec![0u8, 0];
    h.extend_from_slice(method);
    h.extend_from_slice(&(data.len() as u32).to_le_bytes());
    h.extend_from_slice(&(data.len() as u32).to_le_bytes());
    h.extend_from_slice(&0x6000u16.to_le_bytes());
    h.extend_from_slice(&0x5821u16.to_le_bytes());
    h.push(0x20);
    h.push(0);
    h.push(name.len() as u8);
    h.extend_from_slice(name);
    h.extend_from_slice(&crc.to_le_bytes());
    h[0] = (h.len() - 2) as u8;
    h[1] = h[2..].iter().fold(0u8, |a, &b| a.wrapping_add(b));
    h.extend_from_slice(data);
    h
}

/// A terminated archive of stored (`-lh0-`) files with correct CRCs.
///
/// Names use `\` or `/` as separators; `name|target` makes a symlink and a
/// trailing `/` a directory.
pub fn lzh(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, data) in entries {
        let header = match name.strip_suffix('/') {
            Some(dir) => lzh_level0(b"-lhd-", dir.as_bytes(), b"", 0),
            None => lzh_level0(b"-lh0-", name.as_bytes(), data, Crc16::compute(data)),
        };
        out.extend(header);
    }
    out.push(0);
    out
}

// =============================================================================
// FLV
// =============================================================================

pub const FLV_AUDIO: u8 = 8;
pub const FLV_VIDEO: u8 = 9;

/// One tag with its trailing previous-tag-size field.
pub fn flv_tag(tag_type: u8, data: &[u8]) -> Vec<u8> {
    let mut out = vec![tag_type];
    out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(&[0; 7]);
    out.extend_from_slice(data);
    out.extend_from_slice(&(11 + data.len() as u32).to_be_bytes());
    out
}

/// A file header with audio and video flags, then `tags`.
pub fn flv(tags: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"FLV\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00".to_vec();
    for t in tags {
        out.extend_from_slice(t);
    }
    out
}

// =============================================================================
// FAT12
// =============================================================================

pub const SECTOR: usize = 512;
pub const ATTR_READONLY: u8 = 0x01;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;

/// A 64-sector FAT12 volume: one reserved sector, one FAT sector, a
/// one-sector root directory (16 entries) and 1-sector clusters from
/// sector 3.
pub struct FatImage {
    bytes: Vec<u8>,
    fat: Vec<u16>,
}

impl Default for FatImage {
    fn default() -> Self {
        Self::new()
    }
}

impl FatImage {
    pub fn new() -> Self {
        let mut b = vec![0u8; 64 * SECTOR];
        b[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        b[3..11].copy_from_slice(b"MSDOS5.0");
        b[11..13].copy_from_slice(&512u16.to_le_bytes());
        b[13] = 1;
        b[14..16].copy_from_slice(&1u16.to_le_bytes());
        b[16] = 1;
        b[17..19].copy_from_slice(&16u16.to_le_bytes());
        b[19..21].copy_from_slice(&64u16.to_le_bytes());
        b[21] = 0xF8;
        b[22..24].copy_from_slice(&1u16.to_le_bytes());
        b[38] = 0x29;
        b[39..43].copy_from_slice(&0x2024_0601u32.to_le_bytes());
        b[43..54].copy_from_slice(b"FIXTURE    ");
        b[510] = 0x55;
        b[511] = 0xAA;
        Self {
            bytes: b,
            fat: vec![0xFF8, 0xFFF],
        }
    }

    /// Sets FAT entry `cluster`.
    pub fn fat(&mut self, cluster: usize, value: u16) -> &mut Self {
        if self.fat.len() <= cluster {
            self.fat.resize(cluster + 1, 0);
        }
        self.fat[cluster] = value;
        self
    }

    /// Writes root directory entry `index`.
    pub fn root(&mut self, index: usize, entry: &[u8; 32]) -> &mut Self {
        let at = 2 * SECTOR + index * 32;
        self.bytes[at..at + 32].copy_from_slice(entry);
        self
    }

    /// Writes `data` at the start of `cluster`.
    pub fn cluster(&mut self, cluster: usize, data: &[u8]) -> &mut Self {
        let at = 3 * SECTOR + (cluster - 2) * SECTOR;
        self.bytes[at..at + data.len()].copy_from_slice(data);
        self
    }

    /// Stores a one-cluster file: FAT end marker plus data.
    pub fn single_cluster_file(&mut self, cluster: usize, data: &[u8]) -> &mut Self {
        self.fat(cluster, 0xFFF).cluster(cluster, data)
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut bytes = self.bytes.clone();
        for (i, &e) in self.fat.iter().enumerate() {
            let off = SECTOR + i * 3 / 2;
            if i & 1 == 0 {
                bytes[off] = e as u8;
                bytes[off + 1] = (bytes[off + 1] & 0xF0) | (e >> 8) as u8;
            } else {
                bytes[off] = (bytes[off] & 0x0F) | ((e & 0x0F) << 4) as u8;
                bytes[off + 1] = (e >> 4) as u8;
            }
        }
        bytes
    }
}

/// An 8.3 directory entry; `name` is the padded 11-byte form.
pub fn fat_entry(name: &[u8; 11], attr: u8, cluster: u32, size: u32) -> [u8; 32] {
    let mut e = [0u8; 32];
    e[..11].copy_from_slice(name);
    e[11] = attr;
    e[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    // 2024-06-01 12:00:00
    e[22..24].copy_from_slice(&0x6000u16.to_le_bytes());
    e[24..26].copy_from_slice(&0x58C1u16.to_le_bytes());
    e[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    e[28..32].copy_from_slice(&size.to_le_bytes());
    e
}

/// `.` and `..` entries that start a subdirectory cluster.
pub fn fat_dir_head(own: u32, parent: u32) -> Vec<u8> {
    let mut out = fat_entry(b".          ", ATTR_DIRECTORY, own, 0).to_vec();
    out.extend_from_slice(&fat_entry(b"..         ", ATTR_DIRECTORY, parent, 0));
    out
}

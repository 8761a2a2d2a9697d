//! The decompressed installer header: block table, install entries and the
//! file list derived from them.

use crate::archive_path::ItemPath;
use crate::format::reader::le_u32;
use crate::timestamp::Timestamp;
use crate::{Error, Result};

use super::strings::StringTable;

/// Number of blocks in the header's block table.
pub const BLOCK_COUNT: usize = 8;
/// Block holding install entries.
pub const BLOCK_ENTRIES: usize = 2;
/// Block holding the string table.
pub const BLOCK_STRINGS: usize = 3;
/// Block following the string table.
pub const BLOCK_LANG_TABLES: usize = 4;

/// Size of the flags field plus the block table.
pub const BLOCK_TABLE_END: usize = 4 + BLOCK_COUNT * 8;
/// Bytes per install entry (opcode and six parameters).
pub const ENTRY_SIZE: usize = 28;

/// `CreateDirectory`, or `SetOutPath` when parameter 1 is set.
pub const EW_CREATEDIR: u32 = 11;
/// `File`: parameter 1 names it, 2 is the data position, 3/4 the FILETIME.
pub const EW_EXTRACTFILE: u32 = 20;

/// One `(offset, count)` pair of the block table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Block {
    /// Byte offset in the header.
    pub offset: u32,
    /// Number of records.
    pub num: u32,
}

/// An install script entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Opcode.
    pub which: u32,
    /// Parameters.
    pub params: [u32; 6],
}

/// Parsed header layout.
#[derive(Debug, Clone)]
pub struct InstallHeader {
    /// Header flags.
    pub flags: u32,
    /// Block table.
    pub blocks: [Block; BLOCK_COUNT],
}

impl InstallHeader {
    /// Reads the block table and checks it against the header length.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_TABLE_END {
            return Err(Error::corrupt_header(0, "installer header too short"));
        }
        let mut blocks = [Block::default(); BLOCK_COUNT];
        for (i, block) in blocks.iter_mut().enumerate() {
            block.offset = le_u32(data, 4 + i * 8).unwrap_or(0);
            block.num = le_u32(data, 8 + i * 8).unwrap_or(0);
        }
        let entries = blocks[BLOCK_ENTRIES];
        let entries_end = (entries.num as u64)
            .checked_mul(ENTRY_SIZE as u64)
            .and_then(|n| n.checked_add(entries.offset as u64));
        if entries_end.is_none_or(|end| end > data.len() as u64) {
            return Err(Error::corrupt_header(
                entries.offset as u64,
                "entry block outside the header",
            ));
        }
        if blocks[BLOCK_STRINGS].offset as usize >= data.len() {
            return Err(Error::corrupt_header(
                blocks[BLOCK_STRINGS].offset as u64,
                "string table outside the header",
            ));
        }
        Ok(Self {
            flags: le_u32(data, 0).unwrap_or(0),
            blocks,
        })
    }

    /// Install entries in script order.
    pub fn entries(&self, data: &[u8]) -> Vec<Entry> {
        let block = self.blocks[BLOCK_ENTRIES];
        (0..block.num as usize)
            .filter_map(|i| {
                let base = block.offset as usize + i * ENTRY_SIZE;
                let which = le_u32(data, base)?;
                let mut params = [0u32; 6];
                for (j, p) in params.iter_mut().enumerate() {
                    *p = le_u32(data, base + 4 + j * 4)?;
                }
                Some(Entry { which, params })
            })
            .collect()
    }

    /// The string table bytes.
    ///
    /// It ends where the language tables start, or at the end of the header
    /// when that block does not follow it.
    pub fn string_bytes<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = self.blocks[BLOCK_STRINGS].offset as usize;
        let next = self.blocks[BLOCK_LANG_TABLES].offset as usize;
        let end = if next > start && next <= data.len() {
            next
        } else {
            data.len()
        };
        &data[start.min(end)..end]
    }
}

/// A file or directory produced by the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptItem {
    /// Path below the install directory.
    pub path: ItemPath,
    /// Position of the data block, `None` for directories.
    pub position: Option<u32>,
    /// Modification time stored with the file.
    pub modified: Option<Timestamp>,
}

fn is_absolute(name: &str) -> bool {
    name.starts_with('$')
        || name.starts_with("\\\\")
        || name.as_bytes().get(1) == Some(&b':')
}

/// Removes a leading `$INSTDIR` and splits on either separator.
pub fn install_path(full: &str) -> ItemPath {
    let rest = match full.strip_prefix("$INSTDIR") {
        Some(r) if r.is_empty() || r.starts_with(['\\', '/']) => r,
        _ => full,
    };
    ItemPath::new(
        rest.split(['\\', '/'])
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string),
    )
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", dir.trim_end_matches('\\'), name)
    }
}

/// Replays the entries, tracking the output directory.
pub fn script_items(entries: &[Entry], strings: &StringTable<'_>) -> Result<Vec<ScriptItem>> {
    let mut out_dir = String::from("$INSTDIR");
    let mut items: Vec<ScriptItem> = Vec::new();
    for entry in entries {
        match entry.which {
            EW_CREATEDIR => {
                let path = strings.get(entry.params[0])?;
                let full = if is_absolute(&path) {
                    path
                } else {
                    join(&out_dir, &path)
                };
                if entry.params[1] != 0 {
                    out_dir = full;
                    continue;
                }
                let path = install_path(&full);
                if !path.is_empty() && !items.iter().any(|i| i.position.is_none() && i.path == path) {
                    items.push(ScriptItem {
                        path,
                        position: None,
                        modified: None,
                    });
                }
            }
            EW_EXTRACTFILE => {
                let name = strings.get(entry.params[1])?;
                let full = if is_absolute(&name) {
                    name
                } else {
                    join(&out_dir, &name)
                };
                let (low, high) = (entry.params[3], entry.params[4]);
                let modified = if (low, high) == (0, 0) || (low, high) == (u32::MAX, u32::MAX) {
                    None
                } else {
                    Timestamp::from_filetime_parts(low, high)
                };
                items.push(ScriptItem {
                    path: install_path(&full),
                    position: Some(entry.params[2]),
                    modified,
                });
            }
            _ => {}
        }
    }
    Ok(items)
}

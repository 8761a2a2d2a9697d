//! The format-independent item model and selectors.

use crate::archive_path::ItemPath;
use crate::format::locator::DataLocator;
use crate::hash::HashMethod;
use crate::timestamp::Timestamp;

/// Windows file attribute bits, optionally carrying a Unix mode.
///
/// When [`UNIX_EXTENSION`](Self::UNIX_EXTENSION) is set the high 16 bits hold
/// the Unix `st_mode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Attributes(pub u32);

impl Attributes {
    /// Read-only.
    pub const READONLY: u32 = 0x0001;
    /// Hidden.
    pub const HIDDEN: u32 = 0x0002;
    /// System.
    pub const SYSTEM: u32 = 0x0004;
    /// Volume label (FAT).
    pub const VOLUME_LABEL: u32 = 0x0008;
    /// Directory.
    pub const DIRECTORY: u32 = 0x0010;
    /// Archive.
    pub const ARCHIVE: u32 = 0x0020;
    /// Sparse file.
    pub const SPARSE: u32 = 0x0200;
    /// Reparse point.
    pub const REPARSE_POINT: u32 = 0x0400;
    /// Compressed.
    pub const COMPRESSED: u32 = 0x0800;
    /// Encrypted.
    pub const ENCRYPTED: u32 = 0x4000;
    /// The high 16 bits hold a Unix mode.
    pub const UNIX_EXTENSION: u32 = 0x8000;

    /// Wraps raw attribute bits.
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Builds attributes from a Unix mode, mirroring directory and
    /// read-only bits into the Windows half.
    pub fn from_unix_mode(mode: u32) -> Self {
        let mut bits = ((mode & 0xFFFF) << 16) | Self::UNIX_EXTENSION;
        if mode & 0o170000 == 0o040000 {
            bits |= Self::DIRECTORY;
        }
        if mode & 0o222 == 0 {
            bits |= Self::READONLY;
        }
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `flag` is set.
    pub const fn has(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Returns the Unix mode, if present.
    pub fn unix_mode(&self) -> Option<u32> {
        if self.has(Self::UNIX_EXTENSION) {
            Some(self.0 >> 16)
        } else {
            None
        }
    }

    /// Returns true if the item is read-only.
    pub fn is_readonly(&self) -> bool {
        self.has(Self::READONLY)
    }
}

/// Kind of link an item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Another name for a file extracted earlier (same node id).
    Hard,
    /// A symbolic link.
    Symbolic,
    /// An NTFS directory junction.
    Junction,
}

/// Link information of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// The link kind.
    pub kind: LinkKind,
    /// Target with `/` separators.
    pub target: String,
    /// Whether the target is relative to the link's directory.
    pub is_relative: bool,
}

impl LinkInfo {
    /// A symbolic link; relativity is derived from the target.
    pub fn symlink(target: impl Into<String>) -> Self {
        let target = target.into().replace('\\', "/");
        let is_relative = !is_absolute_target(&target);
        Self {
            kind: LinkKind::Symbolic,
            target,
            is_relative,
        }
    }

    /// A junction; always absolute.
    pub fn junction(target: impl Into<String>) -> Self {
        Self {
            kind: LinkKind::Junction,
            target: target.into().replace('\\', "/"),
            is_relative: false,
        }
    }
}

/// Returns true for `/x`, `C:/x` and `//server/x` style targets.
pub(crate) fn is_absolute_target(target: &str) -> bool {
    let bytes = target.as_bytes();
    target.starts_with('/')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// A checksum declared by the archive for an item's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemChecksum {
    /// CRC-16/ARC (LZH).
    Crc16(u16),
    /// CRC-32.
    Crc32(u32),
    /// A digest from a checksum listing.
    Digest {
        /// The hash method.
        method: HashMethod,
        /// Digest bytes in stored order.
        bytes: Vec<u8>,
    },
}

/// One entry of an opened archive.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Item {
    /// Path within the archive.
    pub path: ItemPath,
    /// Whether this item is a directory.
    pub is_directory: bool,
    /// Unpacked size, when known before decoding.
    pub size: Option<u64>,
    /// Packed size.
    pub packed_size: Option<u64>,
    /// Modification time.
    pub modified: Option<Timestamp>,
    /// Creation time.
    pub created: Option<Timestamp>,
    /// Access time.
    pub accessed: Option<Timestamp>,
    /// Attribute bits.
    pub attributes: Attributes,
    /// Link information for symlinks, junctions and hard links.
    pub link: Option<LinkInfo>,
    /// Index of the parent directory item (filesystem images).
    pub parent: Option<usize>,
    /// Identity of the underlying file; items sharing it are hard links.
    pub node_id: Option<u64>,
    /// Method name as the format reports it (`-lh5-`, `LZMA`, ...).
    pub method: Option<String>,
    /// Declared checksum.
    pub checksum: Option<ItemChecksum>,
    /// Alternate data stream (`file:stream`).
    pub is_alt_stream: bool,
    /// Recovered from a deleted directory entry or record.
    pub is_deleted: bool,
    /// Folder created by the parser (`[LOST]`, implied parents).
    pub is_synthetic: bool,
    /// Offset of the item's header in the source.
    pub offset: Option<u64>,
    pub(crate) locator: DataLocator,
}

impl Item {
    /// A file item.
    pub fn file(path: ItemPath, size: u64, locator: DataLocator) -> Self {
        Self {
            path,
            is_directory: false,
            size: Some(size),
            packed_size: None,
            modified: None,
            created: None,
            accessed: None,
            attributes: Attributes::default(),
            link: None,
            parent: None,
            node_id: None,
            method: None,
            checksum: None,
            is_alt_stream: false,
            is_deleted: false,
            is_synthetic: false,
            offset: None,
            locator,
        }
    }

    /// A directory item.
    pub fn directory(path: ItemPath) -> Self {
        let mut item = Self::file(path, 0, DataLocator::Empty);
        item.is_directory = true;
        item.size = None;
        item.attributes = Attributes(Attributes::DIRECTORY);
        item
    }

    /// A folder invented by the parser.
    pub fn synthetic_directory(path: ItemPath) -> Self {
        let mut item = Self::directory(path);
        item.is_synthetic = true;
        item
    }

    /// The last path segment.
    pub fn name(&self) -> &str {
        self.path.file_name()
    }

    /// Returns true if this is not a directory.
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Returns true for symbolic links and junctions.
    pub fn is_symlink(&self) -> bool {
        matches!(
            self.link,
            Some(LinkInfo {
                kind: LinkKind::Symbolic | LinkKind::Junction,
                ..
            })
        )
    }

    /// Where the payload lives.
    pub fn locator(&self) -> &DataLocator {
        &self.locator
    }

    /// Unix mode, if stored.
    pub fn unix_mode(&self) -> Option<u32> {
        self.attributes.unix_mode()
    }

    /// Size used for totals: declared size, 0 for directories.
    pub fn size_or_zero(&self) -> u64 {
        if self.is_directory {
            0
        } else {
            self.size.unwrap_or(0)
        }
    }
}

/// A selector for filtering items during extraction, testing or hashing.
///
/// # Built-in Implementations
///
/// | Type | Behavior |
/// |------|----------|
/// | `()` | Selects all items |
/// | [`SelectAll`] | Selects all items (explicit) |
/// | `&[&str]` / `Vec<String>` | Items whose `/`-joined path matches |
/// | `&[usize]` / [`SelectIndices`] | Items by index |
/// | `Fn(&Item) -> bool` | Custom predicate |
/// | [`SelectByName`] | Exact path match |
/// | [`SelectByPredicate`] | Wraps a predicate closure |
/// | [`SelectFilesOnly`] | Non-directories |
/// | `SelectByRegex` | Regex on the path (feature `regex`) |
pub trait ItemSelector {
    /// Returns true if item `index` should be selected.
    fn select(&self, index: usize, item: &Item) -> bool;
}

/// Selector that matches all items.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAll;

impl ItemSelector for SelectAll {
    fn select(&self, _index: usize, _item: &Item) -> bool {
        true
    }
}

/// Selector that matches items by exact `/`-joined path.
#[derive(Debug, Clone)]
pub struct SelectByName {
    names: Vec<String>,
}

impl SelectByName {
    /// Creates a selector for the given names.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ItemSelector for SelectByName {
    fn select(&self, _index: usize, item: &Item) -> bool {
        let path = item.path.to_slash_string();
        self.names.iter().any(|name| path == *name)
    }
}

/// Selector that matches items by a predicate function.
pub struct SelectByPredicate<F> {
    predicate: F,
}

impl<F: Fn(&Item) -> bool> SelectByPredicate<F> {
    /// Creates a selector with the given predicate.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F: Fn(&Item) -> bool> ItemSelector for SelectByPredicate<F> {
    fn select(&self, _index: usize, item: &Item) -> bool {
        (self.predicate)(item)
    }
}

/// Selector that matches only non-directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectFilesOnly;

impl ItemSelector for SelectFilesOnly {
    fn select(&self, _index: usize, item: &Item) -> bool {
        item.is_file()
    }
}

/// Selector that matches items by index.
#[derive(Debug, Clone, Default)]
pub struct SelectIndices(pub Vec<usize>);

impl ItemSelector for SelectIndices {
    fn select(&self, index: usize, _item: &Item) -> bool {
        self.0.contains(&index)
    }
}

impl ItemSelector for () {
    fn select(&self, _index: usize, _item: &Item) -> bool {
        true
    }
}

impl<F: Fn(&Item) -> bool> ItemSelector for F {
    fn select(&self, _index: usize, item: &Item) -> bool {
        self(item)
    }
}

impl ItemSelector for &[&str] {
    fn select(&self, _index: usize, item: &Item) -> bool {
        let path = item.path.to_slash_string();
        self.iter().any(|name| path == *name)
    }
}

impl ItemSelector for Vec<String> {
    fn select(&self, _index: usize, item: &Item) -> bool {
        let path = item.path.to_slash_string();
        self.iter().any(|name| path == *name)
    }
}

impl ItemSelector for &[usize] {
    fn select(&self, index: usize, _item: &Item) -> bool {
        self.contains(&index)
    }
}

/// Selector that matches the `/`-joined item path against a regex.
#[cfg(feature = "regex")]
#[derive(Debug, Clone)]
pub struct SelectByRegex {
    pattern: regex::Regex,
}

#[cfg(feature = "regex")]
impl SelectByRegex {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRegex`](crate::Error::InvalidRegex) if the pattern does not compile.
    pub fn new(pattern: &str) -> crate::Result<Self> {
        let pattern = regex::Regex::new(pattern).map_err(|e| crate::Error::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern })
    }
}

#[cfg(feature = "regex")]
impl ItemSelector for SelectByRegex {
    fn select(&self, _index: usize, item: &Item) -> bool {
        self.pattern.is_match(&item.path.to_slash_string())
    }
}

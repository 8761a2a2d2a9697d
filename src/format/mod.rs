//! Format identities, archive-level metadata and low-level decoding helpers.
//!
//! Each supported container lives under [`crate::formats`]; this module holds
//! what they share: the [`FormatKind`] tag, the [`ArchiveInfo`] produced on
//! open, the tri-state probe and dispatcher in [`detect`], byte decoding in
//! [`reader`] and item payload addressing in [`locator`].

pub mod detect;
pub mod locator;
pub mod reader;

use std::fmt;

/// The container formats this crate can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatKind {
    /// Intel HEX text image.
    Ihex,
    /// LHA / LZH archive.
    Lzh,
    /// Flash Video container.
    Flv,
    /// Nullsoft installer.
    Nsis,
    /// Checksum listing (`.sha256`, `.md5`, ...).
    HashFile,
    /// Numbered split volumes (`.001`, `.002`, ...).
    Split,
    /// FAT12/16/32 filesystem image.
    Fat,
    /// NTFS filesystem image.
    Ntfs,
}

impl FormatKind {
    /// Every format, in default probe order.
    pub const ALL: [FormatKind; 8] = [
        FormatKind::Ntfs,
        FormatKind::Fat,
        FormatKind::Nsis,
        FormatKind::Flv,
        FormatKind::Lzh,
        FormatKind::Ihex,
        FormatKind::HashFile,
        FormatKind::Split,
    ];

    /// Returns a human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            FormatKind::Ihex => "IHex",
            FormatKind::Lzh => "Lzh",
            FormatKind::Flv => "FLV",
            FormatKind::Nsis => "Nsis",
            FormatKind::HashFile => "Hash",
            FormatKind::Split => "Split",
            FormatKind::Fat => "FAT",
            FormatKind::Ntfs => "NTFS",
        }
    }

    /// Returns the typical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            FormatKind::Ihex => "hex",
            FormatKind::Lzh => "lzh",
            FormatKind::Flv => "flv",
            FormatKind::Nsis => "exe",
            FormatKind::HashFile => "sha256",
            FormatKind::Split => "001",
            FormatKind::Fat => "fat",
            FormatKind::Ntfs => "ntfs",
        }
    }

    /// Returns true for filesystem images (items form a directory tree with
    /// parent links rather than stored paths).
    pub fn is_filesystem(&self) -> bool {
        matches!(self, FormatKind::Fat | FormatKind::Ntfs)
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Warning flags raised while opening.
///
/// An archive with flags set still opened; its item list may be incomplete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveFlags {
    /// The input ended before the format's terminator.
    pub unexpected_end: bool,
    /// A header failed validation after at least one good item.
    pub headers_error: bool,
    /// Bytes follow the last recognised structure.
    pub data_after_end: bool,
    /// Some structures were skipped as unsupported.
    pub unsupported_feature: bool,
}

impl ArchiveFlags {
    /// Returns true if no flag is set.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the raised flags.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.unexpected_end {
            names.push("UnexpectedEnd");
        }
        if self.headers_error {
            names.push("HeadersError");
        }
        if self.data_after_end {
            names.push("DataAfterEnd");
        }
        if self.unsupported_feature {
            names.push("UnsupportedFeature");
        }
        names
    }
}

/// Archive-level metadata gathered on open.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    /// The detected format.
    pub format: FormatKind,
    /// Bytes of the input that belong to the archive.
    pub physical_size: u64,
    /// Warning flags.
    pub flags: ArchiveFlags,
    /// Whether items share one packed stream.
    pub is_solid: bool,
    /// Method used for the whole archive (NSIS) or the most common one.
    pub method: Option<String>,
    /// Number of items, including synthetic folders.
    pub item_count: usize,
    /// Filesystem volume label.
    pub volume_label: Option<String>,
    /// Filesystem serial number.
    pub volume_serial: Option<u64>,
    /// Filesystem cluster size.
    pub cluster_size: Option<u32>,
    /// Filesystem sector size.
    pub sector_size: Option<u32>,
    /// Free-form comment.
    pub comment: Option<String>,
    /// Non-fatal diagnostics collected while parsing.
    pub warnings: Vec<String>,
    /// Number of input volumes.
    pub volumes: u32,
}

impl ArchiveInfo {
    /// Creates info for `format` with everything else empty.
    pub fn new(format: FormatKind) -> Self {
        Self {
            format,
            physical_size: 0,
            flags: ArchiveFlags::default(),
            is_solid: false,
            method: None,
            item_count: 0,
            volume_label: None,
            volume_serial: None,
            cluster_size: None,
            sector_size: None,
            comment: None,
            warnings: Vec::new(),
            volumes: 1,
        }
    }

    /// Records a warning and logs it.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}: {}", self.format, message);
        self.warnings.push(message);
    }

    /// Returns true if the archive opened without any flag or warning.
    pub fn is_clean(&self) -> bool {
        self.flags.is_clean() && self.warnings.is_empty()
    }
}

//! Opening archives and filesystem images, and getting items out of them.
//!
//! [`Archive`] ties an input to the format that recognised it. The item list
//! is available as soon as the archive is open; payloads are decoded on
//! demand by [`Archive::read_item`], [`Archive::extract`], [`Archive::test`]
//! and [`Archive::hash`].
//!
//! # Example
//!
//! ```rust,no_run
//! use archkit::read::{Archive, ExtractOptions};
//!
//! let mut archive = Archive::open_path("disk.img")?;
//! println!("{} ({} items)", archive.format(), archive.len());
//! for item in archive.items() {
//!     println!("{:>10} {}", item.size_or_zero(), item.path);
//! }
//! let result = archive.extract("out", (), &ExtractOptions::default())?;
//! assert!(result.is_success());
//! # Ok::<(), archkit::Error>(())
//! ```

mod destination;
mod info;
mod options;

mod archive_hash;
mod archive_open;
mod archive_query;
mod extraction;
mod metadata;
mod path_safety;

pub use destination::{DiskSink, FilesystemSink, MemoryEntry, MemoryKind, MemorySink};
pub use info::{ExtractResult, ItemReport, OperationResult, Severity};
pub use options::{
    ExtractOptions, LinkPolicy, OpenOptions, OverwritePolicy, PathMode, PathSafety,
    PreserveMetadata, TestOptions, Threads,
};

pub use crate::format::{ArchiveFlags, ArchiveInfo, FormatKind};
pub use crate::item::{
    Item, ItemSelector, SelectAll, SelectByName, SelectByPredicate, SelectFilesOnly,
    SelectIndices,
};
#[cfg(feature = "regex")]
pub use crate::item::SelectByRegex;

use crate::format::locator::StreamSource;
use crate::safety::ResourceLimits;

/// An opened archive or filesystem image.
pub struct Archive<R> {
    pub(crate) reader: R,
    pub(crate) kind: FormatKind,
    pub(crate) items: Vec<Item>,
    pub(crate) info: ArchiveInfo,
    pub(crate) source: Box<dyn StreamSource>,
    /// Limits from the open options, used by [`Archive::read_item`].
    pub(crate) limits: ResourceLimits,
}

impl<R> Archive<R> {
    pub(crate) fn from_parts(
        reader: R,
        kind: FormatKind,
        items: Vec<Item>,
        info: ArchiveInfo,
        source: Box<dyn StreamSource>,
    ) -> Self {
        Self {
            reader,
            kind,
            items,
            info,
            source,
            limits: ResourceLimits::default(),
        }
    }
}

impl<R> std::fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("kind", &self.kind)
            .field("items", &self.items.len())
            .field("flags", &self.info.flags)
            .finish_non_exhaustive()
    }
}

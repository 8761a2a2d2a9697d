//! # archkit
//!
//! A pure-Rust toolkit for reading container formats and filesystem images.
//!
//! Every supported input is presented the same way: a flat, ordered list of
//! [`Item`]s with paths, sizes, times and attributes, plus a way to stream
//! each item's payload. Flat record formats (Intel HEX, LZH/LHA, FLV, NSIS
//! installers, checksum listings, split volumes) and filesystem images
//! (FAT12/16/32, NTFS) all go through one [`Archive`] type.
//!
//! ## Quick Start
//!
//! ### Listing and extracting
//!
//! ```rust,no_run
//! use archkit::{Archive, ExtractOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open_path("disk.img")?;
//!     println!("{}: {} items", archive.format(), archive.len());
//!
//!     for item in archive.items() {
//!         println!("{:>12} {}", item.size_or_zero(), item.path);
//!     }
//!
//!     let result = archive.extract("./output", (), &ExtractOptions::default())?;
//!     println!("{} files, {} failed", result.files, result.failed);
//!     Ok(())
//! }
//! ```
//!
//! ### Testing integrity
//!
//! ```rust,no_run
//! use archkit::{Archive, Result, TestOptions};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open_path("setup.exe")?;
//!     let result = archive.test((), &TestOptions::default())?;
//!     for failure in result.failures() {
//!         eprintln!("{}: {}", failure.path, failure.result);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Hashing
//!
//! ```rust,no_run
//! use archkit::hash::{HashGroup, HashMethod, HashOptions};
//! use archkit::{Archive, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open_path("archive.lzh")?;
//!     let options = HashOptions::new().methods(vec![HashMethod::Sha256]);
//!     let report = archive.hash((), &options)?;
//!     for (method, digest) in report.sum(HashGroup::Data) {
//!         println!("{method} of data: {}", digest.to_hex());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `lzma` | Yes | LZMA decode transform (NSIS) |
//! | `deflate` | Yes | Deflate decode transform (NSIS) |
//! | `bzip2` | Yes | BZip2 decode transform (NSIS) |
//! | `lzh` | Yes | LHA decode transforms (`-lh1-`, `-lh4-`..`-lh7-`, `-lhx-`, `-lzs-`, `-lz5-`) |
//! | `parallel` | Yes | Hash independent files on a Rayon pool |
//! | `regex` | No | Regex-based item selection |
//! | `cli` | No | The `archkit` command-line tool |
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Opening fails with
//! [`Error::NotAnArchive`] when no format accepts the input; a structurally
//! damaged archive that still opens carries its problems in
//! [`ArchiveInfo::flags`](format::ArchiveInfo). Per-item payload failures
//! never abort a batch: they are reported per item as an
//! [`OperationResult`](read::OperationResult).
//!
//! ## Safety and Resource Limits
//!
//! - **Path sanitising**: reserved characters and names in item paths are
//!   escaped before they reach the filesystem.
//! - **Containment**: with [`PathSafety::Strict`] every output path must stay
//!   inside the destination, including through previously written symlinks.
//! - **Link policy**: symlink targets that would climb out of the
//!   destination are refused.
//! - **Resource limits**: [`ResourceLimits`] bounds item counts, metadata
//!   allocations and produced bytes.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod archive_path;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod format;
pub mod formats;
pub mod hardlink;
pub mod hash;
pub mod item;
pub mod progress;
pub mod read;
pub mod safety;
pub mod timestamp;
pub mod volume;

pub use archive_path::ItemPath;
pub use error::{Error, Result};
pub use timestamp::Timestamp;

// Re-export reading API at crate root for convenience
pub use read::{
    Archive, ExtractOptions, ExtractResult, OpenOptions, OperationResult, TestOptions,
};

pub use format::detect::{FormatRegistry, Probe};
pub use format::{ArchiveFlags, ArchiveInfo, FormatKind};

pub use item::{
    Attributes, Item, ItemChecksum, ItemSelector, LinkInfo, LinkKind, SelectAll, SelectByName,
    SelectByPredicate, SelectFilesOnly, SelectIndices,
};

#[cfg(feature = "regex")]
pub use item::SelectByRegex;

// Re-export safety utilities
pub use safety::{LimitedReader, PathSafety, ResourceLimits, validate_extract_path};

// Re-export progress API
pub use progress::{
    AtomicProgress, NoProgress, ProgressReporter, ProgressState, StatisticsProgress,
    ThrottledProgress, progress_fn,
};

// Re-export hard link API
pub use hardlink::{HardLinkTracker, hard_link_groups};

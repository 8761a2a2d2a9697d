//! Error types for archive and filesystem-image operations.
//!
//! This module provides the [`Error`] enum which represents every failure
//! mode of the parsers, the extraction engine and the hash engine, along with
//! a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! Opening an archive either succeeds (possibly with warning flags, see
//! [`ArchiveFlags`](crate::format::ArchiveFlags)) or fails with an error.
//! Per-item failures during extraction are *not* returned as errors: they are
//! recorded as an [`OperationResult`](crate::read::OperationResult) for that
//! item and the batch continues. Only failures of the archive source itself
//! abort a whole operation.
//!
//! ```rust,no_run
//! use archkit::{Archive, Error, ExtractOptions};
//!
//! fn extract(path: &str, dest: &str) -> archkit::Result<()> {
//!     let mut archive = match Archive::open_path(path) {
//!         Ok(archive) => archive,
//!         Err(Error::NotAnArchive(msg)) => {
//!             eprintln!("{path} is not a supported archive: {msg}");
//!             return Ok(());
//!         }
//!         Err(e) => return Err(e),
//!     };
//!     let result = archive.extract(dest, (), &ExtractOptions::default())?;
//!     if !result.is_success() {
//!         eprintln!("{} of {} items failed", result.failed, result.items.len());
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    item_index: usize,
    item_name: Option<&'a str>,
    expected: u64,
    actual: u64,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch for item {}", self.item_index)?;
        if let Some(name) = self.item_name {
            write!(f, " ({})", name)?;
        }
        write!(f, ": expected {:#x}, got {:#x}", self.expected, self.actual)
    }
}

/// The main error type of the crate.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | Source or destination file operations |
/// | Format | [`NotAnArchive`][Self::NotAnArchive], [`NeedMoreInput`][Self::NeedMoreInput], [`CorruptHeader`][Self::CorruptHeader] | Structural rejection |
/// | Item data | [`DataError`][Self::DataError], [`CrcMismatch`][Self::CrcMismatch], [`SizeMismatch`][Self::SizeMismatch], [`UnsupportedMethod`][Self::UnsupportedMethod] | Per-item payload failures |
/// | Security | [`DangerousLink`][Self::DangerousLink], [`PathTraversal`][Self::PathTraversal] | Paths escaping the destination |
/// | Resources | [`ResourceLimitExceeded`][Self::ResourceLimitExceeded] | Safety limits |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading the source or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input was structurally rejected by the format parser.
    ///
    /// The dispatcher treats this as "try the next format".
    #[error("Not an archive: {0}")]
    NotAnArchive(String),

    /// Not enough bytes were available to reach a decision.
    ///
    /// Callers holding more data may retry with a longer prefix; when no more
    /// data will arrive this should be treated like [`NotAnArchive`][Self::NotAnArchive].
    #[error("Need more input: {needed} bytes required at offset {offset:#x}")]
    NeedMoreInput {
        /// Offset at which the read was attempted.
        offset: u64,
        /// Number of bytes the read required.
        needed: u64,
    },

    /// A header structure is corrupt.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The item uses a decode method for which no transform is registered.
    #[error("Unsupported method: {method}")]
    UnsupportedMethod {
        /// Format-specific method name, e.g. `-lh5-` or `BZip2`.
        method: String,
    },

    /// An item's payload could not be produced.
    #[error("Data error in item {item_index}: {reason}")]
    DataError {
        /// The item index.
        item_index: usize,
        /// A description of the failure.
        reason: String,
    },

    /// An item's payload was produced but its checksum does not match.
    #[error("{}", CrcMismatchDisplay { item_index: *item_index, item_name: item_name.as_deref(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The item index.
        item_index: usize,
        /// The item path (if known).
        item_name: Option<String>,
        /// The declared checksum.
        expected: u64,
        /// The computed checksum.
        actual: u64,
    },

    /// The decoded length differs from the declared size.
    #[error("Size mismatch in item {item_index}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The item index.
        item_index: usize,
        /// The declared size.
        expected: u64,
        /// The number of bytes produced.
        actual: u64,
    },

    /// A link target resolves outside of the extraction root.
    #[error("Dangerous link at item {item_index}: {path} -> {target}")]
    DangerousLink {
        /// The item index.
        item_index: usize,
        /// The path of the link item.
        path: String,
        /// The stored link target.
        target: String,
    },

    /// An item path would be written outside of the destination.
    #[error("Path traversal detected in item {item_index}: {path}")]
    PathTraversal {
        /// The item index.
        item_index: usize,
        /// The offending path.
        path: String,
    },

    /// The requested item does not exist.
    #[error("Item not found: {path}")]
    ItemNotFound {
        /// The requested path or index.
        path: String,
    },

    /// A configured resource limit was exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// A split volume could not be opened.
    #[error("Volume {volume} missing: expected at '{path}'")]
    VolumeMissing {
        /// The volume number (1-indexed).
        volume: u32,
        /// The expected path of the missing volume.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A checksum listing line could not be parsed.
    #[error("Invalid checksum line {line}: {reason}")]
    InvalidChecksumLine {
        /// 1-based line number.
        line: usize,
        /// A description of the problem.
        reason: String,
    },

    /// The operation was cancelled through the progress reporter.
    #[error("Operation cancelled")]
    Cancelled,

    /// A regular expression selector could not be compiled.
    #[cfg(feature = "regex")]
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex {
        /// The invalid regex pattern.
        pattern: String,
        /// Description of why the pattern is invalid.
        reason: String,
    },
}

impl Error {
    /// Returns true if this error was raised by a path or link safety check.
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            Error::PathTraversal { .. } | Error::DangerousLink { .. }
        )
    }

    /// Returns true if the error concerns one item's payload.
    ///
    /// The extraction engine records these per item and continues.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Error::DataError { .. }
                | Error::CrcMismatch { .. }
                | Error::SizeMismatch { .. }
                | Error::UnsupportedMethod { .. }
        )
    }

    /// Returns true if the dispatcher may try another format after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotAnArchive(_) | Error::NeedMoreInput { .. } | Error::CorruptHeader { .. }
        )
    }

    /// Returns the item index associated with this error, if any.
    pub fn item_index(&self) -> Option<usize> {
        match self {
            Error::DataError { item_index, .. }
            | Error::CrcMismatch { item_index, .. }
            | Error::SizeMismatch { item_index, .. }
            | Error::DangerousLink { item_index, .. }
            | Error::PathTraversal { item_index, .. } => Some(*item_index),
            _ => None,
        }
    }

    /// Creates a [`CorruptHeader`][Self::CorruptHeader] error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a [`NotAnArchive`][Self::NotAnArchive] error.
    pub fn not_an_archive(reason: impl Into<String>) -> Self {
        Error::NotAnArchive(reason.into())
    }

    /// Creates a [`DataError`][Self::DataError] error.
    pub fn data_error(item_index: usize, reason: impl Into<String>) -> Self {
        Error::DataError {
            item_index,
            reason: reason.into(),
        }
    }

    /// Creates an [`UnsupportedMethod`][Self::UnsupportedMethod] error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Error::UnsupportedMethod {
            method: method.into(),
        }
    }
}

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_mismatch_display() {
        let err = Error::CrcMismatch {
            item_index: 3,
            item_name: Some("a.txt".into()),
            expected: 0x1234,
            actual: 0xabcd,
        };
        assert_eq!(
            err.to_string(),
            "CRC mismatch for item 3 (a.txt): expected 0x1234, got 0xabcd"
        );
    }

    #[test]
    fn test_classification() {
        assert!(Error::not_an_archive("x").is_recoverable());
        assert!(!Error::not_an_archive("x").is_data_error());
        assert!(Error::data_error(1, "bad").is_data_error());
        assert_eq!(Error::data_error(7, "bad").item_index(), Some(7));

        let link = Error::DangerousLink {
            item_index: 2,
            path: "l".into(),
            target: "../../x".into(),
        };
        assert!(link.is_security_error());
        assert_eq!(link.item_index(), Some(2));
    }

    #[test]
    fn test_io_conversion() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.item_index().is_none());
    }
}

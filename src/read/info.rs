//! Per-item outcomes and run reports.

use std::fmt;
use std::path::PathBuf;

use crate::Error;

/// Outcome of one item in an extract, test or hash run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationResult {
    /// The item was processed and verified.
    Ok,
    /// The payload could not be decoded or had the wrong size.
    DataError,
    /// The payload decoded but its checksum differs.
    CrcError,
    /// The item uses a method this build cannot decode.
    UnsupportedMethod,
    /// A path or link target would escape the destination.
    DangerousLink,
    /// The item was not processed (policy or overwrite answer).
    Skipped,
    /// Writing to the destination failed.
    WriteError,
    /// The run was cancelled while this item was in progress.
    Cancelled,
}

impl OperationResult {
    /// Classifies an error raised while processing one item.
    ///
    /// I/O errors count as data errors here; the extraction engine reports
    /// destination failures as [`WriteError`](Self::WriteError) itself.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::CrcMismatch { .. } => Self::CrcError,
            Error::UnsupportedMethod { .. } => Self::UnsupportedMethod,
            Error::DangerousLink { .. } | Error::PathTraversal { .. } => Self::DangerousLink,
            Error::Cancelled => Self::Cancelled,
            _ => Self::DataError,
        }
    }

    /// Returns true for [`Ok`](Self::Ok).
    pub fn is_ok(&self) -> bool {
        *self == Self::Ok
    }

    /// Returns true for outcomes that count as failures.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Ok | Self::Skipped | Self::Cancelled)
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::DataError => "Data Error",
            Self::CrcError => "CRC Failed",
            Self::UnsupportedMethod => "Unsupported Method",
            Self::DangerousLink => "Dangerous Link Path",
            Self::Skipped => "Skipped",
            Self::WriteError => "Write Error",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Overall outcome tier of a run, in increasing order of gravity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Everything selected was processed.
    Ok,
    /// Some items were skipped or the archive raised warnings.
    Warning,
    /// At least one item failed.
    Error,
    /// The run was cancelled.
    Cancelled,
}

/// What happened to one selected item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Index of the item in the archive.
    pub index: usize,
    /// Archive path with `/` separators.
    pub path: String,
    /// Where the item was written, relative to the destination root.
    pub destination: Option<PathBuf>,
    /// Outcome.
    pub result: OperationResult,
    /// Payload bytes written or tested.
    pub bytes: u64,
    /// Error text for failures and skips.
    pub message: Option<String>,
}

impl ItemReport {
    pub(crate) fn new(index: usize, path: String) -> Self {
        Self {
            index,
            path,
            destination: None,
            result: OperationResult::Ok,
            bytes: 0,
            message: None,
        }
    }

    pub(crate) fn fail(mut self, result: OperationResult, message: impl Into<String>) -> Self {
        self.result = result;
        self.message = Some(message.into());
        self
    }
}

/// Result of an extract or test run.
#[must_use = "extraction results should be checked for skipped or failed items"]
#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    /// One report per processed item, in processing order.
    pub items: Vec<ItemReport>,
    /// Files written (or tested).
    pub files: usize,
    /// Directories created.
    pub directories: usize,
    /// Symbolic and hard links created.
    pub links: usize,
    /// Items skipped by policy or answer.
    pub skipped: usize,
    /// Items that failed.
    pub failed: usize,
    /// Payload bytes written.
    pub bytes_written: u64,
    /// Whether the run stopped before every item was processed.
    pub cancelled: bool,
}

impl ExtractResult {
    /// Returns true if nothing failed and the run completed.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }

    /// The run's overall tier.
    pub fn severity(&self) -> Severity {
        if self.cancelled {
            Severity::Cancelled
        } else if self.failed > 0 {
            Severity::Error
        } else if self.skipped > 0 {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    /// Reports of items that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| r.result.is_failure())
    }

    /// Counts a report and keeps it.
    pub(crate) fn push(&mut self, report: ItemReport) {
        match report.result {
            OperationResult::Ok => {}
            OperationResult::Skipped => self.skipped += 1,
            OperationResult::Cancelled => self.cancelled = true,
            _ => self.failed += 1,
        }
        self.bytes_written += report.bytes;
        self.items.push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error() {
        let crc = Error::CrcMismatch {
            item_index: 0,
            item_name: None,
            expected: 1,
            actual: 2,
        };
        assert_eq!(OperationResult::from_error(&crc), OperationResult::CrcError);
        assert_eq!(
            OperationResult::from_error(&Error::unsupported_method("-lh7-")),
            OperationResult::UnsupportedMethod
        );
        let io = Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(OperationResult::from_error(&io), OperationResult::DataError);
    }

    #[test]
    fn test_severity_tiers() {
        let mut result = ExtractResult::default();
        assert_eq!(result.severity(), Severity::Ok);

        result.push(ItemReport::new(0, "a".into()).fail(OperationResult::Skipped, "exists"));
        assert_eq!(result.severity(), Severity::Warning);
        assert!(result.is_success());

        result.push(ItemReport::new(1, "b".into()).fail(OperationResult::CrcError, "crc"));
        assert_eq!(result.severity(), Severity::Error);
        assert_eq!(result.failures().count(), 1);

        result.push(ItemReport::new(2, "c".into()).fail(OperationResult::Cancelled, "stop"));
        assert_eq!(result.severity(), Severity::Cancelled);
        assert!(!result.is_success());
        assert!(Severity::Cancelled > Severity::Error);
    }
}

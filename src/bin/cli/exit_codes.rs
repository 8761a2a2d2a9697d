//! Exit codes for the CLI tool.

use archkit::Error;
use archkit::read::Severity;

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Completed, but the archive opened with warnings or items were skipped
pub const WARNING: i32 = 1;
/// At least one item failed
pub const ITEM_ERRORS: i32 = 2;
/// The input could not be opened as an archive
pub const BAD_ARCHIVE: i32 = 3;
/// I/O error on the source or destination
pub const IO_ERROR: i32 = 5;
/// Ctrl+C (128 + SIGINT)
pub const USER_INTERRUPT: i32 = 130;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitCode {
    Success,
    Warning,
    ItemErrors,
    BadArchive,
    IoError,
    UserInterrupt,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Warning => WARNING,
            Self::ItemErrors => ITEM_ERRORS,
            Self::BadArchive => BAD_ARCHIVE,
            Self::IoError => IO_ERROR,
            Self::UserInterrupt => USER_INTERRUPT,
            Self::BadArgs => BAD_ARGS,
        }
    }

    /// The more severe of two codes.
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Converts a library error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::Io(_) | Error::VolumeMissing { .. } => ExitCode::IoError,
        Error::NotAnArchive(_)
        | Error::NeedMoreInput { .. }
        | Error::CorruptHeader { .. }
        | Error::InvalidChecksumLine { .. } => ExitCode::BadArchive,
        Error::Cancelled => ExitCode::UserInterrupt,
        Error::InvalidRegex { .. } => ExitCode::BadArgs,
        _ => ExitCode::ItemErrors,
    }
}

/// Maps the overall outcome of a batch to an exit code.
pub fn severity_to_exit_code(severity: Severity) -> ExitCode {
    match severity {
        Severity::Ok => ExitCode::Success,
        Severity::Warning => ExitCode::Warning,
        Severity::Error => ExitCode::ItemErrors,
        Severity::Cancelled => ExitCode::UserInterrupt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            error_to_exit_code(&Error::not_an_archive("x")),
            ExitCode::BadArchive
        );
        let io = std::io::Error::other("disk");
        assert_eq!(error_to_exit_code(&io.into()), ExitCode::IoError);
        assert_eq!(
            error_to_exit_code(&Error::data_error(0, "bad")),
            ExitCode::ItemErrors
        );
        assert_eq!(error_to_exit_code(&Error::Cancelled).code(), 130);
    }

    #[test]
    fn test_worst() {
        assert_eq!(ExitCode::Warning.worst(ExitCode::Success), ExitCode::Warning);
        assert_eq!(
            ExitCode::ItemErrors.worst(ExitCode::Warning).code(),
            ITEM_ERRORS
        );
    }
}

//! Checking a listing against files on disk.

use std::path::Path;

use super::digest::Digest;
use super::{ChecksumFile, hash_reader};
use crate::progress::ProgressReporter;
use crate::read::OperationResult;
use crate::{Error, Result};

/// Outcome for one listing entry.
#[derive(Debug, Clone)]
pub struct VerifyResult {
    /// Name as listed.
    pub name: String,
    /// `Ok`, `CrcError` on digest mismatch, `DataError` when the file is
    /// missing, unreadable or has the wrong size.
    pub result: OperationResult,
    /// Digest computed from the file, when it could be read.
    pub actual: Option<Digest>,
}

/// Result of a verification pass.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// One result per entry, in listing order.
    pub results: Vec<VerifyResult>,
    /// Entries that matched.
    pub ok: usize,
    /// Entries whose digest or size differed.
    pub failed: usize,
    /// Entries whose file could not be read.
    pub missing: usize,
    /// Whether the pass stopped early.
    pub cancelled: bool,
}

impl VerifyReport {
    /// Returns true if every entry matched.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed == 0 && self.missing == 0
    }
}

impl ChecksumFile {
    /// Recomputes every entry's digest from `base_dir/name` and compares.
    ///
    /// Per-entry problems never abort the pass; only cancellation stops it.
    pub fn verify(
        &self,
        base_dir: &Path,
        progress: &mut dyn ProgressReporter,
    ) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        progress.on_total(self.entries.len() as u64, 0);
        let mut bytes_done = 0u64;

        for (done, entry) in self.entries.iter().enumerate() {
            if progress.should_cancel() {
                report.cancelled = true;
                break;
            }
            progress.on_item_start(&entry.name, entry.size);
            let path = base_dir.join(&entry.name);
            let computed = std::fs::File::open(&path)
                .map_err(Error::from)
                .and_then(|mut f| hash_reader(&mut f, &[entry.method], |_| true));

            let (result, actual) = match computed {
                Ok((mut digests, size)) => {
                    bytes_done += size;
                    let actual = digests.pop();
                    let digest_ok = actual
                        .as_ref()
                        .is_some_and(|d| d.as_bytes() == entry.digest.as_bytes());
                    let size_ok = entry.size.is_none_or(|s| s == size);
                    let result = if !size_ok {
                        report.failed += 1;
                        OperationResult::DataError
                    } else if !digest_ok {
                        report.failed += 1;
                        OperationResult::CrcError
                    } else {
                        report.ok += 1;
                        OperationResult::Ok
                    };
                    (result, actual)
                }
                Err(e) => {
                    log::debug!("cannot verify {}: {}", path.display(), e);
                    progress.on_warning(&format!("{}: {}", entry.name, e));
                    report.missing += 1;
                    (OperationResult::DataError, None)
                }
            };
            progress.on_item_complete(&entry.name, result);
            report.results.push(VerifyResult {
                name: entry.name.clone(),
                result,
                actual,
            });
            if !progress.on_progress(done as u64 + 1, bytes_done) {
                report.cancelled = true;
                break;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoProgress, StatisticsProgress};
    use std::fs;

    #[test]
    fn test_empty_file_matches_md5_listing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.txt"), b"").unwrap();
        let listing =
            ChecksumFile::parse(b"d41d8cd98f00b204e9800998ecf8427e  empty.txt\n", None).unwrap();
        let report = listing.verify(dir.path(), &mut NoProgress).unwrap();
        assert_eq!(report.results[0].result, OperationResult::Ok);
        assert!(report.is_success());
    }

    #[test]
    fn test_mismatch_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"changed").unwrap();
        let listing = ChecksumFile::parse(
            b"d41d8cd98f00b204e9800998ecf8427e  a\nd41d8cd98f00b204e9800998ecf8427e  gone\n",
            None,
        )
        .unwrap();
        let mut progress = StatisticsProgress::new();
        let report = listing.verify(dir.path(), &mut progress).unwrap();
        assert_eq!(report.results[0].result, OperationResult::CrcError);
        assert_eq!(report.results[1].result, OperationResult::DataError);
        assert_eq!(report.failed, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(progress.results.len(), 2);
        assert_eq!(progress.warnings.len(), 1);
    }

    #[test]
    fn test_cksum_size_checked() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("e"), b"").unwrap();
        let listing = ChecksumFile::parse(b"4294967295 3 e\n", None).unwrap();
        let report = listing.verify(dir.path(), &mut NoProgress).unwrap();
        assert_eq!(report.results[0].result, OperationResult::DataError);
    }
}

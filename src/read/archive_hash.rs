//! Hashing item payloads straight from the archive.

use std::io::{Read, Seek};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crate::hash::{Digest, HashOptions, HashReport, HashState};
use crate::item::ItemSelector;
use crate::progress::{NoProgress, ProgressReporter};
use crate::Result;

use super::archive_test::{CopyFailure, SourceGuard, read_verified};
use super::{Archive, OperationResult};

/// Feeds every written byte to a set of hash states.
struct HashingSink {
    states: Vec<HashState>,
}

impl std::io::Write for HashingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for state in &mut self.states {
            state.update(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<R: Read + Seek + Send> Archive<R> {
    /// Hashes the selected items' payloads, in archive order.
    ///
    /// Payloads are verified while hashed, so an item whose stored checksum
    /// fails is reported as failed rather than hashed. Directories count
    /// towards the name-folded aggregates with zero digests.
    pub fn hash(&mut self, selector: impl ItemSelector, options: &HashOptions) -> Result<HashReport> {
        self.hash_with(selector, options, &mut NoProgress)
    }

    /// [`hash`](Self::hash) with progress reporting and cancellation.
    pub fn hash_with(
        &mut self,
        selector: impl ItemSelector,
        options: &HashOptions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<HashReport> {
        let indices = self.selected(&selector);
        let mut report = HashReport::new(options);
        let methods = report.bundle.methods();
        let Archive {
            reader,
            items,
            source,
            limits,
            ..
        } = self;

        let total_bytes = indices.iter().filter_map(|&i| items[i].size).sum();
        progress.on_total(indices.len() as u64, total_bytes);
        let tracker = Arc::new(AtomicU64::new(0));
        let mut input = SourceGuard::new(reader);
        let mut bytes_done = 0u64;

        for (done, &index) in indices.iter().enumerate() {
            if progress.should_cancel() {
                report.cancelled = true;
                break;
            }
            let item = &items[index];
            let path = item.path.to_slash_string();
            progress.on_item_start(&path, item.size);

            let result = if item.is_directory {
                let zero = methods
                    .iter()
                    .map(|m| Digest::zero(m.digest_size()))
                    .collect();
                report.record(path.clone(), zero, 0, true, false);
                OperationResult::Ok
            } else {
                let mut sink = HashingSink {
                    states: methods.iter().map(|&m| HashState::new(m)).collect(),
                };
                let base = bytes_done;
                let outcome = read_verified(
                    index,
                    item,
                    source.as_mut(),
                    &mut input,
                    limits,
                    &tracker,
                    &mut sink,
                    |n| progress.on_progress(done as u64, base + n) && !progress.should_cancel(),
                )?;
                match outcome {
                    Ok(size) => {
                        bytes_done += size;
                        let digests = sink.states.iter().map(HashState::digest).collect();
                        report.record(path.clone(), digests, size, false, item.is_alt_stream);
                        OperationResult::Ok
                    }
                    Err(failure) => {
                        let result = match &failure {
                            CopyFailure::Read(e) => {
                                progress.on_warning(&format!("{path}: {e}"));
                                OperationResult::from_error(e)
                            }
                            CopyFailure::Write(_) => OperationResult::WriteError,
                            CopyFailure::Cancelled => OperationResult::Cancelled,
                        };
                        report.record_failure(path.clone(), false, result);
                        result
                    }
                }
            };

            progress.on_item_complete(&path, result);
            if result == OperationResult::Cancelled
                || !progress.on_progress(done as u64 + 1, bytes_done)
            {
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
    use crate::archive_path::ItemPath;
    use crate::format::locator::{DataLocator, PlainSource};
    use crate::format::{ArchiveInfo, FormatKind};
    use crate::hash::{HashGroup, HashMethod};
    use crate::item::{Item, ItemChecksum};
    use std::io::Cursor;

    #[test]
    fn test_hash_items() {
        let mut corrupt = Item::file(
            ItemPath::from_slash_str("bad"),
            1,
            DataLocator::Resident(vec![0]),
        );
        corrupt.checksum = Some(ItemChecksum::Crc32(5));
        let items = vec![
            Item::directory(ItemPath::from_slash_str("d")),
            Item::file(
                ItemPath::from_slash_str("d/nine"),
                9,
                DataLocator::Resident(b"123456789".to_vec()),
            ),
            corrupt,
        ];
        let mut archive = Archive::from_parts(
            Cursor::new(Vec::new()),
            FormatKind::Lzh,
            items,
            ArchiveInfo::new(FormatKind::Lzh),
            Box::new(PlainSource),
        );
        let options = HashOptions::new().methods(vec![HashMethod::Crc32]);
        let report = archive.hash((), &options).unwrap();
        assert_eq!(report.items.len(), 3);
        assert!(report.items[0].is_dir);
        assert_eq!(report.items[1].digests[0].1.to_hex(), "CBF43926");
        assert_eq!(report.items[2].result, OperationResult::CrcError);
        assert_eq!(report.errors(), 1);
        assert_eq!(report.sum(HashGroup::Data).len(), 1);
    }
}

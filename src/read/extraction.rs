//! Writing selected items to a destination.
//!
//! Each item goes through the same steps: map its path, vet the path and any
//! link target, settle a conflict with an existing file, write the payload
//! with verification, then apply metadata. A failing item is reported and
//! the run continues; only source I/O errors, exceeded resource limits and
//! cancellation end it early.

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crate::format::locator::StreamSource;
use crate::hardlink::{HardLinkTracker, is_linkable};
use crate::item::{Attributes, Item, ItemSelector, LinkKind, SelectIndices};
use crate::progress::{FileInfo, NoProgress, OverwriteDecision, ProgressReporter};
use crate::Result;

use super::archive_test::{CopyFailure, SourceGuard, read_verified};
use super::metadata::apply_metadata;
use super::path_safety::{link_target, resolve_item_path};
use super::{
    Archive, DiskSink, ExtractOptions, ExtractResult, FilesystemSink, ItemReport, LinkPolicy,
    OperationResult, OverwritePolicy,
};

impl<R: Read + Seek + Send> Archive<R> {
    /// Extracts the selected items below `dest`.
    ///
    /// `dest` is created if missing. Pass [`SelectAll`](crate::SelectAll)
    /// (or `()`) to extract everything.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use archkit::read::{Archive, ExtractOptions, OverwritePolicy};
    ///
    /// let mut archive = Archive::open_path("backup.lzh")?;
    /// let options = ExtractOptions::new().overwrite(OverwritePolicy::Skip);
    /// let result = archive.extract("out", (), &options)?;
    /// println!("{} files, {} failed", result.files, result.failed);
    /// # Ok::<(), archkit::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Item failures are reported in the result. The call fails when the
    /// destination cannot be created, the input fails to read, or a
    /// resource limit is exceeded.
    pub fn extract(
        &mut self,
        dest: impl AsRef<Path>,
        selector: impl ItemSelector,
        options: &ExtractOptions,
    ) -> Result<ExtractResult> {
        self.extract_with(dest, selector, options, &mut NoProgress)
    }

    /// [`extract`](Self::extract) with progress reporting, overwrite
    /// questions and cancellation.
    pub fn extract_with(
        &mut self,
        dest: impl AsRef<Path>,
        selector: impl ItemSelector,
        options: &ExtractOptions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<ExtractResult> {
        let mut sink = DiskSink::new(dest.as_ref(), options.path_safety)?;
        self.extract_to_sink_with(&mut sink, selector, options, progress)
    }

    /// Extracts the items at `indices`, in archive order.
    pub fn extract_indices(
        &mut self,
        dest: impl AsRef<Path>,
        indices: &[usize],
        options: &ExtractOptions,
    ) -> Result<ExtractResult> {
        self.extract(dest, SelectIndices(indices.to_vec()), options)
    }

    /// Extracts into any [`FilesystemSink`].
    pub fn extract_to_sink(
        &mut self,
        sink: &mut dyn FilesystemSink,
        selector: impl ItemSelector,
        options: &ExtractOptions,
    ) -> Result<ExtractResult> {
        self.extract_to_sink_with(sink, selector, options, &mut NoProgress)
    }

    /// [`extract_to_sink`](Self::extract_to_sink) with progress reporting.
    pub fn extract_to_sink_with(
        &mut self,
        sink: &mut dyn FilesystemSink,
        selector: impl ItemSelector,
        options: &ExtractOptions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<ExtractResult> {
        let indices = self.selected(&selector);
        let Archive {
            reader,
            items,
            source,
            ..
        } = self;

        let total_bytes = indices.iter().filter_map(|&i| items[i].size).sum();
        progress.on_total(indices.len() as u64, total_bytes);

        let mut run = Extraction::new(options);
        let mut input = SourceGuard::new(reader);
        let mut directories = Vec::new();

        for &index in &indices {
            if progress.should_cancel() {
                run.result.cancelled = true;
                break;
            }
            let item = &items[index];
            let path = item.path.to_slash_string();
            progress.on_item_start(&path, item.size);

            let report = run.extract_item(index, item, sink, source.as_mut(), &mut input, progress)?;
            if let (true, OperationResult::Ok, Some(dest)) =
                (item.is_directory, report.result, &report.destination)
            {
                directories.push((dest.clone(), index));
            }
            progress.on_item_complete(&path, report.result);
            run.result.push(report);

            run.items_done += 1;
            if run.result.cancelled || !progress.on_progress(run.items_done, run.bytes_done) {
                run.result.cancelled = true;
                break;
            }
        }

        // Writing children bumps a directory's times, so they go last.
        for (dest, index) in directories.iter().rev() {
            apply_metadata(sink, dest, &items[*index], &options.preserve_metadata);
        }

        let result = run.result;
        log::info!(
            "extracted {} files, {} directories, {} links; {} skipped, {} failed{}",
            result.files,
            result.directories,
            result.links,
            result.skipped,
            result.failed,
            if result.cancelled { " (cancelled)" } else { "" }
        );
        Ok(result)
    }
}

/// How an existing destination was settled.
enum Conflict {
    Write(PathBuf),
    Skip,
    Cancel,
    Failed(std::io::Error),
}

/// State of one extraction run.
struct Extraction<'o> {
    options: &'o ExtractOptions,
    links: HardLinkTracker,
    /// Sticky answer from "yes/no to all".
    overwrite_all: Option<bool>,
    total_unpacked: Arc<AtomicU64>,
    items_done: u64,
    bytes_done: u64,
    result: ExtractResult,
}

impl<'o> Extraction<'o> {
    fn new(options: &'o ExtractOptions) -> Self {
        Self {
            options,
            links: HardLinkTracker::new(),
            overwrite_all: None,
            total_unpacked: Arc::new(AtomicU64::new(0)),
            items_done: 0,
            bytes_done: 0,
            result: ExtractResult::default(),
        }
    }

    fn extract_item(
        &mut self,
        index: usize,
        item: &Item,
        sink: &mut dyn FilesystemSink,
        source: &mut dyn StreamSource,
        input: &mut SourceGuard<'_>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<ItemReport> {
        let options = self.options;
        let report = ItemReport::new(index, item.path.to_slash_string());

        let Some(dest) = resolve_item_path(
            &item.path,
            item.is_directory,
            options.path_mode,
            &options.strip_prefix,
        ) else {
            return Ok(report.fail(OperationResult::Skipped, "no destination path"));
        };
        if let Err(e) = sink.check_path(&dest, index) {
            log::warn!("{}: {}", report.path, e);
            return Ok(report.fail(OperationResult::from_error(&e), e.to_string()));
        }

        if item.is_directory {
            let mut report = report;
            report.destination = Some(dest.clone());
            return Ok(match sink.create_dir_all(&dest) {
                Ok(()) => {
                    self.result.directories += 1;
                    report
                }
                Err(e) => report.fail(OperationResult::WriteError, e.to_string()),
            });
        }

        let symlink = match &item.link {
            Some(link) if item.is_symlink() => {
                if options.link_policy == LinkPolicy::Forbid {
                    return Ok(report.fail(OperationResult::Skipped, "links are not extracted"));
                }
                match link_target(index, &item.path, &dest, link, options.link_policy) {
                    Ok(target) => Some((target, link.kind == LinkKind::Junction)),
                    Err(e) => {
                        log::warn!("{}: {}", report.path, e);
                        return Ok(report.fail(OperationResult::DangerousLink, e.to_string()));
                    }
                }
            }
            _ => None,
        };

        let dest = match self.settle_conflict(sink, dest, item, progress) {
            Conflict::Write(dest) => dest,
            Conflict::Skip => {
                return Ok(report.fail(OperationResult::Skipped, "destination exists"));
            }
            Conflict::Cancel => {
                return Ok(report.fail(OperationResult::Cancelled, "cancelled at overwrite prompt"));
            }
            Conflict::Failed(e) => {
                return Ok(report.fail(OperationResult::WriteError, e.to_string()));
            }
        };
        let mut report = report;
        report.destination = Some(dest.clone());

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = sink.create_dir_all(parent) {
                return Ok(report.fail(OperationResult::WriteError, e.to_string()));
            }
        }

        if let Some((target, is_junction)) = symlink {
            let is_dir = is_junction || item.attributes.has(Attributes::DIRECTORY);
            return Ok(match sink.create_symlink(&dest, &target, is_dir) {
                Ok(()) => {
                    self.result.links += 1;
                    report
                }
                Err(e) => report.fail(OperationResult::WriteError, e.to_string()),
            });
        }

        let node = item.node_id.filter(|_| is_linkable(item));
        if let Some(first) = node.and_then(|n| self.links.first_name(n)) {
            let first = first.to_path_buf();
            log::debug!("{} is a hard link to {}", report.path, first.display());
            return Ok(match sink.create_hard_link(&dest, &first) {
                Ok(()) => {
                    self.result.links += 1;
                    report
                }
                Err(e) => report.fail(OperationResult::WriteError, e.to_string()),
            });
        }

        let outcome = {
            let mut writer = match sink.create_file(&dest) {
                Ok(writer) => writer,
                Err(e) => return Ok(report.fail(OperationResult::WriteError, e.to_string())),
            };
            let items_done = self.items_done;
            let base = self.bytes_done;
            let outcome = read_verified(
                index,
                item,
                source,
                input,
                &options.limits,
                &self.total_unpacked,
                &mut writer,
                |n| progress.on_progress(items_done, base + n) && !progress.should_cancel(),
            );
            match (outcome, writer.flush()) {
                (Ok(Ok(_)), Err(e)) => Ok(Err(CopyFailure::Write(e))),
                (outcome, _) => outcome,
            }
        };
        let failure = match outcome {
            Ok(Ok(n)) => {
                self.result.files += 1;
                self.bytes_done += n;
                report.bytes = n;
                if let Some(node) = node {
                    self.links.record(node, &dest);
                }
                apply_metadata(sink, &dest, item, &options.preserve_metadata);
                return Ok(report);
            }
            Ok(Err(failure)) => failure,
            Err(fatal) => {
                let _ = sink.remove_file(&dest);
                return Err(fatal);
            }
        };

        if let Err(e) = sink.remove_file(&dest) {
            log::debug!("cannot remove partial '{}': {}", dest.display(), e);
        }
        Ok(match failure {
            CopyFailure::Read(e) => {
                log::warn!("{}: {}", report.path, e);
                report.fail(OperationResult::from_error(&e), e.to_string())
            }
            CopyFailure::Write(e) => {
                log::warn!("{}: write failed: {}", report.path, e);
                report.fail(OperationResult::WriteError, e.to_string())
            }
            CopyFailure::Cancelled => report.fail(OperationResult::Cancelled, "cancelled"),
        })
    }

    /// Applies the overwrite policy when `dest` already exists.
    ///
    /// Nothing is modified before the policy (or the user) has decided.
    fn settle_conflict(
        &mut self,
        sink: &mut dyn FilesystemSink,
        dest: PathBuf,
        item: &Item,
        progress: &mut dyn ProgressReporter,
    ) -> Conflict {
        let Some(existing) = sink.exists(&dest) else {
            return Conflict::Write(dest);
        };
        let mut policy = match self.overwrite_all {
            Some(true) => OverwritePolicy::Overwrite,
            Some(false) => OverwritePolicy::Skip,
            None => self.options.overwrite,
        };
        if policy == OverwritePolicy::Ask {
            let incoming = FileInfo {
                path: item.path.to_slash_string(),
                size: item.size,
                modified: item.modified,
            };
            policy = match progress.ask_overwrite(&existing, &incoming) {
                OverwriteDecision::Yes => OverwritePolicy::Overwrite,
                OverwriteDecision::No => OverwritePolicy::Skip,
                OverwriteDecision::YesToAll => {
                    self.overwrite_all = Some(true);
                    OverwritePolicy::Overwrite
                }
                OverwriteDecision::NoToAll => {
                    self.overwrite_all = Some(false);
                    OverwritePolicy::Skip
                }
                OverwriteDecision::AutoRename => OverwritePolicy::AutoRename,
                OverwriteDecision::Cancel => return Conflict::Cancel,
            };
        }

        match policy {
            OverwritePolicy::Overwrite => match sink.remove_file(&dest) {
                Ok(()) => Conflict::Write(dest),
                Err(e) => Conflict::Failed(e),
            },
            OverwritePolicy::AutoRename => Conflict::Write(free_name(sink, &dest)),
            OverwritePolicy::RenameExisting => {
                let aside = free_name(sink, &dest);
                match sink.rename(&dest, &aside) {
                    Ok(()) => Conflict::Write(dest),
                    Err(e) => Conflict::Failed(e),
                }
            }
            // Ask was resolved above.
            OverwritePolicy::Skip | OverwritePolicy::Ask => Conflict::Skip,
        }
    }
}

/// First unused `name_N.ext` next to `dest`.
fn free_name(sink: &dyn FilesystemSink, dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = dest
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = dest.parent().unwrap_or(Path::new(""));
    (1u64..)
        .map(|n| parent.join(format!("{stem}_{n}{ext}")))
        .find(|candidate| sink.exists(candidate).is_none())
        .unwrap_or_else(|| dest.to_path_buf())
}

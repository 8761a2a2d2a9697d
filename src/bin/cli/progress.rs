//! Progress bar and interactive prompts for CLI operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use archkit::progress::{FileInfo, OverwriteDecision, ProgressReporter};
use archkit::read::OperationResult;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::output::{format_timestamp, humanize_bytes};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {wide_msg}";

/// Progress display for extract, test and hash runs.
///
/// Cancellation comes from the shared interrupt flag set by the Ctrl+C
/// handler; the library polls [`ProgressReporter::should_cancel`] between
/// buffers.
pub struct CliProgress {
    bar: ProgressBar,
    interrupted: Arc<AtomicBool>,
    verbose: bool,
    /// Whether overwrite questions may be shown.
    interactive: bool,
}

impl CliProgress {
    /// Creates a new progress display
    pub fn new(quiet: bool, interrupted: Arc<AtomicBool>) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
            let style = ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            pb.set_style(style);
            pb
        };
        Self {
            bar,
            interrupted,
            verbose: false,
            interactive: console::user_attended(),
        }
    }

    /// Prints every finished item, not only failures.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Finishes the progress display
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn println(&self, line: String) {
        if self.bar.is_hidden() {
            eprintln!("{line}");
        } else {
            self.bar.println(line);
        }
    }
}

impl ProgressReporter for CliProgress {
    fn on_total(&mut self, _total_items: u64, total_bytes: u64) {
        self.bar.set_length(total_bytes);
    }

    fn on_progress(&mut self, _items_done: u64, bytes_done: u64) -> bool {
        self.bar.set_position(bytes_done);
        !self.interrupted.load(Ordering::Relaxed)
    }

    fn on_item_start(&mut self, path: &str, _size: Option<u64>) {
        let shown = match path.char_indices().rev().nth(39) {
            Some((cut, _)) => format!("...{}", &path[cut..]),
            None => path.to_string(),
        };
        self.bar.set_message(shown);
    }

    fn on_item_complete(&mut self, path: &str, result: OperationResult) {
        if self.bar.is_hidden() {
            return;
        }
        if result.is_failure() {
            self.println(format!("{}: {}", result, path));
        } else if self.verbose {
            self.println(format!("{:<8} {}", result.label(), path));
        }
    }

    fn ask_overwrite(&mut self, existing: &FileInfo, incoming: &FileInfo) -> OverwriteDecision {
        if !self.interactive {
            self.println(format!("exists, skipped: {}", existing.path));
            return OverwriteDecision::No;
        }
        let describe = |info: &FileInfo| {
            format!(
                "{}, modified {}",
                info.size.map(humanize_bytes).unwrap_or_else(|| "?".into()),
                info.modified
                    .map(format_timestamp)
                    .unwrap_or_else(|| "-".into())
            )
        };
        let prompt = format!(
            "File exists: {}\n  existing: {}\n  incoming: {}",
            existing.path,
            describe(existing),
            describe(incoming)
        );
        let choices = [
            "Yes - overwrite this file",
            "No - keep the existing file",
            "All - overwrite every existing file",
            "Skip all - keep every existing file",
            "Rename - write under a new name",
            "Quit - stop extracting",
        ];
        let answer = self.bar.suspend(|| {
            dialoguer::Select::with_theme(&dialoguer::theme::ColorfulTheme::default())
                .with_prompt(prompt)
                .items(&choices[..])
                .default(1)
                .interact_opt()
        });
        match answer {
            Ok(Some(0)) => OverwriteDecision::Yes,
            Ok(Some(2)) => OverwriteDecision::YesToAll,
            Ok(Some(3)) => OverwriteDecision::NoToAll,
            Ok(Some(4)) => OverwriteDecision::AutoRename,
            Ok(Some(5)) | Ok(None) => OverwriteDecision::Cancel,
            _ => OverwriteDecision::No,
        }
    }

    fn on_warning(&mut self, message: &str) {
        self.println(format!("warning: {message}"));
    }

    fn should_cancel(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }
}

//! Progress and decision callbacks for extraction, testing and hashing.
//!
//! A [`ProgressReporter`] receives item and byte counters, per-item
//! outcomes and warnings, answers overwrite questions and signals
//! cooperative cancellation. Cancellation is checked at every item boundary
//! and at each progress checkpoint while a single item is being copied.
//!
//! # Example
//!
//! ```rust,ignore
//! use archkit::progress::StatisticsProgress;
//! use archkit::{Archive, ExtractOptions};
//!
//! let mut progress = StatisticsProgress::new();
//! archive.extract_with("./output", (), &ExtractOptions::default(), &mut progress)?;
//! println!("{} items reported", progress.results.len());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::read::OperationResult;
use crate::timestamp::Timestamp;

// Floating point IEC units for formatting
const BYTES_KB: f64 = 1024.0;
const BYTES_MB: f64 = BYTES_KB * 1024.0;
const BYTES_GB: f64 = BYTES_MB * 1024.0;

/// Description of one side of an overwrite conflict.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Path of the file (destination path or item path).
    pub path: String,
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// Modification time, if known.
    pub modified: Option<Timestamp>,
}

/// Answer to an overwrite question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteDecision {
    /// Overwrite this file.
    Yes,
    /// Keep the existing file and skip the item.
    No,
    /// Overwrite this and every later conflict.
    YesToAll,
    /// Skip this and every later conflict.
    NoToAll,
    /// Write the item under a new, unused name.
    AutoRename,
    /// Stop the whole operation.
    Cancel,
}

/// Progress reporting and decision trait.
///
/// Every method has a default so implementors only override what they need.
pub trait ProgressReporter: Send {
    /// Called once before processing with the number of selected items and
    /// the sum of their known sizes.
    fn on_total(&mut self, total_items: u64, total_bytes: u64) {
        let _ = (total_items, total_bytes);
    }

    /// Called periodically.
    ///
    /// Returns `true` to continue or `false` to request cancellation.
    fn on_progress(&mut self, items_done: u64, bytes_done: u64) -> bool {
        let _ = (items_done, bytes_done);
        true
    }

    /// Called when an item starts.
    fn on_item_start(&mut self, path: &str, size: Option<u64>) {
        let _ = (path, size);
    }

    /// Called when an item finished, with its outcome.
    fn on_item_complete(&mut self, path: &str, result: OperationResult) {
        let _ = (path, result);
    }

    /// Called when the destination of an item already exists and the
    /// overwrite policy is `Ask`.
    ///
    /// No destination mutation happens before this returns. The default
    /// keeps the existing file.
    fn ask_overwrite(&mut self, existing: &FileInfo, incoming: &FileInfo) -> OverwriteDecision {
        let _ = (existing, incoming);
        OverwriteDecision::No
    }

    /// Called on any warning during processing.
    fn on_warning(&mut self, message: &str) {
        let _ = message;
    }

    /// Checks if cancellation has been requested.
    fn should_cancel(&self) -> bool {
        false
    }
}

impl<P: ProgressReporter + ?Sized> ProgressReporter for Box<P> {
    fn on_total(&mut self, total_items: u64, total_bytes: u64) {
        (**self).on_total(total_items, total_bytes);
    }

    fn on_progress(&mut self, items_done: u64, bytes_done: u64) -> bool {
        (**self).on_progress(items_done, bytes_done)
    }

    fn on_item_start(&mut self, path: &str, size: Option<u64>) {
        (**self).on_item_start(path, size);
    }

    fn on_item_complete(&mut self, path: &str, result: OperationResult) {
        (**self).on_item_complete(path, result);
    }

    fn ask_overwrite(&mut self, existing: &FileInfo, incoming: &FileInfo) -> OverwriteDecision {
        (**self).ask_overwrite(existing, incoming)
    }

    fn on_warning(&mut self, message: &str) {
        (**self).on_warning(message);
    }

    fn should_cancel(&self) -> bool {
        (**self).should_cancel()
    }
}

/// Progress state with timing and rate calculation.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Number of selected items.
    pub total_items: u64,
    /// Sum of known item sizes.
    pub total_bytes: u64,
    /// Items finished so far.
    pub items_done: u64,
    /// Bytes produced so far.
    pub bytes_done: u64,
    /// Current item path.
    pub current_item: Option<String>,
    /// Processing start time.
    pub start_time: Instant,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            total_items: 0,
            total_bytes: 0,
            items_done: 0,
            bytes_done: 0,
            current_item: None,
            start_time: Instant::now(),
        }
    }
}

impl ProgressState {
    /// Creates a new progress state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completion percentage by bytes (0.0 - 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.bytes_done as f64 / self.total_bytes as f64) * 100.0
        }
    }

    /// Returns elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the processing rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            0.0
        } else {
            self.bytes_done as f64 / elapsed
        }
    }
}

/// A progress reporter that does nothing.
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// A progress reporter that collects statistics and outcomes.
#[derive(Debug, Default, Clone)]
pub struct StatisticsProgress {
    /// The progress state.
    pub state: ProgressState,
    /// Whether cancellation was requested.
    pub cancelled: bool,
    /// Warnings collected.
    pub warnings: Vec<String>,
    /// Outcome of every completed item, in completion order.
    pub results: Vec<(String, OperationResult)>,
    /// Answer returned to overwrite questions.
    pub overwrite_answer: Option<OverwriteDecision>,
    /// Number of overwrite questions asked.
    pub overwrite_questions: usize,
}

impl StatisticsProgress {
    /// Creates a new statistics progress reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every overwrite question with `decision`.
    pub fn answering(decision: OverwriteDecision) -> Self {
        Self {
            overwrite_answer: Some(decision),
            ..Self::default()
        }
    }

    /// Returns the collected state.
    pub fn state(&self) -> &ProgressState {
        &self.state
    }
}

impl ProgressReporter for StatisticsProgress {
    fn on_total(&mut self, total_items: u64, total_bytes: u64) {
        self.state.total_items = total_items;
        self.state.total_bytes = total_bytes;
    }

    fn on_progress(&mut self, items_done: u64, bytes_done: u64) -> bool {
        self.state.items_done = items_done;
        self.state.bytes_done = bytes_done;
        !self.cancelled
    }

    fn on_item_start(&mut self, path: &str, _size: Option<u64>) {
        self.state.current_item = Some(path.to_string());
    }

    fn on_item_complete(&mut self, path: &str, result: OperationResult) {
        self.results.push((path.to_string(), result));
        self.state.current_item = None;
    }

    fn ask_overwrite(&mut self, _existing: &FileInfo, _incoming: &FileInfo) -> OverwriteDecision {
        self.overwrite_questions += 1;
        self.overwrite_answer.unwrap_or(OverwriteDecision::No)
    }

    fn on_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn should_cancel(&self) -> bool {
        self.cancelled
    }
}

/// A progress reporter that rate-limits `on_progress` callbacks.
pub struct ThrottledProgress<P> {
    inner: P,
    min_interval: Duration,
    last_callback: Instant,
}

impl<P: ProgressReporter> ThrottledProgress<P> {
    /// Creates a new throttled progress reporter.
    pub fn new(inner: P, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_callback: Instant::now(),
        }
    }

    /// Creates with default 100ms interval.
    pub fn default_interval(inner: P) -> Self {
        Self::new(inner, Duration::from_millis(100))
    }

    /// Returns the inner reporter.
    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: ProgressReporter> ProgressReporter for ThrottledProgress<P> {
    fn on_total(&mut self, total_items: u64, total_bytes: u64) {
        self.inner.on_total(total_items, total_bytes);
    }

    fn on_progress(&mut self, items_done: u64, bytes_done: u64) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_callback) >= self.min_interval {
            self.last_callback = now;
            self.inner.on_progress(items_done, bytes_done)
        } else {
            !self.inner.should_cancel()
        }
    }

    fn on_item_start(&mut self, path: &str, size: Option<u64>) {
        self.inner.on_item_start(path, size);
    }

    fn on_item_complete(&mut self, path: &str, result: OperationResult) {
        self.inner.on_item_complete(path, result);
    }

    fn ask_overwrite(&mut self, existing: &FileInfo, incoming: &FileInfo) -> OverwriteDecision {
        self.inner.ask_overwrite(existing, incoming)
    }

    fn on_warning(&mut self, message: &str) {
        self.inner.on_warning(message);
    }

    fn should_cancel(&self) -> bool {
        self.inner.should_cancel()
    }
}

/// A thread-safe progress reporter using atomics.
///
/// Another thread (for example a Ctrl-C handler) can observe progress and
/// request cancellation.
#[derive(Debug)]
pub struct AtomicProgress {
    total_bytes: AtomicU64,
    bytes_done: AtomicU64,
    items_done: AtomicU64,
    cancelled: AtomicBool,
}

impl Default for AtomicProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicProgress {
    /// Creates a new atomic progress reporter.
    pub fn new() -> Self {
        Self {
            total_bytes: AtomicU64::new(0),
            bytes_done: AtomicU64::new(0),
            items_done: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Creates a shared atomic progress reporter.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns total bytes to process.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Returns processed bytes.
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    /// Returns finished items.
    pub fn items_done(&self) -> u64 {
        self.items_done.load(Ordering::Relaxed)
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl ProgressReporter for Arc<AtomicProgress> {
    fn on_total(&mut self, _total_items: u64, total_bytes: u64) {
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
    }

    fn on_progress(&mut self, items_done: u64, bytes_done: u64) -> bool {
        self.items_done.store(items_done, Ordering::Relaxed);
        self.bytes_done.store(bytes_done, Ordering::Relaxed);
        !self.is_cancelled()
    }

    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

/// A progress reporter that calls a closure with `(items_done, bytes_done)`.
pub struct ClosureProgress<F> {
    callback: F,
}

impl<F> ProgressReporter for ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    fn on_progress(&mut self, items_done: u64, bytes_done: u64) -> bool {
        (self.callback)(items_done, bytes_done)
    }
}

/// Creates a closure-based progress reporter.
///
/// The closure returns `false` to cancel.
pub fn progress_fn<F>(f: F) -> ClosureProgress<F>
where
    F: FnMut(u64, u64) -> bool + Send,
{
    ClosureProgress { callback: f }
}

/// Formats bytes as a human-readable string using IEC units.
///
/// ```rust
/// use archkit::progress::format_bytes_iec;
///
/// assert_eq!(format_bytes_iec(512), "512 B");
/// assert_eq!(format_bytes_iec(1536), "1.5 KiB");
/// ```
pub fn format_bytes_iec(bytes: u64) -> String {
    let bytes_f64 = bytes as f64;
    if bytes_f64 < BYTES_KB {
        format!("{} B", bytes)
    } else if bytes_f64 < BYTES_MB {
        format!("{:.1} KiB", bytes_f64 / BYTES_KB)
    } else if bytes_f64 < BYTES_GB {
        format!("{:.1} MiB", bytes_f64 / BYTES_MB)
    } else {
        format!("{:.1} GiB", bytes_f64 / BYTES_GB)
    }
}

//! Open, extraction and test options.

use crate::safety::ResourceLimits;

pub use crate::safety::PathSafety;

/// Options consulted while parsing an input.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Resource limits for parsing.
    pub limits: ResourceLimits,
    /// Expose deleted entries (FAT `0xE5` entries, NTFS records not in use).
    pub show_deleted: bool,
    /// Expose NTFS metadata files under `[SYSTEM]`.
    pub show_system_files: bool,
    /// Recover unreachable directories into `[LOST]` / `[UNKNOWN]`.
    pub recover_lost: bool,
    /// Number of decoded NSIS positions kept in memory.
    pub nsis_cache_capacity: usize,
    /// Treat short LZNT1 units as errors instead of zero-padding them.
    pub strict_lznt1: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            show_deleted: false,
            show_system_files: true,
            recover_lost: true,
            nsis_cache_capacity: 16,
            strict_lznt1: false,
        }
    }
}

impl OpenOptions {
    /// Creates open options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Shows or hides deleted entries.
    pub fn show_deleted(mut self, show: bool) -> Self {
        self.show_deleted = show;
        self
    }

    /// Shows or hides filesystem metadata files.
    pub fn show_system_files(mut self, show: bool) -> Self {
        self.show_system_files = show;
        self
    }

    /// Enables or disables orphan recovery.
    pub fn recover_lost(mut self, recover: bool) -> Self {
        self.recover_lost = recover;
        self
    }

    /// Sets the NSIS decoded-position cache capacity.
    pub fn nsis_cache_capacity(mut self, capacity: usize) -> Self {
        self.nsis_cache_capacity = capacity;
        self
    }

    /// Enables strict LZNT1 unit checking.
    pub fn strict_lznt1(mut self, strict: bool) -> Self {
        self.strict_lznt1 = strict;
        self
    }
}

/// How item paths map onto the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMode {
    /// Full stored path, without a leading drive segment.
    #[default]
    Full,
    /// File name only; directories are not created.
    NoPath,
    /// Path relative to the `strip_prefix` folder; items outside it are skipped.
    Current,
    /// Full stored path including a leading drive segment.
    Absolute,
}

/// Policy for handling existing files during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Keep the existing file and skip the item.
    Skip,
    /// Ask the progress reporter; no destination change happens before it answers.
    #[default]
    Ask,
    /// Replace the existing file.
    Overwrite,
    /// Write the item under the first free `name_N.ext`.
    AutoRename,
    /// Move the existing file to the first free `name_N.ext`, then write.
    RenameExisting,
}

/// Policy for symbolic links and junctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPolicy {
    /// Do not create links; link items are skipped.
    Forbid,
    /// Create links whose targets stay inside the destination.
    #[default]
    ValidateTargets,
    /// Create links exactly as stored. A [`DiskSink`](super::DiskSink)
    /// still refuses targets that leave the destination unless its path
    /// safety is [`PathSafety::Disabled`](crate::PathSafety::Disabled).
    Allow,
}

/// Thread configuration for hashing independent files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threads {
    /// Automatically determine thread count.
    #[default]
    Auto,
    /// Use a specific number of threads.
    Count(std::num::NonZeroUsize),
    /// Single-threaded operation.
    Single,
}

impl Threads {
    /// `Single` for zero, `Count(n)` otherwise.
    pub fn count_or_single(n: usize) -> Self {
        match std::num::NonZeroUsize::new(n) {
            Some(count) => Self::Count(count),
            None => Self::Single,
        }
    }

    /// Resolved thread count, at least 1.
    pub fn count(&self) -> usize {
        match self {
            Self::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            Self::Count(n) => n.get(),
            Self::Single => 1,
        }
    }
}

/// Which metadata is applied after an item's data was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreserveMetadata {
    /// Set the modification time.
    pub modification_time: bool,
    /// Set the access time.
    pub access_time: bool,
    /// Apply the read-only bit and Unix mode.
    pub attributes: bool,
}

impl Default for PreserveMetadata {
    fn default() -> Self {
        Self::all()
    }
}

impl PreserveMetadata {
    /// Preserve all available metadata.
    pub fn all() -> Self {
        Self {
            modification_time: true,
            access_time: true,
            attributes: true,
        }
    }

    /// Preserve no metadata.
    pub fn none() -> Self {
        Self {
            modification_time: false,
            access_time: false,
            attributes: false,
        }
    }

    /// Preserve timestamps only.
    pub fn times() -> Self {
        Self {
            attributes: false,
            ..Self::all()
        }
    }
}

/// Options for extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// How item paths map onto the destination.
    pub path_mode: PathMode,
    /// Leading segments removed from every item path.
    pub strip_prefix: Vec<String>,
    /// Policy for existing files.
    pub overwrite: OverwritePolicy,
    /// Policy for symbolic links and junctions.
    pub link_policy: LinkPolicy,
    /// Destination containment check.
    pub path_safety: PathSafety,
    /// Metadata applied after the data.
    pub preserve_metadata: PreserveMetadata,
    /// Resource limits for extraction.
    pub limits: ResourceLimits,
}

impl ExtractOptions {
    /// Creates extraction options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path mode.
    pub fn path_mode(mut self, mode: PathMode) -> Self {
        self.path_mode = mode;
        self
    }

    /// Sets the prefix stripped from item paths (`/`-separated).
    pub fn strip_prefix(mut self, prefix: &str) -> Self {
        self.strip_prefix = prefix
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    /// Sets the overwrite policy.
    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Sets the link policy.
    pub fn link_policy(mut self, policy: LinkPolicy) -> Self {
        self.link_policy = policy;
        self
    }

    /// Sets the path safety policy.
    pub fn path_safety(mut self, policy: PathSafety) -> Self {
        self.path_safety = policy;
        self
    }

    /// Sets the metadata preservation options.
    pub fn preserve_metadata(mut self, preserve: PreserveMetadata) -> Self {
        self.preserve_metadata = preserve;
        self
    }

    /// Sets the resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Options for integrity tests.
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    /// Resource limits for testing.
    pub limits: ResourceLimits,
}

impl TestOptions {
    /// Creates test options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(OverwritePolicy::default(), OverwritePolicy::Ask);
        assert_eq!(LinkPolicy::default(), LinkPolicy::ValidateTargets);
        assert_eq!(PathSafety::default(), PathSafety::Strict);
        assert_eq!(PathMode::default(), PathMode::Full);
        let open = OpenOptions::default();
        assert!(!open.show_deleted);
        assert!(open.show_system_files);
        assert!(open.recover_lost);
    }

    #[test]
    fn test_strip_prefix_parsing() {
        let opts = ExtractOptions::new().strip_prefix("/a\\b//c/");
        assert_eq!(opts.strip_prefix, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_threads_count() {
        assert_eq!(Threads::count_or_single(0), Threads::Single);
        assert_eq!(Threads::count_or_single(4).count(), 4);
        assert!(Threads::Auto.count() >= 1);
    }

    #[test]
    fn test_preserve_metadata() {
        assert!(PreserveMetadata::default().attributes);
        assert!(!PreserveMetadata::none().modification_time);
        assert!(!PreserveMetadata::times().attributes);
    }
}

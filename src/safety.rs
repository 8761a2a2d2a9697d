//! Safety and resource limit utilities.
//!
//! Every parser in this crate consumes untrusted input. [`ResourceLimits`]
//! bounds what an image may make us allocate or produce, [`PathSafety`]
//! controls how output paths are checked against the destination root, and
//! [`LimitedReader`] enforces byte budgets while streaming.

use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

/// Policy for validating extraction paths.
///
/// Item path segments are always sanitised before they reach the
/// filesystem; this policy adds the containment check against directories
/// (or previously extracted symlinks) that resolve elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathSafety {
    /// Canonicalise the deepest existing ancestor and require it to stay
    /// inside the canonical destination root.
    #[default]
    Strict,
    /// Lexical check only: no absolute paths, no `..` components.
    Relaxed,
    /// No validation. Only for archives you produced yourself.
    Disabled,
}

/// Resource limits applied while opening and extracting.
///
/// | Limit | Default | Applies to |
/// |-------|---------|------------|
/// | `max_items` | 1,000,000 | items built by any parser |
/// | `max_header_bytes` | 256 MiB | metadata read into memory (MFT, NSIS header, text listings) |
/// | `max_item_size` | 64 GiB | bytes produced for one item |
/// | `max_total_unpacked` | 1 TiB | bytes produced by one operation |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum number of items.
    pub max_items: usize,
    /// Maximum metadata bytes held in memory during open.
    pub max_header_bytes: u64,
    /// Maximum bytes produced for a single item.
    pub max_item_size: u64,
    /// Maximum bytes produced during one extract, test or hash call.
    pub max_total_unpacked: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_items: 1_000_000,
            max_header_bytes: 256 << 20,
            max_item_size: 64 << 30,
            max_total_unpacked: 1 << 40,
        }
    }
}

impl ResourceLimits {
    /// Creates resource limits with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resource limits with no restrictions.
    pub fn unlimited() -> Self {
        Self {
            max_items: usize::MAX,
            max_header_bytes: u64::MAX,
            max_item_size: u64::MAX,
            max_total_unpacked: u64::MAX,
        }
    }

    /// Sets the maximum number of items.
    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = max;
        self
    }

    /// Sets the maximum metadata bytes.
    pub fn max_header_bytes(mut self, max: u64) -> Self {
        self.max_header_bytes = max;
        self
    }

    /// Sets the maximum size of one item.
    pub fn max_item_size(mut self, max: u64) -> Self {
        self.max_item_size = max;
        self
    }

    /// Sets the maximum total unpacked size.
    pub fn max_total_unpacked(mut self, max: u64) -> Self {
        self.max_total_unpacked = max;
        self
    }

    /// Fails with [`Error::ResourceLimitExceeded`] once `count` passes `max_items`.
    pub fn check_items(&self, count: usize) -> Result<()> {
        if count > self.max_items {
            return Err(Error::ResourceLimitExceeded(format!(
                "item count {} exceeds limit {}",
                count, self.max_items
            )));
        }
        Ok(())
    }

    /// Fails once a metadata allocation of `bytes` passes `max_header_bytes`.
    pub fn check_header_bytes(&self, bytes: u64) -> Result<()> {
        if bytes > self.max_header_bytes {
            return Err(Error::ResourceLimitExceeded(format!(
                "metadata size {} exceeds limit {}",
                bytes, self.max_header_bytes
            )));
        }
        Ok(())
    }
}

/// Checks that `relative` joined onto `dest_root` stays inside it.
///
/// `relative` is built from sanitised segments; the strict policy also
/// resolves the deepest existing ancestor so that directories replaced by
/// symlinks cannot redirect writes.
pub fn validate_extract_path(
    relative: &Path,
    dest_root: &Path,
    policy: PathSafety,
    item_index: usize,
) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        item_index,
        path: relative.display().to_string(),
    };

    if policy == PathSafety::Disabled {
        return Ok(dest_root.join(relative));
    }

    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(traversal()),
        }
    }

    let full_path = dest_root.join(relative);
    if policy == PathSafety::Relaxed {
        return Ok(full_path);
    }

    let canonical_dest = dest_root.canonicalize()?;
    let mut ancestor = full_path.as_path();
    let mut pending = Vec::new();
    while !ancestor.exists() {
        match (ancestor.file_name(), ancestor.parent()) {
            (Some(name), Some(parent)) => {
                pending.push(name.to_os_string());
                ancestor = parent;
            }
            _ => return Err(traversal()),
        }
    }
    let mut resolved = ancestor.canonicalize()?;
    for name in pending.into_iter().rev() {
        resolved.push(name);
    }
    if !resolved.starts_with(&canonical_dest) {
        return Err(traversal());
    }
    Ok(full_path)
}

/// A reader wrapper that enforces per-item and per-operation byte budgets.
pub struct LimitedReader<R> {
    inner: R,
    max_item_bytes: u64,
    bytes_read: u64,
    total_tracker: Option<Arc<AtomicU64>>,
    max_total_bytes: u64,
}

impl<R> LimitedReader<R> {
    /// Creates a new limited reader with no limits.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_item_bytes: u64::MAX,
            bytes_read: 0,
            total_tracker: None,
            max_total_bytes: u64::MAX,
        }
    }

    /// Sets the maximum bytes for this item.
    pub fn max_item_bytes(mut self, max: u64) -> Self {
        self.max_item_bytes = max;
        self
    }

    /// Sets a shared tracker for total bytes.
    pub fn total_tracker(mut self, tracker: Arc<AtomicU64>, max_total: u64) -> Self {
        self.total_tracker = Some(tracker);
        self.max_total_bytes = max_total;
        self
    }

    /// Returns the number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Ok(0);
        }
        self.bytes_read += n as u64;
        if self.bytes_read > self.max_item_bytes {
            return Err(io::Error::other(Error::ResourceLimitExceeded(format!(
                "item size {} exceeds limit {}",
                self.bytes_read, self.max_item_bytes
            ))));
        }
        if let Some(ref tracker) = self.total_tracker {
            let total = tracker.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
            if total > self.max_total_bytes {
                return Err(io::Error::other(Error::ResourceLimitExceeded(format!(
                    "total unpacked size {} exceeds limit {}",
                    total, self.max_total_bytes
                ))));
            }
        }
        Ok(n)
    }
}

impl<R> std::fmt::Debug for LimitedReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitedReader")
            .field("max_item_bytes", &self.max_item_bytes)
            .field("bytes_read", &self.bytes_read)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_strict_accepts_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let p = validate_extract_path(Path::new("a/b.txt"), dir.path(), PathSafety::Strict, 0)
            .unwrap();
        assert_eq!(p, dir.path().join("a").join("b.txt"));
    }

    #[test]
    fn test_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        for policy in [PathSafety::Strict, PathSafety::Relaxed] {
            let err = validate_extract_path(Path::new("../x"), dir.path(), policy, 4).unwrap_err();
            assert!(matches!(err, Error::PathTraversal { item_index: 4, .. }));
        }
        assert!(
            validate_extract_path(Path::new("../x"), dir.path(), PathSafety::Disabled, 0).is_ok()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_strict_rejects_symlinked_directory() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("evil")).unwrap();
        let err = validate_extract_path(
            Path::new("evil/payload"),
            dir.path(),
            PathSafety::Strict,
            1,
        )
        .unwrap_err();
        assert!(err.is_security_error());
    }

    #[test]
    fn test_limited_reader_item_limit() {
        let mut reader = LimitedReader::new(Cursor::new(vec![0u8; 100])).max_item_bytes(50);
        let mut buf = Vec::new();
        assert!(reader.read_to_end(&mut buf).is_err());
    }

    #[test]
    fn test_limited_reader_total_tracker() {
        let tracker = Arc::new(AtomicU64::new(90));
        let mut reader =
            LimitedReader::new(Cursor::new(vec![0u8; 20])).total_tracker(tracker, 100);
        let mut buf = Vec::new();
        assert!(reader.read_to_end(&mut buf).is_err());
    }

    #[test]
    fn test_limits_checks() {
        let limits = ResourceLimits::new().max_items(2).max_header_bytes(10);
        assert!(limits.check_items(2).is_ok());
        assert!(limits.check_items(3).is_err());
        assert!(limits.check_header_bytes(11).is_err());
        assert!(ResourceLimits::unlimited().check_items(usize::MAX).is_ok());
    }
}

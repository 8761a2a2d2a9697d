//! Where extracted items go.
//!
//! The extraction engine talks to a [`FilesystemSink`] using paths relative
//! to the destination root. [`DiskSink`] writes below a directory on disk
//! and re-checks every path against it; [`MemorySink`] keeps a tree in
//! memory, which suits previews and tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use archkit::read::{Archive, ExtractOptions, MemorySink, SelectAll};
//!
//! let mut archive = Archive::open_path("firmware.hex")?;
//! let mut sink = MemorySink::new();
//! archive.extract_to_sink(&mut sink, SelectAll, &ExtractOptions::default())?;
//! for (path, entry) in sink.entries() {
//!     println!("{} ({} bytes)", path.display(), entry.data.len());
//! }
//! # Ok::<(), archkit::Error>(())
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use crate::item::Attributes;
use crate::progress::FileInfo;
use crate::safety::{PathSafety, validate_extract_path};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

use super::path_safety::target_stays_inside;

/// Operations the extraction engine needs from a destination.
///
/// All paths are relative to the destination root and consist of sanitised
/// normal components.
pub trait FilesystemSink {
    /// Checks that `path` may be written. Called before anything is created
    /// for the item.
    ///
    /// The default accepts only plain relative paths.
    fn check_path(&self, path: &Path, item_index: usize) -> Result<()> {
        if path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            Ok(())
        } else {
            Err(Error::PathTraversal {
                item_index,
                path: path.display().to_string(),
            })
        }
    }

    /// Returns a description of what exists at `path`, if anything.
    fn exists(&self, path: &Path) -> Option<FileInfo>;

    /// Returns true if `path` exists and is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Creates `path` and any missing parents.
    fn create_dir_all(&mut self, path: &Path) -> io::Result<()>;

    /// Creates or truncates a file and returns a writer for it.
    fn create_file(&mut self, path: &Path) -> io::Result<Box<dyn Write + '_>>;

    /// Sets a file's length, zero-filling or truncating.
    fn set_len(&mut self, path: &Path, len: u64) -> io::Result<()>;

    /// Removes a file or link.
    fn remove_file(&mut self, path: &Path) -> io::Result<()>;

    /// Renames `from` to `to`.
    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()>;

    /// Applies modification and access times.
    fn set_times(
        &mut self,
        path: &Path,
        modified: Option<Timestamp>,
        accessed: Option<Timestamp>,
    ) -> io::Result<()>;

    /// Applies attribute bits (read-only flag, Unix mode).
    fn set_attributes(&mut self, path: &Path, attributes: Attributes) -> io::Result<()>;

    /// Creates a symbolic link at `path` pointing to `target`.
    fn create_symlink(&mut self, path: &Path, target: &str, is_dir: bool) -> io::Result<()>;

    /// Creates `path` as another name for the already extracted `existing`.
    fn create_hard_link(&mut self, path: &Path, existing: &Path) -> io::Result<()>;
}

/// Writes below a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskSink {
    root: PathBuf,
    safety: PathSafety,
}

impl DiskSink {
    /// Creates a sink rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, safety: PathSafety) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, safety })
    }

    /// The destination root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl FilesystemSink for DiskSink {
    fn check_path(&self, path: &Path, item_index: usize) -> Result<()> {
        validate_extract_path(path, &self.root, self.safety, item_index).map(|_| ())
    }

    fn exists(&self, path: &Path) -> Option<FileInfo> {
        let meta = fs::symlink_metadata(self.full(path)).ok()?;
        Some(FileInfo {
            path: path.display().to_string(),
            size: meta.is_file().then(|| meta.len()),
            modified: meta.modified().ok().and_then(Timestamp::from_system_time),
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        fs::symlink_metadata(self.full(path)).is_ok_and(|m| m.is_dir())
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.full(path))
    }

    fn create_file(&mut self, path: &Path) -> io::Result<Box<dyn Write + '_>> {
        let file = File::create(self.full(path))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn set_len(&mut self, path: &Path, len: u64) -> io::Result<()> {
        fs::OpenOptions::new()
            .write(true)
            .open(self.full(path))?
            .set_len(len)
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        let full = self.full(path);
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => fs::remove_dir(&full),
            Ok(meta) => {
                // Read-only files cannot be replaced on Windows.
                if meta.permissions().readonly() {
                    let mut perms = meta.permissions();
                    #[allow(clippy::permissions_set_readonly_false)]
                    perms.set_readonly(false);
                    fs::set_permissions(&full, perms)?;
                }
                fs::remove_file(&full)
            }
            Err(e) => Err(e),
        }
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(self.full(from), self.full(to))
    }

    fn set_times(
        &mut self,
        path: &Path,
        modified: Option<Timestamp>,
        accessed: Option<Timestamp>,
    ) -> io::Result<()> {
        let full = self.full(path);
        match (modified, accessed) {
            (Some(m), Some(a)) => {
                filetime::set_file_times(&full, a.as_file_time(), m.as_file_time())
            }
            (Some(m), None) => filetime::set_file_mtime(&full, m.as_file_time()),
            (None, Some(a)) => filetime::set_file_atime(&full, a.as_file_time()),
            (None, None) => Ok(()),
        }
    }

    fn set_attributes(&mut self, path: &Path, attributes: Attributes) -> io::Result<()> {
        let full = self.full(path);
        #[cfg(unix)]
        if let Some(mode) = attributes.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            return fs::set_permissions(&full, fs::Permissions::from_mode(mode & 0o7777));
        }
        if attributes.is_readonly() {
            let mut perms = fs::metadata(&full)?.permissions();
            perms.set_readonly(true);
            fs::set_permissions(&full, perms)?;
        }
        Ok(())
    }

    fn create_symlink(&mut self, path: &Path, target: &str, is_dir: bool) -> io::Result<()> {
        if self.safety != PathSafety::Disabled && !target_stays_inside(path, target) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("link target {target} leaves the destination"),
            ));
        }
        let full = self.full(path);
        #[cfg(unix)]
        {
            let _ = is_dir;
            std::os::unix::fs::symlink(target, full)
        }
        #[cfg(windows)]
        {
            let target = target.replace('/', "\\");
            if is_dir {
                std::os::windows::fs::symlink_dir(target, full)
            } else {
                std::os::windows::fs::symlink_file(target, full)
            }
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = (full, target, is_dir);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "symbolic links are not supported on this platform",
            ))
        }
    }

    fn create_hard_link(&mut self, path: &Path, existing: &Path) -> io::Result<()> {
        fs::hard_link(self.full(existing), self.full(path))
    }
}

/// What a [`MemoryEntry`] is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symbolic link and its target.
    Symlink(String),
}

/// One node of a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    /// Node kind.
    pub kind: MemoryKind,
    /// File contents.
    pub data: Vec<u8>,
    /// Modification time, if applied.
    pub modified: Option<Timestamp>,
    /// Access time, if applied.
    pub accessed: Option<Timestamp>,
    /// Attributes, if applied.
    pub attributes: Option<Attributes>,
}

impl MemoryEntry {
    fn new(kind: MemoryKind) -> Self {
        Self {
            kind,
            data: Vec::new(),
            modified: None,
            accessed: None,
            attributes: None,
        }
    }
}

/// Keeps extracted items in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: BTreeMap<PathBuf, MemoryEntry>,
    rejected: HashSet<PathBuf>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write to `path` fail with `PermissionDenied`.
    pub fn reject(mut self, path: impl Into<PathBuf>) -> Self {
        self.rejected.insert(path.into());
        self
    }

    /// Pre-populates a file, as if it existed before extraction.
    pub fn with_file(mut self, path: impl Into<PathBuf>, data: &[u8]) -> Self {
        let mut entry = MemoryEntry::new(MemoryKind::File);
        entry.data = data.to_vec();
        self.entries.insert(path.into(), entry);
        self
    }

    /// All nodes, sorted by path.
    pub fn entries(&self) -> &BTreeMap<PathBuf, MemoryEntry> {
        &self.entries
    }

    /// The node at `path`.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&MemoryEntry> {
        self.entries.get(path.as_ref())
    }

    /// Contents of the file at `path`.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.get(path)
            .filter(|e| e.kind == MemoryKind::File)
            .map(|e| e.data.as_slice())
    }

    fn writable(&self, path: &Path) -> io::Result<()> {
        if self.rejected.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not writable", path.display()),
            ));
        }
        Ok(())
    }

    fn node_mut(&mut self, path: &Path) -> io::Result<&mut MemoryEntry> {
        self.entries
            .get_mut(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

impl FilesystemSink for MemorySink {
    fn exists(&self, path: &Path) -> Option<FileInfo> {
        self.entries.get(path).map(|entry| FileInfo {
            path: path.display().to_string(),
            size: (entry.kind == MemoryKind::File).then_some(entry.data.len() as u64),
            modified: entry.modified,
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.entries
            .get(path)
            .is_some_and(|e| e.kind == MemoryKind::Directory)
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        for ancestor in path.ancestors().filter(|a| !a.as_os_str().is_empty()) {
            match self.entries.get(ancestor) {
                Some(e) if e.kind != MemoryKind::Directory => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} is not a directory", ancestor.display()),
                    ));
                }
                Some(_) => {}
                None => {
                    self.writable(ancestor)?;
                    self.entries
                        .insert(ancestor.to_path_buf(), MemoryEntry::new(MemoryKind::Directory));
                }
            }
        }
        Ok(())
    }

    fn create_file(&mut self, path: &Path) -> io::Result<Box<dyn Write + '_>> {
        self.writable(path)?;
        let entry = self
            .entries
            .entry(path.to_path_buf())
            .or_insert_with(|| MemoryEntry::new(MemoryKind::File));
        *entry = MemoryEntry::new(MemoryKind::File);
        Ok(Box::new(&mut entry.data))
    }

    fn set_len(&mut self, path: &Path, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.node_mut(path)?.data.resize(len, 0);
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        self.writable(path)?;
        self.entries
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        self.writable(to)?;
        let entry = self
            .entries
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, from.display().to_string()))?;
        self.entries.insert(to.to_path_buf(), entry);
        Ok(())
    }

    fn set_times(
        &mut self,
        path: &Path,
        modified: Option<Timestamp>,
        accessed: Option<Timestamp>,
    ) -> io::Result<()> {
        let entry = self.node_mut(path)?;
        entry.modified = modified.or(entry.modified);
        entry.accessed = accessed.or(entry.accessed);
        Ok(())
    }

    fn set_attributes(&mut self, path: &Path, attributes: Attributes) -> io::Result<()> {
        self.node_mut(path)?.attributes = Some(attributes);
        Ok(())
    }

    fn create_symlink(&mut self, path: &Path, target: &str, _is_dir: bool) -> io::Result<()> {
        self.writable(path)?;
        self.entries.insert(
            path.to_path_buf(),
            MemoryEntry::new(MemoryKind::Symlink(target.to_string())),
        );
        Ok(())
    }

    fn create_hard_link(&mut self, path: &Path, existing: &Path) -> io::Result<()> {
        self.writable(path)?;
        let data = self
            .entries
            .get(existing)
            .filter(|e| e.kind == MemoryKind::File)
            .map(|e| e.data.clone())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, existing.display().to_string())
            })?;
        let mut entry = MemoryEntry::new(MemoryKind::File);
        entry.data = data;
        self.entries.insert(path.to_path_buf(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_files_and_dirs() {
        let mut sink = MemorySink::new();
        sink.create_dir_all(Path::new("a/b")).unwrap();
        assert!(sink.is_dir(Path::new("a")));
        {
            let mut w = sink.create_file(Path::new("a/b/c.txt")).unwrap();
            w.write_all(b"hello").unwrap();
        }
        assert_eq!(sink.file("a/b/c.txt"), Some(&b"hello"[..]));
        assert_eq!(sink.exists(Path::new("a/b/c.txt")).unwrap().size, Some(5));

        sink.create_hard_link(Path::new("a/link"), Path::new("a/b/c.txt"))
            .unwrap();
        assert_eq!(sink.file("a/link"), Some(&b"hello"[..]));

        sink.rename(Path::new("a/link"), Path::new("a/moved")).unwrap();
        assert!(sink.exists(Path::new("a/link")).is_none());
        sink.set_len(Path::new("a/moved"), 2).unwrap();
        assert_eq!(sink.file("a/moved"), Some(&b"he"[..]));
    }

    #[test]
    fn test_memory_sink_rejects() {
        let mut sink = MemorySink::new().reject("locked.bin");
        assert_eq!(
            sink.create_file(Path::new("locked.bin")).err().map(|e| e.kind()),
            Some(io::ErrorKind::PermissionDenied)
        );
        assert!(sink.create_file(Path::new("free.bin")).is_ok());
    }

    #[test]
    fn test_default_check_path() {
        let sink = MemorySink::new();
        assert!(sink.check_path(Path::new("a/b"), 0).is_ok());
        let err = sink.check_path(Path::new("../b"), 3).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { item_index: 3, .. }));
    }

    #[test]
    fn test_disk_sink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DiskSink::new(dir.path().join("out"), PathSafety::Strict).unwrap();
        sink.create_dir_all(Path::new("sub")).unwrap();
        {
            let mut w = sink.create_file(Path::new("sub/f.txt")).unwrap();
            w.write_all(b"data").unwrap();
        }
        assert_eq!(fs::read(dir.path().join("out/sub/f.txt")).unwrap(), b"data");
        let ts = Timestamp::from_unix_secs(1_000_000_000).unwrap();
        sink.set_times(Path::new("sub/f.txt"), Some(ts), None).unwrap();
        let meta = fs::metadata(dir.path().join("out/sub/f.txt")).unwrap();
        assert_eq!(
            filetime::FileTime::from_last_modification_time(&meta).unix_seconds(),
            1_000_000_000
        );
        assert!(sink.check_path(Path::new("sub/../../x"), 0).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_sink_refuses_escaping_link_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DiskSink::new(dir.path().join("out"), PathSafety::Strict).unwrap();
        let err = sink
            .create_symlink(Path::new("link"), "../outside", false)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(fs::symlink_metadata(dir.path().join("out/link")).is_err());

        sink.create_dir_all(Path::new("a")).unwrap();
        sink.create_symlink(Path::new("a/link"), "../b", false).unwrap();

        let mut open = DiskSink::new(dir.path().join("open"), PathSafety::Disabled).unwrap();
        open.create_symlink(Path::new("link"), "../outside", false)
            .unwrap();
        assert_eq!(
            fs::read_link(dir.path().join("open/link")).unwrap(),
            Path::new("../outside")
        );
    }
}

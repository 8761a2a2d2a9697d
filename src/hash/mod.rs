//! Hashing: per-item digests, run aggregates and checksum listings.
//!
//! A [`HashBundle`] computes several [`HashMethod`]s over each item and adds
//! the results into three aggregate sums (see [`HashGroup`]). Sums are
//! carrying byte-wise additions, so they do not depend on item order.
//! [`ChecksumFile`] and [`ChecksumWriter`] read and write the text listings
//! that `sha256sum`, `md5sum`, `cksum` and BSD tools produce.
//!
//! # Example
//!
//! ```rust,no_run
//! use archkit::hash::{hash_paths, HashGroup, HashMethod, HashOptions};
//!
//! let options = HashOptions::new().methods(vec![HashMethod::Sha256]);
//! let report = hash_paths(&["a.txt".into(), "b.txt".into()], &options)?;
//! for (method, sum) in report.sum(HashGroup::Data) {
//!     println!("{method}: {sum}");
//! }
//! # Ok::<(), archkit::Error>(())
//! ```

pub mod bundle;
pub mod checksum_file;
pub mod digest;
pub mod verify;

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use bundle::{HashBundle, HashGroup};
pub use checksum_file::{ChecksumEntry, ChecksumFile, ChecksumStyle, ChecksumWriter, LineEnding};
pub use digest::{Digest, HashState};
pub use verify::{VerifyReport, VerifyResult};

use crate::progress::ProgressReporter;
use crate::read::{OperationResult, Threads};
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashMethod {
    /// CRC-32 (IEEE).
    Crc32,
    /// CRC-64 (XZ).
    Crc64,
    /// MD5.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
    /// POSIX `cksum`.
    Cksum,
}

impl HashMethod {
    /// Every method.
    pub const ALL: [HashMethod; 7] = [
        HashMethod::Crc32,
        HashMethod::Crc64,
        HashMethod::Md5,
        HashMethod::Sha1,
        HashMethod::Sha256,
        HashMethod::Sha512,
        HashMethod::Cksum,
    ];

    /// Upper-case name, as used in BSD tags.
    pub fn name(&self) -> &'static str {
        match self {
            HashMethod::Crc32 => "CRC32",
            HashMethod::Crc64 => "CRC64",
            HashMethod::Md5 => "MD5",
            HashMethod::Sha1 => "SHA1",
            HashMethod::Sha256 => "SHA256",
            HashMethod::Sha512 => "SHA512",
            HashMethod::Cksum => "CKSUM",
        }
    }

    /// Digest size in bytes.
    pub fn digest_size(&self) -> usize {
        match self {
            HashMethod::Crc32 | HashMethod::Cksum => 4,
            HashMethod::Crc64 => 8,
            HashMethod::Md5 => 16,
            HashMethod::Sha1 => 20,
            HashMethod::Sha256 => 32,
            HashMethod::Sha512 => 64,
        }
    }

    /// Looks a method up by name, ignoring case and dashes (`sha-256`).
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|&c| c != '-' && c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self::ALL.into_iter().find(|m| m.name() == key)
    }

    /// The method whose hex digest has `len` digits. CRC-32 wins over cksum.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.digest_size() * 2 == len)
    }

    /// Conventional listing file extension (`sha256`, `md5`, ...).
    pub fn file_extension(&self) -> &'static str {
        match self {
            HashMethod::Crc32 => "crc32",
            HashMethod::Crc64 => "crc64",
            HashMethod::Md5 => "md5",
            HashMethod::Sha1 => "sha1",
            HashMethod::Sha256 => "sha256",
            HashMethod::Sha512 => "sha512",
            HashMethod::Cksum => "cksum",
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::unsupported_method(s))
    }
}

/// Options for hashing runs.
#[derive(Debug, Clone)]
pub struct HashOptions {
    /// Methods to compute.
    pub methods: Vec<HashMethod>,
    /// Report the name-folded aggregates besides the data sum.
    pub include_names: bool,
    /// Threads used to hash independent files.
    pub threads: Threads,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            methods: vec![HashMethod::Crc32],
            include_names: true,
            threads: Threads::Auto,
        }
    }
}

impl HashOptions {
    /// CRC-32 only, names included.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the methods.
    pub fn methods(mut self, methods: Vec<HashMethod>) -> Self {
        self.methods = methods;
        self
    }

    /// Includes or omits the name-folded aggregates.
    pub fn include_names(mut self, include: bool) -> Self {
        self.include_names = include;
        self
    }

    /// Sets the thread configuration.
    pub fn threads(mut self, threads: Threads) -> Self {
        self.threads = threads;
        self
    }
}

/// Outcome for one hashed item.
#[derive(Debug, Clone)]
pub struct HashedItem {
    /// Path with `/` separators.
    pub path: String,
    /// Bytes hashed.
    pub size: u64,
    /// Whether the item is a directory.
    pub is_dir: bool,
    /// Whether the item is an alternate stream.
    pub is_alt_stream: bool,
    /// Digests in method order; empty when the item failed.
    pub digests: Vec<(HashMethod, Digest)>,
    /// Outcome.
    pub result: OperationResult,
}

/// Result of a hashing run.
#[derive(Debug, Clone)]
pub struct HashReport {
    /// Items in processing order.
    pub items: Vec<HashedItem>,
    /// Counters and aggregates.
    pub bundle: HashBundle,
    /// Whether the aggregates fold in names.
    pub include_names: bool,
    /// Whether the run stopped early.
    pub cancelled: bool,
}

impl HashReport {
    pub(crate) fn new(options: &HashOptions) -> Self {
        Self {
            items: Vec::new(),
            bundle: HashBundle::new(&options.methods),
            include_names: options.include_names,
            cancelled: false,
        }
    }

    /// Aggregate of `group` per method.
    pub fn sum(&self, group: HashGroup) -> Vec<(HashMethod, &Digest)> {
        self.bundle.sum(group)
    }

    /// Groups worth reporting under the options used.
    pub fn groups(&self) -> &'static [HashGroup] {
        if self.include_names {
            &HashGroup::ALL
        } else {
            &HashGroup::ALL[..1]
        }
    }

    /// Number of items that failed.
    pub fn errors(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.result != OperationResult::Ok)
            .count()
    }

    /// Returns true if every item hashed and the run was not cancelled.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.errors() == 0
    }

    pub(crate) fn record_failure(&mut self, path: String, is_dir: bool, result: OperationResult) {
        self.items.push(HashedItem {
            path,
            size: 0,
            is_dir,
            is_alt_stream: false,
            digests: Vec::new(),
            result,
        });
    }

    pub(crate) fn record(
        &mut self,
        path: String,
        digests: Vec<Digest>,
        size: u64,
        is_dir: bool,
        is_alt_stream: bool,
    ) {
        let digests = self
            .bundle
            .add_item(digests, size, is_dir, is_alt_stream, &path);
        self.items.push(HashedItem {
            path,
            size,
            is_dir,
            is_alt_stream,
            digests,
            result: OperationResult::Ok,
        });
    }
}

/// Hashes a reader to the end with each method.
///
/// `on_chunk` sees the running byte count after every read and may return
/// `false` to stop with [`Error::Cancelled`].
pub fn hash_reader<R: Read + ?Sized>(
    reader: &mut R,
    methods: &[HashMethod],
    mut on_chunk: impl FnMut(u64) -> bool,
) -> Result<(Vec<Digest>, u64)> {
    let mut states: Vec<HashState> = methods.iter().map(|&m| HashState::new(m)).collect();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        for state in &mut states {
            state.update(&buf[..n]);
        }
        total += n as u64;
        if !on_chunk(total) {
            return Err(Error::Cancelled);
        }
    }
    Ok((states.iter().map(HashState::digest).collect(), total))
}

fn display_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn hash_file(path: &Path, methods: &[HashMethod]) -> Result<(Vec<Digest>, u64)> {
    let mut file = std::fs::File::open(path)?;
    hash_reader(&mut file, methods, |_| true)
}

/// Hashes files and directories on disk, in the given order.
///
/// Directories are counted and name-folded but not descended into. File
/// contents are hashed on the configured threads when the `parallel`
/// feature is enabled; aggregation always follows `paths` order.
///
/// # Errors
///
/// Only failure to build the thread pool is returned; unreadable files are
/// reported per item as [`OperationResult::DataError`].
pub fn hash_paths(paths: &[PathBuf], options: &HashOptions) -> Result<HashReport> {
    hash_paths_with(paths, options, &mut crate::progress::NoProgress)
}

/// [`hash_paths`] with progress reporting and cancellation.
pub fn hash_paths_with(
    paths: &[PathBuf],
    options: &HashOptions,
    progress: &mut dyn ProgressReporter,
) -> Result<HashReport> {
    let mut report = HashReport::new(options);
    let methods = report.bundle.methods();
    progress.on_total(paths.len() as u64, 0);
    let computed = compute_all(paths, &methods, options)?;

    let mut bytes_done = 0u64;
    for (done, (path, outcome)) in paths.iter().zip(computed).enumerate() {
        if progress.should_cancel() {
            report.cancelled = true;
            break;
        }
        let name = display_name(path);
        progress.on_item_start(&name, None);
        let result = match outcome {
            Ok(Computed::Dir) => {
                let zero = methods.iter().map(|m| Digest::zero(m.digest_size())).collect();
                report.record(name.clone(), zero, 0, true, false);
                OperationResult::Ok
            }
            Ok(Computed::File(digests, size)) => {
                bytes_done += size;
                report.record(name.clone(), digests, size, false, false);
                OperationResult::Ok
            }
            Err(e) => {
                progress.on_warning(&format!("{name}: {e}"));
                let result = OperationResult::from_error(&e);
                report.record_failure(name.clone(), false, result);
                result
            }
        };
        progress.on_item_complete(&name, result);
        if !progress.on_progress(done as u64 + 1, bytes_done) {
            report.cancelled = true;
            break;
        }
    }
    Ok(report)
}

enum Computed {
    Dir,
    File(Vec<Digest>, u64),
}

fn compute_one(path: &Path, methods: &[HashMethod]) -> Result<Computed> {
    if std::fs::metadata(path)?.is_dir() {
        return Ok(Computed::Dir);
    }
    let (digests, size) = hash_file(path, methods)?;
    Ok(Computed::File(digests, size))
}

#[cfg(feature = "parallel")]
fn compute_all(
    paths: &[PathBuf],
    methods: &[HashMethod],
    options: &HashOptions,
) -> Result<Vec<Result<Computed>>> {
    use rayon::prelude::*;

    if options.threads.count() <= 1 || paths.len() < 2 {
        return Ok(paths.iter().map(|p| compute_one(p, methods)).collect());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads.count())
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    Ok(pool.install(|| {
        paths
            .par_iter()
            .map(|p| compute_one(p, methods))
            .collect()
    }))
}

#[cfg(not(feature = "parallel"))]
fn compute_all(
    paths: &[PathBuf],
    methods: &[HashMethod],
    _options: &HashOptions,
) -> Result<Vec<Result<Computed>>> {
    Ok(paths.iter().map(|p| compute_one(p, methods)).collect())
}

//! Segment-based item paths.
//!
//! Parsers never store a joined path string: FAT and NTFS build paths from
//! parent links, NSIS from `\`-separated script strings and LZH from
//! `0xFF`-separated directory extensions. [`ItemPath`] keeps the segments and
//! joins them lazily with whatever separator the consumer needs.

use std::fmt;

/// Windows reserved device names that cannot be used as file names.
///
/// Reserved case-insensitively and also when followed by an extension
/// (`CON.txt`).
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Characters that cannot appear in a file name on common host filesystems.
const INVALID_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

fn is_windows_reserved(name: &str) -> bool {
    let base = match name.find('.') {
        Some(pos) => &name[..pos],
        None => name,
    };
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| base.eq_ignore_ascii_case(reserved))
}

/// The path of an item inside an archive, as a sequence of segments.
///
/// Segments are stored exactly as decoded from the archive. They may contain
/// characters that are invalid on the host or be `..`; use
/// [`sanitize_segment`] before mapping them onto a filesystem.
///
/// # Examples
///
/// ```
/// use archkit::ItemPath;
///
/// let path = ItemPath::from_slash_str("dir/sub/file.txt");
/// assert_eq!(path.depth(), 3);
/// assert_eq!(path.file_name(), "file.txt");
/// assert_eq!(path.join_with('\\'), "dir\\sub\\file.txt");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemPath {
    segments: Vec<String>,
}

impl ItemPath {
    /// Creates a path from segments, dropping empty ones.
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// Splits a `/`-separated string into segments.
    pub fn from_slash_str(s: &str) -> Self {
        Self::new(s.split('/'))
    }

    /// Splits on both `/` and `\`.
    pub fn from_any_separator(s: &str) -> Self {
        Self::new(s.split(['/', '\\']))
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Appends a segment (ignored when empty).
    pub fn push(&mut self, segment: impl Into<String>) {
        let segment = segment.into();
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Joins the segments with `sep`.
    pub fn join_with(&self, sep: char) -> String {
        let mut out = String::new();
        for (i, s) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push(sep);
            }
            out.push_str(s);
        }
        out
    }

    /// Joins the segments with `/`.
    pub fn to_slash_string(&self) -> String {
        self.join_with('/')
    }

    /// Returns the last segment or an empty string.
    pub fn file_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Returns the extension of the last segment, if any.
    ///
    /// A leading dot (`.profile`) does not start an extension.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(pos) => Some(&name[pos + 1..]),
        }
    }

    /// Returns the path without its last segment.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Component-wise prefix test.
    pub fn starts_with(&self, prefix: &[String]) -> bool {
        prefix.len() <= self.segments.len()
            && self.segments.iter().zip(prefix).all(|(a, b)| a == b)
    }

    /// Removes `prefix` from the front, if present.
    pub fn strip_prefix(&self, prefix: &[String]) -> Option<Self> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self {
            segments: self.segments[prefix.len()..].to_vec(),
        })
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_slash_string())
    }
}

impl From<&str> for ItemPath {
    fn from(s: &str) -> Self {
        Self::from_slash_str(s)
    }
}

/// Makes one path segment safe to use as a host file name.
///
/// Invalid characters become `_`, `.`/`..` become `_`/`__`, trailing dots and
/// spaces are replaced, and Windows device names get a leading `_`.
pub fn sanitize_segment(segment: &str) -> String {
    if segment == "." {
        return "_".to_string();
    }
    if segment == ".." {
        return "__".to_string();
    }
    let mut out: String = segment
        .chars()
        .map(|c| {
            if INVALID_NAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let kept = out.trim_end_matches(['.', ' ']).len();
    if kept < out.len() {
        let replaced = out.len() - kept;
        out.truncate(kept);
        out.extend(std::iter::repeat_n('_', replaced));
    }
    if is_windows_reserved(&out) {
        out.insert(0, '_');
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

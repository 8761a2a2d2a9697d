//! Checksum listings: `sha256sum`-style, BSD-tagged and `cksum` lines.
//!
//! | Style | Line |
//! |-------|------|
//! | GNU | `hex  name` (text) or `hex *name` (binary) |
//! | BSD | `SHA256 (name) = hex` |
//! | cksum | `crc size name`, decimal |
//!
//! Names containing `\`, LF or CR are escaped (`\\`, `\n`, `\r`) and the
//! line then starts with a single `\`. The line terminator (LF, CRLF or
//! NUL) is taken from the first terminator in the input and kept for the
//! whole listing. A line with an empty name carries an aggregate sum.

use std::io::{self, Write};

use super::digest::Digest;
use super::HashMethod;
use crate::{Error, Result};

/// Line terminator of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// `\n`.
    #[default]
    Lf,
    /// `\r\n`.
    CrLf,
    /// `\0` (`--zero` listings).
    Nul,
}

impl LineEnding {
    /// Detects the terminator from its first occurrence.
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes.iter().position(|&b| b == b'\n' || b == 0) {
            Some(i) if bytes[i] == 0 => LineEnding::Nul,
            Some(i) if i > 0 && bytes[i - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
            LineEnding::Nul => b"\0",
        }
    }
}

/// Line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumStyle {
    /// `hex  name`.
    #[default]
    Gnu,
    /// `METHOD (name) = hex`.
    Bsd,
    /// `crc size name`.
    Cksum,
}

/// One line of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// File name, unescaped. Empty for aggregate lines.
    pub name: String,
    /// Hash method.
    pub method: HashMethod,
    /// Declared digest, with its extra area for aggregate lines.
    pub digest: Digest,
    /// Declared size (cksum form).
    pub size: Option<u64>,
    /// `*` binary marker present.
    pub binary: bool,
    /// Style the line was written in.
    pub style: ChecksumStyle,
    /// 1-based line number.
    pub line: usize,
}

/// A parsed listing.
#[derive(Debug, Clone, Default)]
pub struct ChecksumFile {
    /// Per-file entries in listing order.
    pub entries: Vec<ChecksumEntry>,
    /// Aggregate lines (empty name).
    pub aggregates: Vec<ChecksumEntry>,
    /// Terminator used by the listing.
    pub line_ending: LineEnding,
}

/// Escapes a name; the flag tells whether the line needs the `\` prefix.
pub fn escape_name(name: &str) -> (String, bool) {
    if !name.contains(['\\', '\n', '\r']) {
        return (name.to_string(), false);
    }
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    (out, true)
}

/// Inverse of [`escape_name`]; `None` for a dangling or unknown escape.
pub fn unescape_name(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

fn bad_line(line: usize, reason: impl Into<String>) -> Error {
    Error::InvalidChecksumLine {
        line,
        reason: reason.into(),
    }
}

fn parse_bsd(body: &str, line: usize) -> Option<Result<(HashMethod, &str, &str)>> {
    let open = body.find(" (")?;
    let tag = &body[..open];
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    let close = body.rfind(") = ")?;
    if close < open + 2 {
        return None;
    }
    let method = match HashMethod::from_name(tag) {
        Some(m) => m,
        None => return Some(Err(bad_line(line, format!("unknown method {tag}")))),
    };
    Some(Ok((method, &body[open + 2..close], &body[close + 4..])))
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn method_for_hex(hex: &str, hint: Option<HashMethod>, line: usize) -> Result<HashMethod> {
    let base = hex.split_once('-').map_or(hex, |(b, _)| b);
    match hint {
        Some(m) if m.digest_size() * 2 == base.len() => Ok(m),
        Some(m) => Err(bad_line(
            line,
            format!("digest length {} does not fit {}", base.len(), m),
        )),
        None => HashMethod::from_hex_len(base.len())
            .ok_or_else(|| bad_line(line, format!("no method has {}-digit digests", base.len()))),
    }
}

/// Parses one line (terminator removed).
pub fn parse_line(text: &str, hint: Option<HashMethod>, line: usize) -> Result<ChecksumEntry> {
    let (escaped, body) = match text.strip_prefix('\\') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let finish = |name: &str| -> Result<String> {
        if escaped {
            unescape_name(name).ok_or_else(|| bad_line(line, "invalid escape in name"))
        } else {
            Ok(name.to_string())
        }
    };

    if let Some(bsd) = parse_bsd(body, line) {
        let (method, name, hex) = bsd?;
        let digest = Digest::parse_hex(hex, method.digest_size())
            .ok_or_else(|| bad_line(line, "malformed digest"))?;
        return Ok(ChecksumEntry {
            name: finish(name)?,
            method,
            digest,
            size: None,
            binary: false,
            style: ChecksumStyle::Bsd,
            line,
        });
    }

    let (first, rest) = body
        .split_once(' ')
        .ok_or_else(|| bad_line(line, "missing separator"))?;

    let cksum_form = hint == Some(HashMethod::Cksum)
        || (hint.is_none()
            && is_decimal(first)
            && rest.split_once(' ').is_some_and(|(size, _)| is_decimal(size)));
    if cksum_form {
        let (size, name) = rest
            .split_once(' ')
            .ok_or_else(|| bad_line(line, "missing size"))?;
        let crc: u32 = first.parse().map_err(|_| bad_line(line, "malformed crc"))?;
        let size: u64 = size.parse().map_err(|_| bad_line(line, "malformed size"))?;
        return Ok(ChecksumEntry {
            name: finish(name)?,
            method: HashMethod::Cksum,
            digest: Digest::from_bytes(crc.to_le_bytes().to_vec()),
            size: Some(size),
            binary: false,
            style: ChecksumStyle::Cksum,
            line,
        });
    }

    let (binary, name) = if let Some(n) = rest.strip_prefix('*') {
        (true, n)
    } else if let Some(n) = rest.strip_prefix(' ') {
        (false, n)
    } else {
        (false, rest)
    };
    let method = method_for_hex(first, hint, line)?;
    let digest = Digest::parse_hex(first, method.digest_size())
        .ok_or_else(|| bad_line(line, "malformed digest"))?;
    Ok(ChecksumEntry {
        name: finish(name)?,
        method,
        digest,
        size: None,
        binary,
        style: ChecksumStyle::Gnu,
        line,
    })
}

/// Splits `bytes` into `(line number, text, terminated)` triples.
fn split_lines(bytes: &[u8], ending: LineEnding) -> Vec<(usize, &[u8], bool)> {
    let sep = if ending == LineEnding::Nul { 0 } else { b'\n' };
    let mut out = Vec::new();
    let mut start = 0;
    let mut number = 0;
    while start < bytes.len() {
        number += 1;
        let (end, next, terminated) = match bytes[start..].iter().position(|&b| b == sep) {
            Some(i) => (start + i, start + i + 1, true),
            None => (bytes.len(), bytes.len(), false),
        };
        let mut line = &bytes[start..end];
        if ending == LineEnding::CrLf {
            line = line.strip_suffix(b"\r").unwrap_or(line);
        }
        out.push((number, line, terminated));
        start = next;
    }
    out
}

impl ChecksumFile {
    /// Parses a whole listing; the first bad line fails the parse.
    pub fn parse(bytes: &[u8], method_hint: Option<HashMethod>) -> Result<Self> {
        let (file, error) = Self::parse_partial(bytes, method_hint);
        match error {
            Some(e) => Err(e),
            None => Ok(file),
        }
    }

    /// Parses up to the first bad line, returning what was read and the error.
    pub fn parse_partial(bytes: &[u8], method_hint: Option<HashMethod>) -> (Self, Option<Error>) {
        let mut file = ChecksumFile {
            line_ending: LineEnding::detect(bytes),
            ..Self::default()
        };
        for (number, raw, _) in split_lines(bytes, file.line_ending) {
            if raw.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let text = match std::str::from_utf8(raw) {
                Ok(t) => t,
                Err(_) => return (file, Some(bad_line(number, "not valid UTF-8"))),
            };
            match parse_line(text, method_hint, number) {
                Ok(entry) if entry.name.is_empty() => file.aggregates.push(entry),
                Ok(entry) => file.entries.push(entry),
                Err(e) => return (file, Some(e)),
            }
        }
        (file, None)
    }

    /// Returns true if `prefix` holds at least one complete line and every
    /// complete line parses.
    pub fn looks_like(prefix: &[u8]) -> bool {
        let ending = LineEnding::detect(prefix);
        let mut complete = 0;
        for (number, raw, terminated) in split_lines(prefix, ending) {
            if !terminated {
                break;
            }
            if raw.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let ok = std::str::from_utf8(raw)
                .ok()
                .is_some_and(|t| parse_line(t, None, number).is_ok());
            if !ok {
                return false;
            }
            complete += 1;
        }
        complete > 0
    }
}

/// Writes listings whose lines [`ChecksumFile::parse`] reads back unchanged.
///
/// ```rust
/// use archkit::hash::{ChecksumFile, ChecksumWriter, Digest, HashMethod};
///
/// let mut out = Vec::new();
/// let mut writer = ChecksumWriter::new(&mut out, HashMethod::Md5);
/// let digest = Digest::parse_hex("d41d8cd98f00b204e9800998ecf8427e", 16).unwrap();
/// writer.write_entry("line\nbreak.txt", &digest, Some(0)).unwrap();
/// let parsed = ChecksumFile::parse(&out, None).unwrap();
/// assert_eq!(parsed.entries[0].name, "line\nbreak.txt");
/// ```
#[derive(Debug)]
pub struct ChecksumWriter<W: Write> {
    out: W,
    method: HashMethod,
    style: ChecksumStyle,
    line_ending: LineEnding,
    binary: bool,
}

impl<W: Write> ChecksumWriter<W> {
    /// A GNU-style, LF-terminated writer.
    pub fn new(out: W, method: HashMethod) -> Self {
        let style = if method == HashMethod::Cksum {
            ChecksumStyle::Cksum
        } else {
            ChecksumStyle::Gnu
        };
        Self {
            out,
            method,
            style,
            line_ending: LineEnding::Lf,
            binary: false,
        }
    }

    /// Sets the line style.
    pub fn style(mut self, style: ChecksumStyle) -> Self {
        self.style = style;
        self
    }

    /// Sets the terminator.
    pub fn line_ending(mut self, ending: LineEnding) -> Self {
        self.line_ending = ending;
        self
    }

    /// Marks GNU lines as binary (`*name`).
    pub fn binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    /// Writes one file line.
    pub fn write_entry(&mut self, name: &str, digest: &Digest, size: Option<u64>) -> io::Result<()> {
        let (name, escaped) = escape_name(name);
        let prefix = if escaped { "\\" } else { "" };
        let line = match self.style {
            ChecksumStyle::Gnu => {
                let marker = if self.binary { '*' } else { ' ' };
                format!("{prefix}{} {marker}{name}", digest.to_hex_with_extra())
            }
            ChecksumStyle::Bsd => format!(
                "{prefix}{} ({name}) = {}",
                self.method.name(),
                digest.to_hex_with_extra()
            ),
            ChecksumStyle::Cksum => {
                let mut value = [0u8; 4];
                let bytes = digest.as_bytes();
                let n = bytes.len().min(4);
                value[..n].copy_from_slice(&bytes[..n]);
                format!(
                    "{prefix}{} {} {name}",
                    u32::from_le_bytes(value),
                    size.unwrap_or(0)
                )
            }
        };
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(self.line_ending.as_bytes())
    }

    /// Writes an aggregate line (empty name). Not available in cksum style.
    pub fn write_aggregate(&mut self, digest: &Digest) -> io::Result<()> {
        if self.style == ChecksumStyle::Cksum {
            return Ok(());
        }
        self.write_entry("", digest, None)
    }

    /// Flushes and returns the sink.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gnu_line() {
        let file = ChecksumFile::parse(b"d41d8cd98f00b204e9800998ecf8427e  empty.txt\n", None).unwrap();
        assert_eq!(file.entries.len(), 1);
        let e = &file.entries[0];
        assert_eq!(e.name, "empty.txt");
        assert_eq!(e.method, HashMethod::Md5);
        assert!(!e.binary);
        assert_eq!(e.digest.to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_bsd_and_binary_forms() {
        let text = b"SHA1 (a (1).txt) = da39a3ee5e6b4b0d3255bfef95601890afd80709\r\n\
da39a3ee5e6b4b0d3255bfef95601890afd80709 *b.bin\r\n";
        let file = ChecksumFile::parse(text, None).unwrap();
        assert_eq!(file.line_ending, LineEnding::CrLf);
        assert_eq!(file.entries[0].name, "a (1).txt");
        assert_eq!(file.entries[0].style, ChecksumStyle::Bsd);
        assert_eq!(file.entries[1].name, "b.bin");
        assert!(file.entries[1].binary);
    }

    #[test]
    fn test_cksum_form() {
        let file = ChecksumFile::parse(b"4294967295 0 empty\n", None).unwrap();
        let e = &file.entries[0];
        assert_eq!(e.method, HashMethod::Cksum);
        assert_eq!(e.size, Some(0));
        assert_eq!(e.digest.as_bytes(), &[0xFF; 4]);
    }

    #[test]
    fn test_nul_terminated() {
        let file = ChecksumFile::parse(b"CBF43926  a b\0CBF43926  c\0", None).unwrap();
        assert_eq!(file.line_ending, LineEnding::Nul);
        assert_eq!(file.entries.len(), 2);
        assert_eq!(file.entries[0].name, "a b");
        assert_eq!(file.entries[0].method, HashMethod::Crc32);
    }

    #[test]
    fn test_escaped_round_trip() {
        for style in [ChecksumStyle::Gnu, ChecksumStyle::Bsd] {
            let mut out = Vec::new();
            let mut w = ChecksumWriter::new(&mut out, HashMethod::Crc32).style(style);
            let digest = Digest::from_bytes(vec![0x26, 0x39, 0xF4, 0xCB]);
            w.write_entry("dir\\x\ny\r", &digest, None).unwrap();
            let file = ChecksumFile::parse(&out, None).unwrap();
            assert_eq!(file.entries[0].name, "dir\\x\ny\r");
            assert_eq!(file.entries[0].digest.as_bytes(), digest.as_bytes());
            assert!(out.starts_with(b"\\"));
        }
    }

    #[test]
    fn test_partial_parse_stops_at_bad_line() {
        let (file, err) =
            ChecksumFile::parse_partial(b"CBF43926  a\nnot a checksum\nCBF43926  b\n", None);
        assert_eq!(file.entries.len(), 1);
        assert!(matches!(err, Some(Error::InvalidChecksumLine { line: 2, .. })));
    }

    #[test]
    fn test_aggregate_lines() {
        let mut sum = Digest::zero(4);
        sum.add(&[0xFF; 4]);
        sum.add(&[0xFF; 4]);
        let mut out = Vec::new();
        let mut w = ChecksumWriter::new(&mut out, HashMethod::Crc32);
        w.write_aggregate(&sum).unwrap();
        let file = ChecksumFile::parse(&out, None).unwrap();
        assert!(file.entries.is_empty());
        assert_eq!(file.aggregates[0].digest.extra(), sum.extra());
    }

    #[test]
    fn test_looks_like() {
        assert!(ChecksumFile::looks_like(b"CBF43926  a\nCBF4"));
        assert!(!ChecksumFile::looks_like(b"CBF43926  a"));
        assert!(!ChecksumFile::looks_like(b"hello world\n"));
        assert!(!ChecksumFile::looks_like(b"\x00\x01\x02"));
    }

    #[test]
    fn test_unescape_rejects_unknown() {
        assert_eq!(unescape_name("a\\tb"), None);
        assert_eq!(unescape_name("a\\"), None);
    }
}

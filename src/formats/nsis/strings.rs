//! The installer string table.
//!
//! Strings are NUL-terminated, either single-byte or UTF-16LE. Embedded
//! control codes reference variables, shell folders and language strings;
//! they are rendered as `$NAME` so that paths read the way the script wrote
//! them.

use crate::{Error, Result};

/// Character width of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One byte per character (rendered as Latin-1).
    Ansi,
    /// UTF-16LE.
    Utf16,
}

/// Which numbering the embedded control codes use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSet {
    /// NSIS 2: codes `0xFC..=0xFF`.
    Nsis2,
    /// NSIS 3: codes `1..=4`.
    Nsis3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Code {
    Skip,
    Var,
    Shell,
    Lang,
}

impl CodeSet {
    fn classify(self, c: u16) -> Option<Code> {
        match (self, c) {
            (CodeSet::Nsis3, 1) | (CodeSet::Nsis2, 0xFF) => Some(Code::Lang),
            (CodeSet::Nsis3, 2) | (CodeSet::Nsis2, 0xFE) => Some(Code::Shell),
            (CodeSet::Nsis3, 3) | (CodeSet::Nsis2, 0xFD) => Some(Code::Var),
            (CodeSet::Nsis3, 4) | (CodeSet::Nsis2, 0xFC) => Some(Code::Skip),
            _ => None,
        }
    }
}

const SHELL_FOLDERS: &[(u8, &str)] = &[
    (0x00, "DESKTOP"),
    (0x02, "SMPROGRAMS"),
    (0x05, "DOCUMENTS"),
    (0x06, "FAVORITES"),
    (0x07, "SMSTARTUP"),
    (0x08, "RECENT"),
    (0x09, "SENDTO"),
    (0x0B, "STARTMENU"),
    (0x0D, "MUSIC"),
    (0x0E, "VIDEOS"),
    (0x10, "DESKTOP"),
    (0x13, "NETHOOD"),
    (0x14, "FONTS"),
    (0x15, "TEMPLATES"),
    (0x16, "STARTMENU"),
    (0x17, "SMPROGRAMS"),
    (0x18, "SMSTARTUP"),
    (0x19, "DESKTOP"),
    (0x1A, "APPDATA"),
    (0x1B, "PRINTHOOD"),
    (0x1C, "LOCALAPPDATA"),
    (0x20, "INTERNET_CACHE"),
    (0x21, "COOKIES"),
    (0x22, "HISTORY"),
    (0x23, "APPDATA"),
    (0x24, "WINDIR"),
    (0x25, "SYSDIR"),
    (0x26, "PROGRAMFILES"),
    (0x27, "PICTURES"),
    (0x28, "PROFILE"),
    (0x2B, "COMMONFILES"),
    (0x2D, "TEMPLATES"),
    (0x2E, "DOCUMENTS"),
    (0x2F, "ADMINTOOLS"),
    (0x30, "ADMINTOOLS"),
    (0x35, "MUSIC"),
    (0x36, "PICTURES"),
    (0x37, "VIDEOS"),
    (0x38, "RESOURCES"),
    (0x39, "RESOURCES_LOCALIZED"),
    (0x3B, "CDBURN_AREA"),
];

/// Name of built-in variable `index` with its `$`.
pub fn variable_name(index: u32) -> String {
    let fixed = match index {
        0..=9 => return format!("${index}"),
        10..=19 => return format!("$R{}", index - 10),
        20 => "CMDLINE",
        21 => "INSTDIR",
        22 => "OUTDIR",
        23 => "EXEDIR",
        24 => "LANGUAGE",
        25 => "TEMP",
        26 => "PLUGINSDIR",
        27 => "EXEPATH",
        28 => "EXEFILE",
        29 => "HWNDPARENT",
        30 => "_CLICK",
        31 => "_OUTDIR",
        _ => return format!("$_{index}_"),
    };
    format!("${fixed}")
}

fn decode_number(c0: u8, c1: u8) -> u32 {
    (c0 & 0x7F) as u32 | ((c1 & 0x7F) as u32) << 7
}

/// A view over the string table bytes.
#[derive(Debug, Clone, Copy)]
pub struct StringTable<'a> {
    data: &'a [u8],
    encoding: Encoding,
    codes: CodeSet,
}

impl<'a> StringTable<'a> {
    /// Detects encoding and code set.
    ///
    /// The table always starts with the empty string, so UTF-16 tables begin
    /// with two zero bytes. Single-byte tables use the NSIS 3 codes when any
    /// byte in `1..=4` occurs.
    pub fn new(data: &'a [u8]) -> Self {
        let encoding = if data.len() >= 2 && data[0] == 0 && data[1] == 0 {
            Encoding::Utf16
        } else {
            Encoding::Ansi
        };
        let codes = match encoding {
            Encoding::Utf16 => CodeSet::Nsis3,
            Encoding::Ansi if data.iter().any(|b| (1..=4).contains(b)) => CodeSet::Nsis3,
            Encoding::Ansi => CodeSet::Nsis2,
        };
        Self::with_codes(data, encoding, codes)
    }

    /// A table with explicit encoding and codes.
    pub fn with_codes(data: &'a [u8], encoding: Encoding, codes: CodeSet) -> Self {
        Self {
            data,
            encoding,
            codes,
        }
    }

    /// Character width.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Control code numbering.
    pub fn code_set(&self) -> CodeSet {
        self.codes
    }

    fn unit_size(&self) -> usize {
        match self.encoding {
            Encoding::Ansi => 1,
            Encoding::Utf16 => 2,
        }
    }

    fn unit(&self, pos: usize) -> Option<u16> {
        match self.encoding {
            Encoding::Ansi => self.data.get(pos).map(|&b| b as u16),
            Encoding::Utf16 => {
                let b = self.data.get(pos..pos + 2)?;
                Some(u16::from_le_bytes([b[0], b[1]]))
            }
        }
    }

    /// Two code-argument bytes following a control code.
    fn argument(&self, pos: &mut usize) -> Result<(u8, u8)> {
        let pair = match self.encoding {
            Encoding::Ansi => {
                let b = self.data.get(*pos..*pos + 2).ok_or_else(|| truncated(*pos))?;
                (b[0], b[1])
            }
            Encoding::Utf16 => {
                let u = self.unit(*pos).ok_or_else(|| truncated(*pos))?;
                (u as u8, (u >> 8) as u8)
            }
        };
        *pos += 2;
        Ok(pair)
    }

    /// Characters without code interpretation, used for registry value names.
    fn plain(&self, offset: u32) -> Option<String> {
        let size = self.unit_size();
        let mut pos = offset as usize * size;
        let mut units = Vec::new();
        loop {
            let u = self.unit(pos)?;
            if u == 0 {
                break;
            }
            units.push(u);
            pos += size;
        }
        Some(units_to_string(self.encoding, &units))
    }

    fn shell_name(&self, c0: u8, c1: u8) -> String {
        if c0 & 0x80 != 0 {
            return match self.plain((c0 & 0x3F) as u32).as_deref() {
                Some("ProgramFilesDir") => "$PROGRAMFILES".to_string(),
                Some("CommonFilesDir") => "$COMMONFILES".to_string(),
                _ => format!("$SHELL[{c0:#04x}]"),
            };
        }
        [c0, c1]
            .into_iter()
            .find_map(|c| SHELL_FOLDERS.iter().find(|(id, _)| *id == c))
            .map(|(_, name)| format!("${name}"))
            .unwrap_or_else(|| format!("$SHELL[{c0:#04x}]"))
    }

    /// Renders the string at `offset` (in characters).
    ///
    /// Negative offsets are language string references.
    pub fn get(&self, offset: u32) -> Result<String> {
        if (offset as i32) < 0 {
            return Ok(format!("$(LSTR_{})", -(offset as i32 as i64)));
        }
        let size = self.unit_size();
        let mut pos = (offset as usize)
            .checked_mul(size)
            .filter(|&p| p < self.data.len())
            .ok_or_else(|| {
                Error::corrupt_header(offset as u64, "string offset outside the table")
            })?;
        let mut out = String::new();
        let mut literal = Vec::new();
        loop {
            let u = self.unit(pos).ok_or_else(|| truncated(pos))?;
            pos += size;
            if u == 0 {
                break;
            }
            match self.codes.classify(u) {
                None => literal.push(u),
                Some(Code::Skip) => {
                    let next = self.unit(pos).ok_or_else(|| truncated(pos))?;
                    pos += size;
                    literal.push(next);
                }
                Some(code) => {
                    let (c0, c1) = self.argument(&mut pos)?;
                    out.push_str(&units_to_string(self.encoding, &literal));
                    literal.clear();
                    match code {
                        Code::Var => out.push_str(&variable_name(decode_number(c0, c1))),
                        Code::Lang => {
                            out.push_str(&format!("$(LSTR_{})", decode_number(c0, c1)))
                        }
                        _ => out.push_str(&self.shell_name(c0, c1)),
                    }
                }
            }
        }
        out.push_str(&units_to_string(self.encoding, &literal));
        Ok(out)
    }
}

fn truncated(pos: usize) -> Error {
    Error::corrupt_header(pos as u64, "unterminated string")
}

fn units_to_string(encoding: Encoding, units: &[u16]) -> String {
    match encoding {
        Encoding::Ansi => units.iter().map(|&u| char::from(u as u8)).collect(),
        Encoding::Utf16 => String::from_utf16_lossy(units),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_ansi_nsis3_variable() {
        // "" then "\x03<INSTDIR>\\app.exe"
        let mut data = vec![0u8];
        data.extend_from_slice(&[3, 21 | 0x80, 0x80]);
        data.extend_from_slice(b"\\app.exe\0");
        let table = StringTable::new(&data);
        assert_eq!(table.code_set(), CodeSet::Nsis3);
        assert_eq!(table.get(1).unwrap(), "$INSTDIR\\app.exe");
        assert_eq!(table.get(0).unwrap(), "");
    }

    #[test]
    fn test_ansi_nsis2_codes() {
        let mut data = vec![0u8];
        data.extend_from_slice(&[0xFD, 0x80 | 22, 0x80]);
        data.extend_from_slice(b"\\x\0");
        data.extend_from_slice(&[0xFE, 0x1A, 0x1A]);
        data.extend_from_slice(b"\\cfg\0");
        data.extend_from_slice(&[0xFC, 0xFD]);
        data.extend_from_slice(b"\0");
        let table = StringTable::new(&data);
        assert_eq!(table.code_set(), CodeSet::Nsis2);
        assert_eq!(table.get(1).unwrap(), "$OUTDIR\\x");
        assert_eq!(table.get(7).unwrap(), "$APPDATA\\cfg");
        assert_eq!(table.get(15).unwrap(), "\u{fd}");
    }

    #[test]
    fn test_utf16_table() {
        let mut data = vec![0u8, 0];
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&(0x8080u16 | 21).to_le_bytes());
        data.extend_from_slice(&utf16("\\dir\\é.txt\0"));
        let table = StringTable::new(&data);
        assert_eq!(table.encoding(), Encoding::Utf16);
        assert_eq!(table.get(1).unwrap(), "$INSTDIR\\dir\\é.txt");
    }

    #[test]
    fn test_language_reference_and_bounds() {
        let table = StringTable::new(b"\0abc");
        assert_eq!(table.get(-3i32 as u32).unwrap(), "$(LSTR_3)");
        assert!(table.get(1).is_err());
        assert!(table.get(100).is_err());
    }

    #[test]
    fn test_variable_names() {
        assert_eq!(variable_name(0), "$0");
        assert_eq!(variable_name(15), "$R5");
        assert_eq!(variable_name(25), "$TEMP");
        assert_eq!(variable_name(99), "$_99_");
    }
}

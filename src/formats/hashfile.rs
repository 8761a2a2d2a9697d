//! Checksum listings opened as archives.
//!
//! Each listed name becomes an item carrying its declared digest. The data
//! of an item is the file of that name next to the listing, so testing the
//! archive verifies the listed files.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::archive_path::ItemPath;
use crate::format::detect::{FormatHandler, OpenContext, Opened, Probe};
use crate::format::locator::{DataLocator, ReadSeek, StreamSource};
use crate::format::reader::read_region;
use crate::format::{ArchiveInfo, FormatKind};
use crate::hash::{ChecksumFile, HashMethod};
use crate::item::{Item, ItemChecksum};
use crate::{Error, Result};

/// Method implied by a listing's file name (`x.sha256`, `SHA256SUMS`).
pub fn method_from_name(name: &str) -> Option<HashMethod> {
    let file = Path::new(name).file_name()?.to_str()?;
    if let Some((_, ext)) = file.rsplit_once('.') {
        let ext = ext.to_ascii_lowercase();
        if let Some(m) = HashMethod::ALL.into_iter().find(|m| m.file_extension() == ext) {
            return Some(m);
        }
    }
    let upper = file.to_ascii_uppercase();
    upper
        .strip_suffix("SUMS")
        .or_else(|| upper.strip_suffix("SUM"))
        .and_then(HashMethod::from_name)
}

struct ListedFiles {
    base_dir: Option<PathBuf>,
    names: Vec<String>,
}

impl StreamSource for ListedFiles {
    fn open_stream<'a>(
        &'a mut self,
        index: usize,
        item: &'a Item,
        _source: &'a mut dyn ReadSeek,
    ) -> Result<Box<dyn Read + 'a>> {
        let DataLocator::Position(pos) = item.locator else {
            return Err(Error::data_error(index, "listing entry has no file"));
        };
        let name = self
            .names
            .get(pos as usize)
            .ok_or_else(|| Error::data_error(index, "listing entry out of range"))?;
        let Some(base) = &self.base_dir else {
            return Err(Error::data_error(index, "listing location unknown"));
        };
        let file = std::fs::File::open(base.join(name))
            .map_err(|e| Error::data_error(index, format!("{name}: {e}")))?;
        Ok(Box::new(file))
    }
}

/// Checksum listing handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashFileHandler;

impl FormatHandler for HashFileHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::HashFile
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["sha256", "sha512", "sha1", "md5", "crc32", "crc64", "cksum", "sfv", "hash"]
    }

    fn probe(&self, prefix: &[u8]) -> Probe {
        if ChecksumFile::looks_like(prefix) {
            Probe::Yes
        } else if !prefix.iter().any(|&b| b == b'\n' || b == 0) {
            Probe::NeedMore
        } else {
            Probe::No
        }
    }

    fn open(&self, reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened> {
        let text = read_region(reader, 0, ctx.source_len, &ctx.options.limits)?;
        let hint = ctx.name_hint.and_then(method_from_name);
        let (listing, error) = ChecksumFile::parse_partial(&text, hint);
        if listing.entries.is_empty() && listing.aggregates.is_empty() {
            return Err(match error {
                Some(e) => Error::not_an_archive(e.to_string()),
                None => Error::not_an_archive("empty checksum listing"),
            });
        }
        ctx.options.limits.check_items(listing.entries.len())?;

        let mut info = ArchiveInfo::new(FormatKind::HashFile);
        info.physical_size = ctx.source_len;
        if let Some(e) = error {
            info.flags.headers_error = true;
            info.warn(e.to_string());
        }
        if !listing.aggregates.is_empty() {
            let sums: Vec<String> = listing
                .aggregates
                .iter()
                .map(|a| format!("{} sum: {}", a.method, a.digest))
                .collect();
            info.comment = Some(sums.join("\n"));
        }
        info.method = listing.entries.first().map(|e| e.method.name().to_string());

        let mut names = Vec::with_capacity(listing.entries.len());
        let mut items = Vec::with_capacity(listing.entries.len());
        for (i, entry) in listing.entries.into_iter().enumerate() {
            let mut item = Item::file(
                ItemPath::from_any_separator(&entry.name),
                entry.size.unwrap_or(0),
                DataLocator::Position(i as u64),
            );
            item.size = entry.size;
            item.method = Some(entry.method.name().to_string());
            item.checksum = Some(ItemChecksum::Digest {
                method: entry.method,
                bytes: entry.digest.as_bytes().to_vec(),
            });
            names.push(entry.name);
            items.push(item);
        }
        info.item_count = items.len();

        let base_dir = ctx
            .name_hint
            .map(|n| Path::new(n).parent().map(Path::to_path_buf).unwrap_or_default());
        Ok(Opened {
            items,
            info,
            source: Box::new(ListedFiles { base_dir, names }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecoderRegistry;
    use crate::read::OpenOptions;
    use std::io::Cursor;
    use std::sync::Arc;

    fn open(text: &[u8], name: Option<&str>) -> Result<Opened> {
        let decoders = Arc::new(DecoderRegistry::default());
        let options = OpenOptions::default();
        let ctx = OpenContext {
            options: &options,
            decoders: &decoders,
            name_hint: name,
            source_len: text.len() as u64,
        };
        HashFileHandler.open(&mut Cursor::new(text.to_vec()), &ctx)
    }

    #[test]
    fn test_method_from_name() {
        assert_eq!(method_from_name("dir/x.SHA256"), Some(HashMethod::Sha256));
        assert_eq!(method_from_name("MD5SUMS"), Some(HashMethod::Md5));
        assert_eq!(method_from_name("notes.txt"), None);
    }

    #[test]
    fn test_items_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.txt"), b"").unwrap();
        let listing = dir.path().join("list.md5");
        let text = b"d41d8cd98f00b204e9800998ecf8427e  empty.txt\n";
        let name = listing.to_string_lossy().into_owned();
        let mut opened = open(text, Some(&name)).unwrap();
        assert_eq!(opened.items.len(), 1);
        let item = opened.items[0].clone();
        assert_eq!(item.name(), "empty.txt");
        assert!(matches!(
            item.checksum,
            Some(ItemChecksum::Digest { method: HashMethod::Md5, .. })
        ));
        let mut src = Cursor::new(Vec::new());
        let mut r = opened.source.open_stream(0, &item, &mut src).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_partial_listing_flags_error() {
        let opened = open(b"CBF43926  a\ngarbage line\n", None).unwrap();
        assert_eq!(opened.items.len(), 1);
        assert!(opened.info.flags.headers_error);
        assert!(open(b"garbage line\n", None).is_err());
    }

    #[test]
    fn test_probe() {
        assert_eq!(HashFileHandler.probe(b"CBF43926  a\n"), Probe::Yes);
        assert_eq!(HashFileHandler.probe(b"CBF43926  a"), Probe::NeedMore);
        assert_eq!(HashFileHandler.probe(b"MZ\x90\x00\n"), Probe::No);
    }
}

//! Numbered split volumes as a one-item archive.
//!
//! The handler is chosen by name only (`disk.img.001`). The caller hands it
//! the joined stream, normally a [`MultiVolumeReader`]; the single item is
//! that stream under the name without the numeric suffix.

use std::path::Path;

use crate::archive_path::ItemPath;
use crate::format::detect::{FormatHandler, OpenContext, Opened, Probe};
use crate::format::locator::{DataLocator, PlainSource, ReadSeek};
use crate::format::{ArchiveInfo, FormatKind};
use crate::item::Item;
use crate::volume::{MultiVolumeReader, VolumeReader, first_volume_base};
use crate::{Error, Result};

/// Split-volume handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitHandler;

impl FormatHandler for SplitHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Split
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["001"]
    }

    fn probe(&self, _prefix: &[u8]) -> Probe {
        Probe::No
    }

    fn accepts_name(&self, name: &str) -> bool {
        first_volume_base(Path::new(name)).is_some()
    }

    fn open(&self, _reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened> {
        let name = ctx
            .name_hint
            .ok_or_else(|| Error::not_an_archive("split volumes need a file name"))?;
        let (base, _) = first_volume_base(Path::new(name))
            .ok_or_else(|| Error::not_an_archive("not a numbered volume name"))?;
        let item_name = base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::not_an_archive("volume name has no stem"))?;

        let mut info = ArchiveInfo::new(FormatKind::Split);
        info.physical_size = ctx.source_len;
        info.item_count = 1;
        info.volumes = match MultiVolumeReader::open(name) {
            Ok(set) => set.volume_count(),
            Err(e) => {
                log::debug!("cannot enumerate volumes of {name}: {e}");
                1
            }
        };

        let item = Item::file(
            ItemPath::from_slash_str(&item_name),
            ctx.source_len,
            DataLocator::range(0, ctx.source_len),
        );
        Ok(Opened {
            items: vec![item],
            info,
            source: Box::new(PlainSource),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecoderRegistry;
    use crate::read::OpenOptions;
    use crate::volume::volume_path;
    use std::io::Read;
    use std::sync::Arc;

    #[test]
    fn test_accepts_numbered_names_only() {
        assert!(SplitHandler.accepts_name("dir/disk.img.001"));
        assert!(SplitHandler.accepts_name("disk.img.002"));
        assert!(!SplitHandler.accepts_name("disk.img"));
        assert_eq!(SplitHandler.probe(b"anything"), Probe::No);
    }

    #[test]
    fn test_joined_item() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("disk.img");
        std::fs::write(volume_path(&base, 3, 1), b"hello ").unwrap();
        std::fs::write(volume_path(&base, 3, 2), b"world").unwrap();
        let first = volume_path(&base, 3, 1).to_string_lossy().into_owned();

        let mut reader = MultiVolumeReader::open(&first).unwrap();
        let decoders = Arc::new(DecoderRegistry::default());
        let options = OpenOptions::default();
        let ctx = OpenContext {
            options: &options,
            decoders: &decoders,
            name_hint: Some(&first),
            source_len: reader.total_size(),
        };
        let mut opened = SplitHandler.open(&mut reader, &ctx).unwrap();
        assert_eq!(opened.info.volumes, 2);
        let item = opened.items[0].clone();
        assert_eq!(item.name(), "disk.img");
        assert_eq!(item.size, Some(11));

        let mut out = String::new();
        opened
            .source
            .open_stream(0, &item, &mut reader)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "hello world");
    }
}

//! FAT12/16/32 filesystem images.
//!
//! Opening runs four stages: the boot sector is validated
//! ([`boot::BootSector`]), the first FAT is loaded
//! ([`table::AllocationTable`]), the directory tree is walked from the
//! root, and clusters that look like unreachable directories are recovered
//! into `[LOST]` or `[UNKNOWN]` ([`tree::Walker`]).
//!
//! File payloads are cluster extents; a file whose chain disagrees with its
//! size still appears, but reading it yields a data error.

pub mod boot;
pub mod dir;
pub mod table;
pub mod tree;

use crate::format::detect::{FormatHandler, OpenContext, Opened, Probe};
use crate::format::locator::{PlainSource, ReadSeek};
use crate::format::reader::read_region;
use crate::format::{ArchiveInfo, FormatKind};
use crate::{Error, Result};

use boot::{BOOT_SECTOR_SIZE, BootSector};
use table::AllocationTable;
use tree::Walker;

/// FAT image handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct FatHandler;

impl FormatHandler for FatHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Fat
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["fat", "img", "ima", "vfd"]
    }

    fn probe(&self, prefix: &[u8]) -> Probe {
        match BootSector::parse(prefix) {
            Ok(_) => Probe::Yes,
            Err(Error::NeedMoreInput { .. }) => Probe::NeedMore,
            Err(_) => Probe::No,
        }
    }

    fn open(&self, reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened> {
        let sector = read_region(reader, 0, BOOT_SECTOR_SIZE as u64, &ctx.options.limits)?;
        let boot = BootSector::parse(&sector)?;
        log::debug!(
            "FAT{}: {} clusters of {} bytes",
            boot.fat_bits,
            boot.num_clusters,
            boot.cluster_size()
        );
        let table = AllocationTable::load(reader, &boot, &ctx.options.limits)?;
        let tree = Walker::new(reader, &boot, table, ctx.options).run()?;

        let mut info = ArchiveInfo::new(FormatKind::Fat);
        info.physical_size = boot.volume_size();
        info.method = Some(format!("FAT{}", boot.fat_bits));
        info.cluster_size = Some(boot.cluster_size());
        info.sector_size = Some(boot.sector_size());
        info.volume_serial = boot.serial.map(u64::from);
        info.volume_label = tree.label.or(boot.label.clone());
        if ctx.source_len < info.physical_size {
            info.flags.unexpected_end = true;
            info.warn(format!(
                "image is {} bytes, volume needs {}",
                ctx.source_len, info.physical_size
            ));
        } else if ctx.source_len > info.physical_size {
            info.flags.data_after_end = true;
        }
        if !tree.warnings.is_empty() {
            info.flags.headers_error = true;
        }
        for warning in tree.warnings {
            info.warnings.push(warning);
        }
        info.item_count = tree.items.len();

        Ok(Opened {
            items: tree.items,
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
    use boot::tests::fat12_boot;
    use dir::ATTR_DIRECTORY;
    use dir::tests::{long_entries, short_entry};
    use std::io::{Cursor, Read};
    use std::sync::Arc;

    const SECTOR: usize = 512;
    const DATA: usize = 3 * SECTOR;

    /// A 64-sector FAT12 image with 1-sector clusters.
    struct Image {
        bytes: Vec<u8>,
        fat: Vec<u16>,
    }

    impl Image {
        fn new() -> Self {
            let mut bytes = fat12_boot(64);
            bytes.resize(64 * SECTOR, 0);
            Self {
                bytes,
                fat: vec![0xFF8, 0xFFF],
            }
        }

        fn set_fat(&mut self, cluster: usize, value: u16) {
            if self.fat.len() <= cluster {
                self.fat.resize(cluster + 1, 0);
            }
            self.fat[cluster] = value;
        }

        fn root(&mut self, index: usize, entry: &[u8; 32]) {
            let at = 2 * SECTOR + index * 32;
            self.bytes[at..at + 32].copy_from_slice(entry);
        }

        fn cluster(&mut self, cluster: usize, offset: usize, data: &[u8]) {
            let at = DATA + (cluster - 2) * SECTOR + offset;
            self.bytes[at..at + data.len()].copy_from_slice(data);
        }

        fn finish(mut self) -> Vec<u8> {
            for (i, &e) in self.fat.iter().enumerate() {
                let off = SECTOR + i * 3 / 2;
                if i & 1 == 0 {
                    self.bytes[off] = e as u8;
                    self.bytes[off + 1] = (self.bytes[off + 1] & 0xF0) | (e >> 8) as u8;
                } else {
                    self.bytes[off] = (self.bytes[off] & 0x0F) | ((e & 0x0F) << 4) as u8;
                    self.bytes[off + 1] = (e >> 4) as u8;
                }
            }
            self.bytes
        }
    }

    fn dir_head(own: u32, parent: u32) -> Vec<u8> {
        let mut out = short_entry(b".          ", ATTR_DIRECTORY, own, 0).to_vec();
        out.extend_from_slice(&short_entry(b"..         ", ATTR_DIRECTORY, parent, 0));
        out
    }

    fn open_image(bytes: Vec<u8>, options: OpenOptions) -> (Opened, Cursor<Vec<u8>>) {
        let mut cursor = Cursor::new(bytes);
        let decoders = Arc::new(DecoderRegistry::default());
        let ctx = OpenContext {
            options: &options,
            decoders: &decoders,
            name_hint: None,
            source_len: cursor.get_ref().len() as u64,
        };
        let opened = FatHandler.open(&mut cursor, &ctx).unwrap();
        (opened, cursor)
    }

    fn read(opened: &mut Opened, index: usize, cursor: &mut Cursor<Vec<u8>>) -> Result<Vec<u8>> {
        let item = opened.items[index].clone();
        let mut out = Vec::new();
        opened.source.open_stream(index, &item, cursor)?.read_to_end(&mut out)?;
        Ok(out)
    }

    fn paths(opened: &Opened) -> Vec<String> {
        opened.items.iter().map(|i| i.path.to_slash_string()).collect()
    }

    #[test]
    fn test_files_and_subdirectory() {
        let mut img = Image::new();
        let dos = *b"README~1TXT";
        for (i, e) in long_entries("readme.txt.long", &dos).iter().enumerate() {
            img.root(i, e);
        }
        img.root(2, &short_entry(&dos, 0x20, 2, 600));
        img.root(3, &short_entry(b"SUB        ", ATTR_DIRECTORY, 4, 0));
        img.set_fat(2, 3);
        img.set_fat(3, 0xFFF);
        img.set_fat(4, 0xFFF);
        img.set_fat(5, 0xFFF);
        img.cluster(2, 0, &[b'a'; 512]);
        img.cluster(3, 0, &[b'b'; 88]);
        let mut sub = dir_head(4, 0);
        sub.extend_from_slice(&short_entry(b"INNER   BIN", 0x21, 5, 3));
        img.cluster(4, 0, &sub);
        img.cluster(5, 0, b"xyz");

        let (mut opened, mut cursor) = open_image(img.finish(), OpenOptions::default());
        assert_eq!(paths(&opened), ["readme.txt.long", "SUB", "SUB/INNER.BIN"]);
        assert_eq!(opened.items[2].parent, Some(1));
        assert!(opened.items[2].attributes.is_readonly());
        assert_eq!(opened.info.volume_label.as_deref(), Some("TESTVOL"));
        assert!(opened.info.flags.is_clean());

        let data = read(&mut opened, 0, &mut cursor).unwrap();
        assert_eq!(data.len(), 600);
        assert!(data[..512].iter().all(|&b| b == b'a'));
        assert!(data[512..].iter().all(|&b| b == b'b'));
        assert_eq!(read(&mut opened, 2, &mut cursor).unwrap(), b"xyz");
    }

    #[test]
    fn test_short_chain_is_item_level_error() {
        let mut img = Image::new();
        img.root(0, &short_entry(b"BROKEN  BIN", 0x20, 2, 1500));
        img.set_fat(2, 0xFFF);
        let (mut opened, mut cursor) = open_image(img.finish(), OpenOptions::default());
        assert_eq!(opened.items.len(), 1);
        assert!(matches!(
            read(&mut opened, 0, &mut cursor),
            Err(Error::DataError { item_index: 0, .. })
        ));
    }

    #[test]
    fn test_directory_cycle_is_contained() {
        let mut img = Image::new();
        img.root(0, &short_entry(b"LOOP       ", ATTR_DIRECTORY, 2, 0));
        img.set_fat(2, 0xFFF);
        let mut dir = dir_head(2, 0);
        dir.extend_from_slice(&short_entry(b"AGAIN      ", ATTR_DIRECTORY, 2, 0));
        img.cluster(2, 0, &dir);
        let (opened, _) = open_image(img.finish(), OpenOptions::default());
        assert_eq!(paths(&opened), ["LOOP", "LOOP/AGAIN"]);
        assert!(opened.info.flags.headers_error);
    }

    #[test]
    fn test_orphans_are_bucketed_by_allocation() {
        let mut img = Image::new();
        img.root(0, &short_entry(b"KEEP    TXT", 0x20, 0, 0));
        // allocated orphan whose parent cluster 20 is free and unwalked
        img.set_fat(6, 0xFFF);
        let mut lost = dir_head(6, 20);
        lost.extend_from_slice(&short_entry(b"A       TXT", 0x20, 0, 0));
        img.cluster(6, 0, &lost);
        // orphan in a free cluster
        let mut unknown = dir_head(9, 21);
        unknown.extend_from_slice(&short_entry(b"B       TXT", 0x20, 0, 0));
        img.cluster(9, 0, &unknown);

        let (opened, _) = open_image(img.finish(), OpenOptions::default());
        assert_eq!(
            paths(&opened),
            [
                "KEEP.TXT",
                "[LOST]/DIR6",
                "[LOST]/DIR6/A.TXT",
                "[UNKNOWN]/DIR9",
                "[UNKNOWN]/DIR9/B.TXT",
                "[LOST]",
                "[UNKNOWN]",
            ]
        );
        assert_eq!(opened.items[1].parent, Some(5));
        assert_eq!(opened.items[3].parent, Some(6));
        assert!(opened.items[5].is_synthetic);

        let (plain, _) = open_image(
            Image::new().finish(),
            OpenOptions::default().recover_lost(false),
        );
        assert!(plain.items.is_empty());
    }

    #[test]
    fn test_probe() {
        let img = Image::new().finish();
        assert_eq!(FatHandler.probe(&img[..512]), Probe::Yes);
        assert_eq!(FatHandler.probe(&img[..200]), Probe::NeedMore);
        assert_eq!(FatHandler.probe(&[0u8; 512]), Probe::No);
    }
}

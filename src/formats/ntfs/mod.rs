//! NTFS filesystem images.
//!
//! The boot sector locates `$MFT`, whose own `$DATA` run list is used to
//! read every record. Records are checked with their update sequence
//! fixups, extension records are merged into their bases, and the tree is
//! rebuilt from `$FILE_NAME` parent references ([`tree::TreeBuilder`]).
//!
//! Unnamed `$DATA` is an item's content; named `$DATA` attributes become
//! extra items named `file:stream`. Compressed streams are decoded a unit at
//! a time through [`stream::NtfsSource`]. [`check_volume`] examines an image
//! for damage instead of working around it.

pub mod attr;
pub mod boot;
pub mod check;
pub mod lznt1;
pub mod record;
pub mod runlist;
pub mod stream;
pub mod tree;

pub use check::{ConsistencyReport, check_volume};

use crate::format::detect::{FormatHandler, OpenContext, Opened, Probe};
use crate::format::locator::ReadSeek;
use crate::format::reader::{read_region, utf16le_to_string};
use crate::format::{ArchiveInfo, FormatKind};
use crate::{Error, Result};

use attr::{ATTR_VOLUME_INFORMATION, ATTR_VOLUME_NAME};
use boot::{BOOT_SECTOR_SIZE, NtfsBoot};
use record::{Mft, MftRecord};
use stream::NtfsSource;
use tree::TreeBuilder;

/// Separates a file name from an alternate stream name in item paths.
pub const STREAM_SEPARATOR: char = ':';

/// Record of `$Volume`.
const VOLUME_RECORD: u64 = 3;

/// NTFS image handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct NtfsHandler;

fn volume_label(volume: &MftRecord) -> Option<String> {
    volume
        .resident_value(ATTR_VOLUME_NAME)
        .map(utf16le_to_string)
        .filter(|label| !label.is_empty())
}

fn volume_version(volume: &MftRecord) -> Option<(u8, u8)> {
    let info = volume.resident_value(ATTR_VOLUME_INFORMATION)?;
    Some((*info.get(8)?, *info.get(9)?))
}

impl FormatHandler for NtfsHandler {
    fn kind(&self) -> FormatKind {
        FormatKind::Ntfs
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ntfs", "img"]
    }

    fn probe(&self, prefix: &[u8]) -> Probe {
        match NtfsBoot::parse(prefix) {
            Ok(_) => Probe::Yes,
            Err(Error::NeedMoreInput { .. }) => Probe::NeedMore,
            Err(_) => Probe::No,
        }
    }

    fn open(&self, reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened> {
        let sector = read_region(reader, 0, BOOT_SECTOR_SIZE as u64, &ctx.options.limits)?;
        let boot = NtfsBoot::parse(&sector)?;
        log::debug!(
            "NTFS: {} clusters of {} bytes, $MFT at cluster {}",
            boot.total_clusters(),
            boot.cluster_size(),
            boot.mft_lcn
        );
        let mut mft = Mft::load(reader, &boot, &ctx.options.limits)?;
        let merge_warnings = mft.merge_extensions();
        let tree = TreeBuilder::new(&mft, boot.cluster_size(), ctx.options).build()?;

        let mut info = ArchiveInfo::new(FormatKind::Ntfs);
        info.physical_size = boot.volume_size();
        info.cluster_size = u32::try_from(boot.cluster_size()).ok();
        info.sector_size = Some(boot.sector_size());
        info.volume_serial = Some(boot.serial);
        if let Some(volume) = mft.get(VOLUME_RECORD) {
            info.volume_label = volume_label(volume);
            info.method = volume_version(volume).map(|(major, minor)| format!("NTFS {major}.{minor}"));
        }
        if info.method.is_none() {
            info.method = Some("NTFS".into());
        }

        if mft.truncated || ctx.source_len < info.physical_size {
            info.flags.unexpected_end = true;
            info.warn(format!(
                "image is {} bytes, volume needs {}",
                ctx.source_len, info.physical_size
            ));
        } else if ctx.source_len > info.physical_size + u64::from(boot.sector_size()) {
            // the backup boot sector may sit just past the last sector
            info.flags.data_after_end = true;
        }
        if !mft.corrupt.is_empty() {
            info.flags.headers_error = true;
            info.warn(format!("{} MFT records could not be parsed", mft.corrupt.len()));
        }
        if !merge_warnings.is_empty() || !tree.warnings.is_empty() {
            info.flags.headers_error = true;
        }
        info.warnings.extend(merge_warnings);
        info.warnings.extend(tree.warnings);
        info.item_count = tree.items.len();

        Ok(Opened {
            items: tree.items,
            info,
            source: Box::new(NtfsSource::new(ctx.options.strict_lznt1)),
        })
    }
}

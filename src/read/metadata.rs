//! Applying item times and attributes after extraction.

use std::path::Path;

use crate::item::{Attributes, Item};

use super::{FilesystemSink, PreserveMetadata};

/// Applies `item`'s times and attributes to `path`, as `options` allow.
///
/// Failures are logged and otherwise ignored: the payload is already in
/// place and correct. Symbolic links are left alone since most platforms
/// would follow them.
pub(crate) fn apply_metadata(
    sink: &mut dyn FilesystemSink,
    path: &Path,
    item: &Item,
    options: &PreserveMetadata,
) {
    if item.is_symlink() {
        return;
    }

    let modified = item.modified.filter(|_| options.modification_time);
    let accessed = item.accessed.filter(|_| options.access_time);
    if modified.is_some() || accessed.is_some() {
        if let Err(e) = sink.set_times(path, modified, accessed) {
            log::warn!("cannot set times on '{}': {}", path.display(), e);
        }
    }

    if options.attributes {
        let attributes = host_attributes(item);
        if attributes != Attributes::default() {
            if let Err(e) = sink.set_attributes(path, attributes) {
                log::warn!("cannot set attributes on '{}': {}", path.display(), e);
            }
        }
    }
}

/// The subset of attribute bits worth applying on the host.
///
/// A stored Unix mode is kept as is. Otherwise only the read-only bit is
/// meaningful, and never on directories, which Windows ignores and Unix
/// would make unwritable.
fn host_attributes(item: &Item) -> Attributes {
    if item.unix_mode().is_some() {
        return item.attributes;
    }
    if !item.is_directory && item.attributes.is_readonly() {
        Attributes::new(Attributes::READONLY)
    } else {
        Attributes::default()
    }
}

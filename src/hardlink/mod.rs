//! Hard links inside filesystem images.
//!
//! FAT never shares data between names, but NTFS records with several
//! `$FILE_NAME` attributes surface as several items with one
//! [`Item::node_id`]. Extraction writes the payload once and links the
//! other names to it through [`HardLinkTracker`].
//!
//! # Example
//!
//! ```rust
//! use archkit::hardlink::HardLinkTracker;
//! use std::path::Path;
//!
//! let mut tracker = HardLinkTracker::new();
//! assert!(tracker.first_name(7).is_none());
//! tracker.record(7, Path::new("docs/report.txt"));
//! assert_eq!(tracker.first_name(7), Some(Path::new("docs/report.txt")));
//! ```

mod tracker;

use std::collections::BTreeMap;

pub use tracker::HardLinkTracker;

use crate::item::Item;

/// Returns true if `item` takes part in hard-link grouping.
///
/// Directories and alternate streams carry their record's node id too, but
/// only a file's main stream can be linked.
pub fn is_linkable(item: &Item) -> bool {
    item.is_file() && !item.is_alt_stream && item.link.is_none() && item.node_id.is_some()
}

/// Groups item indices by node id, keeping only nodes with several names.
pub fn hard_link_groups(items: &[Item]) -> BTreeMap<u64, Vec<usize>> {
    let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        if let (true, Some(node)) = (is_linkable(item), item.node_id) {
            groups.entry(node).or_default().push(index);
        }
    }
    groups.retain(|_, names| names.len() > 1);
    groups
}

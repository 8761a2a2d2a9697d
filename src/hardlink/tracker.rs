//! Remembering where each node was first written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maps node ids to the destination path of their first extracted name.
///
/// Only successful writes should be recorded, so that a failed first name
/// lets the next name carry the payload instead of linking to nothing.
#[derive(Debug, Default)]
pub struct HardLinkTracker {
    first: HashMap<u64, PathBuf>,
}

impl HardLinkTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Destination of the first extracted name of `node`.
    pub fn first_name(&self, node: u64) -> Option<&Path> {
        self.first.get(&node).map(PathBuf::as_path)
    }

    /// Records `path` as the payload holder for `node` unless one exists.
    pub fn record(&mut self, node: u64, path: &Path) {
        self.first.entry(node).or_insert_with(|| path.to_path_buf());
    }

    /// Number of nodes seen.
    pub fn len(&self) -> usize {
        self.first.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }
}

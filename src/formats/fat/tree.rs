//! Directory walk and orphan recovery.

use std::collections::{HashMap, HashSet};

use super::boot::BootSector;
use super::dir::{DirEntry, parse_directory};
use super::table::{AllocationTable, extents, read_clusters};
use crate::archive_path::ItemPath;
use crate::format::locator::{DataLocator, ExtentMap, ReadSeek};
use crate::format::reader::read_region;
use crate::formats::{LOST_FOLDER, UNKNOWN_FOLDER};
use crate::item::{Attributes, Item};
use crate::read::OpenOptions;
use crate::{Error, Result};

/// Deepest directory level that is walked.
pub const MAX_DEPTH: usize = 256;

/// Where a directory's entries are stored.
#[derive(Debug, Clone, Copy)]
enum DirData {
    /// The fixed FAT12/16 root region.
    FixedRoot,
    /// A cluster chain.
    Chain(u32),
    /// A single cluster whose table entry is free.
    Loose(u32),
}

#[derive(Debug, Clone, Copy)]
struct PendingDir {
    item: Option<usize>,
    data: DirData,
    depth: usize,
}

/// Synthetic parent an item is attached to once every real item exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Lost,
    Unknown,
}

/// The rebuilt tree.
#[derive(Debug, Default)]
pub struct Tree {
    /// Real items followed by synthetic folders.
    pub items: Vec<Item>,
    /// Label from the root directory's volume entry.
    pub label: Option<String>,
    /// Problems that dropped part of the tree.
    pub warnings: Vec<String>,
}

/// Walks a FAT volume into items.
pub struct Walker<'a> {
    reader: &'a mut dyn ReadSeek,
    boot: &'a BootSector,
    table: AllocationTable,
    options: &'a OpenOptions,
    tree: Tree,
    dir_items: HashMap<u32, usize>,
    bucketed: Vec<(usize, Bucket)>,
}

fn count_clusters(size: u64, cluster_size: u64) -> u64 {
    size.div_ceil(cluster_size)
}

impl<'a> Walker<'a> {
    /// Creates a walker over a loaded table.
    pub fn new(
        reader: &'a mut dyn ReadSeek,
        boot: &'a BootSector,
        table: AllocationTable,
        options: &'a OpenOptions,
    ) -> Self {
        Self {
            reader,
            boot,
            table,
            options,
            tree: Tree::default(),
            dir_items: HashMap::new(),
            bucketed: Vec::new(),
        }
    }

    /// Walks from the root, recovers lost directories and appends the
    /// synthetic folders.
    ///
    /// Failure to read the root directory is fatal; a broken subdirectory
    /// only loses its own subtree and leaves a warning.
    pub fn run(mut self) -> Result<Tree> {
        let root = if self.boot.is_fat32() {
            DirData::Chain(self.boot.root_cluster)
        } else {
            DirData::FixedRoot
        };
        let root_listing = self.read_dir(root)?;
        self.walk(
            PendingDir {
                item: None,
                data: root,
                depth: 0,
            },
            Some(root_listing),
        )?;
        if self.options.recover_lost {
            self.recover_lost()?;
        }
        self.append_buckets();
        Ok(self.tree)
    }

    fn warn(&mut self, message: String) {
        log::warn!("FAT: {message}");
        self.tree.warnings.push(message);
    }

    fn read_dir(&mut self, data: DirData) -> Result<Vec<u8>> {
        let limits = &self.options.limits;
        match data {
            DirData::FixedRoot => read_region(
                &mut *self.reader,
                self.boot.root_dir_offset(),
                self.boot.root_dir_len(),
                limits,
            ),
            DirData::Chain(start) => {
                let clusters = self.table.chain(start, self.table.num_clusters() as u64)?;
                for &cluster in &clusters {
                    self.table.tag_dir(cluster)?;
                }
                read_clusters(&mut *self.reader, self.boot, &clusters, limits)
            }
            DirData::Loose(cluster) => {
                self.table.tag_dir(cluster)?;
                read_clusters(&mut *self.reader, self.boot, &[cluster], limits)
            }
        }
    }

    fn path_of(&self, parent: Option<usize>) -> ItemPath {
        parent
            .and_then(|i| self.tree.items.get(i))
            .map(|item| item.path.clone())
            .unwrap_or_default()
    }

    fn push(&mut self, item: Item) -> Result<usize> {
        self.options.limits.check_items(self.tree.items.len() + 1)?;
        self.tree.items.push(item);
        Ok(self.tree.items.len() - 1)
    }

    fn walk(&mut self, start: PendingDir, first: Option<Vec<u8>>) -> Result<()> {
        let mut stack = vec![(start, first)];
        while let Some((dir, preloaded)) = stack.pop() {
            let data = match preloaded {
                Some(data) => data,
                None => match self.read_dir(dir.data) {
                    Ok(data) => data,
                    Err(e @ Error::ResourceLimitExceeded(_)) => return Err(e),
                    Err(Error::Io(e)) => return Err(Error::Io(e)),
                    Err(e) => {
                        let path = self.path_of(dir.item);
                        self.warn(format!("directory {path} skipped: {e}"));
                        continue;
                    }
                },
            };
            let listing = parse_directory(&data, self.boot.is_fat32(), self.options.show_deleted);
            if dir.item.is_none() && self.tree.label.is_none() {
                self.tree.label = listing.label;
            }
            let parent_path = self.path_of(dir.item);

            let mut children = Vec::new();
            for entry in listing.entries {
                if entry.is_dot() {
                    continue;
                }
                let path = parent_path.child(entry.name());
                let index = self.push(self.entry_item(&entry, path, dir.item))?;
                if !entry.is_dir() || entry.deleted {
                    continue;
                }
                if !self.table.is_valid(entry.cluster) {
                    self.warn(format!(
                        "directory {} has invalid cluster {}",
                        self.tree.items[index].path, entry.cluster
                    ));
                    continue;
                }
                if dir.depth + 1 >= MAX_DEPTH {
                    self.warn(format!(
                        "directory {} is nested too deeply",
                        self.tree.items[index].path
                    ));
                    continue;
                }
                self.dir_items.insert(entry.cluster, index);
                children.push(PendingDir {
                    item: Some(index),
                    data: DirData::Chain(entry.cluster),
                    depth: dir.depth + 1,
                });
            }
            // Reverse so that subdirectories are walked in listing order.
            stack.extend(children.into_iter().rev().map(|d| (d, None)));
        }
        Ok(())
    }

    fn entry_item(&self, entry: &DirEntry, path: ItemPath, parent: Option<usize>) -> Item {
        let mut item = if entry.is_dir() {
            Item::directory(path)
        } else {
            Item::file(path, entry.size as u64, self.file_locator(entry))
        };
        item.parent = parent;
        item.modified = entry.modified;
        item.created = entry.created;
        item.accessed = entry.accessed;
        item.attributes = Attributes(entry.attributes as u32);
        item.is_deleted = entry.deleted;
        if !entry.is_dir() {
            item.packed_size = Some(
                count_clusters(entry.size as u64, self.boot.cluster_size() as u64)
                    * self.boot.cluster_size() as u64,
            );
        }
        item
    }

    fn file_locator(&self, entry: &DirEntry) -> DataLocator {
        let size = entry.size as u64;
        if size == 0 {
            return DataLocator::Empty;
        }
        let cluster_size = self.boot.cluster_size() as u64;
        let needed = count_clusters(size, cluster_size);
        let clusters: Vec<u32> = if entry.deleted {
            let end = entry.cluster as u64 + needed;
            if !self.table.is_valid(entry.cluster) || end > self.table.num_clusters() as u64 + 2 {
                return DataLocator::Broken("deleted file points outside the volume".into());
            }
            (entry.cluster..end as u32).collect()
        } else {
            match self.table.chain(entry.cluster, needed) {
                Ok(chain) if chain.len() as u64 == needed => chain,
                Ok(chain) => {
                    return DataLocator::Broken(format!(
                        "cluster chain has {} clusters, size needs {needed}",
                        chain.len()
                    ));
                }
                Err(e) => return DataLocator::Broken(e.to_string()),
            }
        };
        DataLocator::Extents(ExtentMap::new(
            extents(&clusters),
            cluster_size,
            self.boot.data_offset(),
            size,
        ))
    }

    /// Clusters that open with `.` and `..` entries but were never reached.
    fn lost_candidates(&mut self) -> Result<Vec<(u32, u32)>> {
        let mut found = Vec::new();
        let limits = self.options.limits.clone();
        for cluster in 2..self.table.num_clusters() + 2 {
            if self.table.is_dir_tagged(cluster) {
                continue;
            }
            let head = match read_region(&mut *self.reader, self.boot.cluster_offset(cluster), 64, &limits) {
                Ok(head) => head,
                Err(Error::NeedMoreInput { .. }) => break,
                Err(e) => return Err(e),
            };
            let listing = parse_directory(&head, self.boot.is_fat32(), false);
            let [dot, dotdot] = listing.entries.as_slice() else {
                continue;
            };
            if &dot.dos_name == b".          "
                && dot.is_dir()
                && dot.cluster == cluster
                && &dotdot.dos_name == b"..         "
                && dotdot.is_dir()
            {
                found.push((cluster, dotdot.cluster));
            }
        }
        Ok(found)
    }

    fn recover_lost(&mut self) -> Result<()> {
        let candidates = parents_first(&self.lost_candidates()?);
        for (cluster, parent_cluster) in candidates {
            if self.table.is_dir_tagged(cluster) {
                continue;
            }
            let allocated = self.table.is_allocated(cluster);
            let parent = if parent_cluster == 0 {
                Some(None)
            } else {
                self.dir_items.get(&parent_cluster).map(|&i| Some(i))
            };
            let name = format!("DIR{cluster}");
            let (path, parent_index, bucket) = match parent {
                Some(p) => (self.path_of(p).child(name), p, None),
                None => {
                    let bucket = if allocated { Bucket::Lost } else { Bucket::Unknown };
                    let folder = match bucket {
                        Bucket::Lost => LOST_FOLDER,
                        Bucket::Unknown => UNKNOWN_FOLDER,
                    };
                    (ItemPath::from(folder).child(name), None, Some(bucket))
                }
            };
            log::debug!("recovered lost directory at cluster {cluster} as {path}");
            let mut item = Item::directory(path);
            item.parent = parent_index;
            item.is_deleted = !allocated;
            let index = self.push(item)?;
            if let Some(bucket) = bucket {
                self.bucketed.push((index, bucket));
            }
            self.dir_items.insert(cluster, index);
            let data = if allocated {
                DirData::Chain(cluster)
            } else {
                DirData::Loose(cluster)
            };
            self.walk(
                PendingDir {
                    item: Some(index),
                    data,
                    depth: 1,
                },
                None,
            )?;
        }
        Ok(())
    }

    fn append_buckets(&mut self) {
        for bucket in [Bucket::Lost, Bucket::Unknown] {
            if !self.bucketed.iter().any(|&(_, b)| b == bucket) {
                continue;
            }
            let name = match bucket {
                Bucket::Lost => LOST_FOLDER,
                Bucket::Unknown => UNKNOWN_FOLDER,
            };
            let folder = self.tree.items.len();
            self.tree
                .items
                .push(Item::synthetic_directory(ItemPath::from(name)));
            for &(index, _) in self.bucketed.iter().filter(|&&(_, b)| b == bucket) {
                self.tree.items[index].parent = Some(folder);
            }
        }
    }
}

/// Orders lost directories so that one whose `..` names another lost
/// directory comes after it. Members of a `..` loop keep their relative
/// order and the first one reached ends up in a recovery folder.
fn parents_first(candidates: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let parent_of: HashMap<u32, u32> = candidates.iter().copied().collect();
    let mut placed = HashSet::new();
    let mut order = Vec::with_capacity(candidates.len());
    for &(cluster, _) in candidates {
        let mut chain = Vec::new();
        let mut on_chain = HashSet::new();
        let mut current = cluster;
        while !placed.contains(&current) && on_chain.insert(current) {
            let Some(&parent) = parent_of.get(&current) else {
                break;
            };
            chain.push((current, parent));
            current = parent;
        }
        for &(c, parent) in chain.iter().rev() {
            if placed.insert(c) {
                order.push((c, parent));
            }
        }
    }
    order
}

//! Building the item tree from merged MFT records.
//!
//! Every file name of a record becomes a node: a record with two names in
//! different directories is a hard link and yields two items sharing a
//! `node_id`. Parents come from the names' parent references. Nodes whose
//! parent is missing, is not a directory, or was reused (sequence mismatch)
//! are orphans and go to `[LOST]` when their record is in use and to
//! `[UNKNOWN]` when it is deleted. Metadata files (records below 16) go to
//! `[SYSTEM]`.

use std::collections::{BTreeMap, HashMap};

use super::STREAM_SEPARATOR;
use super::attr::{
    ATTR_FILE_NAME, ATTR_REPARSE_POINT, ATTR_STANDARD_INFORMATION, AttrBody,
    Attribute, FLAG_ENCRYPTED, FileName, FileRef, Namespace, StandardInformation, parse_reparse,
};
use super::record::{Mft, MftRecord};
use super::runlist::stream_map;
use crate::archive_path::ItemPath;
use crate::format::locator::DataLocator;
use crate::formats::{LOST_FOLDER, SYSTEM_FOLDER, UNKNOWN_FOLDER};
use crate::item::{Attributes, Item};
use crate::read::OpenOptions;
use crate::Result;

/// Record of the root directory.
pub const ROOT_RECORD: u64 = 5;
/// First record available to ordinary files.
pub const FIRST_USER_RECORD: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    System,
    Lost,
    Unknown,
}

impl Bucket {
    fn folder(self) -> &'static str {
        match self {
            Bucket::System => SYSTEM_FOLDER,
            Bucket::Lost => LOST_FOLDER,
            Bucket::Unknown => UNKNOWN_FOLDER,
        }
    }

    fn orphan(in_use: bool) -> Self {
        if in_use { Bucket::Lost } else { Bucket::Unknown }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Root,
    Node(usize),
    Bucket(Bucket),
    /// Below a metadata directory that is not shown.
    Hidden,
}

/// One name of one record.
struct Node {
    record: u64,
    name: String,
    in_use: bool,
    parent_ref: FileRef,
    parent: Parent,
    /// Index of the first name of the same record.
    primary: usize,
}

/// The built tree.
#[derive(Debug, Default)]
pub struct Tree {
    pub items: Vec<Item>,
    pub warnings: Vec<String>,
}

/// Picks the names to show: DOS short names are dropped when the record
/// has a long name, and a name repeated for the same parent counts once.
fn visible_names(record: &MftRecord) -> Vec<FileName> {
    let names: Vec<FileName> = record
        .attrs(ATTR_FILE_NAME)
        .filter_map(|a| a.resident().and_then(FileName::parse))
        .collect();
    let has_long = names.iter().any(|n| n.namespace != Namespace::Dos);
    let mut out: Vec<FileName> = Vec::new();
    for name in names {
        if has_long && name.namespace == Namespace::Dos {
            continue;
        }
        if out
            .iter()
            .any(|o| o.parent.record == name.parent.record && o.name == name.name)
        {
            continue;
        }
        out.push(name);
    }
    out
}

/// Builds the items of one volume.
pub struct TreeBuilder<'a> {
    mft: &'a Mft,
    cluster_size: u64,
    options: &'a OpenOptions,
    nodes: Vec<Node>,
    /// First directory node of each record.
    dirs: HashMap<u64, usize>,
    warnings: Vec<String>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(mft: &'a Mft, cluster_size: u64, options: &'a OpenOptions) -> Self {
        Self {
            mft,
            cluster_size,
            options,
            nodes: Vec::new(),
            dirs: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        log::warn!("NTFS: {message}");
        self.warnings.push(message);
    }

    fn is_system(&self, record: u64) -> bool {
        record < FIRST_USER_RECORD
    }

    /// Runs every pass and returns the items.
    pub fn build(mut self) -> Result<Tree> {
        self.collect_nodes()?;
        self.resolve_parents();
        self.break_cycles();
        let items = self.emit()?;
        Ok(Tree {
            items,
            warnings: self.warnings,
        })
    }

    fn collect_nodes(&mut self) -> Result<()> {
        let mft = self.mft;
        for record in mft.records.iter().flatten() {
            if record.index == ROOT_RECORD || record.base.is_some() {
                continue;
            }
            if !record.in_use() && !self.options.show_deleted {
                continue;
            }
            if self.is_system(record.index) && !self.options.show_system_files {
                continue;
            }
            let names = visible_names(record);
            if names.is_empty() {
                log::debug!("NTFS: record {} has no file name", record.index);
                continue;
            }
            let primary = self.nodes.len();
            for name in names {
                self.options.limits.check_items(self.nodes.len() + 1)?;
                let parent = if self.is_system(record.index) {
                    Parent::Bucket(Bucket::System)
                } else {
                    // resolved in the next pass
                    Parent::Root
                };
                self.nodes.push(Node {
                    record: record.index,
                    name: name.name,
                    in_use: record.in_use(),
                    parent_ref: name.parent,
                    parent,
                    primary,
                });
            }
            if record.is_dir() {
                self.dirs.insert(record.index, primary);
            }
        }
        Ok(())
    }

    /// Whether a node's record still matches the parent reference. A deleted
    /// directory has had its sequence number bumped once.
    fn parent_matches(&self, parent: FileRef) -> bool {
        match self.mft.get(parent.record) {
            Some(r) if r.in_use() => r.sequence == parent.sequence,
            Some(r) => r.sequence == parent.sequence || r.sequence == parent.sequence.wrapping_add(1),
            None => false,
        }
    }

    fn resolve_parents(&mut self) {
        for i in 0..self.nodes.len() {
            // system records were placed while collecting
            if self.nodes[i].parent != Parent::Root {
                continue;
            }
            let parent_ref = self.nodes[i].parent_ref;
            let parent = if parent_ref.record == ROOT_RECORD {
                Parent::Root
            } else if self.is_system(parent_ref.record) {
                match self.dirs.get(&parent_ref.record) {
                    Some(&p) if self.options.show_system_files => Parent::Node(p),
                    _ => Parent::Hidden,
                }
            } else {
                match self.dirs.get(&parent_ref.record) {
                    Some(&p) if self.parent_matches(parent_ref) => Parent::Node(p),
                    _ => {
                        log::debug!(
                            "NTFS: record {} names missing parent {}",
                            self.nodes[i].record,
                            parent_ref.record
                        );
                        Parent::Bucket(Bucket::orphan(self.nodes[i].in_use))
                    }
                }
            };
            self.nodes[i].parent = parent;
        }
    }

    /// Walks every ancestor chain; a chain that returns to a node on itself
    /// is cut by moving the node that closed it to an orphan folder.
    fn break_cycles(&mut self) {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum State {
            New,
            Walking,
            Done,
        }
        let mut state = vec![State::New; self.nodes.len()];
        for start in 0..self.nodes.len() {
            let mut path: Vec<usize> = Vec::new();
            let mut current = start;
            loop {
                match state[current] {
                    State::Done => break,
                    State::Walking => {
                        let Some(&closer) = path.last() else {
                            break;
                        };
                        let node = &self.nodes[closer];
                        let message = format!(
                            "directory loop through record {}; moved {} to an orphan folder",
                            node.record, node.name
                        );
                        let bucket = Bucket::orphan(node.in_use);
                        self.nodes[closer].parent = Parent::Bucket(bucket);
                        self.warn(message);
                        break;
                    }
                    State::New => {
                        state[current] = State::Walking;
                        path.push(current);
                        match self.nodes[current].parent {
                            Parent::Node(p) => current = p,
                            _ => break,
                        }
                    }
                }
            }
            for node in path {
                state[node] = State::Done;
            }
        }
    }

    /// Follows parents to the root; returns the path segments (leaf last),
    /// the bucket the chain ends in, and whether it is hidden.
    fn chain(&self, node: usize) -> (Vec<usize>, Option<Bucket>, bool) {
        let mut chain = vec![node];
        let mut current = node;
        loop {
            match self.nodes[current].parent {
                Parent::Root => break,
                Parent::Node(p) => {
                    if chain.len() > self.nodes.len() {
                        break;
                    }
                    chain.push(p);
                    current = p;
                }
                Parent::Bucket(b) => {
                    chain.reverse();
                    return (chain, Some(b), false);
                }
                Parent::Hidden => return (chain, None, true),
            }
        }
        chain.reverse();
        (chain, None, false)
    }

    fn emit(&self) -> Result<Vec<Item>> {
        let mft = self.mft;
        let mut items: Vec<Item> = Vec::new();
        let mut index_of: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut bucketed: BTreeMap<Bucket, Vec<usize>> = BTreeMap::new();
        let mut streams: Vec<(usize, Item)> = Vec::new();

        for i in 0..self.nodes.len() {
            let (chain, bucket, hidden) = self.chain(i);
            if hidden {
                continue;
            }
            let mut path = match bucket {
                Some(b) => ItemPath::from(b.folder()),
                None => ItemPath::default(),
            };
            for &n in &chain {
                path.push(self.nodes[n].name.clone());
            }
            let node = &self.nodes[i];
            let Some(record) = mft.get(node.record) else {
                continue;
            };
            let mut item = self.item_for(record, path.clone());
            item.is_deleted = !node.in_use;
            item.node_id = Some(node.record);
            let primary = node.primary == i;
            let parent = node.parent;
            self.options.limits.check_items(items.len() + 1)?;
            let index = items.len();
            items.push(item);
            index_of[i] = Some(index);
            if let Parent::Bucket(b) = parent {
                bucketed.entry(b).or_default().push(index);
            }
            if primary {
                for mut stream in self.alt_streams(record, &path) {
                    stream.is_deleted = !self.nodes[i].in_use;
                    streams.push((i, stream));
                }
            }
        }

        // Parents are node indices until every node has an item index.
        for i in 0..self.nodes.len() {
            let (Some(index), Parent::Node(p)) = (index_of[i], self.nodes[i].parent) else {
                continue;
            };
            items[index].parent = index_of[p];
        }
        for (node, mut stream) in streams {
            let Some(owner) = index_of[node] else {
                continue;
            };
            stream.parent = items[owner].parent;
            self.options.limits.check_items(items.len() + 1)?;
            if let Parent::Bucket(b) = self.nodes[node].parent {
                bucketed.entry(b).or_default().push(items.len());
            }
            items.push(stream);
        }
        for (bucket, members) in bucketed {
            let folder = items.len();
            let mut item = Item::synthetic_directory(ItemPath::from(bucket.folder()));
            item.is_deleted = bucket == Bucket::Unknown;
            items.push(item);
            for member in members {
                items[member].parent = Some(folder);
            }
        }
        Ok(items)
    }

    /// Size, packed size and locator of one data stream.
    fn stream_locator(&self, parts: &[&Attribute]) -> (u64, Option<u64>, DataLocator) {
        if let [single] = parts {
            if let AttrBody::Resident(value) = &single.body {
                return (value.len() as u64, Some(value.len() as u64), DataLocator::Resident(value.clone()));
            }
        }
        if parts.iter().any(|p| p.flags & FLAG_ENCRYPTED != 0) {
            return (0, None, DataLocator::Broken("stream is encrypted".into()));
        }
        let non_resident: Vec<_> = parts
            .iter()
            .filter_map(|p| match &p.body {
                AttrBody::NonResident(nr) => Some(nr),
                AttrBody::Resident(_) => None,
            })
            .collect();
        if non_resident.len() != parts.len() {
            return (0, None, DataLocator::Broken("stream mixes resident and non-resident parts".into()));
        }
        let size = non_resident
            .iter()
            .find(|p| p.lowest_vcn == 0)
            .map_or(0, |p| p.data_size);
        match stream_map(&non_resident, self.cluster_size) {
            Ok(map) => {
                let packed = map
                    .extents
                    .iter()
                    .filter(|e| e.lcn.is_some())
                    .map(|e| e.clusters)
                    .sum::<u64>()
                    * self.cluster_size;
                (size, Some(packed), DataLocator::Extents(map))
            }
            Err(e) => (size, None, DataLocator::Broken(e.to_string())),
        }
    }

    fn item_for(&self, record: &MftRecord, path: ItemPath) -> Item {
        let info = record
            .resident_value(ATTR_STANDARD_INFORMATION)
            .and_then(StandardInformation::parse)
            .unwrap_or_default();
        let mut item = if record.is_dir() {
            Item::directory(path)
        } else {
            let data = record.data_streams();
            let (size, packed, locator) = match data.get("") {
                Some(parts) => self.stream_locator(parts),
                None => (0, None, DataLocator::Empty),
            };
            let mut item = Item::file(path, size, locator);
            item.packed_size = packed;
            item
        };
        item.created = info.created;
        item.modified = info.modified;
        item.accessed = info.accessed;
        let mut bits = info.attributes;
        if record.is_dir() {
            bits |= Attributes::DIRECTORY;
        }
        item.attributes = Attributes(bits);
        item.link = record
            .resident_value(ATTR_REPARSE_POINT)
            .and_then(parse_reparse);
        if item.link.is_some() {
            item.locator = DataLocator::Empty;
            item.size = if item.is_directory { None } else { Some(0) };
        }
        item
    }

    fn alt_streams(&self, record: &MftRecord, path: &ItemPath) -> Vec<Item> {
        let mut out = Vec::new();
        for (name, parts) in record.data_streams() {
            if name.is_empty() {
                continue;
            }
            let (size, packed, locator) = self.stream_locator(&parts);
            let leaf = format!("{}{STREAM_SEPARATOR}{name}", path.file_name());
            let stream_path = path.parent().unwrap_or_default().child(leaf);
            let mut item = Item::file(stream_path, size, locator);
            item.packed_size = packed;
            item.is_alt_stream = true;
            item.node_id = Some(record.index);
            out.push(item);
        }
        out
    }
}

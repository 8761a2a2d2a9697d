//! Per-item digests and the three aggregate sums of a hashing run.

use super::digest::{Digest, HashState};
use super::HashMethod;

/// Aggregate buckets of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashGroup {
    /// Sum of the data digests of main streams.
    Data,
    /// Sum of name-folded digests of main streams and directories.
    Names,
    /// Sum of name-folded digests of every stream, alternate ones included.
    Streams,
}

impl HashGroup {
    /// Every group in report order.
    pub const ALL: [HashGroup; 3] = [HashGroup::Data, HashGroup::Names, HashGroup::Streams];

    /// Label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            HashGroup::Data => "data",
            HashGroup::Names => "data and names",
            HashGroup::Streams => "data and names and streams",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
struct MethodSlot {
    state: HashState,
    current: Digest,
    sums: [Digest; 3],
}

/// Hashes items with several methods at once and keeps run totals.
///
/// ```rust
/// use archkit::hash::{HashBundle, HashGroup, HashMethod};
///
/// let mut bundle = HashBundle::new(&[HashMethod::Crc32]);
/// bundle.begin_item();
/// bundle.update(b"123456789");
/// let digests = bundle.finalize_item(false, false, "a.txt");
/// assert_eq!(digests[0].1.to_hex(), "CBF43926");
/// assert_eq!(bundle.num_files, 1);
/// assert_eq!(bundle.sum(HashGroup::Data)[0].1.to_hex(), "CBF43926");
/// ```
#[derive(Debug, Clone)]
pub struct HashBundle {
    slots: Vec<MethodSlot>,
    current_size: u64,
    /// Main-stream files finalised.
    pub num_files: u64,
    /// Directories finalised.
    pub num_dirs: u64,
    /// Alternate streams finalised.
    pub num_alt_streams: u64,
    /// Bytes of main-stream files.
    pub files_size: u64,
    /// Bytes of alternate streams.
    pub alt_streams_size: u64,
}

impl HashBundle {
    /// Creates a bundle; duplicate methods are kept once.
    pub fn new(methods: &[HashMethod]) -> Self {
        let mut unique: Vec<HashMethod> = Vec::new();
        for &m in methods {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        let slots = unique
            .into_iter()
            .map(|m| {
                let size = m.digest_size();
                MethodSlot {
                    state: HashState::new(m),
                    current: Digest::zero(size),
                    sums: [Digest::zero(size), Digest::zero(size), Digest::zero(size)],
                }
            })
            .collect();
        Self {
            slots,
            current_size: 0,
            num_files: 0,
            num_dirs: 0,
            num_alt_streams: 0,
            files_size: 0,
            alt_streams_size: 0,
        }
    }

    /// Methods in this bundle.
    pub fn methods(&self) -> Vec<HashMethod> {
        self.slots.iter().map(|s| s.state.method()).collect()
    }

    /// Starts a new item.
    pub fn begin_item(&mut self) {
        self.current_size = 0;
        for slot in &mut self.slots {
            slot.state.reset();
        }
    }

    /// Feeds item bytes to every method.
    pub fn update(&mut self, data: &[u8]) {
        self.current_size += data.len() as u64;
        for slot in &mut self.slots {
            slot.state.update(data);
        }
    }

    /// Finishes the current item and folds it into the sums.
    ///
    /// Returns the per-method data digests (zero for directories).
    pub fn finalize_item(
        &mut self,
        is_dir: bool,
        is_alt_stream: bool,
        path: &str,
    ) -> Vec<(HashMethod, Digest)> {
        let digests: Vec<Digest> = self.slots.iter().map(|s| s.state.digest()).collect();
        let size = self.current_size;
        self.add_item(digests, size, is_dir, is_alt_stream, path)
    }

    /// Folds an item whose data digests were computed elsewhere.
    ///
    /// `digests` must be in [`methods`](Self::methods) order.
    pub fn add_item(
        &mut self,
        digests: Vec<Digest>,
        size: u64,
        is_dir: bool,
        is_alt_stream: bool,
        path: &str,
    ) -> Vec<(HashMethod, Digest)> {
        if is_dir {
            self.num_dirs += 1;
        } else if is_alt_stream {
            self.num_alt_streams += 1;
            self.alt_streams_size += size;
        } else {
            self.num_files += 1;
            self.files_size += size;
        }

        let mut pre = [0u8; 16];
        if is_dir {
            pre[0] = 1;
        }
        let name: Vec<u8> = path
            .chars()
            .map(|c| if c == '\\' { '/' } else { c })
            .collect::<String>()
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();

        let mut out = Vec::with_capacity(self.slots.len());
        for (slot, digest) in self.slots.iter_mut().zip(digests) {
            let size = slot.current.as_bytes().len();
            slot.current = if is_dir {
                Digest::zero(size)
            } else {
                digest
            };
            if !is_dir && !is_alt_stream {
                slot.sums[HashGroup::Data.slot()].add(slot.current.as_bytes());
            }
            let mut fold = HashState::new(slot.state.method());
            fold.update(&pre);
            fold.update(slot.current.as_bytes());
            fold.update(&name);
            let folded = fold.digest();
            if !is_alt_stream {
                slot.sums[HashGroup::Names.slot()].add(folded.as_bytes());
            }
            slot.sums[HashGroup::Streams.slot()].add(folded.as_bytes());
            out.push((slot.state.method(), slot.current.clone()));
        }
        out
    }

    /// The last finalised item's digests.
    pub fn item_digests(&self) -> Vec<(HashMethod, Digest)> {
        self.slots
            .iter()
            .map(|s| (s.state.method(), s.current.clone()))
            .collect()
    }

    /// The aggregate of `group` for every method.
    pub fn sum(&self, group: HashGroup) -> Vec<(HashMethod, &Digest)> {
        self.slots
            .iter()
            .map(|s| (s.state.method(), &s.sums[group.slot()]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(items: &[(&str, &[u8])]) -> HashBundle {
        let mut bundle = HashBundle::new(&[HashMethod::Crc32, HashMethod::Sha256]);
        for (name, data) in items {
            bundle.begin_item();
            bundle.update(data);
            bundle.finalize_item(false, false, name);
        }
        bundle
    }

    #[test]
    fn test_data_sum_is_order_independent() {
        let a = run(&[("a", b"one"), ("b", b"two")]);
        let b = run(&[("b", b"two"), ("a", b"one")]);
        for group in HashGroup::ALL {
            let sa: Vec<String> = a.sum(group).iter().map(|(_, d)| d.to_hex_with_extra()).collect();
            let sb: Vec<String> = b.sum(group).iter().map(|(_, d)| d.to_hex_with_extra()).collect();
            assert_eq!(sa, sb, "{}", group.label());
        }
        assert_eq!(a.num_files, 2);
        assert_eq!(a.files_size, 6);
    }

    #[test]
    fn test_names_sum_depends_on_names() {
        let a = run(&[("a", b"one")]);
        let b = run(&[("c", b"one")]);
        assert_eq!(a.sum(HashGroup::Data)[0].1, b.sum(HashGroup::Data)[0].1);
        assert_ne!(a.sum(HashGroup::Names)[0].1, b.sum(HashGroup::Names)[0].1);
    }

    #[test]
    fn test_backslash_normalised() {
        let a = run(&[("dir/a", b"x")]);
        let b = run(&[("dir\\a", b"x")]);
        assert_eq!(a.sum(HashGroup::Names)[1].1, b.sum(HashGroup::Names)[1].1);
    }

    #[test]
    fn test_alt_streams_only_in_stream_sum() {
        let mut bundle = HashBundle::new(&[HashMethod::Crc32]);
        bundle.begin_item();
        bundle.update(b"ads");
        bundle.finalize_item(false, true, "f:s");
        bundle.begin_item();
        bundle.finalize_item(true, false, "d");
        assert_eq!(bundle.num_alt_streams, 1);
        assert_eq!(bundle.num_dirs, 1);
        assert_eq!(bundle.sum(HashGroup::Data)[0].1.count(), 0);
        assert_eq!(bundle.sum(HashGroup::Names)[0].1.count(), 1);
        assert_eq!(bundle.sum(HashGroup::Streams)[0].1.count(), 2);
    }
}

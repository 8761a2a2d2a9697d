//! Looking at items without extracting them.

use std::io::{Read, Seek};

use crate::item::{Item, ItemSelector};
use crate::{Error, Result};

use super::archive_test::{CopyFailure, SourceGuard, read_verified};
use super::{Archive, ArchiveInfo, FormatKind};

impl<R> Archive<R> {
    /// Number of items, including synthetic folders.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the archive has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in archive order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// The item at `index`.
    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    /// Archive-level metadata and warning flags.
    pub fn info(&self) -> &ArchiveInfo {
        &self.info
    }

    /// The detected format.
    pub fn format(&self) -> FormatKind {
        self.kind
    }

    /// Index of the item whose `/`-joined path is `path`.
    pub fn find(&self, path: &str) -> Option<usize> {
        let wanted = path.trim_matches('/');
        self.items
            .iter()
            .position(|item| item.path.to_slash_string() == wanted)
    }

    /// The item at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::ItemNotFound`] if no item has that path.
    pub fn item_by_path(&self, path: &str) -> Result<&Item> {
        self.find(path)
            .map(|i| &self.items[i])
            .ok_or_else(|| Error::ItemNotFound {
                path: path.to_string(),
            })
    }

    /// Indices of the items `selector` picks, in archive order.
    pub fn selected(&self, selector: &impl ItemSelector) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(i, item)| selector.select(*i, item))
            .map(|(i, _)| i)
            .collect()
    }

    /// Gives back the input.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek + Send> Archive<R> {
    /// Decodes item `index` into memory and verifies it.
    ///
    /// # Errors
    ///
    /// [`Error::ItemNotFound`] for a bad index, and the item's own error
    /// (data, CRC, unsupported method) when decoding or verification fails.
    pub fn read_item(&mut self, index: usize) -> Result<Vec<u8>> {
        let item = self.items.get(index).ok_or_else(|| Error::ItemNotFound {
            path: format!("#{index}"),
        })?;
        if item.is_directory {
            return Ok(Vec::new());
        }
        let mut data = Vec::new();
        let mut input = SourceGuard::new(&mut self.reader);
        let total = std::sync::Arc::default();
        let outcome = read_verified(
            index,
            item,
            self.source.as_mut(),
            &mut input,
            &self.limits,
            &total,
            &mut data,
            |_| true,
        )?;
        match outcome {
            Ok(_) => Ok(data),
            Err(CopyFailure::Read(e)) => Err(e),
            Err(CopyFailure::Write(e)) => Err(Error::Io(e)),
            Err(CopyFailure::Cancelled) => Err(Error::Cancelled),
        }
    }

    /// Opens item `index` as a raw stream, without verification.
    ///
    /// The stream borrows the archive; drop it before touching other items.
    pub fn open_item(&mut self, index: usize) -> Result<Box<dyn Read + '_>> {
        let item = self.items.get(index).ok_or_else(|| Error::ItemNotFound {
            path: format!("#{index}"),
        })?;
        self.source.open_stream(index, item, &mut self.reader)
    }
}

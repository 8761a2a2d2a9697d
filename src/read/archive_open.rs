//! Opening archives from paths and readers.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::format::detect::FormatRegistry;
use crate::format::locator::ReadSeek;
use crate::volume::{MultiVolumeReader, VolumeReader, first_volume_base};
use crate::Result;

use super::{Archive, OpenOptions};

impl Archive<Box<dyn ReadSeek>> {
    /// Opens the file at `path`, detecting its format.
    ///
    /// A numbered volume name (`image.001`, `data.bin.002`) opens the whole
    /// set as one joined input.
    ///
    /// # Errors
    ///
    /// I/O errors, [`Error::VolumeMissing`](crate::Error::VolumeMissing) for
    /// an incomplete set, and [`Error::NotAnArchive`](crate::Error::NotAnArchive)
    /// when no format accepts the input.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_path_with(path, &OpenOptions::default())
    }

    /// Opens the file at `path` with explicit options.
    pub fn open_path_with(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();
        let reader: Box<dyn ReadSeek> = if first_volume_base(path).is_some() {
            let volumes = MultiVolumeReader::open(path)?;
            log::debug!("opening {} as {} volumes", name, volumes.volume_count());
            Box::new(volumes)
        } else {
            Box::new(BufReader::new(File::open(path)?))
        };
        Archive::open_with(reader, Some(&name), options)
    }
}

impl<R: Read + Seek + Send> Archive<R> {
    /// Opens `reader`, detecting the format from content alone.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with(reader, None, &OpenOptions::default())
    }

    /// Opens `reader`; `name_hint` lets name-based formats (split sets,
    /// checksum listings) and extension ordering take part.
    pub fn open_with(reader: R, name_hint: Option<&str>, options: &OpenOptions) -> Result<Self> {
        Self::open_with_registry(reader, name_hint, options, &FormatRegistry::default())
    }

    /// Opens `reader` using a custom set of formats and decoders.
    pub fn open_with_registry(
        mut reader: R,
        name_hint: Option<&str>,
        options: &OpenOptions,
        registry: &FormatRegistry,
    ) -> Result<Self> {
        let (kind, opened) = registry.open(&mut reader, name_hint, options)?;
        log::info!(
            "opened {} with {} items{}",
            kind,
            opened.items.len(),
            if opened.info.flags.is_clean() {
                String::new()
            } else {
                format!(" [{}]", opened.info.flags.names().join(", "))
            }
        );
        let mut archive = Archive::from_parts(reader, kind, opened.items, opened.info, opened.source);
        archive.limits = options.limits.clone();
        Ok(archive)
    }
}

//! Multi-volume reader.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Readers that can report volume information.
pub trait VolumeReader: Read + Seek {
    /// Total number of volumes.
    fn volume_count(&self) -> u32;

    /// Size of each volume in bytes.
    fn volume_sizes(&self) -> &[u64];

    /// Volume holding the current position (1-indexed).
    fn current_volume(&self) -> u32;

    /// Logical size across all volumes.
    fn total_size(&self) -> u64;
}

/// Splits `name.NNN` into its base path and suffix width.
///
/// Returns `None` unless the last extension is all digits (at least three).
pub fn first_volume_base(path: &Path) -> Option<(PathBuf, usize)> {
    let name = path.file_name()?.to_str()?;
    let (stem, suffix) = name.rsplit_once('.')?;
    if stem.is_empty() || suffix.len() < 3 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((path.with_file_name(stem), suffix.len()))
}

/// Path of volume `number` (1-indexed) for `base`.
pub fn volume_path(base: &Path, width: usize, number: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{number:0width$}"));
    PathBuf::from(name)
}

/// Reads numbered volumes as one stream.
///
/// Volumes are found by probing `base.001`, `base.002`, ... until one is
/// missing; files are opened lazily on first access.
pub struct MultiVolumeReader {
    volumes: Vec<Option<BufReader<File>>>,
    volume_sizes: Vec<u64>,
    base_path: PathBuf,
    width: usize,
    position: u64,
    current_volume: usize,
    volume_position: u64,
    total_size: u64,
}

impl MultiVolumeReader {
    /// Opens the set that `path` (any of its volumes) belongs to.
    ///
    /// # Errors
    ///
    /// [`Error::NotAnArchive`] if `path` has no numeric suffix,
    /// [`Error::VolumeMissing`] if the first volume does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (base_path, width) = first_volume_base(path)
            .ok_or_else(|| Error::not_an_archive("not a numbered volume name"))?;
        let volume_sizes = Self::detect_volumes(&base_path, width)?;
        if volume_sizes.is_empty() {
            let missing = volume_path(&base_path, width, 1);
            return Err(Error::VolumeMissing {
                volume: 1,
                path: missing.to_string_lossy().into_owned(),
                source: io::Error::new(io::ErrorKind::NotFound, "volume file not found"),
            });
        }
        let total_size = volume_sizes.iter().sum();
        log::debug!(
            "split set {} has {} volumes, {} bytes",
            base_path.display(),
            volume_sizes.len(),
            total_size
        );
        Ok(Self {
            volumes: volume_sizes.iter().map(|_| None).collect(),
            volume_sizes,
            base_path,
            width,
            position: 0,
            current_volume: 0,
            volume_position: 0,
            total_size,
        })
    }

    fn detect_volumes(base_path: &Path, width: usize) -> Result<Vec<u64>> {
        let mut sizes = Vec::new();
        for number in 1u32.. {
            match std::fs::metadata(volume_path(base_path, width, number)) {
                Ok(meta) if meta.is_file() => sizes.push(meta.len()),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(sizes)
    }

    fn open_volume(&mut self, index: usize) -> io::Result<&mut BufReader<File>> {
        let slot = &mut self.volumes[index];
        if slot.is_none() {
            let path = volume_path(&self.base_path, self.width, index as u32 + 1);
            *slot = Some(BufReader::new(File::open(path)?));
        }
        slot.as_mut()
            .ok_or_else(|| io::Error::other("volume handle unavailable"))
    }

    fn position_to_volume(&self, pos: u64) -> (usize, u64) {
        let mut remaining = pos;
        for (i, &size) in self.volume_sizes.iter().enumerate() {
            if remaining < size {
                return (i, remaining);
            }
            remaining -= size;
        }
        let last = self.volume_sizes.len().saturating_sub(1);
        (last, self.volume_sizes.get(last).copied().unwrap_or(0))
    }

    /// Path without the numeric suffix (the joined file's name).
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of volume `number` (1-indexed).
    pub fn get_volume_path(&self, number: u32) -> PathBuf {
        volume_path(&self.base_path, self.width, number)
    }
}

impl Read for MultiVolumeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total_read = 0;
        while total_read < buf.len() && self.position < self.total_size {
            let remaining_in_volume = self.volume_sizes[self.current_volume] - self.volume_position;
            if remaining_in_volume == 0 {
                if self.current_volume + 1 >= self.volumes.len() {
                    break;
                }
                self.current_volume += 1;
                self.volume_position = 0;
                continue;
            }

            let to_read = (buf.len() - total_read).min(remaining_in_volume as usize);
            let seek_pos = self.volume_position;
            let volume = self.open_volume(self.current_volume)?;
            volume.seek(SeekFrom::Start(seek_pos))?;
            let n = volume.read(&mut buf[total_read..total_read + to_read])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("volume {} is shorter than when opened", self.current_volume + 1),
                ));
            }
            total_read += n;
            self.position += n as u64;
            self.volume_position += n as u64;
        }
        Ok(total_read)
    }
}

impl Seek for MultiVolumeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(p) => self.total_size.checked_add_signed(p),
            SeekFrom::Current(p) => self.position.checked_add_signed(p),
        };
        let new_pos = new_pos.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "cannot seek before start of stream")
        })?;
        self.position = new_pos.min(self.total_size);
        let (vol_idx, vol_pos) = self.position_to_volume(self.position);
        self.current_volume = vol_idx;
        self.volume_position = vol_pos;
        Ok(self.position)
    }
}

impl VolumeReader for MultiVolumeReader {
    fn volume_count(&self) -> u32 {
        self.volume_sizes.len() as u32
    }

    fn volume_sizes(&self) -> &[u64] {
        &self.volume_sizes
    }

    fn current_volume(&self) -> u32 {
        (self.current_volume + 1) as u32
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }
}

impl std::fmt::Debug for MultiVolumeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiVolumeReader")
            .field("base_path", &self.base_path)
            .field("volume_count", &self.volume_sizes.len())
            .field("total_size", &self.total_size)
            .field("position", &self.position)
            .field("current_volume", &(self.current_volume + 1))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_volumes(dir: &Path, base_name: &str, sizes: &[usize]) -> PathBuf {
        let base_path = dir.join(base_name);
        for (i, &size) in sizes.iter().enumerate() {
            let data: Vec<u8> = (0..size).map(|j| (i * 7 + j) as u8).collect();
            std::fs::write(volume_path(&base_path, 3, i as u32 + 1), data).unwrap();
        }
        base_path
    }

    #[test]
    fn test_first_volume_base() {
        let (base, width) = first_volume_base(Path::new("/p/disk.img.001")).unwrap();
        assert_eq!(base, PathBuf::from("/p/disk.img"));
        assert_eq!(width, 3);
        assert_eq!(first_volume_base(Path::new("x.0001")).unwrap().1, 4);
        assert!(first_volume_base(Path::new("x.01")).is_none());
        assert!(first_volume_base(Path::new("x.7z")).is_none());
        assert!(first_volume_base(Path::new(".001")).is_none());
    }

    #[test]
    fn test_volume_path_generation() {
        let base = PathBuf::from("test.bin");
        assert_eq!(volume_path(&base, 3, 1), PathBuf::from("test.bin.001"));
        assert_eq!(volume_path(&base, 3, 100), PathBuf::from("test.bin.100"));
        assert_eq!(volume_path(&base, 4, 12), PathBuf::from("test.bin.0012"));
    }

    #[test]
    fn test_read_across_volumes() {
        let dir = TempDir::new().unwrap();
        let base = create_test_volumes(dir.path(), "data.bin", &[100, 100, 50]);
        let mut reader = MultiVolumeReader::open(volume_path(&base, 3, 2)).unwrap();
        assert_eq!(reader.volume_count(), 3);
        assert_eq!(reader.total_size(), 250);
        assert_eq!(reader.base_path(), base.as_path());

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 250);
        assert_eq!(buffer[99], 99);
        assert_eq!(buffer[100], 7);
        assert_eq!(buffer[200], 14);
    }

    #[test]
    fn test_seek_operations() {
        let dir = TempDir::new().unwrap();
        let base = create_test_volumes(dir.path(), "data.bin", &[100, 100, 50]);
        let mut reader = MultiVolumeReader::open(volume_path(&base, 3, 1)).unwrap();

        assert_eq!(reader.seek(SeekFrom::Start(150)).unwrap(), 150);
        assert_eq!(reader.current_volume(), 2);
        assert_eq!(reader.seek(SeekFrom::End(-50)).unwrap(), 200);
        assert_eq!(reader.current_volume(), 3);
        reader.seek(SeekFrom::Start(100)).unwrap();
        assert_eq!(reader.seek(SeekFrom::Current(25)).unwrap(), 125);
        assert!(reader.seek(SeekFrom::Current(-500)).is_err());

        let mut byte = [0u8; 1];
        reader.seek(SeekFrom::Start(99)).unwrap();
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 99);
    }

    #[test]
    fn test_missing_first_volume() {
        let dir = TempDir::new().unwrap();
        let err = MultiVolumeReader::open(dir.path().join("gone.bin.001")).unwrap_err();
        assert!(matches!(err, Error::VolumeMissing { volume: 1, .. }));
        assert!(matches!(
            MultiVolumeReader::open(dir.path().join("plain.bin")),
            Err(Error::NotAnArchive(_))
        ));
    }
}

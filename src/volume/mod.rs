//! Numbered split volumes.
//!
//! A file cut into `name.001`, `name.002`, ... is read back as one seekable
//! stream by [`MultiVolumeReader`]. The volume number is zero padded to the
//! width of the first volume's suffix (at least three digits).
//!
//! ```rust,no_run
//! use std::io::Read;
//! use archkit::volume::{MultiVolumeReader, VolumeReader};
//!
//! let mut reader = MultiVolumeReader::open("backup.img.001")?;
//! println!("{} volumes, {} bytes", reader.volume_count(), reader.total_size());
//! let mut head = [0u8; 512];
//! reader.read_exact(&mut head)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod reader;

pub use reader::{MultiVolumeReader, VolumeReader, first_volume_base, volume_path};

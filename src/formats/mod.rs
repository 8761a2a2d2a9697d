//! Parsers for the supported containers.
//!
//! Flat record formats ([`ihex`], [`lzh`], [`flv`], [`nsis`], [`hashfile`],
//! [`split`]) scan their input once and emit items in record order.
//! Filesystem images ([`fat`], [`ntfs`]) rebuild a directory tree, resolve
//! parent links and bucket orphans into synthetic folders.

pub mod fat;
pub mod flv;
pub mod hashfile;
pub mod ihex;
pub mod lzh;
pub mod nsis;
pub mod ntfs;
pub mod split;

/// Folder for orphans whose own entry is still in use.
pub const LOST_FOLDER: &str = "[LOST]";
/// Folder for orphans whose own entry is deleted.
pub const UNKNOWN_FOLDER: &str = "[UNKNOWN]";
/// Folder for filesystem metadata files.
pub const SYSTEM_FOLDER: &str = "[SYSTEM]";

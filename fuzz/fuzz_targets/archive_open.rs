//! Fuzz target for format detection and item decoding.
//!
//! Run with: cargo +nightly fuzz run archive_open
//!
//! Every container parser sees the input; whatever opens is then tested
//! item by item, which drives the stream decoders as well.

#![no_main]

use archkit::read::{Archive, TestOptions};
use archkit::{ResourceLimits, SelectAll};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let Ok(mut archive) = Archive::open(Cursor::new(data)) else {
        return;
    };
    for item in archive.items() {
        let _ = item.path.to_slash_string();
        let _ = (item.size, item.is_directory, &item.checksum, &item.link);
    }
    let limits = ResourceLimits::new()
        .max_item_size(16 << 20)
        .max_total_unpacked(64 << 20);
    let _ = archive.test(SelectAll, &TestOptions::new().limits(limits));
});

//! Fuzz target for destination path handling.
//!
//! Run with: cargo +nightly fuzz run extract_paths
//!
//! Arbitrary item names and link targets are extracted into a memory sink;
//! nothing may land outside the destination root.

#![no_main]

use archkit::read::{ExtractOptions, MemorySink, PathMode};
use archkit::{Archive, ItemPath, SelectAll};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use std::path::Component;

/// A one-entry stored LZH archive named `name`.
fn lzh(name: &[u8]) -> Vec<u8> {
    let mut h = vec![0u8, 0];
    h.extend_from_slice(b"-lh0-");
    h.extend_from_slice(&[0; 8]);
    h.extend_from_slice(&[0, 0x60, 0x21, 0x58, 0x20, 0]);
    h.push(name.len() as u8);
    h.extend_from_slice(name);
    h.extend_from_slice(&[0, 0]);
    h[0] = (h.len() - 2) as u8;
    h[1] = h[2..].iter().fold(0u8, |a, &b| a.wrapping_add(b));
    h.push(0);
    h
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 200 {
        return;
    }
    let name = String::from_utf8_lossy(data);
    let _ = ItemPath::from_any_separator(&name).to_slash_string();

    let Ok(mut archive) = Archive::open(Cursor::new(lzh(data))) else {
        return;
    };
    for mode in [PathMode::Full, PathMode::NoPath, PathMode::Absolute] {
        let mut sink = MemorySink::new();
        let options = ExtractOptions::new().path_mode(mode);
        let _ = archive.extract_to_sink(&mut sink, SelectAll, &options);
        for path in sink.entries().keys() {
            assert!(
                path.components().all(|c| matches!(c, Component::Normal(_))),
                "escaping destination {path:?} for {name:?}"
            );
        }
    }
});

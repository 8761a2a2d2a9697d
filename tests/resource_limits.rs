//! Resource limits end the run instead of failing a single item.

mod common;

use std::io::Cursor;

use archkit::read::{Archive, ExtractOptions, OpenOptions, TestOptions};
use archkit::{Error, ResourceLimits, SelectAll};

use common::*;

fn two_files() -> Vec<u8> {
    lzh(&[("one.bin", &[1u8; 100]), ("two.bin", &[2u8; 100])])
}

#[test]
fn test_item_count_limit_rejects_open() {
    let options = OpenOptions::new().limits(ResourceLimits::new().max_items(1));
    let err = Archive::open_with(Cursor::new(two_files()), None, &options).unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)), "{err:?}");
}

#[test]
fn test_item_size_limit_aborts_extraction() {
    let mut archive = open(two_files());
    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions::new().limits(ResourceLimits::new().max_item_size(50));
    let err = archive.extract(out.path(), SelectAll, &options).unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)), "{err:?}");
    assert!(!out.path().join("one.bin").exists());
    assert!(!out.path().join("two.bin").exists());
}

#[test]
fn test_total_unpacked_limit_stops_after_budget() {
    let mut archive = open(two_files());
    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions::new().limits(ResourceLimits::new().max_total_unpacked(150));
    let err = archive.extract(out.path(), SelectAll, &options).unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    assert_eq!(std::fs::read(out.path().join("one.bin")).unwrap(), [1u8; 100]);
    assert!(!out.path().join("two.bin").exists());
}

#[test]
fn test_limits_apply_to_testing() {
    let mut archive = open(two_files());
    let options = TestOptions::new().limits(ResourceLimits::new().max_item_size(10));
    assert!(matches!(
        archive.test(SelectAll, &options),
        Err(Error::ResourceLimitExceeded(_))
    ));
}

#[test]
fn test_limits_within_budget_pass() {
    let mut archive = open(two_files());
    let options = TestOptions::new().limits(
        ResourceLimits::new()
            .max_item_size(100)
            .max_total_unpacked(200),
    );
    assert!(archive.test(SelectAll, &options).unwrap().is_success());
}

#[test]
fn test_header_budget_rejects_large_listing() {
    let mut listing = String::new();
    for i in 0..64 {
        listing.push_str(&format!("d41d8cd98f00b204e9800998ecf8427e  file{i}.txt\n"));
    }
    let options = OpenOptions::new().limits(ResourceLimits::new().max_header_bytes(256));
    let err = Archive::open_with(Cursor::new(listing.into_bytes()), Some("sums.md5"), &options)
        .unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)), "{err:?}");
}

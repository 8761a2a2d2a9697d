//! End-to-end behaviour of each container family through the public API.

mod common;

use std::fs;

use archkit::hash::{ChecksumFile, HashMethod};
use archkit::progress::NoProgress;
use archkit::read::{
    ExtractOptions, LinkPolicy, OperationResult, OverwritePolicy, TestOptions,
};
use archkit::{FormatKind, ItemChecksum, SelectAll};

use common::*;

// =============================================================================
// Intel HEX
// =============================================================================

#[test]
fn test_ihex_single_record_image() {
    let text = b":0300300002337A1E\n:00000001FF\n".to_vec();
    let mut archive = open(text.clone());

    assert_eq!(archive.format(), FormatKind::Ihex);
    assert!(archive.info().flags.is_clean());
    assert_eq!(archive.info().physical_size, text.len() as u64);
    assert_eq!(archive.len(), 1);

    let item = archive.item(0).unwrap();
    assert_eq!(item.offset, Some(0x30));
    assert_eq!(item.size, Some(3));
    assert_eq!(archive.read_item(0).unwrap(), [0x02, 0x33, 0x7A]);
}

#[test]
fn test_ihex_builder_matches_hand_written_records() {
    assert_eq!(
        ihex(&[(0x30, &[0x02, 0x33, 0x7A])]),
        b":0300300002337A1E\n:00000001FF\n"
    );
}

#[test]
fn test_ihex_missing_eof_is_flagged() {
    let text = ihex_record(0, 0x100, b"abcd").into_bytes();
    let mut archive = open(text);
    assert!(archive.info().flags.unexpected_end);
    assert!(!archive.info().is_clean());
    assert_eq!(archive.read_item(0).unwrap(), b"abcd");
}

// =============================================================================
// LZH
// =============================================================================

#[test]
fn test_lzh_stored_extraction_verifies_crc() {
    let bytes = lzh(&[("docs\\readme.txt", b"hello lzh"), ("top.bin", &[7u8; 300])]);
    let mut archive = open(bytes);
    assert_eq!(archive.format(), FormatKind::Lzh);
    assert!(matches!(
        archive.item(0).unwrap().checksum,
        Some(ItemChecksum::Crc16(_))
    ));

    let out = tempfile::tempdir().unwrap();
    let result = archive
        .extract(out.path(), SelectAll, &ExtractOptions::new())
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.files, 2);
    assert_eq!(result.bytes_written, 9 + 300);
    assert_eq!(
        fs::read(out.path().join("docs/readme.txt")).unwrap(),
        b"hello lzh"
    );
    assert_eq!(fs::read(out.path().join("top.bin")).unwrap(), vec![7u8; 300]);
}

#[test]
fn test_lzh_crc_mismatch_reports_and_removes_partial_file() {
    let mut bytes = lzh(&[("bad.txt", b"payload!")]);
    // flip a payload byte; the header and its CRC stay intact
    let at = bytes.len() - 2;
    bytes[at] ^= 0x40;
    let mut archive = open(bytes);

    let tested = archive.test(SelectAll, &TestOptions::new()).unwrap();
    assert_eq!(tested.failed, 1);
    assert_eq!(tested.items[0].result, OperationResult::CrcError);

    let out = tempfile::tempdir().unwrap();
    let result = archive
        .extract(out.path(), SelectAll, &ExtractOptions::new())
        .unwrap();
    assert!(!result.is_success());
    assert_eq!(result.items[0].result, OperationResult::CrcError);
    assert!(!out.path().join("bad.txt").exists());
}

#[test]
fn test_lzh_escaping_symlink_is_never_created() {
    let bytes = lzh(&[
        ("link|../../../etc/passwd", b""),
        ("plain.txt", b"kept"),
    ]);
    for policy in [
        OverwritePolicy::Skip,
        OverwritePolicy::Ask,
        OverwritePolicy::Overwrite,
        OverwritePolicy::AutoRename,
        OverwritePolicy::RenameExisting,
    ] {
        let mut archive = open(bytes.clone());
        let out = tempfile::tempdir().unwrap();
        let options = ExtractOptions::new()
            .overwrite(policy)
            .link_policy(LinkPolicy::ValidateTargets);
        let result = archive.extract(out.path(), SelectAll, &options).unwrap();

        assert_eq!(result.items[0].result, OperationResult::DangerousLink, "{policy:?}");
        assert_eq!(result.items[1].result, OperationResult::Ok, "{policy:?}");
        assert_eq!(result.links, 0);
        assert!(fs::symlink_metadata(out.path().join("link")).is_err());
        assert_eq!(tree(out.path()), ["plain.txt"]);
    }
}

#[cfg(unix)]
#[test]
fn test_lzh_contained_symlink_is_created() {
    let bytes = lzh(&[("dir/target.txt", b"t"), ("dir/link|target.txt", b"")]);
    let mut archive = open(bytes);
    let out = tempfile::tempdir().unwrap();
    let result = archive
        .extract(out.path(), SelectAll, &ExtractOptions::new())
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.links, 1);
    let link = out.path().join("dir/link");
    assert_eq!(
        fs::read_link(&link).unwrap(),
        std::path::PathBuf::from("target.txt")
    );
    assert_eq!(fs::read(&link).unwrap(), b"t");
}

// =============================================================================
// Checksum listings
// =============================================================================

#[test]
fn test_md5_listing_verifies_empty_file() {
    let (dir, _) = write_temp("empty.txt", b"");
    let listing = b"d41d8cd98f00b204e9800998ecf8427e  empty.txt\n";
    let parsed = ChecksumFile::parse(listing, None).unwrap();
    assert_eq!(parsed.entries.len(), 1);
    assert_eq!(parsed.entries[0].method, HashMethod::Md5);

    let report = parsed.verify(dir.path(), &mut NoProgress).unwrap();
    assert!(report.is_success());
    assert_eq!(report.ok, 1);
    assert_eq!(report.results[0].result, OperationResult::Ok);
}

#[test]
fn test_listing_reports_changed_and_missing_files() {
    let (dir, _) = write_temp("empty.txt", b"not empty any more");
    let listing = b"d41d8cd98f00b204e9800998ecf8427e  empty.txt\n\
                    d41d8cd98f00b204e9800998ecf8427e  gone.txt\n";
    let report = ChecksumFile::parse(listing, None)
        .unwrap()
        .verify(dir.path(), &mut NoProgress)
        .unwrap();
    assert!(!report.is_success());
    assert_eq!((report.ok, report.failed, report.missing), (0, 1, 1));
    assert_eq!(report.results[0].result, OperationResult::CrcError);
}

#[test]
fn test_listing_opens_as_archive_of_named_files() {
    let (dir, listing) = write_temp(
        "sums.md5",
        b"d41d8cd98f00b204e9800998ecf8427e  empty.txt\n",
    );
    fs::write(dir.path().join("empty.txt"), b"").unwrap();

    let mut archive = archkit::read::Archive::open_path(&listing).unwrap();
    assert_eq!(archive.format(), FormatKind::HashFile);
    assert_eq!(archive.items()[0].path.to_slash_string(), "empty.txt");
    let tested = archive.test(SelectAll, &TestOptions::new()).unwrap();
    assert!(tested.is_success());
}

// =============================================================================
// FAT
// =============================================================================

fn orphan_image() -> Vec<u8> {
    let mut img = FatImage::new();
    img.root(0, &fat_entry(b"KEEP    TXT", ATTR_ARCHIVE, 2, 5));
    img.single_cluster_file(2, b"keep!");
    // allocated directory cluster whose parent (20) was never reached
    let mut lost = fat_dir_head(6, 20);
    lost.extend_from_slice(&fat_entry(b"A       TXT", ATTR_ARCHIVE, 0, 0));
    img.fat(6, 0xFFF).cluster(6, &lost);
    // directory left behind in a free cluster
    let mut unknown = fat_dir_head(9, 21);
    unknown.extend_from_slice(&fat_entry(b"B       TXT", ATTR_ARCHIVE, 0, 0));
    img.cluster(9, &unknown);
    img.finish()
}

#[test]
fn test_fat_lost_directory_nests_under_lost_parent() {
    let mut img = FatImage::new();
    // 6 is a child of 12 that 12 no longer lists; 12's own parent is gone
    let mut child = fat_dir_head(6, 12);
    child.extend_from_slice(&fat_entry(b"C       TXT", ATTR_ARCHIVE, 0, 0));
    img.fat(6, 0xFFF).cluster(6, &child);
    img.fat(12, 0xFFF).cluster(12, &fat_dir_head(12, 30));
    let archive = open(img.finish());

    let paths: Vec<String> = archive
        .items()
        .iter()
        .map(|i| i.path.to_slash_string())
        .collect();
    assert!(paths.contains(&"[LOST]/DIR12/DIR6/C.TXT".to_string()), "{paths:?}");
    assert!(!paths.contains(&"[LOST]/DIR6".to_string()), "{paths:?}");
    let nested = archive.item_by_path("[LOST]/DIR12/DIR6").unwrap();
    let parent = nested.parent.unwrap();
    assert_eq!(archive.items()[parent].path.to_slash_string(), "[LOST]/DIR12");
}

#[test]
fn test_fat_orphans_land_in_recovery_folders() {
    let mut archive = open(orphan_image());
    assert_eq!(archive.format(), FormatKind::Fat);
    assert_eq!(archive.info().volume_label.as_deref(), Some("FIXTURE"));

    let paths: Vec<String> = archive
        .items()
        .iter()
        .map(|i| i.path.to_slash_string())
        .collect();
    assert!(paths.contains(&"[LOST]/DIR6/A.TXT".to_string()), "{paths:?}");
    assert!(paths.contains(&"[UNKNOWN]/DIR9/B.TXT".to_string()), "{paths:?}");
    let lost = archive.item_by_path("[LOST]").unwrap();
    assert!(lost.is_synthetic && lost.is_directory);

    let keep = archive.find("KEEP.TXT").unwrap();
    assert_eq!(archive.read_item(keep).unwrap(), b"keep!");

    let out = tempfile::tempdir().unwrap();
    let result = archive
        .extract(out.path(), SelectAll, &ExtractOptions::new())
        .unwrap();
    assert!(result.is_success(), "{:?}", result.failures().collect::<Vec<_>>());
    assert!(out.path().join("[LOST]/DIR6/A.TXT").is_file());
    assert!(out.path().join("[UNKNOWN]/DIR9/B.TXT").is_file());
}

#[test]
fn test_fat_without_recovery_lists_only_reachable_items() {
    let options = archkit::OpenOptions::new().recover_lost(false);
    let archive = archkit::read::Archive::open_with(
        std::io::Cursor::new(orphan_image()),
        None,
        &options,
    )
    .unwrap();
    let paths: Vec<String> = archive
        .items()
        .iter()
        .map(|i| i.path.to_slash_string())
        .collect();
    assert_eq!(paths, ["KEEP.TXT"]);
}

#[test]
fn test_fat_subdirectory_and_readonly_attribute() {
    let mut img = FatImage::new();
    img.root(0, &fat_entry(b"SUB        ", ATTR_DIRECTORY, 3, 0));
    let mut sub = fat_dir_head(3, 0);
    sub.extend_from_slice(&fat_entry(b"INNER   BIN", ATTR_READONLY | ATTR_ARCHIVE, 4, 3));
    img.fat(3, 0xFFF).cluster(3, &sub);
    img.single_cluster_file(4, b"xyz");
    let mut archive = open(img.finish());

    let inner = archive.find("SUB/INNER.BIN").unwrap();
    let item = archive.item(inner).unwrap();
    assert!(item.attributes.is_readonly());
    assert_eq!(item.parent, archive.find("SUB"));
    assert!(item.modified.is_some());
    assert_eq!(archive.read_item(inner).unwrap(), b"xyz");
}

// =============================================================================
// FLV
// =============================================================================

#[test]
fn test_flv_single_audio_stream_is_raw_mp3() {
    let bytes = flv(&[
        flv_tag(FLV_AUDIO, &[0x2F, 1, 2, 3]),
        flv_tag(FLV_AUDIO, &[0x2F, 4, 5]),
    ]);
    let mut archive = open(bytes);
    assert_eq!(archive.format(), FormatKind::Flv);
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.items()[0].name(), "0.mp3");
    assert_eq!(archive.read_item(0).unwrap(), [1, 2, 3, 4, 5]);
}

#[test]
fn test_flv_audio_and_video_are_rewrapped() {
    let bytes = flv(&[
        flv_tag(FLV_AUDIO, &[0x2F, 1, 2, 3]),
        flv_tag(FLV_VIDEO, &[0x12, 9, 9]),
    ]);
    let mut archive = open(bytes);
    assert_eq!(archive.len(), 2);
    for item in archive.items() {
        assert_eq!(item.path.extension(), Some("flv"));
    }
    let first = archive.read_item(0).unwrap();
    assert_eq!(&first[..3], b"FLV");
    let tested = archive.test(SelectAll, &TestOptions::new()).unwrap();
    assert!(tested.is_success());
}

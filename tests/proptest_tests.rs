//! Property-based tests using proptest.

mod common;

use std::io::Cursor;

use archkit::archive_path::sanitize_segment;
use archkit::checksum::{Checksum, Crc16, Crc32};
use archkit::hash::checksum_file::{escape_name, unescape_name};
use archkit::hash::{ChecksumWriter, Digest, HashMethod, HashState};
use archkit::read::{Archive, ExtractOptions, MemorySink, TestOptions};
use archkit::{ItemPath, SelectAll};
use proptest::prelude::*;

/// 1-4 plain segments joined with `/`.
fn path_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,9}", 1..5)
}

proptest! {
    #[test]
    fn slash_paths_keep_their_segments(segments in path_strategy()) {
        let joined = segments.join("/");
        let path = ItemPath::from_slash_str(&joined);
        prop_assert_eq!(path.depth(), segments.len());
        prop_assert_eq!(path.to_slash_string(), joined);
        prop_assert_eq!(path.file_name(), segments.last().unwrap().as_str());
    }

    #[test]
    fn sanitized_segments_are_single_components(segment in "\\PC{0,24}") {
        let clean = sanitize_segment(&segment);
        prop_assert!(!clean.is_empty());
        prop_assert!(!clean.contains(['/', '\\']));
        prop_assert!(clean != "." && clean != "..");
        prop_assert!(!clean.ends_with(['.', ' ']));
    }

    #[test]
    fn escaped_names_are_single_lines(name in "[a-z\\\\\\n\\r ]{0,32}") {
        let (escaped, flagged) = escape_name(&name);
        prop_assert!(!escaped.contains(['\n', '\r']));
        prop_assert_eq!(flagged, escaped != name);
        prop_assert_eq!(unescape_name(&escaped), Some(name));
    }

    #[test]
    fn incremental_crc_matches_one_shot(data in proptest::collection::vec(any::<u8>(), 0..2048), cut in any::<prop::sample::Index>()) {
        let at = cut.index(data.len() + 1);
        let mut crc16 = Crc16::new();
        crc16.update(&data[..at]);
        crc16.update(&data[at..]);
        prop_assert_eq!(crc16.finalize(), Crc16::compute(&data));

        let mut crc32 = Crc32::new();
        crc32.update(&data[..at]);
        crc32.update(&data[at..]);
        prop_assert_eq!(crc32.finalize(), Crc32::compute(&data));
    }

    #[test]
    fn digest_sums_commute(a in proptest::collection::vec(any::<u8>(), 4), b in proptest::collection::vec(any::<u8>(), 4)) {
        let mut ab = Digest::zero(4);
        ab.add(&a);
        ab.add(&b);
        let mut ba = Digest::zero(4);
        ba.add(&b);
        ba.add(&a);
        prop_assert_eq!(ab.to_hex_with_extra(), ba.to_hex_with_extra());
        prop_assert_eq!(ab.count(), 2);
    }

    #[test]
    fn written_lines_parse_back(name in "[a-zA-Z0-9_][a-zA-Z0-9 ._-]{0,18}[a-zA-Z0-9_]", data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut state = HashState::new(HashMethod::Sha1);
        state.update(&data);
        let digest = state.digest();
        let mut writer = ChecksumWriter::new(Vec::new(), HashMethod::Sha1);
        writer.write_entry(&name, &digest, None).unwrap();
        let listing = writer.into_inner().unwrap();

        let parsed = archkit::hash::ChecksumFile::parse(&listing, None).unwrap();
        prop_assert_eq!(parsed.entries.len(), 1);
        prop_assert_eq!(&parsed.entries[0].name, &name);
        prop_assert_eq!(parsed.entries[0].digest.as_bytes(), digest.as_bytes());
    }

    #[test]
    fn ihex_blocks_keep_address_and_data(address in 0u16..0xF000, data in proptest::collection::vec(any::<u8>(), 1..=32)) {
        let mut archive = common::open(common::ihex(&[(address, &data[..])]));
        prop_assert_eq!(archive.len(), 1);
        prop_assert_eq!(archive.items()[0].offset, Some(address as u64));
        prop_assert_eq!(archive.read_item(0).unwrap(), data);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        if let Ok(mut archive) = Archive::open(Cursor::new(data)) {
            let _ = archive.test(SelectAll, &TestOptions::new());
        }
    }

    #[test]
    fn corrupted_lzh_never_panics(flips in proptest::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 1..8)) {
        let mut bytes = common::lzh(&[("dir/a.txt", b"alpha"), ("b|../b", b""), ("c.bin", &[3u8; 64])]);
        for (at, value) in flips {
            let i = at.index(bytes.len());
            bytes[i] ^= value;
        }
        if let Ok(mut archive) = Archive::open(Cursor::new(bytes)) {
            let _ = archive.extract_to_sink(&mut MemorySink::new(), SelectAll, &ExtractOptions::new());
        }
    }

    #[test]
    fn corrupted_fat_never_panics(flips in proptest::collection::vec((0usize..4096, any::<u8>()), 1..16)) {
        let mut img = common::FatImage::new();
        img.root(0, &common::fat_entry(b"A       TXT", common::ATTR_ARCHIVE, 2, 600));
        img.fat(2, 3).fat(3, 0xFFF);
        let mut bytes = img.finish();
        for (i, value) in flips {
            bytes[i] ^= value;
        }
        if let Ok(mut archive) = Archive::open(Cursor::new(bytes)) {
            let _ = archive.test(SelectAll, &TestOptions::new());
        }
    }
}

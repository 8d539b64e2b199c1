mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{TestEntry, build_zip, hello_world, split_at};
use dunzip::{Error, ExtractOptions, Extraction, LogProgress, Phase, VolumeMode, extract};

fn options(chunk_size: usize) -> ExtractOptions {
    ExtractOptions {
        chunk_size,
        ..ExtractOptions::default()
    }
}

fn assert_hello_world(root: &Path) {
    assert_eq!(fs::read(root.join("a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(root.join("dir").join("b.txt")).unwrap(), b"world");
}

fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 16) as u8 + b'a'
        })
        .collect()
}

#[test]
fn single_archive_is_extracted_and_consumed() {
    let temp_dir = tempfile::Builder::new()
        .prefix("dunzip-test-single-")
        .tempdir()
        .expect("Failed to create temp dir");
    let archive = temp_dir.path().join("hello.zip");
    fs::write(&archive, build_zip(&hello_world())).unwrap();

    let result = extract(&archive, options(7)).expect("extraction failed");

    assert_eq!(result.files, 2);
    assert_eq!(result.bytes, 10);
    assert_hello_world(&temp_dir.path().join("hello"));
    assert!(!archive.exists(), "consumed archive should be removed");
}

#[test]
fn large_entries_survive_small_chunks() {
    let temp_dir = tempfile::tempdir().unwrap();
    let archive = temp_dir.path().join("big.zip");
    let body = noise(200_000);
    fs::write(
        &archive,
        build_zip(&[
            TestEntry::deflated("big/packed.bin", &body),
            TestEntry::stored("big/raw.bin", &body[..70_000]),
        ]),
    )
    .unwrap();
    let archive_len = fs::metadata(&archive).unwrap().len();

    let progress = Arc::new(LogProgress::new(Some(archive_len)));
    let mut extraction = Extraction::prepare(&archive, options(4096))
        .unwrap()
        .with_progress(progress.clone());
    let result = extraction.run().unwrap();

    assert_eq!(extraction.phase(), Phase::Done);
    assert_eq!(result.files, 2);
    assert_eq!(result.bytes, 270_000);
    assert_eq!(progress.read_bytes(), archive_len);
    assert_eq!(progress.written_bytes(), 270_000);
    let root = temp_dir.path().join("big").join("big");
    assert_eq!(fs::read(root.join("packed.bin")).unwrap(), body);
    assert_eq!(fs::read(root.join("raw.bin")).unwrap(), &body[..70_000]);
}

#[test]
fn split_archive_is_extracted_and_every_volume_removed() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bytes = build_zip(&hello_world());
    let parts = split_at(&bytes, &[25, 70]);

    let mut first = b"PK\x07\x08".to_vec();
    first.extend_from_slice(&parts[0]);
    let volumes = [
        (temp_dir.path().join("base.z01"), first),
        (temp_dir.path().join("base.z02"), parts[1].clone()),
        (temp_dir.path().join("base.zip"), parts[2].clone()),
    ];
    for (path, data) in &volumes {
        fs::write(path, data).unwrap();
    }

    let result = extract(&temp_dir.path().join("base.zip"), options(5)).unwrap();

    assert_eq!(result.files, 2);
    assert_eq!(result.bytes, 10);
    assert_hello_world(&temp_dir.path().join("base"));
    for (path, _) in &volumes {
        assert!(!path.exists(), "{} should be removed", path.display());
    }
}

#[test]
fn numbered_volumes_are_streamed_in_order() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bytes = build_zip(&hello_world());
    for (i, part) in split_at(&bytes, &[40, 90]).into_iter().enumerate() {
        fs::write(temp_dir.path().join(format!("data.zip.{:03}", i + 1)), part).unwrap();
    }

    let second = temp_dir.path().join("data.zip.002");
    let mut extraction = Extraction::prepare(&second, options(64)).unwrap();
    assert!(matches!(extraction.archive(), dunzip::Archive::MultiVolume { .. }));
    extraction.run().unwrap();

    assert_hello_world(&temp_dir.path().join("data"));
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
}

#[test]
fn split_archive_with_a_missing_volume_is_not_touched() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bytes = build_zip(&hello_world());
    let parts = split_at(&bytes, &[25, 70]);
    let mut first = b"PK\x07\x08".to_vec();
    first.extend_from_slice(&parts[0]);
    let z01 = temp_dir.path().join("base.z01");
    let last = temp_dir.path().join("base.zip");
    fs::write(&z01, &first).unwrap();
    fs::write(&last, &parts[2]).unwrap();

    let err = extract(&last, options(5)).unwrap_err();

    assert!(matches!(err, Error::Argument(_)), "unexpected error: {err}");
    assert_eq!(fs::read(&z01).unwrap(), first);
    assert_eq!(fs::read(&last).unwrap(), parts[2]);
    assert!(!temp_dir.path().join("base").exists());
}

#[test]
fn volume_names_match_case_insensitively() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bytes = build_zip(&hello_world());
    let parts = split_at(&bytes, &[50]);
    let mut first = b"PK\x07\x08".to_vec();
    first.extend_from_slice(&parts[0]);
    fs::write(temp_dir.path().join("BASE.Z01"), first).unwrap();
    fs::write(temp_dir.path().join("base.ZIP"), &parts[1]).unwrap();

    let result = extract(&temp_dir.path().join("base.ZIP"), options(16)).unwrap();

    assert_eq!(result.files, 2);
    assert_hello_world(&temp_dir.path().join("base"));
    assert!(!temp_dir.path().join("BASE.Z01").exists());
    assert!(!temp_dir.path().join("base.ZIP").exists());
}

#[test]
fn directory_markers_only_create_directories() {
    let temp_dir = tempfile::tempdir().unwrap();
    let archive = temp_dir.path().join("tree.zip");
    fs::write(
        &archive,
        build_zip(&[
            TestEntry::dir("empty/"),
            TestEntry::dir("docs/"),
            TestEntry::stored("docs/readme.txt", b"read me"),
        ]),
    )
    .unwrap();

    let result = extract(&archive, options(9)).unwrap();

    let root = temp_dir.path().join("tree");
    assert!(root.join("empty").is_dir());
    assert_eq!(fs::read_dir(root.join("empty")).unwrap().count(), 0);
    assert_eq!(fs::read(root.join("docs").join("readme.txt")).unwrap(), b"read me");
    assert_eq!(result.files, 1);
    assert_eq!(result.directories, 2);
}

#[test]
fn output_dir_overrides_the_root() {
    let temp_dir = tempfile::tempdir().unwrap();
    let archive = temp_dir.path().join("hello.zip");
    fs::write(&archive, build_zip(&hello_world())).unwrap();
    let out = temp_dir.path().join("elsewhere").join("out");

    let opts = ExtractOptions {
        output_dir: Some(out.clone()),
        ..options(32)
    };
    extract(&archive, opts).unwrap();

    assert_hello_world(&out);
    assert!(!temp_dir.path().join("hello").exists());
}

#[test]
fn forced_single_mode_leaves_siblings_alone() {
    let temp_dir = tempfile::tempdir().unwrap();
    let archive = temp_dir.path().join("set.zip");
    fs::write(&archive, build_zip(&hello_world())).unwrap();
    fs::write(temp_dir.path().join("set.z01"), b"unrelated").unwrap();

    let opts = ExtractOptions {
        mode: VolumeMode::Single,
        ..options(32)
    };
    extract(&archive, opts).unwrap();

    assert_hello_world(&temp_dir.path().join("set"));
    assert_eq!(fs::read(temp_dir.path().join("set.z01")).unwrap(), b"unrelated");
}

#[test]
fn zero_chunk_size_leaves_the_archive_untouched() {
    let temp_dir = tempfile::tempdir().unwrap();
    let archive = temp_dir.path().join("hello.zip");
    let bytes = build_zip(&hello_world());
    fs::write(&archive, &bytes).unwrap();

    let err = extract(&archive, options(0)).unwrap_err();

    assert!(matches!(err, Error::Argument(_)));
    assert_eq!(fs::read(&archive).unwrap(), bytes);
    assert!(!temp_dir.path().join("hello").exists());
}

#[test]
fn truncated_archive_fails_and_keeps_partial_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let archive = temp_dir.path().join("cut.zip");
    let bytes = build_zip(&[
        TestEntry::stored("first.txt", b"complete"),
        TestEntry::stored("second.txt", b"never finished"),
    ]);
    // first entry: 30 + 9 + 8 bytes; keep 4 bytes of the second entry's data
    let keep = 47 + 30 + 10 + 4;
    fs::write(&archive, &bytes[..keep]).unwrap();

    let mut extraction = Extraction::prepare(&archive, options(16)).unwrap();
    let err = extraction.run().unwrap_err();

    assert!(matches!(err, Error::Corrupt(_)), "unexpected error: {err}");
    assert_eq!(extraction.phase(), Phase::Failed);
    let root = temp_dir.path().join("cut");
    assert_eq!(fs::read(root.join("first.txt")).unwrap(), b"complete");
    assert_eq!(fs::read(root.join("second.txt")).unwrap(), b"neve");
    assert!(archive.exists(), "failed runs do not delete the archive");
}

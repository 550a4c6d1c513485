//! End-to-end scenarios driving `FSCore` the way a mounted filesystem would
//! be driven, through a single backing file per test.

use bfs_core::layout::{DIRECT_BLOCKS, BLOCK_SIZE, MAX_FILES, MAX_FILE_SIZE};
use bfs_core::{format, FSCore};
use tempfile::NamedTempFile;

fn fresh_mount() -> (FSCore, NamedTempFile) {
    let tmp = NamedTempFile::new().unwrap();
    format::format(tmp.path()).unwrap();
    (FSCore::mount(tmp.path()).unwrap(), tmp)
}

#[test]
fn format_then_mount_readdir_root_has_dot_and_dotdot() {
    let (fs, _tmp) = fresh_mount();
    let entries = fs.readdir("/").unwrap();
    assert_eq!(entries, vec![(".".to_string(), 1), ("..".to_string(), 1)]);
}

#[test]
fn create_write_read_getattr_roundtrip() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    let n = fs.write("/a", 0, b"hello").unwrap();
    assert_eq!(n, 5);

    let mut out = [0u8; 5];
    let r = fs.read("/a", 0, &mut out).unwrap();
    assert_eq!(r, 5);
    assert_eq!(&out, b"hello");
    assert_eq!(fs.getattr("/a").unwrap().size, 5);
}

#[test]
fn create_duplicate_name_is_exists() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    let err = fs.create("/a", 0o644).unwrap_err();
    assert_eq!(err.errno(), -libc::EEXIST);
}

#[test]
fn full_direct_write_uses_only_direct_pointers() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    let data = vec![b'x'; DIRECT_BLOCKS * BLOCK_SIZE];
    fs.write("/a", 0, &data).unwrap();
    assert_eq!(fs.getattr("/a").unwrap().size, (DIRECT_BLOCKS * BLOCK_SIZE) as u64);

    let mut out = vec![0u8; data.len()];
    fs.read("/a", 0, &mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn write_past_direct_range_allocates_indirect_and_leaves_a_zero_hole() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    let boundary = (DIRECT_BLOCKS * BLOCK_SIZE) as u64;
    let n = fs.write("/a", boundary, b"Z").unwrap();
    assert_eq!(n, 1);
    assert_eq!(fs.getattr("/a").unwrap().size, boundary + 1);

    let mut hole = vec![0xffu8; DIRECT_BLOCKS * BLOCK_SIZE];
    let r = fs.read("/a", 0, &mut hole).unwrap();
    assert_eq!(r, hole.len());
    assert!(hole.iter().all(|&b| b == 0));
}

#[test]
fn rename_moves_entry_and_rejects_existing_target() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    fs.rename("/a", "/b").unwrap();
    assert!(fs.getattr("/a").is_err());
    assert!(fs.getattr("/b").is_ok());

    let entries = fs.readdir("/").unwrap();
    assert!(entries.iter().any(|(n, _)| n.as_str() == "b"));
    assert!(!entries.iter().any(|(n, _)| n.as_str() == "a"));

    fs.create("/c", 0o644).unwrap();
    let err = fs.rename("/b", "/c").unwrap_err();
    assert_eq!(err.errno(), -libc::EEXIST);
}

#[test]
fn creating_past_max_files_is_no_space() {
    let (mut fs, _tmp) = fresh_mount();
    for i in 0..(MAX_FILES - 1) {
        fs.create(&format!("/f{i:03}"), 0o644).unwrap();
    }
    let err = fs.create("/f127", 0o644).unwrap_err();
    assert_eq!(err.errno(), -libc::ENOSPC);
}

#[test]
fn write_at_max_file_size_boundary_succeeds_one_byte_over_fails() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    let n = fs.write("/a", MAX_FILE_SIZE - 1, b"x").unwrap();
    assert_eq!(n, 1);
    assert_eq!(fs.getattr("/a").unwrap().size, MAX_FILE_SIZE);

    let err = fs.write("/a", MAX_FILE_SIZE, b"x").unwrap_err();
    assert_eq!(err.errno(), -libc::EFBIG);
}

#[test]
fn unlink_then_recreate_yields_empty_file() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    fs.write("/a", 0, b"some data").unwrap();
    fs.unlink("/a").unwrap();

    fs.create("/a", 0o644).unwrap();
    let mut out = [0u8; 16];
    let r = fs.read("/a", 0, &mut out).unwrap();
    assert_eq!(r, 0);
    assert_eq!(fs.getattr("/a").unwrap().size, 0);
}

#[test]
fn unlink_reclaims_blocks_for_later_allocations() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    fs.write("/a", 0, &vec![1u8; DIRECT_BLOCKS * BLOCK_SIZE]).unwrap();
    fs.unlink("/a").unwrap();

    fs.create("/b", 0o644).unwrap();
    fs.write("/b", 0, &vec![2u8; DIRECT_BLOCKS * BLOCK_SIZE]).unwrap();
    let mut out = vec![0u8; DIRECT_BLOCKS * BLOCK_SIZE];
    fs.read("/b", 0, &mut out).unwrap();
    assert!(out.iter().all(|&b| b == 2));
}

#[test]
fn mount_unmount_remount_preserves_directory_and_file_state() {
    let tmp = NamedTempFile::new().unwrap();
    format::format(tmp.path()).unwrap();

    let mut fs = FSCore::mount(tmp.path()).unwrap();
    fs.create("/a", 0o600).unwrap();
    fs.write("/a", 0, b"persisted across remount").unwrap();
    let before = fs.getattr("/a").unwrap();
    fs.unmount().unwrap();

    let fs2 = FSCore::mount(tmp.path()).unwrap();
    let after = fs2.getattr("/a").unwrap();
    assert_eq!(before.size, after.size);
    assert_eq!(before.mtime, after.mtime);
    let mut out = vec![0u8; after.size as usize];
    fs2.read("/a", 0, &mut out).unwrap();
    assert_eq!(&out, b"persisted across remount");
}

#[test]
fn access_and_open_are_existence_checks_only() {
    let (mut fs, _tmp) = fresh_mount();
    assert!(fs.access("/").is_ok());
    assert!(fs.access("/missing").is_err());

    fs.create("/a", 0o644).unwrap();
    assert!(fs.open("/a").is_ok());
    assert!(fs.open("/missing").is_err());
    assert!(fs.release("/a").is_ok());
}

#[test]
fn utimens_updates_reported_timestamps() {
    let (mut fs, _tmp) = fresh_mount();
    fs.create("/a", 0o644).unwrap();
    fs.utimens("/a", 12345, 67890).unwrap();
    let attr = fs.getattr("/a").unwrap();
    assert_eq!(attr.atime, 12345);
    assert_eq!(attr.mtime, 67890);
}

//! Writes a fresh, valid, empty image to a backing file.
//!
//! Exposed as a library function so both the `mkbfs` binary and the
//! integration tests can format a scratch file without shelling out.

use std::path::Path;

use crate::alloc::Allocator;
use crate::block_device::BlockDevice;
use crate::directory::{DirectoryTable, FileName};
use crate::error::FsError;
use crate::inode::{Inode, InodeTable};
use crate::layout::{BLOCK_SIZE, DATA_START, ROOT_DIR_START, ROOT_DIR_MODE, ROOT_INODE_NUM, TOTAL_BLOCKS};
use crate::superblock::Superblock;
use crate::util::now_secs;

/// Creates (or overwrites) the backing file at `path` and writes a fresh,
/// valid, empty filesystem image to it.
pub fn format(path: &Path) -> Result<(), FsError> {
    let mut dev = BlockDevice::create(path)?;

    Superblock::fresh().write(&mut dev)?;

    let alloc = Allocator::fresh();
    // `Allocator::fresh` already reflects the formatted state in memory;
    // persisting here writes it to the two bitmap regions.
    persist_fresh_allocator(&alloc, &mut dev)?;

    let timestamp = now_secs();
    let mut inodes = InodeTable::empty();
    *inodes.get_mut(ROOT_INODE_NUM) = Inode {
        size_bytes: 0,
        direct: [ROOT_DIR_START, ROOT_DIR_START + 1, 0, 0, 0, 0, 0, 0],
        indirect: 0,
        ctime: timestamp,
        mtime: timestamp,
        perms: ROOT_DIR_MODE,
        refcount: 2,
    };
    inodes.flush_all(&mut dev)?;

    let mut dir = DirectoryTable::empty();
    let dot = unchecked_name(".");
    let dotdot = unchecked_name("..");
    dir.set(0, dot, ROOT_INODE_NUM);
    dir.set(1, dotdot, ROOT_INODE_NUM);
    dir.flush(&mut dev)?;

    zero_data_region(&mut dev)?;

    dev.sync()?;
    Ok(())
}

/// `.`/`..` are not valid [`FileName`]s under the bridge-facing validation
/// rules (they are not ordinary basenames), but the on-disk format only
/// requires the raw bytes, so this builds the field directly rather than
/// widening `FileName::new`'s contract for two fixed, formatter-only names.
fn unchecked_name(s: &str) -> FileName {
    // `FileName::new` only rejects empty/oversized/NUL/`/` names, all of
    // which "." and ".." safely clear.
    FileName::new(s).expect("formatter-only name must validate")
}

fn persist_fresh_allocator(alloc: &Allocator, dev: &mut BlockDevice) -> Result<(), FsError> {
    use crate::layout::{DATA_BITMAP_START, INODE_BITMAP_BLOCK};
    let data_bytes = alloc.data_bitmap().as_bytes();
    for (b, chunk) in data_bytes.chunks(BLOCK_SIZE).enumerate() {
        dev.write_block(DATA_BITMAP_START + b as u32, chunk)?;
    }
    dev.write_block(INODE_BITMAP_BLOCK, alloc.inode_bitmap().as_bytes())
}

fn zero_data_region(dev: &mut BlockDevice) -> Result<(), FsError> {
    let zero = [0u8; BLOCK_SIZE];
    for b in DATA_START..TOTAL_BLOCKS {
        dev.write_block(b, &zero)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layout::{DATA_BITMAP_START, INODE_BITMAP_BLOCK, INODE_TABLE_START};
    use tempfile::NamedTempFile;

    #[test]
    fn fresh_image_has_valid_superblock() {
        let tmp = NamedTempFile::new().unwrap();
        format(tmp.path()).unwrap();
        let mut dev = BlockDevice::open(tmp.path()).unwrap();
        let sb = Superblock::load(&mut dev).unwrap();
        assert_eq!(sb, Superblock::fresh());
    }

    #[test]
    fn fresh_image_root_directory_has_dot_and_dotdot() {
        let tmp = NamedTempFile::new().unwrap();
        format(tmp.path()).unwrap();
        let mut dev = BlockDevice::open(tmp.path()).unwrap();
        let dir = DirectoryTable::load(&mut dev).unwrap();
        let entries: Vec<_> = dir.live_entries().map(|(n, i)| (n.as_str().to_string(), i)).collect();
        assert_eq!(entries, vec![(".".to_string(), 1), ("..".to_string(), 1)]);
    }

    #[test]
    fn fresh_image_reserves_metadata_in_bitmap() {
        let tmp = NamedTempFile::new().unwrap();
        format(tmp.path()).unwrap();
        let mut dev = BlockDevice::open(tmp.path()).unwrap();
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(DATA_BITMAP_START, &mut buf).unwrap();
        assert_eq!(buf[0], 0xff);

        let mut inode_buf = [0u8; BLOCK_SIZE];
        dev.read_block(INODE_BITMAP_BLOCK, &mut inode_buf).unwrap();
        assert_eq!(inode_buf[0] & 1, 1);
    }

    #[test]
    fn fresh_image_root_inode_has_expected_fields() {
        let tmp = NamedTempFile::new().unwrap();
        format(tmp.path()).unwrap();
        let mut dev = BlockDevice::open(tmp.path()).unwrap();
        let table = InodeTable::load(&mut dev).unwrap();
        let root = table.get(ROOT_INODE_NUM);
        assert_eq!(root.refcount, 2);
        assert_eq!(root.perms, ROOT_DIR_MODE);
        assert_eq!(root.direct[0], ROOT_DIR_START);
        assert_eq!(root.direct[1], ROOT_DIR_START + 1);
        let _ = INODE_TABLE_START;
    }
}

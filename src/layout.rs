//! Fixed on-disk layout parameters.
//!
//! These are compile-time constants rather than superblock-derived values:
//! this layout never resizes, and fixing the numbers lets every other
//! module validate pointers with plain range checks.

/// Size in bytes of every block, including metadata blocks.
pub const BLOCK_SIZE: usize = 4096;

/// Total number of blocks in a freshly formatted image (16 MiB backing file).
pub const TOTAL_BLOCKS: u32 = 4096;

/// Number of inodes the inode table can hold.
pub const MAX_FILES: usize = 128;

/// Width in bytes of a directory entry's name field, NUL-terminated.
pub const FILENAME_LEN: usize = 48;

/// Longest name payload a [`crate::directory::FileName`] may hold (`FILENAME_LEN - 1`,
/// leaving room for the trailing NUL).
pub const MAX_NAME_LEN: usize = FILENAME_LEN - 1;

/// Number of direct block pointers stored inline in an inode.
pub const DIRECT_BLOCKS: usize = 8;

/// Number of block ids an indirect block can hold (`BLOCK_SIZE / 4`).
pub const INDIRECT_CAPACITY: usize = BLOCK_SIZE / 4;

/// Largest byte offset a file may reach.
pub const MAX_FILE_SIZE: u64 = ((DIRECT_BLOCKS + INDIRECT_CAPACITY) * BLOCK_SIZE) as u64;

/// Block index of the superblock.
pub const SUPERBLOCK_BLOCK: u32 = 0;

/// First block of the data-block bitmap (2 blocks, 65536 bits).
pub const DATA_BITMAP_START: u32 = 1;
/// Number of blocks occupied by the data-block bitmap.
pub const DATA_BITMAP_BLOCKS: u32 = 2;

/// Block holding the inode bitmap (first `MAX_FILES` bits meaningful).
pub const INODE_BITMAP_BLOCK: u32 = 3;

/// First block of the inode table.
pub const INODE_TABLE_START: u32 = 4;
/// Number of blocks occupied by the inode table.
pub const INODE_TABLE_BLOCKS: u32 = 8;

/// First block of the root directory table.
pub const ROOT_DIR_START: u32 = 12;
/// Number of blocks occupied by the root directory table.
pub const ROOT_DIR_BLOCKS: u32 = 2;

/// First block index available for file data.
pub const DATA_START: u32 = 14;

/// Number of metadata blocks reserved at format time (`[0, DATA_START)`).
pub const METADATA_BLOCKS: u32 = DATA_START;

/// The root directory's fixed inode number.
pub const ROOT_INODE_NUM: u32 = 1;

/// Mode bits reported for the (single, synthetic) root directory.
pub const ROOT_DIR_MODE: u16 = 0o755;

/// Default permission bits a freshly created regular file receives when the
/// bridge does not specify any.
pub const DEFAULT_FILE_MODE: u16 = 0o644;

/// Number of inode records packed into each inode-table block.
///
/// Chosen so that `INODES_PER_BLOCK * INODE_TABLE_BLOCKS == MAX_FILES`
/// exactly; the on-disk record size (see `inode::INODE_RECORD_SIZE`) is
/// derived from this rather than the other way around.
pub const INODES_PER_BLOCK: usize = MAX_FILES / INODE_TABLE_BLOCKS as usize;

/// Number of directory entries packed into each root-directory block.
///
/// Chosen so that `ENTRIES_PER_BLOCK * ROOT_DIR_BLOCKS == MAX_FILES`: one
/// slot per possible inode.
pub const ENTRIES_PER_BLOCK: usize = MAX_FILES / ROOT_DIR_BLOCKS as usize;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn max_file_size_matches_pointer_budget() {
        assert_eq!(MAX_FILE_SIZE, (8 + 1024) * 4096);
    }

    #[test]
    fn data_region_starts_after_metadata() {
        assert_eq!(DATA_START, ROOT_DIR_START + ROOT_DIR_BLOCKS);
        assert_eq!(METADATA_BLOCKS, 14);
    }
}

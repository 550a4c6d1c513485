//! The layout descriptor written once at format time.

use crate::block_device::BlockDevice;
use crate::error::FsError;
use crate::layout::{BLOCK_SIZE, MAX_FILES, ROOT_DIR_START, SUPERBLOCK_BLOCK, TOTAL_BLOCKS};

/// Immutable-after-format layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub total_blocks: u32,
    pub block_size: u32,
    pub inode_count: u32,
    pub root_dir_block: u32,
}

impl Superblock {
    /// The superblock written by the formatter for a fresh image.
    pub fn fresh() -> Self {
        Self {
            total_blocks: TOTAL_BLOCKS,
            block_size: BLOCK_SIZE as u32,
            inode_count: MAX_FILES as u32,
            root_dir_block: ROOT_DIR_START,
        }
    }

    fn encode(&self, out: &mut [u8]) {
        out.fill(0);
        out[0..4].copy_from_slice(&self.total_blocks.to_le_bytes());
        out[4..8].copy_from_slice(&self.block_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.inode_count.to_le_bytes());
        out[12..16].copy_from_slice(&self.root_dir_block.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            total_blocks: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            block_size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            inode_count: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            root_dir_block: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }

    /// Reads and validates the superblock from `dev`.
    pub fn load(dev: &mut BlockDevice) -> Result<Self, FsError> {
        let mut block_buf = [0u8; BLOCK_SIZE];
        dev.read_block(SUPERBLOCK_BLOCK, &mut block_buf)?;
        let sb = Self::decode(&block_buf);

        if sb.block_size != BLOCK_SIZE as u32 {
            return Err(FsError::Invalid(format!(
                "superblock block_size {} != expected {BLOCK_SIZE}",
                sb.block_size
            )));
        }
        if sb.total_blocks < TOTAL_BLOCKS {
            return Err(FsError::Invalid(format!(
                "superblock total_blocks {} < required {TOTAL_BLOCKS}",
                sb.total_blocks
            )));
        }
        if sb.inode_count != MAX_FILES as u32 {
            return Err(FsError::Invalid(format!(
                "superblock inode_count {} != expected {MAX_FILES}",
                sb.inode_count
            )));
        }

        Ok(sb)
    }

    /// Writes the superblock to block 0, used only by the formatter.
    pub fn write(&self, dev: &mut BlockDevice) -> Result<(), FsError> {
        let mut block_buf = [0u8; BLOCK_SIZE];
        self.encode(&mut block_buf);
        dev.write_block(SUPERBLOCK_BLOCK, &block_buf)
    }
}

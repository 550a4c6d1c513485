//! Free-space management over the two bitmaps.
//!
//! `Allocator` owns the two [`BitVector`]s directly; `FSCore` owns the
//! [`BlockDevice`] and passes it in for each call that needs to persist a
//! bitmap block, avoiding a self-referential struct while keeping a clean
//! "allocator mutates the bitmaps, caller supplies the device" split.

use crate::bitvector::BitVector;
use crate::block_device::BlockDevice;
use crate::error::{FsError, NoSpaceKind};
use crate::layout::{
    BLOCK_SIZE, DATA_BITMAP_BLOCKS, DATA_BITMAP_START, DATA_START, INODE_BITMAP_BLOCK, MAX_FILES,
    METADATA_BLOCKS, TOTAL_BLOCKS,
};

/// Number of bits the on-disk data bitmap spans (2 blocks = 65536 bits).
const DATA_BITMAP_BITS: usize = DATA_BITMAP_BLOCKS as usize * BLOCK_SIZE * 8;
/// Number of bits the on-disk inode bitmap spans (1 block).
const INODE_BITMAP_BITS: usize = BLOCK_SIZE * 8;

pub struct Allocator {
    data_bitmap: BitVector,
    inode_bitmap: BitVector,
}

impl Allocator {
    /// Builds the allocator over a freshly formatted bitmap state: blocks
    /// `[0, DATA_START)` reserved in the data bitmap, bit 0 (inode #1, the
    /// root) set in the inode bitmap.
    pub fn fresh() -> Self {
        let mut data_bitmap = BitVector::new(DATA_BITMAP_BITS);
        for b in 0..METADATA_BLOCKS {
            data_bitmap.set(b as usize);
        }
        let mut inode_bitmap = BitVector::new(INODE_BITMAP_BITS);
        inode_bitmap.set(0);
        Self {
            data_bitmap,
            inode_bitmap,
        }
    }

    /// Loads both bitmaps from disk at mount.
    pub fn load(dev: &mut BlockDevice) -> Result<Self, FsError> {
        let mut data_bytes = Vec::with_capacity(DATA_BITMAP_BLOCKS as usize * BLOCK_SIZE);
        for b in 0..DATA_BITMAP_BLOCKS {
            let mut block_buf = [0u8; BLOCK_SIZE];
            dev.read_block(DATA_BITMAP_START + b, &mut block_buf)?;
            data_bytes.extend_from_slice(&block_buf);
        }
        let data_bitmap = BitVector::from_bytes(data_bytes, DATA_BITMAP_BITS);

        let mut inode_buf = [0u8; BLOCK_SIZE];
        dev.read_block(INODE_BITMAP_BLOCK, &mut inode_buf)?;
        let inode_bitmap = BitVector::from_bytes(inode_buf.to_vec(), INODE_BITMAP_BITS);

        Ok(Self {
            data_bitmap,
            inode_bitmap,
        })
    }

    pub fn data_bitmap(&self) -> &BitVector {
        &self.data_bitmap
    }

    pub fn inode_bitmap(&self) -> &BitVector {
        &self.inode_bitmap
    }

    /// Persists both bitmaps, used at unmount alongside the per-call eager
    /// persistence each allocation/free already performs.
    pub fn flush(&self, dev: &mut BlockDevice) -> Result<(), FsError> {
        self.persist_data_bitmap(dev)?;
        self.persist_inode_bitmap(dev)
    }

    /// Persists both data-bitmap blocks.
    fn persist_data_bitmap(&self, dev: &mut BlockDevice) -> Result<(), FsError> {
        let bytes = self.data_bitmap.as_bytes();
        for b in 0..DATA_BITMAP_BLOCKS as usize {
            let start = b * BLOCK_SIZE;
            dev.write_block(DATA_BITMAP_START + b as u32, &bytes[start..start + BLOCK_SIZE])?;
        }
        Ok(())
    }

    /// Persists the inode-bitmap block.
    fn persist_inode_bitmap(&self, dev: &mut BlockDevice) -> Result<(), FsError> {
        dev.write_block(INODE_BITMAP_BLOCK, self.inode_bitmap.as_bytes())
    }

    /// Allocates the lowest free data block in `[DATA_START, TOTAL_BLOCKS)`,
    /// persists the bitmap change, and returns its id.
    pub fn alloc_data_block(&mut self, dev: &mut BlockDevice) -> Result<u32, FsError> {
        let idx = self
            .data_bitmap
            .find_first_clear(DATA_START as usize, TOTAL_BLOCKS as usize)
            .ok_or(FsError::NoSpace(NoSpaceKind::DataBlocks))?;
        self.data_bitmap.set(idx);
        self.persist_data_bitmap(dev)?;
        Ok(idx as u32)
    }

    /// Frees data block `id`. A no-op if `id` falls outside the data
    /// region (covers `id == 0`, meaning "no block", transparently).
    pub fn free_data_block(&mut self, id: u32, dev: &mut BlockDevice) -> Result<(), FsError> {
        if id < DATA_START || id >= TOTAL_BLOCKS {
            return Ok(());
        }
        self.data_bitmap.clear(id as usize);
        self.persist_data_bitmap(dev)
    }

    /// Allocates the lowest free inode number in `1..=MAX_FILES`, persists
    /// the bitmap change, and returns it.
    pub fn alloc_inode(&mut self, dev: &mut BlockDevice) -> Result<u32, FsError> {
        let idx = self
            .inode_bitmap
            .find_first_clear(0, MAX_FILES)
            .ok_or(FsError::NoSpace(NoSpaceKind::Inodes))?;
        self.inode_bitmap.set(idx);
        self.persist_inode_bitmap(dev)?;
        Ok(idx as u32 + 1)
    }

    /// Frees inode number `n` (1-based).
    pub fn free_inode(&mut self, n: u32, dev: &mut BlockDevice) -> Result<(), FsError> {
        if n == 0 || n as usize > MAX_FILES {
            return Ok(());
        }
        self.inode_bitmap.clear(n as usize - 1);
        self.persist_inode_bitmap(dev)
    }
}

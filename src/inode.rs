//! Inode records and the in-memory inode table.
//!
//! Records are encoded to a fixed little-endian byte layout rather than
//! reinterpreted from a `#[repr(C, packed)]` struct, so the image is
//! portable across host architectures.

use crate::block_device::BlockDevice;
use crate::error::FsError;
use crate::layout::{
    BLOCK_SIZE, DIRECT_BLOCKS, INODES_PER_BLOCK, INODE_TABLE_START, MAX_FILES,
};

/// On-disk size of one inode record. `BLOCK_SIZE / INODES_PER_BLOCK`, chosen
/// so a record packs with no cross-block straddling and no wasted tail.
pub const INODE_RECORD_SIZE: usize = BLOCK_SIZE / INODES_PER_BLOCK;

/// A block id of `0` means "unallocated" throughout this crate.
pub const UNALLOCATED: u32 = 0;

/// One file's metadata: size, pointers, timestamps, mode and link count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub size_bytes: u32,
    pub direct: [u32; DIRECT_BLOCKS],
    pub indirect: u32,
    pub ctime: i64,
    pub mtime: i64,
    pub perms: u16,
    pub refcount: i32,
}

impl Inode {
    /// The all-zero, unallocated inode record.
    pub const fn empty() -> Self {
        Self {
            size_bytes: 0,
            direct: [0; DIRECT_BLOCKS],
            indirect: 0,
            ctime: 0,
            mtime: 0,
            perms: 0,
            refcount: 0,
        }
    }

    /// Encodes the inode into its fixed-width little-endian on-disk record.
    fn encode(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), INODE_RECORD_SIZE);
        out.fill(0);
        out[0..4].copy_from_slice(&self.size_bytes.to_le_bytes());
        for (i, ptr) in self.direct.iter().enumerate() {
            let off = 4 + i * 4;
            out[off..off + 4].copy_from_slice(&ptr.to_le_bytes());
        }
        let off = 4 + DIRECT_BLOCKS * 4;
        out[off..off + 4].copy_from_slice(&self.indirect.to_le_bytes());
        let off = off + 4;
        out[off..off + 8].copy_from_slice(&self.ctime.to_le_bytes());
        let off = off + 8;
        out[off..off + 8].copy_from_slice(&self.mtime.to_le_bytes());
        let off = off + 8;
        out[off..off + 2].copy_from_slice(&self.perms.to_le_bytes());
        let off = off + 2;
        out[off..off + 4].copy_from_slice(&self.refcount.to_le_bytes());
    }

    /// Decodes an inode from its fixed-width little-endian on-disk record.
    fn decode(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), INODE_RECORD_SIZE);
        let size_bytes = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let mut direct = [0u32; DIRECT_BLOCKS];
        for (i, ptr) in direct.iter_mut().enumerate() {
            let off = 4 + i * 4;
            *ptr = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        let off = 4 + DIRECT_BLOCKS * 4;
        let indirect = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let off = off + 4;
        let ctime = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        let off = off + 8;
        let mtime = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        let off = off + 8;
        let perms = u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());
        let off = off + 2;
        let refcount = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());

        Self {
            size_bytes,
            direct,
            indirect,
            ctime,
            mtime,
            perms,
            refcount,
        }
    }

    /// Whether this record currently describes a live file.
    pub fn is_live(&self) -> bool {
        self.refcount > 0
    }
}

/// The fixed array of `MAX_FILES` inodes, packed into the inode-table
/// blocks in index order.
pub struct InodeTable {
    inodes: [Inode; MAX_FILES],
}

impl InodeTable {
    /// An all-empty table, used before `load` populates it at mount.
    pub fn empty() -> Self {
        Self {
            inodes: [Inode::empty(); MAX_FILES],
        }
    }

    /// Loads every inode-table block from `dev` into memory.
    pub fn load(dev: &mut BlockDevice) -> Result<Self, FsError> {
        let mut inodes = [Inode::empty(); MAX_FILES];
        let mut block_buf = [0u8; BLOCK_SIZE];
        for block_idx in 0..crate::layout::INODE_TABLE_BLOCKS {
            dev.read_block(INODE_TABLE_START + block_idx, &mut block_buf)?;
            for slot in 0..INODES_PER_BLOCK {
                let i = block_idx as usize * INODES_PER_BLOCK + slot;
                let off = slot * INODE_RECORD_SIZE;
                inodes[i] = Inode::decode(&block_buf[off..off + INODE_RECORD_SIZE]);
            }
        }
        Ok(Self { inodes })
    }

    /// Inode number `n` (1-based). Panics if `n` is out of `1..=MAX_FILES`.
    pub fn get(&self, n: u32) -> &Inode {
        assert!((1..=MAX_FILES as u32).contains(&n), "inode number {n} out of range");
        &self.inodes[n as usize - 1]
    }

    /// Mutable access to inode number `n` (1-based).
    pub fn get_mut(&mut self, n: u32) -> &mut Inode {
        assert!((1..=MAX_FILES as u32).contains(&n), "inode number {n} out of range");
        &mut self.inodes[n as usize - 1]
    }

    /// Persists inode number `n`'s record to its containing block.
    ///
    /// The whole containing block is read, patched, and written back: a
    /// block holds `INODES_PER_BLOCK` records, so a single inode write
    /// cannot simply overwrite the block.
    pub fn flush_one(&self, n: u32, dev: &mut BlockDevice) -> Result<(), FsError> {
        assert!((1..=MAX_FILES as u32).contains(&n), "inode number {n} out of range");
        let idx = n as usize - 1;
        let block_idx = idx / INODES_PER_BLOCK;
        let slot = idx % INODES_PER_BLOCK;

        let block_num = INODE_TABLE_START + block_idx as u32;
        let mut block_buf = [0u8; BLOCK_SIZE];
        dev.read_block(block_num, &mut block_buf)?;

        let off = slot * INODE_RECORD_SIZE;
        self.inodes[idx].encode(&mut block_buf[off..off + INODE_RECORD_SIZE]);

        dev.write_block(block_num, &block_buf)
    }

    /// Persists every inode-table block, used at unmount and by tests.
    pub fn flush_all(&self, dev: &mut BlockDevice) -> Result<(), FsError> {
        for block_idx in 0..crate::layout::INODE_TABLE_BLOCKS {
            let mut block_buf = [0u8; BLOCK_SIZE];
            for slot in 0..INODES_PER_BLOCK {
                let i = block_idx as usize * INODES_PER_BLOCK + slot;
                let off = slot * INODE_RECORD_SIZE;
                self.inodes[i].encode(&mut block_buf[off..off + INODE_RECORD_SIZE]);
            }
            dev.write_block(INODE_TABLE_START + block_idx, &block_buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_size_packs_exactly() {
        assert_eq!(INODES_PER_BLOCK * INODE_RECORD_SIZE, BLOCK_SIZE);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let inode = Inode {
            size_bytes: 12345,
            direct: [14, 15, 0, 0, 0, 0, 0, 4095],
            indirect: 20,
            ctime: -1,
            mtime: 1_700_000_000,
            perms: 0o644,
            refcount: 1,
        };
        let mut buf = [0u8; INODE_RECORD_SIZE];
        inode.encode(&mut buf);
        let back = Inode::decode(&buf);
        assert_eq!(inode, back);
    }

    #[test]
    fn empty_inode_is_not_live() {
        assert!(!Inode::empty().is_live());
    }
}

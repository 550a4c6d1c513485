//! Translates `(inode, offset, length)` into block operations through the
//! direct-pointer array plus one level of indirection.

use crate::alloc::Allocator;
use crate::block_device::BlockDevice;
use crate::error::FsError;
use crate::inode::{Inode, InodeTable, UNALLOCATED};
use crate::layout::{BLOCK_SIZE, DIRECT_BLOCKS, INDIRECT_CAPACITY, MAX_FILE_SIZE};

/// A typed view over an indirect block's 1024 4-byte block ids, rather than
/// a raw-pointer cast of the 4096-byte buffer.
struct IndirectBlock {
    entries: [u32; INDIRECT_CAPACITY],
}

impl IndirectBlock {
    fn zeroed() -> Self {
        Self {
            entries: [0; INDIRECT_CAPACITY],
        }
    }

    fn decode(buf: &[u8; BLOCK_SIZE]) -> Self {
        let mut entries = [0u32; INDIRECT_CAPACITY];
        for (i, e) in entries.iter_mut().enumerate() {
            let off = i * 4;
            *e = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        Self { entries }
    }

    fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        for (i, e) in self.entries.iter().enumerate() {
            let off = i * 4;
            buf[off..off + 4].copy_from_slice(&e.to_le_bytes());
        }
        buf
    }

    fn read(dev: &mut BlockDevice, block: u32) -> Result<Self, FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(block, &mut buf)?;
        Ok(Self::decode(&buf))
    }

    fn write(&self, dev: &mut BlockDevice, block: u32) -> Result<(), FsError> {
        dev.write_block(block, &self.encode())
    }
}

/// Resolves the physical block id holding logical block `block_index` of
/// `inode`, without allocating. Returns `UNALLOCATED` for a hole.
fn resolve_read(inode: &Inode, dev: &mut BlockDevice, block_index: usize) -> Result<u32, FsError> {
    if block_index < DIRECT_BLOCKS {
        return Ok(inode.direct[block_index]);
    }
    if inode.indirect == UNALLOCATED {
        return Ok(UNALLOCATED);
    }
    let indirect = IndirectBlock::read(dev, inode.indirect)?;
    Ok(indirect.entries[block_index - DIRECT_BLOCKS])
}

/// Resolves the physical block id holding logical block `block_index` of
/// `inode`, allocating a data block (and the indirect block, if needed)
/// when the slot is currently a hole.
fn resolve_write(
    inode: &mut Inode,
    alloc: &mut Allocator,
    dev: &mut BlockDevice,
    block_index: usize,
) -> Result<u32, FsError> {
    if block_index < DIRECT_BLOCKS {
        if inode.direct[block_index] == UNALLOCATED {
            inode.direct[block_index] = alloc.alloc_data_block(dev)?;
        }
        return Ok(inode.direct[block_index]);
    }

    if inode.indirect == UNALLOCATED {
        let block = alloc.alloc_data_block(dev)?;
        IndirectBlock::zeroed().write(dev, block)?;
        inode.indirect = block;
    }

    let mut indirect = IndirectBlock::read(dev, inode.indirect)?;
    let slot = block_index - DIRECT_BLOCKS;
    if indirect.entries[slot] == UNALLOCATED {
        let block = alloc.alloc_data_block(dev)?;
        indirect.entries[slot] = block;
        indirect.write(dev, inode.indirect)?;
    }
    Ok(indirect.entries[slot])
}

/// Reads up to `buf.len()` bytes of inode `inode_num` starting at `offset`.
///
/// Returns the number of bytes copied. A read starting at or past EOF
/// returns `0`; a read crossing a hole fills that span with zeros rather
/// than failing.
pub fn read(
    table: &InodeTable,
    dev: &mut BlockDevice,
    inode_num: u32,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize, FsError> {
    let inode = table.get(inode_num);
    let size = inode.size_bytes as u64;
    if offset >= size {
        return Ok(0);
    }

    let effective_len = buf.len().min((size - offset) as usize);
    let mut done = 0usize;
    let mut block_buf = [0u8; BLOCK_SIZE];

    while done < effective_len {
        let pos = offset + done as u64;
        let block_index = (pos / BLOCK_SIZE as u64) as usize;
        let in_block_off = (pos % BLOCK_SIZE as u64) as usize;
        let chunk = (BLOCK_SIZE - in_block_off).min(effective_len - done);

        let phys = resolve_read(inode, dev, block_index)?;
        if phys == UNALLOCATED {
            buf[done..done + chunk].fill(0);
        } else {
            dev.read_block(phys, &mut block_buf)?;
            buf[done..done + chunk].copy_from_slice(&block_buf[in_block_off..in_block_off + chunk]);
        }

        done += chunk;
    }

    Ok(done)
}

/// Writes `buf` to inode `inode_num` starting at `offset`, allocating
/// blocks as needed, and returns the number of bytes written.
///
/// Partial allocation performed before an `ENOSPC` is not rolled back.
/// `now` is the timestamp recorded as the inode's new `mtime` if any bytes
/// are written.
pub fn write(
    table: &mut InodeTable,
    alloc: &mut Allocator,
    dev: &mut BlockDevice,
    inode_num: u32,
    offset: u64,
    buf: &[u8],
    now: i64,
) -> Result<usize, FsError> {
    if offset.checked_add(buf.len() as u64).is_none() || offset + buf.len() as u64 > MAX_FILE_SIZE {
        return Err(FsError::TooLarge {
            offset,
            len: buf.len() as u64,
            max: MAX_FILE_SIZE,
        });
    }

    let mut done = 0usize;
    let mut block_buf = [0u8; BLOCK_SIZE];

    while done < buf.len() {
        let pos = offset + done as u64;
        let block_index = (pos / BLOCK_SIZE as u64) as usize;
        let in_block_off = (pos % BLOCK_SIZE as u64) as usize;
        let chunk = (BLOCK_SIZE - in_block_off).min(buf.len() - done);

        let phys = {
            let inode = table.get_mut(inode_num);
            match resolve_write(inode, alloc, dev, block_index) {
                Ok(p) => p,
                Err(e) => {
                    finish_write(table, dev, inode_num, offset, done, now)?;
                    return Err(e);
                }
            }
        };

        if chunk < BLOCK_SIZE {
            dev.read_block(phys, &mut block_buf)?;
        }
        block_buf[in_block_off..in_block_off + chunk].copy_from_slice(&buf[done..done + chunk]);
        dev.write_block(phys, &block_buf)?;

        done += chunk;
    }

    finish_write(table, dev, inode_num, offset, done, now)?;
    Ok(done)
}

/// Updates `size_bytes`/`mtime` and flushes the inode record after a write,
/// whether the write ran to completion or stopped early on `ENOSPC`.
fn finish_write(
    table: &mut InodeTable,
    dev: &mut BlockDevice,
    inode_num: u32,
    offset: u64,
    written: usize,
    now: i64,
) -> Result<(), FsError> {
    if written == 0 {
        return Ok(());
    }
    let inode = table.get_mut(inode_num);
    let new_end = offset + written as u64;
    if new_end > inode.size_bytes as u64 {
        inode.size_bytes = new_end as u32;
    }
    inode.mtime = now;
    table.flush_one(inode_num, dev)
}

/// Frees every block referenced by `inode_num`'s direct and indirect
/// pointers, clearing the indirect block's own bitmap bit only after every
/// entry it names has been freed. Never dereferences a pointer that was
/// already cleared.
pub fn free_all_blocks(
    table: &InodeTable,
    alloc: &mut Allocator,
    dev: &mut BlockDevice,
    inode_num: u32,
) -> Result<(), FsError> {
    let inode = *table.get(inode_num);
    for &ptr in &inode.direct {
        if ptr != UNALLOCATED {
            alloc.free_data_block(ptr, dev)?;
        }
    }
    if inode.indirect != UNALLOCATED {
        let indirect = IndirectBlock::read(dev, inode.indirect)?;
        for &ptr in &indirect.entries {
            if ptr != UNALLOCATED {
                alloc.free_data_block(ptr, dev)?;
            }
        }
        alloc.free_data_block(inode.indirect, dev)?;
    }
    Ok(())
}

/// Reports whether a file of `len` bytes starting at offset 0 would
/// require an indirect block. Used only by tests to assert the
/// direct/indirect boundary without duplicating the arithmetic.
#[cfg(test)]
fn needs_indirect(len: u64) -> bool {
    len > (DIRECT_BLOCKS * BLOCK_SIZE) as u64
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layout::DATA_START;
    use tempfile::NamedTempFile;

    fn setup() -> (InodeTable, Allocator, BlockDevice) {
        let tmp = NamedTempFile::new().unwrap();
        let dev = BlockDevice::create(tmp.path()).unwrap();
        let mut table = InodeTable::empty();
        *table.get_mut(2) = Inode {
            refcount: 1,
            ..Inode::empty()
        };
        (table, Allocator::fresh(), dev)
    }

    #[test]
    fn write_then_read_roundtrips_small_file() {
        let (mut table, mut alloc, mut dev) = setup();
        let data = b"hello, bfs";
        let n = write(&mut table, &mut alloc, &mut dev, 2, 0, data, 1000).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(table.get(2).size_bytes as usize, data.len());

        let mut out = vec![0u8; data.len()];
        let r = read(&table, &mut dev, 2, 0, &mut out).unwrap();
        assert_eq!(r, data.len());
        assert_eq!(&out, data);
    }

    #[test]
    fn read_past_eof_returns_zero() {
        let (mut table, mut alloc, mut dev) = setup();
        write(&mut table, &mut alloc, &mut dev, 2, 0, b"abc", 1).unwrap();
        let mut out = [0u8; 10];
        let r = read(&table, &mut dev, 2, 100, &mut out).unwrap();
        assert_eq!(r, 0);
    }

    #[test]
    fn full_direct_write_keeps_indirect_unset() {
        let (mut table, mut alloc, mut dev) = setup();
        let data = vec![7u8; DIRECT_BLOCKS * BLOCK_SIZE];
        assert!(!needs_indirect(data.len() as u64));
        write(&mut table, &mut alloc, &mut dev, 2, 0, &data, 1).unwrap();
        let inode = table.get(2);
        assert_eq!(inode.indirect, UNALLOCATED);
        assert!(inode.direct.iter().all(|&p| p != UNALLOCATED));
    }

    #[test]
    fn write_past_direct_range_allocates_indirect() {
        let (mut table, mut alloc, mut dev) = setup();
        let offset = (DIRECT_BLOCKS * BLOCK_SIZE) as u64;
        write(&mut table, &mut alloc, &mut dev, 2, offset, b"Z", 1).unwrap();
        assert_ne!(table.get(2).indirect, UNALLOCATED);
    }

    #[test]
    fn hole_reads_as_zero() {
        let (mut table, mut alloc, mut dev) = setup();
        let offset = (DIRECT_BLOCKS * BLOCK_SIZE) as u64;
        write(&mut table, &mut alloc, &mut dev, 2, offset, b"Z", 1).unwrap();

        let mut out = vec![0xffu8; DIRECT_BLOCKS * BLOCK_SIZE];
        let r = read(&table, &mut dev, 2, 0, &mut out).unwrap();
        assert_eq!(r, out.len());
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_at_max_file_size_boundary_succeeds_one_byte_over_fails() {
        let (mut table, mut alloc, mut dev) = setup();
        let at_boundary = MAX_FILE_SIZE - 1;
        let n = write(&mut table, &mut alloc, &mut dev, 2, at_boundary, b"x", 1).unwrap();
        assert_eq!(n, 1);

        let err = write(&mut table, &mut alloc, &mut dev, 2, MAX_FILE_SIZE, b"x", 1).unwrap_err();
        assert_eq!(err.errno(), -libc::EFBIG);
    }

    #[test]
    fn free_all_blocks_releases_direct_and_indirect() {
        let (mut table, mut alloc, mut dev) = setup();
        let offset = (DIRECT_BLOCKS * BLOCK_SIZE) as u64;
        write(&mut table, &mut alloc, &mut dev, 2, 0, &vec![1u8; BLOCK_SIZE], 1).unwrap();
        write(&mut table, &mut alloc, &mut dev, 2, offset, b"Z", 1).unwrap();

        let indirect_block = table.get(2).indirect;
        free_all_blocks(&table, &mut alloc, &mut dev, 2).unwrap();

        assert!(!alloc.data_bitmap().test(DATA_START as usize));
        assert!(!alloc.data_bitmap().test(indirect_block as usize));
    }
}

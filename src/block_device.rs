//! Thin wrapper over the backing file.
//!
//! Positioning is always by absolute byte offset `block * BLOCK_SIZE`; there
//! is no internal caching and no buffer ownership, callers pass and own
//! every `[u8; BLOCK_SIZE]`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::FsError;
use crate::layout::{BLOCK_SIZE, TOTAL_BLOCKS};

/// A fixed-size-block random-access view over a regular host file.
pub struct BlockDevice {
    file: File,
}

impl BlockDevice {
    /// Opens an existing backing file for reading and writing.
    pub fn open(path: &Path) -> Result<Self, FsError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| FsError::Io {
                block: 0,
                source: e,
            })?;
        Ok(Self { file })
    }

    /// Creates (or truncates) a backing file and sizes it to hold
    /// `TOTAL_BLOCKS` blocks, for use by the formatter.
    pub fn create(path: &Path) -> Result<Self, FsError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| FsError::Io {
                block: 0,
                source: e,
            })?;
        file.set_len(TOTAL_BLOCKS as u64 * BLOCK_SIZE as u64)
            .map_err(|e| FsError::Io {
                block: 0,
                source: e,
            })?;
        Ok(Self { file })
    }

    /// Reads block `n` into `buf`, which must be exactly `BLOCK_SIZE` bytes.
    pub fn read_block(&mut self, n: u32, buf: &mut [u8]) -> Result<(), FsError> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);
        self.file
            .seek(SeekFrom::Start(n as u64 * BLOCK_SIZE as u64))
            .map_err(|e| FsError::Io { block: n, source: e })?;
        let got = self
            .file
            .read(buf)
            .map_err(|e| FsError::Io { block: n, source: e })?;
        if got != buf.len() {
            return Err(FsError::short_io(n, buf.len(), got));
        }
        Ok(())
    }

    /// Writes `buf`, which must be exactly `BLOCK_SIZE` bytes, to block `n`.
    pub fn write_block(&mut self, n: u32, buf: &[u8]) -> Result<(), FsError> {
        debug_assert_eq!(buf.len(), BLOCK_SIZE);
        self.file
            .seek(SeekFrom::Start(n as u64 * BLOCK_SIZE as u64))
            .map_err(|e| FsError::Io { block: n, source: e })?;
        let written = self
            .file
            .write(buf)
            .map_err(|e| FsError::Io { block: n, source: e })?;
        if written != buf.len() {
            return Err(FsError::short_io(n, buf.len(), written));
        }
        Ok(())
    }

    /// Flushes any OS-level buffering to the backing file.
    pub fn sync(&mut self) -> Result<(), FsError> {
        self.file.sync_data().map_err(|e| FsError::Io {
            block: 0,
            source: e,
        })
    }

    /// The backing file's size expressed in whole blocks (rounded down).
    pub fn size_in_blocks(&self) -> Result<u64, FsError> {
        let len = self
            .file
            .metadata()
            .map_err(|e| FsError::Io {
                block: 0,
                source: e,
            })?
            .len();
        Ok(len / BLOCK_SIZE as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn create_sizes_file_to_total_blocks() {
        let tmp = NamedTempFile::new().unwrap();
        let dev = BlockDevice::create(tmp.path()).unwrap();
        assert_eq!(dev.size_in_blocks().unwrap(), TOTAL_BLOCKS as u64);
    }

    #[test]
    fn write_then_read_roundtrips() {
        let tmp = NamedTempFile::new().unwrap();
        let mut dev = BlockDevice::create(tmp.path()).unwrap();
        let mut data = [0u8; BLOCK_SIZE];
        data[0] = 0xab;
        data[BLOCK_SIZE - 1] = 0xcd;
        dev.write_block(20, &data).unwrap();

        let mut out = [0u8; BLOCK_SIZE];
        dev.read_block(20, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn blocks_are_independent() {
        let tmp = NamedTempFile::new().unwrap();
        let mut dev = BlockDevice::create(tmp.path()).unwrap();
        dev.write_block(5, &[1u8; BLOCK_SIZE]).unwrap();
        dev.write_block(6, &[2u8; BLOCK_SIZE]).unwrap();

        let mut a = [0u8; BLOCK_SIZE];
        let mut b = [0u8; BLOCK_SIZE];
        dev.read_block(5, &mut a).unwrap();
        dev.read_block(6, &mut b).unwrap();
        assert_eq!(a, [1u8; BLOCK_SIZE]);
        assert_eq!(b, [2u8; BLOCK_SIZE]);
    }
}

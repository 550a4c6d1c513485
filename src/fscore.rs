//! The single-entry facade the kernel bridge drives.
//!
//! `FSCore` owns every in-memory table plus the `BlockDevice` for the whole
//! mount lifetime; every mutating method reads or updates those tables and
//! flushes the affected blocks before returning, so a caller never observes
//! a half-applied operation. The bridge is responsible for serializing
//! calls; a multithreaded bridge wraps the facade in one
//! `std::sync::Mutex` rather than this module taking any internal lock.

use std::path::Path;

use crate::alloc::Allocator;
use crate::block_device::BlockDevice;
use crate::directory::{DirectoryTable, FileName};
use crate::error::{FsError, NoSpaceKind};
use crate::fileio;
use crate::inode::{Inode, InodeTable};
use crate::layout::{DEFAULT_FILE_MODE, ROOT_DIR_MODE, ROOT_INODE_NUM, TOTAL_BLOCKS};
use crate::superblock::Superblock;
use crate::util::now_secs;

/// What a [`getattr`](FSCore::getattr) call resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    RegularFile,
}

/// The attribute set `getattr` reports, independent of any particular
/// bridge's `stat`-alike representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub kind: EntryKind,
    pub perms: u16,
    pub nlink: u32,
    pub size: u64,
    /// Reported identically to `ctime`; the on-disk inode has no
    /// separate atime field.
    pub atime: i64,
    pub ctime: i64,
    pub mtime: i64,
}

impl Attr {
    /// Only `mode`/`nlink` are mandated for the root; timestamps come
    /// from the root's own inode record (written by the formatter) rather
    /// than a fixed sentinel, so a mounted image reports a real creation
    /// time.
    fn root(root_inode: &Inode) -> Self {
        Self {
            kind: EntryKind::Directory,
            perms: ROOT_DIR_MODE,
            nlink: 2,
            size: 0,
            atime: root_inode.ctime,
            ctime: root_inode.ctime,
            mtime: root_inode.mtime,
        }
    }
}

/// A mounted filesystem: the backing device plus every table loaded from it.
pub struct FSCore {
    dev: BlockDevice,
    #[allow(dead_code)] // validated at mount, not consulted again (fixed layout)
    superblock: Superblock,
    alloc: Allocator,
    inodes: InodeTable,
    dir: DirectoryTable,
}

/// Resolves a bridge-supplied path to either the root (`None`) or a
/// basename (`Some`). The bridge always passes paths
/// starting with `/`; anything else, or a non-root path containing a
/// further `/`, is malformed since this filesystem has no subdirectories.
fn resolve(path: &str) -> Result<Option<&str>, FsError> {
    if path == "/" {
        return Ok(None);
    }
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| FsError::Invalid(format!("path {path:?} must be absolute")))?;
    if rest.is_empty() || rest.contains('/') {
        return Err(FsError::Invalid(format!(
            "path {path:?} is not a flat-namespace file name"
        )));
    }
    Ok(Some(rest))
}

impl FSCore {
    /// Mounts the backing file at `path`: validates the superblock and loads
    /// every table into memory.
    pub fn mount(path: &Path) -> Result<Self, FsError> {
        let mut dev = BlockDevice::open(path)?;
        if dev.size_in_blocks()? < TOTAL_BLOCKS as u64 {
            return Err(FsError::Invalid(format!(
                "backing file has fewer than {TOTAL_BLOCKS} blocks"
            )));
        }
        let superblock = Superblock::load(&mut dev)?;
        let alloc = Allocator::load(&mut dev)?;
        let inodes = InodeTable::load(&mut dev)?;
        let dir = DirectoryTable::load(&mut dev)?;
        Ok(Self {
            dev,
            superblock,
            alloc,
            inodes,
            dir,
        })
    }

    /// Flushes every table to the backing file, then drops the handle,
    /// closing it.
    pub fn unmount(mut self) -> Result<(), FsError> {
        self.alloc.flush(&mut self.dev)?;
        self.inodes.flush_all(&mut self.dev)?;
        self.dir.flush(&mut self.dev)?;
        self.dev.sync()
    }

    /// Populates attributes for the root or for a named file.
    pub fn getattr(&self, path: &str) -> Result<Attr, FsError> {
        match resolve(path)? {
            None => Ok(Attr::root(self.inodes.get(ROOT_INODE_NUM))),
            Some(name) => {
                let slot = self
                    .dir
                    .find(name)
                    .ok_or_else(|| FsError::NotFound(name.to_string()))?;
                let (_, inode_num) = self.dir.entry_at(slot);
                let inode = self.inodes.get(inode_num);
                Ok(Attr {
                    kind: EntryKind::RegularFile,
                    perms: inode.perms,
                    nlink: inode.refcount.max(0) as u32,
                    size: inode.size_bytes as u64,
                    atime: inode.ctime,
                    ctime: inode.ctime,
                    mtime: inode.mtime,
                })
            }
        }
    }

    /// Lists the root directory. `.` and `..` are ordinary live entries in
    /// slots 0 and 1 written by the formatter, so no special-casing is
    /// needed beyond rejecting non-root paths.
    pub fn readdir(&self, path: &str) -> Result<Vec<(String, u32)>, FsError> {
        if resolve(path)?.is_some() {
            return Err(FsError::NotFound(path.to_string()));
        }
        Ok(self
            .dir
            .live_entries()
            .map(|(name, n)| (name.as_str().to_string(), n))
            .collect())
    }

    /// Creates a new regular file with the given permission bits.
    pub fn create(&mut self, path: &str, mode: u16) -> Result<(), FsError> {
        let name = resolve(path)?
            .ok_or_else(|| FsError::Invalid("cannot create the root directory".to_string()))?;
        let name = FileName::new(name)?;
        if self.dir.find(name.as_str()).is_some() {
            return Err(FsError::Exists(name.as_str().to_string()));
        }
        let slot = self
            .dir
            .find_free()
            .ok_or(FsError::NoSpace(NoSpaceKind::DirectorySlots))?;
        let inode_num = self.alloc.alloc_inode(&mut self.dev)?;

        let now = now_secs();
        *self.inodes.get_mut(inode_num) = Inode {
            size_bytes: 0,
            direct: [0; 8],
            indirect: 0,
            ctime: now,
            mtime: now,
            perms: if mode == 0 { DEFAULT_FILE_MODE } else { mode },
            refcount: 1,
        };
        self.inodes.flush_one(inode_num, &mut self.dev)?;

        self.dir.set(slot, name, inode_num);
        self.dir.flush(&mut self.dev)
    }

    /// Removes a file and releases every block it owned.
    pub fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let name = resolve(path)?
            .ok_or_else(|| FsError::Invalid("cannot unlink the root directory".to_string()))?;
        let slot = self
            .dir
            .find(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let (_, inode_num) = self.dir.entry_at(slot);

        fileio::free_all_blocks(&self.inodes, &mut self.alloc, &mut self.dev, inode_num)?;
        *self.inodes.get_mut(inode_num) = Inode::empty();
        self.inodes.flush_one(inode_num, &mut self.dev)?;
        self.alloc.free_inode(inode_num, &mut self.dev)?;

        self.dir.clear(slot);
        self.dir.flush(&mut self.dev)
    }

    /// Renames a file. Copies the entry under the new name into a free
    /// slot, then clears the old one; in-place renaming of the existing
    /// slot would be equally correct, but copy-then-clear keeps this
    /// implementation consistent with `create`/`unlink`'s slot handling.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        let from_name = resolve(from)?
            .ok_or_else(|| FsError::Invalid("cannot rename the root directory".to_string()))?;
        let to_name = resolve(to)?
            .ok_or_else(|| FsError::Invalid("cannot rename onto the root directory".to_string()))?;

        let from_slot = self
            .dir
            .find(from_name)
            .ok_or_else(|| FsError::NotFound(from_name.to_string()))?;
        if self.dir.find(to_name).is_some() {
            return Err(FsError::Exists(to_name.to_string()));
        }
        let to_name = FileName::new(to_name)?;
        let (_, inode_num) = self.dir.entry_at(from_slot);

        let new_slot = self
            .dir
            .find_free()
            .ok_or(FsError::NoSpace(NoSpaceKind::DirectorySlots))?;
        self.dir.set(new_slot, to_name, inode_num);
        self.dir.clear(from_slot);
        self.dir.flush(&mut self.dev)
    }

    /// Existence check only; no per-open state is kept.
    pub fn open(&self, path: &str) -> Result<(), FsError> {
        self.require_entry(path).map(|_| ())
    }

    /// Root always succeeds; otherwise an existence check (no permission
    /// evaluation is performed by this core).
    pub fn access(&self, path: &str) -> Result<(), FsError> {
        match resolve(path)? {
            None => Ok(()),
            Some(name) => self
                .dir
                .find(name)
                .map(|_| ())
                .ok_or_else(|| FsError::NotFound(name.to_string())),
        }
    }

    /// Reads up to `buf.len()` bytes from a file starting at `offset`.
    pub fn read(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FsError> {
        let inode_num = self.require_entry(path)?;
        fileio::read(&self.inodes, &mut self.dev, inode_num, offset, buf)
    }

    /// Writes `buf` to a file starting at `offset`, allocating blocks as
    /// needed.
    pub fn write(&mut self, path: &str, offset: u64, buf: &[u8]) -> Result<usize, FsError> {
        let inode_num = self.require_entry(path)?;
        let now = now_secs();
        fileio::write(&mut self.inodes, &mut self.alloc, &mut self.dev, inode_num, offset, buf, now)
    }

    /// Updates timestamps. The inode's `ctime` field doubles as the
    /// on-disk carrier for the reported `atime`; there is no separate
    /// atime field in the inode record.
    pub fn utimens(&mut self, path: &str, atime: i64, mtime: i64) -> Result<(), FsError> {
        let inode_num = self.require_entry(path)?;
        let inode = self.inodes.get_mut(inode_num);
        inode.ctime = atime;
        inode.mtime = mtime;
        self.inodes.flush_one(inode_num, &mut self.dev)
    }

    /// No-op: no per-open state is kept to release.
    pub fn release(&self, _path: &str) -> Result<(), FsError> {
        Ok(())
    }

    /// Resolves `path` to a live inode number, or `ENOENT`/`EINVAL`. Public
    /// so a bridge adapter keyed on inode numbers (e.g. FUSE's low-level
    /// protocol) can map a name to the number it hands back in a `lookup`
    /// reply.
    pub fn inode_number(&self, path: &str) -> Result<u32, FsError> {
        self.require_entry(path)
    }

    /// The inverse of [`inode_number`](Self::inode_number): recovers the
    /// flat-namespace path for a live inode number, for bridges that only
    /// carry inode numbers between calls.
    pub fn path_for_inode(&self, inode_num: u32) -> Result<String, FsError> {
        if inode_num == ROOT_INODE_NUM {
            return Ok("/".to_string());
        }
        self.dir
            .live_entries()
            .find(|(name, n)| *n == inode_num && !matches!(name.as_str(), "." | ".."))
            .map(|(name, _)| format!("/{}", name.as_str()))
            .ok_or_else(|| FsError::NotFound(format!("inode {inode_num}")))
    }

    fn require_entry(&self, path: &str) -> Result<u32, FsError> {
        let name = resolve(path)?
            .ok_or_else(|| FsError::Invalid("expected a regular file path".to_string()))?;
        let slot = self
            .dir
            .find(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        Ok(self.dir.entry_at(slot).1)
    }
}

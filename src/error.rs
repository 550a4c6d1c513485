//! Error taxonomy shared by every `bfs_core` component.
//!
//! Every operation in this crate returns a [`FsError`] rather than a bare
//! `std::io::Error` or an integer: the bridge-facing translation to a
//! negative POSIX error number happens in exactly one place, [`FsError::errno`].

use std::fmt;
use std::io;

use crate::layout::BLOCK_SIZE;

/// The error taxonomy this crate returns, translated to a negative POSIX
/// errno only at the bridge boundary.
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    /// The requested name has no live directory entry.
    #[error("no such file: {0}")]
    NotFound(String),

    /// The target name is already in use.
    #[error("already exists: {0}")]
    Exists(String),

    /// Data-block or inode exhaustion.
    #[error("no space left on device ({0})")]
    NoSpace(NoSpaceKind),

    /// A write would push the file past `MAX_FILE_SIZE`.
    #[error("file too large: offset {offset} + {len} exceeds the {max} byte limit")]
    TooLarge {
        offset: u64,
        len: u64,
        max: u64,
    },

    /// A backing-device read or write failed, or returned a short count.
    #[error("I/O error on block {block}: {source}")]
    Io {
        block: u32,
        #[source]
        source: io::Error,
    },

    /// A malformed path or argument reached the core.
    #[error("invalid argument: {0}")]
    Invalid(String),
}

/// Distinguishes which free-space pool was exhausted, for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSpaceKind {
    DataBlocks,
    Inodes,
    DirectorySlots,
}

impl fmt::Display for NoSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoSpaceKind::DataBlocks => "no free data blocks",
            NoSpaceKind::Inodes => "no free inodes",
            NoSpaceKind::DirectorySlots => "no free directory slots",
        };
        f.write_str(s)
    }
}

impl FsError {
    /// Builds an [`FsError::Io`] from a short read/write on block `block`.
    pub fn short_io(block: u32, expected: usize, got: usize) -> Self {
        FsError::Io {
            block,
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short I/O on block {block}: expected {expected} bytes, got {got} (block size is {BLOCK_SIZE})"),
            ),
        }
    }

    /// Converts the error into the bridge's negative-`errno` convention.
    ///
    /// This is the one boundary crossing point between the internal tagged
    /// enum and the small-integer convention the kernel bridge expects.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => -libc::ENOENT,
            FsError::Exists(_) => -libc::EEXIST,
            FsError::NoSpace(_) => -libc::ENOSPC,
            FsError::TooLarge { .. } => -libc::EFBIG,
            FsError::Io { .. } => -libc::EIO,
            FsError::Invalid(_) => -libc::EINVAL,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;

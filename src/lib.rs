//! `bfs_core`: a minimal, user-space block-based file system.
//!
//! This crate is the pure, testable model of the on-disk filesystem; no
//! FUSE binding and no CLI parsing lives here. `bin/mkbfs` formats a fresh
//! backing file through [`format::format`]; `bin/bfs-fuse` mounts one through
//! [`fscore::FSCore`] and adapts it to `fuser::Filesystem`.

pub mod alloc;
pub mod bitvector;
pub mod block_device;
pub mod directory;
pub mod error;
pub mod fileio;
pub mod format;
pub mod fscore;
pub mod inode;
pub mod layout;
pub mod superblock;
pub mod util;

pub use error::{FsError, FsResult};
pub use fscore::{Attr, EntryKind, FSCore};

//! `bfs-fuse`: the kernel bridge adapter binary.
//!
//! The bridge itself (FUSE's request/reply plumbing, argument dispatch) is
//! kept out of the core on purpose; this binary is the thin, concrete
//! wiring between a real binding (`fuser`) and `bfs_core::FSCore`. Every
//! `fuser::Filesystem` method below does exactly one thing: resolve the
//! inode number(s) FUSE gives it to a path, call the matching `FSCore`
//! operation, and translate the `Result` into a `reply`.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};

use bfs_core::layout::ROOT_INODE_NUM;
use bfs_core::{Attr, EntryKind, FSCore};

/// How long the kernel may cache a `lookup`/`getattr` reply before asking
/// again. Short, since nothing here is expensive to recompute and the
/// in-memory tables can change from any other call.
const ATTR_TTL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "bfs-fuse", about = "Mount a bfs backing file via FUSE")]
struct Cli {
    /// Path to the backing file (the simulated disk), already formatted by `mkbfs`.
    disk: PathBuf,
    /// Directory to mount the filesystem at.
    mountpoint: PathBuf,
    /// Increase log verbosity; repeat for more (-v, -vv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    let core = match FSCore::mount(&cli.disk) {
        Ok(core) => core,
        Err(e) => {
            log::error!("mount {}: {e}", cli.disk.display());
            std::process::exit(1);
        }
    };
    log::info!("mounted {} at {}", cli.disk.display(), cli.mountpoint.display());

    let adapter = BfsFuse { core: Some(core) };
    let options = [MountOption::FSName("bfs".to_string())];
    if let Err(e) = fuser::mount2(adapter, &cli.mountpoint, &options) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

/// Adapts one mounted [`FSCore`] to `fuser::Filesystem`. `core` is `Some`
/// for the adapter's entire lifetime except during `Drop`, where it is
/// taken so the final metadata flush can consume `FSCore` by value whether
/// the process is unwinding from a signal or `fuser::mount2` simply
/// returned.
struct BfsFuse {
    core: Option<FSCore>,
}

impl Drop for BfsFuse {
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            if let Err(e) = core.unmount() {
                log::error!("unmount: {e}");
            }
        }
    }
}

impl BfsFuse {
    fn core(&mut self) -> &mut FSCore {
        self.core.as_mut().expect("FSCore is Some until Drop")
    }

    fn core_ref(&self) -> &FSCore {
        self.core.as_ref().expect("FSCore is Some until Drop")
    }

    /// Resolves a FUSE directory inode (always the root: no nested
    /// directories) plus a child name into the flat-namespace path string
    /// the core's operations expect.
    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, i32> {
        if parent as u32 != ROOT_INODE_NUM {
            return Err(libc::ENOENT);
        }
        let name = name.to_str().ok_or(libc::EINVAL)?;
        Ok(format!("/{name}"))
    }

    fn path_for_ino(&self, ino: u64) -> Result<String, i32> {
        self.core_ref()
            .path_for_inode(ino as u32)
            .map_err(|e| e.errno())
    }
}

fn to_file_attr(ino: u64, attr: &Attr) -> FileAttr {
    let kind = match attr.kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::RegularFile => FileType::RegularFile,
    };
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: secs_to_system_time(attr.atime),
        mtime: secs_to_system_time(attr.mtime),
        ctime: secs_to_system_time(attr.ctime),
        crtime: secs_to_system_time(attr.ctime),
        kind,
        perm: attr.perms,
        nlink: attr.nlink,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: bfs_core::layout::BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs((-secs) as u64)
    }
}

impl Filesystem for BfsFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.core().getattr(&path) {
            Ok(attr) => {
                let ino = match self.core_ref().inode_number(&path) {
                    Ok(ino) => ino as u64,
                    Err(e) => return reply.error(-e.errno()),
                };
                reply.entry(&ATTR_TTL, &to_file_attr(ino, &attr), 0);
            }
            Err(e) => reply.error(-e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.path_for_ino(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.core().getattr(&path) {
            Ok(attr) => reply.attr(&ATTR_TTL, &to_file_attr(ino, &attr)),
            Err(e) => reply.error(-e.errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        if ino as u32 != ROOT_INODE_NUM {
            return reply.error(libc::ENOENT);
        }
        let entries = match self.core().readdir("/") {
            Ok(e) => e,
            Err(e) => return reply.error(-e.errno()),
        };
        for (i, (name, inode_num)) in entries.into_iter().enumerate().skip(offset as usize) {
            let kind = if inode_num == ROOT_INODE_NUM {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            let full = reply.add(inode_num as u64, (i + 1) as i64, kind, &name);
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        if let Err(e) = self.core().create(&path, mode as u16) {
            return reply.error(-e.errno());
        }
        match self.core().getattr(&path) {
            Ok(attr) => {
                let ino = match self.core_ref().inode_number(&path) {
                    Ok(ino) => ino as u64,
                    Err(e) => return reply.error(-e.errno()),
                };
                reply.created(&ATTR_TTL, &to_file_attr(ino, &attr), 0, 0, 0);
            }
            Err(e) => reply.error(-e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.core().unlink(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(-e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let from = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        let to = match self.child_path(newparent, newname) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.core().rename(&from, &to) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(-e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path_for_ino(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.core().open(&path) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(-e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.path_for_ino(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        let mut buf = vec![0u8; size as usize];
        match self.core().read(&path, offset as u64, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(-e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.path_for_ino(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.core().write(&path, offset as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(-e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = match self.path_for_ino(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        let _ = self.core().release(&path);
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        let path = match self.path_for_ino(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.core().access(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(-e.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_for_ino(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        // `utimens` is the only attribute update the core implements; mode,
        // uid, gid and size changes have no handler and are silently
        // accepted as no-ops since there is no truncate operation.
        if atime.is_some() || mtime.is_some() {
            let now = system_time_to_secs(SystemTime::now());
            let a = atime.map(time_or_now_to_secs).unwrap_or(now);
            let m = mtime.map(time_or_now_to_secs).unwrap_or(now);
            if let Err(e) = self.core().utimens(&path, a, m) {
                return reply.error(-e.errno());
            }
        }
        match self.core().getattr(&path) {
            Ok(attr) => reply.attr(&ATTR_TTL, &to_file_attr(ino, &attr)),
            Err(e) => reply.error(-e.errno()),
        }
    }
}

fn time_or_now_to_secs(t: TimeOrNow) -> i64 {
    match t {
        TimeOrNow::SpecificTime(t) => system_time_to_secs(t),
        TimeOrNow::Now => system_time_to_secs(SystemTime::now()),
    }
}

fn system_time_to_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}


//! The `mkbfs` tool writes a fresh, valid, empty `bfs` image to a backing
//! file.
//!
//! One optional positional argument names the output file, defaulting to
//! `disk1`; `-h`/`--help` prints usage and exits `0`. Hand-parsed in a
//! `mkfs`/`fdisk`-style rather than via `clap`, since there is exactly one
//! parameter to read.

use std::env;
use std::path::PathBuf;
use std::process::exit;

use bfs_core::format;

const DEFAULT_DISK_NAME: &str = "disk1";

struct Args {
    prog: String,
    help: bool,
    output: PathBuf,
}

fn parse_args() -> Args {
    let mut iter = env::args();
    let prog = iter.next().unwrap_or_else(|| "mkbfs".to_string());
    let mut help = false;
    let mut output = PathBuf::from(DEFAULT_DISK_NAME);

    for arg in iter {
        match arg.as_str() {
            "-h" | "--help" => help = true,
            _ => output = PathBuf::from(arg),
        }
    }

    Args { prog, help, output }
}

fn print_usage(prog: &str) {
    println!("usage: {prog} [-h|--help] [path]");
    println!();
    println!("Writes a fresh, empty bfs image to `path` (default: {DEFAULT_DISK_NAME}),");
    println!("creating it if absent and overwriting it if present.");
}

fn main() {
    let args = parse_args();
    if args.help {
        print_usage(&args.prog);
        exit(0);
    }

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp(None)
        .init();

    if let Err(e) = format::format(&args.output) {
        eprintln!("{}: error: {}: {e}", args.prog, args.output.display());
        exit(1);
    }

    log::info!(
        "wrote a fresh bfs image to {} ({} blocks, {} inodes free)",
        args.output.display(),
        bfs_core::layout::TOTAL_BLOCKS,
        bfs_core::layout::MAX_FILES - 1,
    );
}

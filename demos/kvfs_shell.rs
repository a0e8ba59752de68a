//! kvfs_shell - drive a KVFS filesystem stored in a jammdb file
//!
//! Usage:
//!   kvfs_shell --db fs.db mkfs
//!   kvfs_shell --db fs.db mkdir /docs
//!   echo hi | kvfs_shell --db fs.db write /docs/readme
//!   kvfs_shell --db fs.db read /docs/readme

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kvfs::{store::JammdbStore, FileKind, Kvfs, KvfsConfig, KvfsError, KvfsResult};

#[derive(Parser)]
#[command(name = "kvfs_shell")]
#[command(about = "Inspect and modify a KVFS filesystem in a local jammdb file")]
struct Args {
    /// Database file holding the store
    #[arg(long)]
    db: PathBuf,

    /// Filesystem prefix inside the store
    #[arg(short, long, default_value = "fs1")]
    prefix: String,

    /// JSON file naming the store namespace
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Format the prefix with an empty root directory
    Mkfs,
    Mkdir { path: String },
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Write stdin to a file
    Write {
        path: String,
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
    },
    /// Print a file to stdout
    Read {
        path: String,
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
        #[arg(short, long)]
        len: Option<usize>,
    },
    Stat { path: String },
    /// Store a raw key, bypassing the filesystem
    Put { key: String, value: String },
    Get { key: String },
    Del { key: String },
}

fn run(args: Args) -> KvfsResult<()> {
    let config = match &args.config {
        Some(path) => KvfsConfig::load(path)?,
        None => KvfsConfig::default(),
    };
    let store = JammdbStore::open(&args.db)?;
    let mut fs = Kvfs::new(store, &config)?;

    match args.command {
        Command::Mkfs => {
            fs.initialize(&args.prefix)?;
            println!("initialized {}", args.prefix);
            return Ok(());
        }
        Command::Put { key, value } => return fs.raw_put(&key, value.as_bytes()),
        Command::Get { key } => {
            match fs.raw_get(&key)? {
                Some(v) => println!("{} @{}", String::from_utf8_lossy(&v.value), v.timestamp),
                None => println!("{} not found", key),
            }
            return Ok(());
        }
        Command::Del { key } => return fs.raw_delete(&key),
        command => {
            fs.mount(&args.prefix)?;
            run_mounted(&mut fs, command)
        }
    }
}

fn run_mounted(fs: &mut Kvfs<JammdbStore>, command: Command) -> KvfsResult<()> {
    match command {
        Command::Mkdir { path } => fs.make_directory(&path),
        Command::Ls { path } => fs.list(&path, |name, inum, mode| {
            let tag = match FileKind::of(mode) {
                FileKind::Directory => 'd',
                FileKind::Regular => '-',
                FileKind::Other(_) => '?',
            };
            println!("{} {:>9} {}", tag, inum, name);
        }),
        Command::Write { path, offset } => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .map_err(|e| KvfsError::Io(e.to_string()))?;
            let n = fs.write(&path, offset, &data)?;
            println!("wrote {} bytes", n);
            Ok(())
        }
        Command::Read { path, offset, len } => {
            let len = match len {
                Some(len) => len,
                None => fs.stat(&path)?.size.saturating_sub(offset) as usize,
            };
            let data = fs.read(&path, offset, len)?;
            std::io::stdout()
                .write_all(&data)
                .map_err(|e| KvfsError::Io(e.to_string()))
        }
        Command::Stat { path } => {
            let stat = fs.stat(&path)?;
            println!(
                "{} inum {} mode {:o} size {}",
                path,
                stat.inum.map_or_else(|| "?".to_string(), |i| i.to_string()),
                stat.mode,
                stat.size
            );
            Ok(())
        }
        Command::Mkfs | Command::Put { .. } | Command::Get { .. } | Command::Del { .. } => Ok(()),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kvfs_shell: {}", e);
            ExitCode::from(e.errno() as u8)
        }
    }
}

//! KVFS: a POSIX-like namespace laid over flat records in a
//! last-write-wins key/value store.
//!
//! Three record families live under one filesystem prefix:
//! - `<prefix>_sb`: superblock (allocation counters, root location)
//! - `<prefix>_i_NNNNNNNNN`: inodes (type tag, size, direct block map)
//! - `<prefix>_d_NNNNNNNNN`: data blocks, including directory entry lists
//!
//! The store offers no transactions and no locks, so every multi-key
//! operation here is a sequence of independent writes ordered by a
//! process-local logical clock. One mutator per mounted prefix.

mod codec;
mod config;
mod directory;
mod error;
mod file;
mod fs;
mod keys;
mod models;
mod path;
mod superblock;

pub mod store;


pub use codec::{decode_dir_entries, encode_dir_entries, Record};
pub use config::KvfsConfig;
pub use error::{KvfsError, KvfsResult};
pub use fs::{FileStat, Kvfs};
pub use keys::{data_key, inode_key, parse_key, superblock_key, KeyFamily};
pub use models::*;
pub use path::Resolved;
pub use store::{Consistency, KeyValueStore, StoreError, StoreNamespace, Versioned};

/// Size of one data block; every block record is exactly this long.
pub const BLOCK_SIZE: usize = 8192;

/// Capacity of an inode's direct block map.
pub const MAX_BLOCKS: usize = 2048;

/// Largest byte length a file can reach with direct blocks only.
pub const MAX_FILE_SIZE: u64 = (BLOCK_SIZE * MAX_BLOCKS) as u64;

/// Block-map slot value meaning "no block allocated here".
pub const NO_BLOCK: u64 = u64::MAX;

#[macro_export]
macro_rules! le_u32 {
    ($x:expr) => {{
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&$x[..4]);
        u32::from_le_bytes(raw)
    }};
}

#[macro_export]
macro_rules! le_u64 {
    ($x:expr) => {{
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&$x[..8]);
        u64::from_le_bytes(raw)
    }};
}

#[macro_export]
macro_rules! be_u64 {
    ($x:expr) => {{
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&$x[..8]);
        u64::from_be_bytes(raw)
    }};
}

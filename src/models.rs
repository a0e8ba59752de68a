use bitflags::bitflags;

use crate::{
    error::{KvfsError, KvfsResult},
    keys::{inode_key, MAX_KEY_LEN},
    MAX_BLOCKS, NO_BLOCK,
};

/// Bytes reserved for a name or prefix on the store, terminator included.
pub const NAME_FIELD_LEN: usize = 32;
/// Bytes reserved for a key on the store, terminator included.
pub const KEY_FIELD_LEN: usize = MAX_KEY_LEN + 1;

pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;
pub const MAX_PREFIX_LEN: usize = NAME_FIELD_LEN - 1;

/// Index of the root directory's inode. 0 is never handed out.
pub const ROOT_INODE_INDEX: u64 = 1;
/// Index of the root directory's entry-list block.
pub const ROOT_BLOCK_INDEX: u64 = 0;
pub const FIRST_FREE_INODE_INDEX: u64 = 2;
pub const FIRST_FREE_BLOCK_INDEX: u64 = 1;

pub const DOT: &str = ".";
pub const DOTDOT: &str = "..";

bitflags! {
    /// Type tag bits of an inode's mode word. Only the `S_IFMT` bits carry
    /// meaning; the rest are reserved.
    pub struct FileMode: u32 {
        const S_IFMT = 0o170000;
        const S_IFDIR = 0o040000;
        const S_IFREG = 0o100000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
    /// A type tag this filesystem never writes.
    Other(u32),
}

impl FileKind {
    pub fn of(mode: u32) -> Self {
        let fmt = mode & FileMode::S_IFMT.bits();
        if fmt == FileMode::S_IFDIR.bits() {
            FileKind::Directory
        } else if fmt == FileMode::S_IFREG.bits() {
            FileKind::Regular
        } else {
            FileKind::Other(fmt)
        }
    }

    pub fn mode(self) -> u32 {
        match self {
            FileKind::Directory => FileMode::S_IFDIR.bits(),
            FileKind::Regular => FileMode::S_IFREG.bits(),
            FileKind::Other(fmt) => fmt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub prefix: String,
    pub root_dir_key: String,
    pub next_inode_index: u64,
    pub next_block_index: u64,
}

impl Superblock {
    /// A fresh superblock: root at inode 1 / block 0, counters past them.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            root_dir_key: inode_key(prefix, ROOT_INODE_INDEX),
            next_inode_index: FIRST_FREE_INODE_INDEX,
            next_block_index: FIRST_FREE_BLOCK_INDEX,
        }
    }
}

/// File or directory metadata with a fixed-capacity direct block map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub mode: u32,
    pub reserved: u32,
    /// High-water mark of bytes written; not derived from the block map.
    pub size: u64,
    blocks: Vec<u64>,
}

impl Inode {
    pub fn new_file() -> Self {
        Self {
            mode: FileMode::S_IFREG.bits(),
            reserved: 0,
            size: 0,
            blocks: vec![NO_BLOCK; MAX_BLOCKS],
        }
    }

    /// A directory whose entry list lives in block `data_index`.
    pub fn new_directory(data_index: u64) -> Self {
        let mut blocks = vec![NO_BLOCK; MAX_BLOCKS];
        blocks[0] = data_index;
        Self {
            mode: FileMode::S_IFDIR.bits(),
            reserved: 0,
            size: 0,
            blocks,
        }
    }

    pub fn from_parts(mode: u32, reserved: u32, size: u64, blocks: Vec<u64>) -> KvfsResult<Self> {
        if blocks.len() != MAX_BLOCKS {
            return Err(KvfsError::CorruptRecord {
                what: "inode",
                reason: format!("block map has {} slots, expected {}", blocks.len(), MAX_BLOCKS),
            });
        }
        Ok(Self {
            mode,
            reserved,
            size,
            blocks,
        })
    }

    pub fn kind(&self) -> FileKind {
        FileKind::of(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    pub fn is_regular(&self) -> bool {
        self.kind() == FileKind::Regular
    }

    /// Raw block map, sentinels included.
    pub fn blocks(&self) -> &[u64] {
        &self.blocks
    }

    /// Block index stored in `slot`, or `None` when the slot is unallocated
    /// or past the map's capacity.
    pub fn block(&self, slot: usize) -> Option<u64> {
        match self.blocks.get(slot) {
            Some(&index) if index != NO_BLOCK => Some(index),
            _ => None,
        }
    }

    pub fn set_block(&mut self, slot: usize, index: u64) -> KvfsResult<()> {
        match self.blocks.get_mut(slot) {
            Some(entry) => {
                *entry = index;
                Ok(())
            }
            None => Err(KvfsError::FileTooLarge {
                end: ((slot + 1) * crate::BLOCK_SIZE) as u64,
                max: crate::MAX_FILE_SIZE,
            }),
        }
    }

    /// Block holding a directory's entry list.
    pub fn dir_block(&self) -> Option<u64> {
        self.block(0)
    }

    pub fn allocated_blocks(&self) -> usize {
        self.blocks.iter().filter(|&&b| b != NO_BLOCK).count()
    }
}

/// One slot of a directory's entry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub child_key: String,
    pub inum: u32,
    pub mode: u32,
}

impl DirEntry {
    pub fn new(name: &str, child_key: &str, inum: u32, mode: u32) -> KvfsResult<Self> {
        validate_name(name)?;
        if child_key.len() > MAX_KEY_LEN {
            return Err(KvfsError::InvalidArgument(format!(
                "key `{}` is longer than {} bytes",
                child_key, MAX_KEY_LEN
            )));
        }
        Ok(Self {
            name: name.to_string(),
            child_key: child_key.to_string(),
            inum,
            mode,
        })
    }

    pub fn kind(&self) -> FileKind {
        FileKind::of(self.mode)
    }
}

/// A single path component that fits a directory entry.
pub fn validate_name(name: &str) -> KvfsResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(KvfsError::InvalidArgument(format!("bad name `{}`", name)));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(KvfsError::NameTooLong {
            name: name.to_string(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

use log::{debug, info, warn};

use crate::{
    codec::Record,
    directory::create_directory,
    error::{KvfsError, KvfsResult},
    keys::{data_key, superblock_key},
    models::{Inode, Superblock, MAX_PREFIX_LEN, ROOT_BLOCK_INDEX, ROOT_INODE_INDEX},
    store::{Backend, KeyValueStore},
};

/// In-memory view of one filesystem's superblock plus its cached root inode.
#[derive(Debug)]
pub struct SuperblockManager {
    sb: Superblock,
    root: Option<Inode>,
    mounted: bool,
}

impl SuperblockManager {
    pub fn new() -> Self {
        Self {
            sb: Superblock::new(""),
            root: None,
            mounted: false,
        }
    }

    /// Lays down a fresh superblock and root directory under `prefix`.
    /// Running it over an existing prefix resets the counters and orphans
    /// everything previously allocated there.
    pub(crate) fn initialize<S: KeyValueStore>(
        &mut self,
        backend: &Backend<S>,
        prefix: &str,
    ) -> KvfsResult<()> {
        if prefix.len() > MAX_PREFIX_LEN {
            return Err(KvfsError::PrefixTooLong {
                prefix: prefix.to_string(),
                max: MAX_PREFIX_LEN,
            });
        }
        if prefix.is_empty() || prefix.contains('\0') {
            return Err(KvfsError::InvalidArgument(format!("bad prefix `{}`", prefix)));
        }
        info!("making filesystem {}", prefix);
        self.mounted = false;
        self.root = None;
        self.sb = Superblock::new(prefix);

        let root_key = self.sb.root_dir_key.clone();
        // stamp above whatever an earlier filesystem left under this prefix
        for key in [superblock_key(prefix), root_key.clone(), data_key(prefix, ROOT_BLOCK_INDEX)] {
            if backend.fetch(&key)?.is_some() {
                debug!("overwriting {}", key);
            }
        }
        create_directory(
            backend,
            prefix,
            (&root_key, ROOT_INODE_INDEX),
            (&root_key, ROOT_INODE_INDEX),
            ROOT_BLOCK_INDEX,
        )?;
        self.persist(backend)
    }

    pub(crate) fn mount<S: KeyValueStore>(
        &mut self,
        backend: &Backend<S>,
        prefix: &str,
    ) -> KvfsResult<()> {
        if self.mounted && self.sb.prefix == prefix {
            info!("already mounted {}", prefix);
            return Ok(());
        }
        self.mounted = false;
        self.root = None;

        let sb: Superblock = backend.load(&superblock_key(prefix))?;
        info!(
            "mounting {}: root {} next inode {} next block {}",
            prefix, sb.root_dir_key, sb.next_inode_index, sb.next_block_index
        );
        if sb.prefix != prefix {
            warn!("superblock for {} names prefix {}", prefix, sb.prefix);
        }
        let root: Inode = backend.load(&sb.root_dir_key)?;
        if !root.is_dir() {
            warn!("root {} is not a directory (mode {:o})", sb.root_dir_key, root.mode);
        }

        self.sb = sb;
        self.root = Some(root);
        self.mounted = true;
        Ok(())
    }

    /// Writes the current superblock. No retry: indices handed out before a
    /// failed persist are simply lost.
    pub(crate) fn persist<S: KeyValueStore>(&self, backend: &Backend<S>) -> KvfsResult<()> {
        backend.put(&superblock_key(&self.sb.prefix), &self.sb.encode())
    }

    pub fn allocate_inode_index(&mut self) -> u64 {
        let index = self.sb.next_inode_index;
        self.sb.next_inode_index += 1;
        index
    }

    pub fn allocate_block_index(&mut self) -> u64 {
        let index = self.sb.next_block_index;
        self.sb.next_block_index += 1;
        index
    }

    pub fn require_mounted(&self) -> KvfsResult<()> {
        if self.mounted {
            Ok(())
        } else {
            Err(KvfsError::NotMounted)
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn prefix(&self) -> &str {
        &self.sb.prefix
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// Cached root inode; `NotMounted` until a mount succeeds.
    pub fn root(&self) -> KvfsResult<&Inode> {
        self.require_mounted()?;
        self.root.as_ref().ok_or(KvfsError::NotMounted)
    }
}

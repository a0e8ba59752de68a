use log::{debug, info};

use crate::{
    config::KvfsConfig,
    directory, file,
    error::KvfsResult,
    models::{DirEntry, FileKind, Superblock},
    path::resolve,
    store::{Backend, KeyValueStore, LogicalClock, Versioned},
    superblock::SuperblockManager,
};

/// What `stat` reports for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Numeric id recovered from the inode key; `None` for keys that do not
    /// follow this prefix's naming.
    pub inum: Option<u64>,
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
}

/// One filesystem instance over a store. Mutating calls take `&mut self`:
/// a mounted prefix has a single writer.
pub struct Kvfs<S: KeyValueStore> {
    backend: Backend<S>,
    sbm: SuperblockManager,
}

impl<S: KeyValueStore> Kvfs<S> {
    pub fn new(store: S, config: &KvfsConfig) -> KvfsResult<Self> {
        config.validate()?;
        debug!(
            "kvfs over {}/{}/{} ({:?})",
            config.table, config.column_family, config.column, config.consistency
        );
        Ok(Self::with_clock(store, config, LogicalClock::starting_now()))
    }

    pub fn with_defaults(store: S) -> Self {
        Self::with_clock(store, &KvfsConfig::default(), LogicalClock::starting_now())
    }

    pub(crate) fn with_clock(store: S, config: &KvfsConfig, clock: LogicalClock) -> Self {
        Self {
            backend: Backend::new(store, config.namespace(), config.consistency, clock),
            sbm: SuperblockManager::new(),
        }
    }

    /// Formats `prefix`: fresh superblock plus an empty root directory.
    /// Leaves the instance unmounted.
    pub fn initialize(&mut self, prefix: &str) -> KvfsResult<()> {
        self.sbm.initialize(&self.backend, prefix)
    }

    /// Loads the superblock and root inode of `prefix`. Mounting the
    /// prefix that is already mounted changes nothing.
    pub fn mount(&mut self, prefix: &str) -> KvfsResult<()> {
        self.sbm.mount(&self.backend, prefix)
    }

    pub fn is_mounted(&self) -> bool {
        self.sbm.is_mounted()
    }

    pub fn superblock(&self) -> KvfsResult<&Superblock> {
        self.sbm.require_mounted()?;
        Ok(self.sbm.superblock())
    }

    pub fn make_directory(&mut self, path: &str) -> KvfsResult<()> {
        directory::make_directory(&self.backend, &mut self.sbm, path)
    }

    /// Visits `(name, inum, mode)` for every entry of the directory at
    /// `path`, `.` and `..` included.
    pub fn list<F>(&self, path: &str, visit: F) -> KvfsResult<()>
    where
        F: FnMut(&str, u32, u32),
    {
        directory::list(&self.backend, &self.sbm, path, visit)
    }

    /// Collecting form of [`Kvfs::list`].
    pub fn read_dir(&self, path: &str) -> KvfsResult<Vec<DirEntry>> {
        directory::entries_at(&self.backend, &self.sbm, path)
    }

    pub fn read(&self, path: &str, offset: u64, max_len: usize) -> KvfsResult<Vec<u8>> {
        file::read(&self.backend, &self.sbm, path, offset, max_len)
    }

    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> KvfsResult<usize> {
        file::write(&self.backend, &mut self.sbm, path, offset, data)
    }

    /// Creates an empty regular file, or touches an existing one.
    pub fn create(&mut self, path: &str) -> KvfsResult<()> {
        self.write(path, 0, &[]).map(|_| ())
    }

    /// Attributes of whatever `path` resolves to. Like every lookup,
    /// resolution stops at the first non-directory.
    pub fn stat(&self, path: &str) -> KvfsResult<FileStat> {
        self.sbm.require_mounted()?;
        let resolved = resolve(&self.backend, &self.sbm, path)?;
        Ok(FileStat {
            inum: resolved.inum(self.sbm.prefix()),
            kind: resolved.inode.kind(),
            mode: resolved.inode.mode,
            size: resolved.inode.size,
        })
    }

    /// Writes `value` under `key` in this filesystem's namespace, bypassing
    /// the filesystem layout entirely. The current value is read first so
    /// the new stamp outranks it.
    pub fn raw_put(&mut self, key: &str, value: &[u8]) -> KvfsResult<()> {
        info!("raw put {}", key);
        self.backend.fetch(key)?;
        self.backend.put(key, value)
    }

    pub fn raw_get(&self, key: &str) -> KvfsResult<Option<Versioned>> {
        self.backend.fetch(key)
    }

    pub fn raw_delete(&mut self, key: &str) -> KvfsResult<()> {
        info!("raw delete {}", key);
        self.backend.fetch(key)?;
        self.backend.delete(key)
    }

    pub fn store(&self) -> &S {
        self.backend.store()
    }
}

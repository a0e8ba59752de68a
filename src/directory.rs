//! Directory entry lists: creation, lookup and append.
//!
//! A directory's entries live in the first block of its block map as one
//! packed list, always starting with `.` and `..`. Adding a child rewrites
//! the whole list; nothing is patched in place.

use log::{debug, info};

use crate::{
    codec::{decode_dir_entries, encode_dir_entries, Record},
    error::{KvfsError, KvfsResult},
    keys::{data_key, inode_key},
    models::{validate_name, DirEntry, FileMode, Inode, DOT, DOTDOT},
    path::{resolve, resolve_dir, split_leaf},
    store::{Backend, KeyValueStore},
    superblock::SuperblockManager,
};

/// Directory-entry form of an allocation index. Only a corrupt superblock
/// counter can push an index past `u32`.
pub(crate) fn inum(index: u64) -> KvfsResult<u32> {
    u32::try_from(index).map_err(|_| KvfsError::CorruptRecord {
        what: "superblock",
        reason: format!("inode index {} does not fit a directory entry", index),
    })
}

/// Loads the entry list of `dir`, returning the key it lives under too.
pub(crate) fn read_entries<S: KeyValueStore>(
    backend: &Backend<S>,
    prefix: &str,
    dir: &Inode,
) -> KvfsResult<(String, Vec<DirEntry>)> {
    let block = dir
        .dir_block()
        .ok_or_else(|| KvfsError::Io("directory has no entry block".to_string()))?;
    let key = data_key(prefix, block);
    let raw = backend.fetch_required(&key, "directory data")?;
    let entries =
        decode_dir_entries(&raw).map_err(|e| KvfsError::Io(format!("{}: {}", key, e)))?;
    Ok((key, entries))
}

/// Rewrites the list at `dir_key` as `entries` plus `entry`.
pub(crate) fn append_entry<S: KeyValueStore>(
    backend: &Backend<S>,
    dir_key: &str,
    mut entries: Vec<DirEntry>,
    entry: DirEntry,
) -> KvfsResult<()> {
    entries.try_reserve(1).map_err(|_| {
        KvfsError::ResourceExhausted("could not allocate expanded directory".to_string())
    })?;
    entries.push(entry);
    info!("rewriting {} with {} entries", dir_key, entries.len());
    backend.put(dir_key, &encode_dir_entries(&entries))
}

/// Writes a directory inode at `new.0` whose single block `block_index`
/// holds the `.` (self) and `..` (`parent`) entries. Both keys come with
/// their numeric inode ids.
pub(crate) fn create_directory<S: KeyValueStore>(
    backend: &Backend<S>,
    prefix: &str,
    parent: (&str, u64),
    new: (&str, u64),
    block_index: u64,
) -> KvfsResult<()> {
    let dir_mode = FileMode::S_IFDIR.bits();
    let entries = [
        DirEntry::new(DOT, new.0, inum(new.1)?, dir_mode)?,
        DirEntry::new(DOTDOT, parent.0, inum(parent.1)?, dir_mode)?,
    ];

    backend.put(new.0, &Inode::new_directory(block_index).encode())?;
    backend.put(&data_key(prefix, block_index), &encode_dir_entries(&entries))
}

pub(crate) fn make_directory<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &mut SuperblockManager,
    path: &str,
) -> KvfsResult<()> {
    sbm.require_mounted()?;
    let (parent_path, leaf) = split_leaf(path)?;
    validate_name(leaf)?;

    let prefix = sbm.prefix().to_string();
    let parent = resolve_dir(backend, sbm, parent_path)?;
    let (dir_key, entries) = read_entries(backend, &prefix, &parent.inode)?;
    if entries.iter().any(|e| e.name == leaf) {
        return Err(KvfsError::AlreadyExists(path.to_string()));
    }
    debug!("checked {} entries", entries.len());

    let parent_inum = match parent.inum(&prefix) {
        Some(index) => index,
        None => entries.first().map(|e| e.inum as u64).unwrap_or_default(),
    };
    let index = sbm.allocate_inode_index();
    let block_index = sbm.allocate_block_index();
    let child_key = inode_key(&prefix, index);
    info!("mkdir {} as {} (block {})", path, child_key, block_index);
    create_directory(
        backend,
        &prefix,
        (&parent.key, parent_inum),
        (&child_key, index),
        block_index,
    )?;

    let entry = DirEntry::new(leaf, &child_key, inum(index)?, FileMode::S_IFDIR.bits())?;
    append_entry(backend, &dir_key, entries, entry)?;
    sbm.persist(backend)
}

/// Entries of the directory at `path`, in stored order. A path that ends
/// at a file has none.
pub(crate) fn entries_at<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &SuperblockManager,
    path: &str,
) -> KvfsResult<Vec<DirEntry>> {
    sbm.require_mounted()?;
    let resolved = resolve(backend, sbm, path)?;
    if !resolved.inode.is_dir() {
        debug!("{} not a directory", path);
        return Ok(Vec::new());
    }
    let (_, entries) = read_entries(backend, sbm.prefix(), &resolved.inode)?;
    Ok(entries)
}

/// Calls `visit(name, inum, mode)` for each entry of the directory at `path`.
pub(crate) fn list<S, F>(
    backend: &Backend<S>,
    sbm: &SuperblockManager,
    path: &str,
    mut visit: F,
) -> KvfsResult<()>
where
    S: KeyValueStore,
    F: FnMut(&str, u32, u32),
{
    for entry in entries_at(backend, sbm, path)? {
        visit(&entry.name, entry.inum, entry.mode);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inum_rejects_indices_past_u32() {
        assert_eq!(inum(7).unwrap(), 7);
        assert_eq!(inum(u32::MAX as u64).unwrap(), u32::MAX);
        assert!(matches!(
            inum(u32::MAX as u64 + 1),
            Err(KvfsError::CorruptRecord { what: "superblock", .. })
        ));
    }
}

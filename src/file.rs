//! Block-granular file I/O over an inode's direct block map.
//!
//! Blocks are allocated on first write and always stored at full
//! `BLOCK_SIZE`; slots never written read back as zeros.

use log::{debug, error, info};

use crate::{
    codec::Record,
    directory::{append_entry, inum, read_entries},
    error::{KvfsError, KvfsResult},
    keys::{data_key, inode_key},
    models::{validate_name, DirEntry, FileMode, Inode},
    path::{resolve_dir, split_leaf},
    store::{Backend, KeyValueStore},
    superblock::SuperblockManager,
    BLOCK_SIZE, MAX_FILE_SIZE,
};

/// A regular file located through its parent directory. A freshly created
/// file's inode is not on the store until the write that created it ends.
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub(crate) key: String,
    pub(crate) inode: Inode,
}

/// One block-aligned piece of a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Chunk {
    slot: usize,
    /// Offset inside the block.
    at: usize,
    len: usize,
}

/// Splits `[offset, offset + len)` at block boundaries.
fn chunks(offset: u64, len: usize) -> impl Iterator<Item = Chunk> {
    let mut off = offset;
    let mut left = len;
    std::iter::from_fn(move || {
        if left == 0 {
            return None;
        }
        // ib_ = intra block
        let ib_off = (off % BLOCK_SIZE as u64) as usize;
        let ib_len = (BLOCK_SIZE - ib_off).min(left);
        let chunk = Chunk {
            slot: (off / BLOCK_SIZE as u64) as usize,
            at: ib_off,
            len: ib_len,
        };
        off += ib_len as u64;
        left -= ib_len;
        Some(chunk)
    })
}

fn zeroed_block() -> KvfsResult<Vec<u8>> {
    let mut block = Vec::new();
    block.try_reserve_exact(BLOCK_SIZE).map_err(|_| {
        KvfsError::ResourceExhausted("could not allocate block buffer".to_string())
    })?;
    block.resize(BLOCK_SIZE, 0);
    Ok(block)
}

fn load_block<S: KeyValueStore>(backend: &Backend<S>, key: &str) -> KvfsResult<Vec<u8>> {
    let raw = backend.fetch_required(key, "data block")?;
    if raw.len() != BLOCK_SIZE {
        return Err(KvfsError::Io(format!(
            "bad size {} for {}",
            raw.len(),
            key
        )));
    }
    Ok(raw)
}

/// Loads the inode an entry points at, insisting on a regular file.
fn load_file<S: KeyValueStore>(
    backend: &Backend<S>,
    entry: &DirEntry,
) -> KvfsResult<OpenFile> {
    debug!("fetching {}", entry.child_key);
    let inode: Inode = backend.load(&entry.child_key)?;
    if !inode.is_regular() {
        debug!("{} has non-file type {:o}", entry.child_key, inode.mode);
        return Err(KvfsError::IsADirectory(entry.name.clone()));
    }
    Ok(OpenFile {
        key: entry.child_key.clone(),
        inode,
    })
}

/// Opens the existing file at `path`. Never writes.
pub(crate) fn open<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &SuperblockManager,
    path: &str,
) -> KvfsResult<OpenFile> {
    let (parent_path, leaf) = split_leaf(path)?;
    let parent = resolve_dir(backend, sbm, parent_path)?;
    let (_, entries) = read_entries(backend, sbm.prefix(), &parent.inode)?;
    match entries.iter().find(|e| e.name == leaf) {
        Some(entry) => load_file(backend, entry),
        None => Err(KvfsError::NotFound(leaf.to_string())),
    }
}

/// Opens the file at `path`, adding an entry for it when missing. The
/// entry list is rewritten and the superblock persisted, but a new inode is
/// only returned in memory.
pub(crate) fn open_or_create<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &mut SuperblockManager,
    path: &str,
) -> KvfsResult<OpenFile> {
    let (parent_path, leaf) = split_leaf(path)?;
    let parent = resolve_dir(backend, sbm, parent_path)?;
    let prefix = sbm.prefix().to_string();
    let (dir_key, entries) = read_entries(backend, &prefix, &parent.inode)?;
    if let Some(entry) = entries.iter().find(|e| e.name == leaf) {
        return load_file(backend, entry);
    }

    validate_name(leaf)?;
    info!("creating new {}", leaf);
    let index = sbm.allocate_inode_index();
    let key = inode_key(&prefix, index);
    let entry = DirEntry::new(leaf, &key, inum(index)?, FileMode::S_IFREG.bits())?;
    append_entry(backend, &dir_key, entries, entry)?;
    sbm.persist(backend)?;
    Ok(OpenFile {
        key,
        inode: Inode::new_file(),
    })
}

/// Writes `data` at `offset`, creating the file if needed. Returns the
/// number of bytes written, which is all of them on success.
pub(crate) fn write<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &mut SuperblockManager,
    path: &str,
    offset: u64,
    data: &[u8],
) -> KvfsResult<usize> {
    sbm.require_mounted()?;
    let end = offset
        .checked_add(data.len() as u64)
        .filter(|&end| end <= MAX_FILE_SIZE)
        .ok_or(KvfsError::FileTooLarge {
            end: offset.saturating_add(data.len() as u64),
            max: MAX_FILE_SIZE,
        })?;

    let mut file = open_or_create(backend, sbm, path)?;
    if file.inode.size < end {
        debug!("increasing size to {}", end);
        file.inode.size = end;
    }

    let mut allocated = false;
    let result = write_chunks(backend, sbm, &mut file.inode, offset, data, &mut allocated);
    if let Err(e) = result {
        if allocated {
            // keep freshly issued block indices from being handed out again
            if let Err(persist) = sbm.persist(backend) {
                error!("superblock persist after failed write: {}", persist);
            }
        }
        return Err(e);
    }

    backend.put(&file.key, &file.inode.encode())?;
    if allocated {
        sbm.persist(backend)?;
    }
    Ok(data.len())
}

fn write_chunks<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &mut SuperblockManager,
    inode: &mut Inode,
    offset: u64,
    data: &[u8],
    allocated: &mut bool,
) -> KvfsResult<()> {
    let prefix = sbm.prefix().to_string();
    let mut consumed = 0;
    for chunk in chunks(offset, data.len()) {
        let (key, mut block) = match inode.block(chunk.slot) {
            Some(index) => {
                debug!("modifying block {}", chunk.slot);
                let key = data_key(&prefix, index);
                let block = load_block(backend, &key)?;
                (key, block)
            }
            None => {
                debug!("allocating block {}", chunk.slot);
                let index = sbm.allocate_block_index();
                inode.set_block(chunk.slot, index)?;
                *allocated = true;
                (data_key(&prefix, index), zeroed_block()?)
            }
        };
        block[chunk.at..chunk.at + chunk.len]
            .copy_from_slice(&data[consumed..consumed + chunk.len]);
        backend.put(&key, &block)?;
        consumed += chunk.len;
    }
    Ok(())
}

/// Reads up to `max_len` bytes at `offset`, clamped to the file size.
/// Unallocated blocks read as zeros. A missing or mis-sized block ends the
/// read early: the bytes gathered so far are returned, so a short result
/// is not proof of end-of-file.
pub(crate) fn read<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &SuperblockManager,
    path: &str,
    offset: u64,
    max_len: usize,
) -> KvfsResult<Vec<u8>> {
    sbm.require_mounted()?;
    let file = open(backend, sbm, path)?;
    let size = file.inode.size;
    if offset >= size {
        debug!("read past EOF");
        return Ok(Vec::new());
    }
    let len = (max_len as u64).min(size - offset) as usize;
    if len < max_len {
        debug!("read crossed EOF - shortened to {}", len);
    }

    let mut out = Vec::new();
    out.try_reserve_exact(len).map_err(|_| {
        KvfsError::ResourceExhausted("could not allocate read buffer".to_string())
    })?;
    for chunk in chunks(offset, len) {
        match file.inode.block(chunk.slot) {
            None => {
                debug!("empty block {}", chunk.slot);
                out.resize(out.len() + chunk.len, 0);
            }
            Some(index) => {
                let key = data_key(sbm.prefix(), index);
                match load_block(backend, &key) {
                    Ok(block) => out.extend_from_slice(&block[chunk.at..chunk.at + chunk.len]),
                    Err(e) => {
                        error!("short read of {} at block {}: {}", path, chunk.slot, e);
                        break;
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_split_at_block_boundaries() {
        let got: Vec<Chunk> = chunks(BLOCK_SIZE as u64 - 2, 5).collect();
        assert_eq!(
            got,
            vec![
                Chunk { slot: 0, at: BLOCK_SIZE - 2, len: 2 },
                Chunk { slot: 1, at: 0, len: 3 },
            ]
        );
    }

    #[test]
    fn chunks_cover_whole_blocks() {
        let got: Vec<Chunk> = chunks(0, 2 * BLOCK_SIZE).collect();
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|c| c.at == 0 && c.len == BLOCK_SIZE));
        assert_eq!(chunks(10, 0).count(), 0);
    }

    #[test]
    fn chunk_lengths_sum_to_request() {
        let total: usize = chunks(12_345, 3 * BLOCK_SIZE + 17).map(|c| c.len).sum();
        assert_eq!(total, 3 * BLOCK_SIZE + 17);
    }
}

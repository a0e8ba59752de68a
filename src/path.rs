//! Path resolution from the cached root inode.

use log::debug;

use crate::{
    directory::read_entries,
    error::{KvfsError, KvfsResult},
    keys::{parse_key, KeyFamily},
    models::{DirEntry, Inode},
    store::{Backend, KeyValueStore},
    superblock::SuperblockManager,
};

/// The inode a path led to, with the key it is stored under.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub key: String,
    pub inode: Inode,
}

impl Resolved {
    /// Numeric inode id recovered from the key.
    pub fn inum(&self, prefix: &str) -> Option<u64> {
        match parse_key(prefix, &self.key) {
            Some(KeyFamily::Inode(index)) => Some(index),
            _ => None,
        }
    }
}

/// Non-empty components of `path`; repeated and leading slashes vanish.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Splits at the last slash into (parent, leaf). A path with no slash or
/// ending in a slash has no leaf to create.
pub fn split_leaf(path: &str) -> KvfsResult<(&str, &str)> {
    match path.rfind('/') {
        Some(at) if at + 1 < path.len() => Ok((&path[..at], &path[at + 1..])),
        _ => Err(KvfsError::InvalidArgument(format!(
            "no new path component in `{}`",
            path
        ))),
    }
}

/// Finds `name` in directory `dir` and loads the child's inode.
pub(crate) fn lookup_one<S: KeyValueStore>(
    backend: &Backend<S>,
    prefix: &str,
    dir: &Inode,
    name: &str,
) -> KvfsResult<(DirEntry, Inode)> {
    let (_, entries) = read_entries(backend, prefix, dir)?;
    let entry = entries
        .into_iter()
        .find(|e| e.name == name)
        .ok_or_else(|| KvfsError::NotFound(name.to_string()))?;
    let child = backend.load(&entry.child_key)?;
    Ok((entry, child))
}

/// Walks `path` from the root. Descent stops quietly at the first
/// non-directory, returning that inode as the result.
pub(crate) fn resolve<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &SuperblockManager,
    path: &str,
) -> KvfsResult<Resolved> {
    let mut current = Resolved {
        key: sbm.superblock().root_dir_key.clone(),
        inode: sbm.root()?.clone(),
    };
    for elem in components(path) {
        if !current.inode.is_dir() {
            debug!("tried to traverse non-dir {} at {}", current.key, elem);
            break;
        }
        debug!("descend into {}", elem);
        let (entry, inode) = lookup_one(backend, sbm.prefix(), &current.inode, elem)?;
        current = Resolved {
            key: entry.child_key,
            inode,
        };
    }
    Ok(current)
}

/// Resolves `path` and insists on a directory at the end.
pub(crate) fn resolve_dir<S: KeyValueStore>(
    backend: &Backend<S>,
    sbm: &SuperblockManager,
    path: &str,
) -> KvfsResult<Resolved> {
    let resolved = resolve(backend, sbm, path)?;
    if !resolved.inode.is_dir() {
        return Err(KvfsError::NotADirectory(path.to_string()));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_skip_empty_segments() {
        let parts: Vec<&str> = components("//a///b/c/").collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
        assert_eq!(components("/").count(), 0);
        assert_eq!(components("").count(), 0);
    }

    #[test]
    fn split_leaf_takes_last_component() {
        assert_eq!(split_leaf("/a").unwrap(), ("", "a"));
        assert_eq!(split_leaf("/a/b/f.txt").unwrap(), ("/a/b", "f.txt"));
        assert_eq!(split_leaf("a//b").unwrap(), ("a/", "b"));
    }

    #[test]
    fn split_leaf_needs_a_leaf() {
        for bad in ["", "/", "name", "/a/"] {
            assert!(matches!(split_leaf(bad), Err(KvfsError::InvalidArgument(_))), "{}", bad);
        }
    }
}

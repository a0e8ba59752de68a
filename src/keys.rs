//! Store key derivation.
//!
//! Indices are rendered as fixed-width zero-padded decimals, so within one
//! prefix `index -> key` is injective for every index below
//! `10^INDEX_DIGITS`. Larger indices are a configuration limit and are not
//! checked at runtime.

/// Width of the decimal index suffix.
pub const INDEX_DIGITS: usize = 9;

/// Largest key length, excluding the terminator the on-store fields reserve.
pub const MAX_KEY_LEN: usize = 63;

const SUPERBLOCK_SUFFIX: &str = "_sb";
const INODE_TAG: &str = "_i_";
const DATA_TAG: &str = "_d_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Superblock,
    Inode(u64),
    Data(u64),
}

pub fn superblock_key(prefix: &str) -> String {
    format!("{}{}", prefix, SUPERBLOCK_SUFFIX)
}

pub fn inode_key(prefix: &str, index: u64) -> String {
    format!("{}{}{:0width$}", prefix, INODE_TAG, index, width = INDEX_DIGITS)
}

pub fn data_key(prefix: &str, index: u64) -> String {
    format!("{}{}{:0width$}", prefix, DATA_TAG, index, width = INDEX_DIGITS)
}

/// Inverse of the three constructors for keys under `prefix`.
pub fn parse_key(prefix: &str, key: &str) -> Option<KeyFamily> {
    let rest = key.strip_prefix(prefix)?;
    if rest == SUPERBLOCK_SUFFIX {
        return Some(KeyFamily::Superblock);
    }
    let (tag, digits) = (rest.get(..INODE_TAG.len())?, rest.get(INODE_TAG.len()..)?);
    if digits.len() < INDEX_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok()?;
    match tag {
        INODE_TAG => Some(KeyFamily::Inode(index)),
        DATA_TAG => Some(KeyFamily::Data(index)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_zero_padded() {
        assert_eq!(superblock_key("fs1"), "fs1_sb");
        assert_eq!(inode_key("fs1", 1), "fs1_i_000000001");
        assert_eq!(data_key("fs1", 0), "fs1_d_000000000");
        assert_eq!(data_key("fs1", 999_999_999), "fs1_d_999999999");
    }

    #[test]
    fn families_never_collide() {
        let mut seen = HashSet::new();
        assert!(seen.insert(superblock_key("p")));
        for index in (0..2000).chain([123_456_789, 999_999_999]) {
            assert!(seen.insert(inode_key("p", index)));
            assert!(seen.insert(data_key("p", index)));
        }
    }

    #[test]
    fn parse_inverts_construction() {
        assert_eq!(parse_key("fs", &superblock_key("fs")), Some(KeyFamily::Superblock));
        assert_eq!(parse_key("fs", &inode_key("fs", 42)), Some(KeyFamily::Inode(42)));
        assert_eq!(parse_key("fs", &data_key("fs", 7)), Some(KeyFamily::Data(7)));
        assert_eq!(parse_key("other", &inode_key("fs", 42)), None);
        assert_eq!(parse_key("fs", "fs_x_000000001"), None);
        assert_eq!(parse_key("fs", "fs_i_12"), None);
    }

    #[test]
    fn longest_prefix_fits_key_bound() {
        let prefix = "p".repeat(crate::models::MAX_PREFIX_LEN);
        assert!(inode_key(&prefix, 999_999_999).len() <= MAX_KEY_LEN);
        assert!(superblock_key(&prefix).len() <= MAX_KEY_LEN);
    }
}

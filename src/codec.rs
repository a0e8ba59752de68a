//! Fixed binary layouts of the on-store records.
//!
//! All integers are little-endian; strings are NUL-padded fixed fields.
//! There is no version or checksum, so the only validation possible is the
//! byte length, and a length mismatch is always a `CorruptRecord`.

use crate::{
    error::{KvfsError, KvfsResult},
    le_u32, le_u64,
    models::{DirEntry, Inode, Superblock, KEY_FIELD_LEN, NAME_FIELD_LEN},
    MAX_BLOCKS,
};

pub const SUPERBLOCK_RECORD_LEN: usize = NAME_FIELD_LEN + KEY_FIELD_LEN + 8 + 8;
pub const INODE_RECORD_LEN: usize = 4 + 4 + 8 + MAX_BLOCKS * 8;
pub const DIR_ENTRY_RECORD_LEN: usize = NAME_FIELD_LEN + KEY_FIELD_LEN + 4 + 4;

/// A record with one fixed encoded length.
pub trait Record: Sized {
    const NAME: &'static str;
    const LEN: usize;

    fn encode(&self) -> Vec<u8>;
    fn decode(raw: &[u8]) -> KvfsResult<Self>;
}

fn corrupt(what: &'static str, reason: String) -> KvfsError {
    KvfsError::CorruptRecord { what, reason }
}

fn check_len(raw: &[u8], expected: usize, what: &'static str) -> KvfsResult<()> {
    if raw.len() != expected {
        return Err(corrupt(
            what,
            format!("got {} bytes, expected {}", raw.len(), expected),
        ));
    }
    Ok(())
}

fn put_str(out: &mut Vec<u8>, s: &str, field: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(field);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + field - n, 0);
}

fn get_str(raw: &[u8], what: &'static str) -> KvfsResult<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8(raw[..end].to_vec())
        .map_err(|_| corrupt(what, "string field is not utf-8".to_string()))
}

impl Record for Superblock {
    const NAME: &'static str = "superblock";
    const LEN: usize = SUPERBLOCK_RECORD_LEN;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        put_str(&mut out, &self.prefix, NAME_FIELD_LEN);
        put_str(&mut out, &self.root_dir_key, KEY_FIELD_LEN);
        out.extend_from_slice(&self.next_inode_index.to_le_bytes());
        out.extend_from_slice(&self.next_block_index.to_le_bytes());
        out
    }

    fn decode(raw: &[u8]) -> KvfsResult<Self> {
        check_len(raw, Self::LEN, Self::NAME)?;
        let (prefix, rest) = raw.split_at(NAME_FIELD_LEN);
        let (root, counters) = rest.split_at(KEY_FIELD_LEN);
        Ok(Self {
            prefix: get_str(prefix, Self::NAME)?,
            root_dir_key: get_str(root, Self::NAME)?,
            next_inode_index: le_u64!(counters),
            next_block_index: le_u64!(counters[8..]),
        })
    }
}

impl Record for Inode {
    const NAME: &'static str = "inode";
    const LEN: usize = INODE_RECORD_LEN;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.mode.to_le_bytes());
        out.extend_from_slice(&self.reserved.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        for index in self.blocks() {
            out.extend_from_slice(&index.to_le_bytes());
        }
        out
    }

    fn decode(raw: &[u8]) -> KvfsResult<Self> {
        check_len(raw, Self::LEN, Self::NAME)?;
        let blocks = raw[16..].chunks_exact(8).map(|c| le_u64!(c)).collect();
        Inode::from_parts(le_u32!(raw), le_u32!(raw[4..]), le_u64!(raw[8..]), blocks)
    }
}

fn encode_entry(entry: &DirEntry, out: &mut Vec<u8>) {
    put_str(out, &entry.name, NAME_FIELD_LEN);
    put_str(out, &entry.child_key, KEY_FIELD_LEN);
    out.extend_from_slice(&entry.inum.to_le_bytes());
    out.extend_from_slice(&entry.mode.to_le_bytes());
}

fn decode_entry(raw: &[u8]) -> KvfsResult<DirEntry> {
    let (name, rest) = raw.split_at(NAME_FIELD_LEN);
    let (key, tail) = rest.split_at(KEY_FIELD_LEN);
    Ok(DirEntry {
        name: get_str(name, "directory")?,
        child_key: get_str(key, "directory")?,
        inum: le_u32!(tail),
        mode: le_u32!(tail[4..]),
    })
}

/// Packs entries back to back, in order.
pub fn encode_dir_entries(entries: &[DirEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * DIR_ENTRY_RECORD_LEN);
    for entry in entries {
        encode_entry(entry, &mut out);
    }
    out
}

/// Splits a packed entry list. The length must be an exact multiple of the
/// entry size; an empty value decodes to no entries.
pub fn decode_dir_entries(raw: &[u8]) -> KvfsResult<Vec<DirEntry>> {
    if raw.len() % DIR_ENTRY_RECORD_LEN != 0 {
        return Err(corrupt(
            "directory",
            format!(
                "{} bytes is not a multiple of the {}-byte entry",
                raw.len(),
                DIR_ENTRY_RECORD_LEN
            ),
        ));
    }
    raw.chunks_exact(DIR_ENTRY_RECORD_LEN)
        .map(decode_entry)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;

    #[test]
    fn layouts_match_the_persisted_format() {
        assert_eq!(SUPERBLOCK_RECORD_LEN, 112);
        assert_eq!(INODE_RECORD_LEN, 16400);
        assert_eq!(DIR_ENTRY_RECORD_LEN, 104);
    }

    #[test]
    fn superblock_fields_sit_at_fixed_offsets() {
        let sb = Superblock::new("fs1");
        let raw = sb.encode();
        assert_eq!(raw.len(), SUPERBLOCK_RECORD_LEN);
        assert_eq!(&raw[..4], b"fs1\0");
        assert_eq!(&raw[32..47], b"fs1_i_000000001");
        assert_eq!(raw[96], 2);
        assert_eq!(raw[104], 1);
        assert_eq!(Superblock::decode(&raw).unwrap(), sb);
        assert_eq!(Superblock::decode(&raw).unwrap().encode(), raw);
    }

    #[test]
    fn inode_keeps_reserved_bits_and_sentinels() {
        let mut inode = Inode::new_file();
        inode.mode |= 0o644;
        inode.reserved = 0xdead_beef;
        inode.size = 12_345;
        inode.set_block(3, 77).unwrap();
        let raw = inode.encode();
        assert_eq!(raw.len(), INODE_RECORD_LEN);
        assert_eq!(&raw[16..24], &u64::MAX.to_le_bytes());
        let back = Inode::decode(&raw).unwrap();
        assert_eq!(back, inode);
        assert_eq!(back.kind(), FileKind::Regular);
        assert_eq!(back.encode(), raw);
    }

    #[test]
    fn wrong_lengths_are_corrupt() {
        let raw = Superblock::new("x").encode();
        assert!(matches!(
            Superblock::decode(&raw[..raw.len() - 1]),
            Err(KvfsError::CorruptRecord { .. })
        ));
        let mut long = Inode::new_file().encode();
        long.push(0);
        assert!(matches!(
            Inode::decode(&long),
            Err(KvfsError::CorruptRecord { .. })
        ));
        assert!(matches!(
            decode_dir_entries(&[0u8; DIR_ENTRY_RECORD_LEN + 1]),
            Err(KvfsError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn entry_lists_of_any_length_decode_back() {
        for count in [0usize, 1, 2, 5] {
            let entries: Vec<DirEntry> = (0..count)
                .map(|i| {
                    DirEntry::new(
                        &format!("e{}", i),
                        &format!("fs_i_{:09}", i + 2),
                        i as u32 + 2,
                        FileKind::Regular.mode(),
                    )
                    .unwrap()
                })
                .collect();
            let raw = encode_dir_entries(&entries);
            assert_eq!(raw.len(), count * DIR_ENTRY_RECORD_LEN);
            assert_eq!(decode_dir_entries(&raw).unwrap(), entries);
            assert_eq!(encode_dir_entries(&decode_dir_entries(&raw).unwrap()), raw);
        }
    }

    #[test]
    fn non_utf8_names_are_corrupt() {
        let mut raw = encode_dir_entries(&[DirEntry::new("ok", "k", 1, 0).unwrap()]);
        raw[0] = 0xff;
        assert!(matches!(
            decode_dir_entries(&raw),
            Err(KvfsError::CorruptRecord { .. })
        ));
    }
}

use std::path::Path;

use jammdb::{Data, Error as DbError, DB};
use log::{info, trace};

use super::{Cell, Consistency, KeyValueStore, StoreError, StoreNamespace, StoreResult, Versioned};

/// Persistent single-file store. One jammdb bucket per table; a cell's key
/// inside the bucket is `<column_family>:<column>:<key>`.
pub struct JammdbStore {
    db: DB,
}

fn db_err(e: DbError) -> StoreError {
    StoreError::Backend(format!("jammdb: {}", e))
}

fn cell_key(ns: &StoreNamespace, key: &str) -> Vec<u8> {
    format!("{}:{}:{}", ns.column_family, ns.column, key).into_bytes()
}

impl JammdbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        info!("opening jammdb store at {}", path.display());
        let db = DB::open(path).map_err(db_err)?;
        Ok(Self { db })
    }

    fn read_cell(&self, ns: &StoreNamespace, key: &str) -> StoreResult<Option<Cell>> {
        let tx = self.db.tx(false).map_err(db_err)?;
        let bucket = match tx.get_bucket(ns.table.as_bytes().to_vec()) {
            Ok(bucket) => bucket,
            Err(DbError::BucketMissing) => return Ok(None),
            Err(e) => return Err(db_err(e)),
        };
        let raw = match bucket.get(cell_key(ns, key)) {
            Some(Data::KeyValue(kv)) => kv.value().to_vec(),
            Some(Data::Bucket(_)) => return Err(StoreError::MalformedCell(key.to_string())),
            None => return Ok(None),
        };
        Cell::decode(key, &raw).map(Some)
    }

    fn apply(&self, ns: &StoreNamespace, key: &str, cell: Cell) -> StoreResult<()> {
        let tx = self.db.tx(true).map_err(db_err)?;
        let bucket = tx
            .get_or_create_bucket(ns.table.as_bytes().to_vec())
            .map_err(db_err)?;
        let current = match bucket.get(cell_key(ns, key)) {
            Some(Data::KeyValue(kv)) => Some(Cell::decode(key, kv.value())?),
            Some(Data::Bucket(_)) => return Err(StoreError::MalformedCell(key.to_string())),
            None => None,
        };
        if let Some(current) = current {
            if !cell.supersedes(&current) {
                trace!("{} @{} lost to @{}", key, cell.timestamp(), current.timestamp());
                return Ok(());
            }
        }
        bucket.put(cell_key(ns, key), cell.encode()).map_err(db_err)?;
        tx.commit().map_err(db_err)
    }
}

impl KeyValueStore for JammdbStore {
    fn get(&self, ns: &StoreNamespace, key: &str) -> StoreResult<Option<Versioned>> {
        Ok(self.read_cell(ns, key)?.and_then(Cell::into_live))
    }

    fn put(
        &self,
        ns: &StoreNamespace,
        key: &str,
        value: &[u8],
        timestamp: u64,
        _consistency: Consistency,
    ) -> StoreResult<()> {
        self.apply(
            ns,
            key,
            Cell::Live(Versioned {
                value: value.to_vec(),
                timestamp,
            }),
        )
    }

    fn delete(
        &self,
        ns: &StoreNamespace,
        key: &str,
        timestamp: u64,
        _consistency: Consistency,
    ) -> StoreResult<()> {
        self.apply(ns, key, Cell::Tombstone { timestamp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> StoreNamespace {
        StoreNamespace {
            table: "Keyspace1".to_string(),
            column_family: "Standard1".to_string(),
            column: "data".to_string(),
        }
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        {
            let store = JammdbStore::open(&path).unwrap();
            store.put(&ns(), "fs_sb", b"super", 3, Consistency::One).unwrap();
        }
        let store = JammdbStore::open(&path).unwrap();
        let got = store.get(&ns(), "fs_sb").unwrap().unwrap();
        assert_eq!(got.value, b"super");
        assert_eq!(got.timestamp, 3);
    }

    #[test]
    fn missing_table_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JammdbStore::open(dir.path().join("kv.db")).unwrap();
        assert_eq!(store.get(&ns(), "nope").unwrap(), None);
    }

    #[test]
    fn last_write_wins_and_tombstones_stick() {
        let dir = tempfile::tempdir().unwrap();
        let store = JammdbStore::open(dir.path().join("kv.db")).unwrap();
        store.put(&ns(), "k", b"two", 2, Consistency::One).unwrap();
        store.put(&ns(), "k", b"one", 1, Consistency::One).unwrap();
        assert_eq!(store.get(&ns(), "k").unwrap().unwrap().value, b"two");
        store.delete(&ns(), "k", 3, Consistency::One).unwrap();
        store.put(&ns(), "k", b"late", 2, Consistency::One).unwrap();
        assert_eq!(store.get(&ns(), "k").unwrap(), None);
    }
}

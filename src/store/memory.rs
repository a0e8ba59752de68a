use std::collections::BTreeMap;

use log::trace;
use spin::Mutex;

use super::{Cell, Consistency, KeyValueStore, StoreNamespace, StoreResult, Versioned};

/// In-process store with the same last-write-wins rules as the real thing.
#[derive(Default)]
pub struct MemoryStore {
    cells: Mutex<BTreeMap<(StoreNamespace, String), Cell>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys holding a live value in `ns`, in key order.
    pub fn live_keys(&self, ns: &StoreNamespace) -> Vec<String> {
        self.cells
            .lock()
            .iter()
            .filter(|((n, _), cell)| n == ns && matches!(cell, Cell::Live(_)))
            .map(|((_, key), _)| key.clone())
            .collect()
    }

    fn apply(&self, ns: &StoreNamespace, key: &str, cell: Cell) {
        let mut cells = self.cells.lock();
        let slot = (ns.clone(), key.to_string());
        match cells.get(&slot) {
            Some(current) if !cell.supersedes(current) => {
                trace!("{} @{} lost to @{}", key, cell.timestamp(), current.timestamp());
            }
            _ => {
                cells.insert(slot, cell);
            }
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, ns: &StoreNamespace, key: &str) -> StoreResult<Option<Versioned>> {
        let cells = self.cells.lock();
        Ok(cells
            .get(&(ns.clone(), key.to_string()))
            .cloned()
            .and_then(Cell::into_live))
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
        );
        Ok(())
    }

    fn delete(
        &self,
        ns: &StoreNamespace,
        key: &str,
        timestamp: u64,
        _consistency: Consistency,
    ) -> StoreResult<()> {
        self.apply(ns, key, Cell::Tombstone { timestamp });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(table: &str) -> StoreNamespace {
        StoreNamespace {
            table: table.to_string(),
            column_family: "Standard1".to_string(),
            column: "data".to_string(),
        }
    }

    #[test]
    fn stale_put_is_ignored() {
        let store = MemoryStore::new();
        let ns = ns("t");
        store.put(&ns, "k", b"new", 10, Consistency::One).unwrap();
        store.put(&ns, "k", b"old", 9, Consistency::One).unwrap();
        let got = store.get(&ns, "k").unwrap().unwrap();
        assert_eq!(got.value, b"new");
        assert_eq!(got.timestamp, 10);
    }

    #[test]
    fn delete_shadows_older_puts() {
        let store = MemoryStore::new();
        let ns = ns("t");
        store.put(&ns, "k", b"v", 1, Consistency::One).unwrap();
        store.delete(&ns, "k", 5, Consistency::One).unwrap();
        assert_eq!(store.get(&ns, "k").unwrap(), None);
        // a put older than the tombstone never resurfaces
        store.put(&ns, "k", b"again", 4, Consistency::One).unwrap();
        assert_eq!(store.get(&ns, "k").unwrap(), None);
        store.put(&ns, "k", b"again", 6, Consistency::One).unwrap();
        assert_eq!(store.get(&ns, "k").unwrap().unwrap().value, b"again");
    }

    #[test]
    fn namespaces_are_disjoint() {
        let store = MemoryStore::new();
        store.put(&ns("a"), "k", b"1", 1, Consistency::All).unwrap();
        assert_eq!(store.get(&ns("b"), "k").unwrap(), None);
        assert_eq!(store.live_keys(&ns("a")), vec!["k".to_string()]);
        assert!(store.live_keys(&ns("b")).is_empty());
    }
}

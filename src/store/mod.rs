//! The key/value store collaborator.
//!
//! The engine only ever sees `get`, `put` and `delete` on flat string keys
//! inside one namespace. Conflicts are resolved per key by the caller's
//! timestamp (last write wins); nothing spans more than one key.

mod jammdb_store;
mod memory;

pub use self::jammdb_store::JammdbStore;
pub use self::memory::MemoryStore;

use core::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use onlyerror::Error;
use serde::{Deserialize, Serialize};

use crate::{
    be_u64,
    codec::Record,
    error::{KvfsError, KvfsResult},
};

/// Table / column family / column triple that scopes every key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreNamespace {
    pub table: String,
    pub column_family: String,
    pub column: String,
}

/// Write acknowledgement level. Local backends accept and ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    #[default]
    One,
    Quorum,
    All,
}

/// A live value together with the timestamp it was written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("malformed cell under `{0}`")]
    MalformedCell(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait KeyValueStore {
    /// `Ok(None)` means the key has no live value (never written, or deleted).
    fn get(&self, ns: &StoreNamespace, key: &str) -> StoreResult<Option<Versioned>>;

    fn put(
        &self,
        ns: &StoreNamespace,
        key: &str,
        value: &[u8],
        timestamp: u64,
        consistency: Consistency,
    ) -> StoreResult<()>;

    fn delete(
        &self,
        ns: &StoreNamespace,
        key: &str,
        timestamp: u64,
        consistency: Consistency,
    ) -> StoreResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, ns: &StoreNamespace, key: &str) -> StoreResult<Option<Versioned>> {
        (**self).get(ns, key)
    }

    fn put(
        &self,
        ns: &StoreNamespace,
        key: &str,
        value: &[u8],
        timestamp: u64,
        consistency: Consistency,
    ) -> StoreResult<()> {
        (**self).put(ns, key, value, timestamp, consistency)
    }

    fn delete(
        &self,
        ns: &StoreNamespace,
        key: &str,
        timestamp: u64,
        consistency: Consistency,
    ) -> StoreResult<()> {
        (**self).delete(ns, key, timestamp, consistency)
    }
}

const CELL_HEADER_LEN: usize = 9;
const CELL_LIVE: u8 = 0;
const CELL_TOMBSTONE: u8 = 1;

/// One stored cell: either a live value or a deletion marker, both stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Cell {
    Live(Versioned),
    Tombstone { timestamp: u64 },
}

impl Cell {
    pub(crate) fn timestamp(&self) -> u64 {
        match self {
            Cell::Live(v) => v.timestamp,
            Cell::Tombstone { timestamp } => *timestamp,
        }
    }

    /// Whether `self` wins over `other` under last-write-wins. Ties go to
    /// the tombstone, then to the larger value.
    pub(crate) fn supersedes(&self, other: &Cell) -> bool {
        match self.timestamp().cmp(&other.timestamp()) {
            core::cmp::Ordering::Greater => true,
            core::cmp::Ordering::Less => false,
            core::cmp::Ordering::Equal => match (self, other) {
                (Cell::Tombstone { .. }, Cell::Live(_)) => true,
                (Cell::Live(a), Cell::Live(b)) => a.value > b.value,
                _ => false,
            },
        }
    }

    pub(crate) fn into_live(self) -> Option<Versioned> {
        match self {
            Cell::Live(v) => Some(v),
            Cell::Tombstone { .. } => None,
        }
    }

    /// `[timestamp: u64 BE][flag: u8][value...]`
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CELL_HEADER_LEN + self.value_len());
        out.extend_from_slice(&self.timestamp().to_be_bytes());
        match self {
            Cell::Live(v) => {
                out.push(CELL_LIVE);
                out.extend_from_slice(&v.value);
            }
            Cell::Tombstone { .. } => out.push(CELL_TOMBSTONE),
        }
        out
    }

    pub(crate) fn decode(key: &str, raw: &[u8]) -> StoreResult<Cell> {
        if raw.len() < CELL_HEADER_LEN {
            return Err(StoreError::MalformedCell(key.to_string()));
        }
        let timestamp = be_u64!(raw);
        match raw[8] {
            CELL_LIVE => Ok(Cell::Live(Versioned {
                value: raw[CELL_HEADER_LEN..].to_vec(),
                timestamp,
            })),
            CELL_TOMBSTONE if raw.len() == CELL_HEADER_LEN => Ok(Cell::Tombstone { timestamp }),
            _ => Err(StoreError::MalformedCell(key.to_string())),
        }
    }

    fn value_len(&self) -> usize {
        match self {
            Cell::Live(v) => v.value.len(),
            Cell::Tombstone { .. } => 0,
        }
    }
}

/// Write timestamps for one engine. Seeded from the wall clock in
/// microseconds, then Lamport-style: every stamp read back from the store
/// pushes the next one above it, so a later writer never stamps below a
/// record it has seen.
#[derive(Debug)]
pub(crate) struct LogicalClock {
    next: AtomicU64,
}

impl LogicalClock {
    pub(crate) fn starting_now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self::starting_at(micros)
    }

    pub(crate) fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub(crate) fn tick(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn observe(&self, seen: u64) {
        self.next.fetch_max(seen.saturating_add(1), Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

/// A store bound to one namespace and consistency level: the handle every
/// engine layer reads and writes records through. It owns the write clock,
/// so every put and delete is stamped here.
pub(crate) struct Backend<S> {
    store: S,
    ns: StoreNamespace,
    consistency: Consistency,
    clock: LogicalClock,
}

impl<S: KeyValueStore> Backend<S> {
    pub(crate) fn new(
        store: S,
        ns: StoreNamespace,
        consistency: Consistency,
        clock: LogicalClock,
    ) -> Self {
        Self {
            store,
            ns,
            consistency,
            clock,
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    pub(crate) fn fetch(&self, key: &str) -> KvfsResult<Option<Versioned>> {
        let found = self.store.get(&self.ns, key)?;
        if let Some(v) = &found {
            self.clock.observe(v.timestamp);
        }
        Ok(found)
    }

    /// Reads a record that the data model says must exist. Absence is an
    /// I/O error, not an empty value.
    pub(crate) fn fetch_required(&self, key: &str, what: &str) -> KvfsResult<Vec<u8>> {
        match self.fetch(key)? {
            Some(v) => Ok(v.value),
            None => Err(KvfsError::Io(format!("missing {} {}", what, key))),
        }
    }

    /// Fetches and decodes a fixed-layout record; absence and bad length
    /// both surface as I/O errors naming the key.
    pub(crate) fn load<R: Record>(&self, key: &str) -> KvfsResult<R> {
        let raw = self.fetch_required(key, R::NAME)?;
        R::decode(&raw).map_err(|e| KvfsError::Io(format!("{}: {}", key, e)))
    }

    pub(crate) fn put(&self, key: &str, value: &[u8]) -> KvfsResult<()> {
        let timestamp = self.clock.tick();
        debug!("writing {} ({} bytes) @{}", key, value.len(), timestamp);
        Ok(self
            .store
            .put(&self.ns, key, value, timestamp, self.consistency)?)
    }

    pub(crate) fn delete(&self, key: &str) -> KvfsResult<()> {
        let timestamp = self.clock.tick();
        debug!("deleting {} @{}", key, timestamp);
        Ok(self.store.delete(&self.ns, key, timestamp, self.consistency)?)
    }
}

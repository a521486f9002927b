//! Purpose: Read-only access to ordered key-value stores.
//! Exports: `Store`, `Scan`, `StoreRecord`, `RocksStore`, `MemoryStore`.
//! Role: The only path the engines use to read node and matcher data.
//! Invariants: Nothing in this crate writes a store; RocksDB handles are opened read-only.
//! Invariants: Scans are ordered by key ascending and stop at the prefix boundary.
//! Invariants: A latent iterator error surfaces as the final `Err` item of a scan.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rocksdb::{DBRawIteratorWithThreadMode, DBWithThreadMode, MultiThreaded, Options};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

pub type Scan<'a> = Box<dyn Iterator<Item = Result<StoreRecord, Error>> + 'a>;

pub trait Store {
    /// Records whose key starts with `prefix`, ascending. An empty prefix scans everything.
    fn scan(&self, prefix: &[u8]) -> Scan<'_>;

    /// `Ok(None)` when the key is absent; `Err` only for real read failures.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;
}

type Db = DBWithThreadMode<MultiThreaded>;

pub struct RocksStore {
    db: Db,
    path: PathBuf,
}

impl RocksStore {
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("store directory does not exist")
                .with_path(path)
                .with_hint("Pass the directory that holds the store's CURRENT file."));
        }

        let mut options = Options::default();
        options.create_if_missing(false);
        let db = Db::open_for_read_only(&options, path, false)
            .map_err(|err| engine_error(err, "failed to open store").with_path(path))?;

        tracing::debug!(path = %path.display(), "opened store read-only");
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }
}

impl Store for RocksStore {
    fn scan(&self, prefix: &[u8]) -> Scan<'_> {
        let mut raw = self.db.raw_iterator();
        if prefix.is_empty() {
            raw.seek_to_first();
        } else {
            raw.seek(prefix);
        }
        Box::new(RocksScan {
            raw,
            prefix: prefix.to_vec(),
            path: &self.path,
            done: false,
        })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        self.db.get(key).map_err(|err| {
            engine_error(err, "point lookup failed")
                .with_path(&self.path)
                .with_key(key)
        })
    }
}

struct RocksScan<'a> {
    raw: DBRawIteratorWithThreadMode<'a, Db>,
    prefix: Vec<u8>,
    path: &'a Path,
    done: bool,
}

impl Iterator for RocksScan<'_> {
    type Item = Result<StoreRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.raw.valid() {
            self.done = true;
            // Invalid is either end of data or a failed read; only status() tells.
            return self.raw.status().err().map(|err| {
                Err(engine_error(err, "store iteration failed").with_path(self.path))
            });
        }

        let record = match (self.raw.key(), self.raw.value()) {
            (Some(key), Some(value)) if key.starts_with(&self.prefix) => StoreRecord {
                key: key.to_vec(),
                value: value.to_vec(),
            },
            _ => {
                self.done = true;
                return None;
            }
        };
        self.raw.next();
        Some(Ok(record))
    }
}

fn engine_error(err: rocksdb::Error, message: &str) -> Error {
    let kind = match err.kind() {
        rocksdb::ErrorKind::NotFound => ErrorKind::NotFound,
        rocksdb::ErrorKind::Corruption => ErrorKind::Corrupt,
        _ => ErrorKind::Io,
    };
    Error::new(kind).with_message(message).with_source(err)
}

/// Ordered in-memory store with the same read semantics as `RocksStore`.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryStore
where
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            records: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl Store for MemoryStore {
    fn scan(&self, prefix: &[u8]) -> Scan<'_> {
        let prefix = prefix.to_vec();
        Box::new(
            self.records
                .range(prefix.clone()..)
                .take_while(move |(key, _)| key.starts_with(&prefix))
                .map(|(key, value)| {
                    Ok(StoreRecord {
                        key: key.clone(),
                        value: value.clone(),
                    })
                }),
        )
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.records.get(key).cloned())
    }
}

//! Typed key-value storage over an embedded redb database.
//!
//! # Layout
//!
//! ```text
//! <directory>/db/plugman.redb
//!   table "kv": &[u8] -> &[u8]
//!     meta\0schema_version           -> 1
//!     sources\0<org/repo>            -> SourceInfo
//!     registry\0<alias>              -> RepoList
//!     installed\0<org/repo:alias>    -> InstallInfo
//!     repo\0<org/repo>\0vm\0<alias>     -> Definition<VmDefinition>
//!     repo\0<org/repo>\0subnet\0<alias> -> Definition<SubnetDefinition>
//! ```
//!
//! Every namespace prefix ends in `0x00`; aliases never contain NUL, so one
//! namespace can never observe another's keys. Values are JSON.
//!
//! # Transactions
//!
//! All reads and writes go through a [`ReadTxn`] or [`WriteTxn`]. Use
//! [`KvStore::update`] for multi-key mutations: it commits when the closure
//! returns `Ok` and aborts otherwise.

use std::fmt;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, CoreError};

const KV_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// File name of the database inside the db directory.
pub const DB_FILE: &str = "plugman.redb";

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

const NAMESPACE_TERMINATOR: u8 = 0x00;

// ---------------------------------------------------------------------------
// Raw access
// ---------------------------------------------------------------------------

/// Visitor over raw key/value pairs. Must not re-enter the transaction.
pub type RawVisitor<'v> = dyn FnMut(&[u8], &[u8]) -> Result<ControlFlow<()>, CoreError> + 'v;

/// Read access to raw bytes.
pub trait KeyValue {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError>;

    /// Visit every pair whose key starts with `prefix`, in key order, until
    /// the visitor breaks. Cursor resources are released before returning.
    fn scan(&self, prefix: &[u8], visit: &mut RawVisitor<'_>) -> Result<(), CoreError>;

    fn has(&self, key: &[u8]) -> Result<bool, CoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Write access to raw bytes.
pub trait KeyValueMut: KeyValue {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), CoreError>;
    fn delete(&self, key: &[u8]) -> Result<(), CoreError>;
}

/// Exclusive upper bound of the key range covered by `prefix`.
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn scan_table<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    prefix: &[u8],
    visit: &mut RawVisitor<'_>,
) -> Result<(), CoreError> {
    let range = match prefix_end(prefix) {
        Some(end) => table.range(prefix..end.as_slice())?,
        None => table.range(prefix..)?,
    };
    for entry in range {
        let (key, value) = entry?;
        if visit(key.value(), value.value())?.is_break() {
            break;
        }
    }
    Ok(())
}

/// A read-only snapshot.
pub struct ReadTxn(redb::ReadTransaction);

impl KeyValue for ReadTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        let table = self.0.open_table(KV_TABLE)?;
        let value = table.get(key)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn scan(&self, prefix: &[u8], visit: &mut RawVisitor<'_>) -> Result<(), CoreError> {
        let table = self.0.open_table(KV_TABLE)?;
        scan_table(&table, prefix, visit)
    }
}

/// A write transaction. Dropping it without [`WriteTxn::commit`] discards
/// every write.
pub struct WriteTxn(redb::WriteTransaction);

impl WriteTxn {
    pub fn commit(self) -> Result<(), CoreError> {
        self.0.commit()?;
        Ok(())
    }

    pub fn abort(self) -> Result<(), CoreError> {
        self.0.abort()?;
        Ok(())
    }
}

impl KeyValue for WriteTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        let table = self.0.open_table(KV_TABLE)?;
        let value = table.get(key)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn scan(&self, prefix: &[u8], visit: &mut RawVisitor<'_>) -> Result<(), CoreError> {
        let table = self.0.open_table(KV_TABLE)?;
        scan_table(&table, prefix, visit)
    }
}

impl KeyValueMut for WriteTxn {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), CoreError> {
        let mut table = self.0.open_table(KV_TABLE)?;
        table.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), CoreError> {
        let mut table = self.0.open_table(KV_TABLE)?;
        table.remove(key)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Database handle
// ---------------------------------------------------------------------------

/// Handle to the embedded database. Opened once per process and passed to
/// every component that needs it.
pub struct KvStore {
    db: Database,
    path: PathBuf,
}

impl fmt::Debug for KvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvStore").field("path", &self.path).finish()
    }
}

impl KvStore {
    /// Open (or create) the database under `dir`, checking the schema version.
    pub fn open(dir: &Path) -> Result<Self, CoreError> {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let path = dir.join(DB_FILE);
        let db = Database::create(&path)?;
        let store = Self { db, path };
        store.update(ensure_schema)?;
        tracing::debug!(path = %store.path.display(), "opened store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<ReadTxn, CoreError> {
        Ok(ReadTxn(self.db.begin_read()?))
    }

    pub fn write(&self) -> Result<WriteTxn, CoreError> {
        Ok(WriteTxn(self.db.begin_write()?))
    }

    /// Run `f` inside one write transaction; commit on `Ok`, abort on `Err`.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&WriteTxn) -> Result<T, E>,
        E: From<CoreError>,
    {
        let txn = self.write()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!(error = %abort_err, "failed to abort write transaction");
                }
                Err(err)
            }
        }
    }

    /// Run `f` against a read snapshot.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTxn) -> Result<T, E>,
        E: From<CoreError>,
    {
        let txn = self.read()?;
        f(&txn)
    }
}

fn ensure_schema(txn: &WriteTxn) -> Result<(), CoreError> {
    let meta: Storage<u32> = Storage::new(Namespace::root("meta"));
    match meta.get_opt(txn, "schema_version")? {
        None => meta.put(txn, "schema_version", &SCHEMA_VERSION),
        Some(SCHEMA_VERSION) => Ok(()),
        Some(found) => Err(CoreError::SchemaMismatch {
            found,
            expected: SCHEMA_VERSION,
        }),
    }
}

// ---------------------------------------------------------------------------
// Namespaces and typed storage
// ---------------------------------------------------------------------------

/// A NUL-terminated key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(Vec<u8>);

impl Namespace {
    pub fn root(name: &str) -> Self {
        Self(Vec::new()).child(name)
    }

    pub fn child(&self, name: &str) -> Self {
        let mut prefix = self.0.clone();
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(NAMESPACE_TERMINATOR);
        Self(prefix)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn key(&self, key: &str) -> Vec<u8> {
        let mut full = self.0.clone();
        full.extend_from_slice(key.as_bytes());
        full
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments: Vec<_> = self
            .0
            .split(|b| *b == NAMESPACE_TERMINATOR)
            .filter(|s| !s.is_empty())
            .map(String::from_utf8_lossy)
            .collect();
        f.write_str(&segments.join("/"))
    }
}

/// A typed view of one namespace. Values of type `T` are stored as JSON under
/// string keys.
#[derive(Debug, Clone)]
pub struct Storage<T> {
    namespace: Namespace,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> Storage<T> {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            _marker: PhantomData,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Fetch `key`, failing with [`CoreError::NotFound`] when absent.
    pub fn get(&self, kv: &impl KeyValue, key: &str) -> Result<T, CoreError> {
        self.get_opt(kv, key)?.ok_or_else(|| CoreError::NotFound {
            namespace: self.namespace.to_string(),
            key: key.to_owned(),
        })
    }

    pub fn get_opt(&self, kv: &impl KeyValue, key: &str) -> Result<Option<T>, CoreError> {
        kv.get(&self.namespace.key(key))?
            .map(|bytes| self.decode(key, &bytes))
            .transpose()
    }

    pub fn has(&self, kv: &impl KeyValue, key: &str) -> Result<bool, CoreError> {
        kv.has(&self.namespace.key(key))
    }

    pub fn put(&self, kv: &impl KeyValueMut, key: &str, value: &T) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| CoreError::Codec {
            namespace: self.namespace.to_string(),
            key: key.to_owned(),
            source,
        })?;
        kv.put(&self.namespace.key(key), &bytes)
    }

    pub fn delete(&self, kv: &impl KeyValueMut, key: &str) -> Result<(), CoreError> {
        kv.delete(&self.namespace.key(key))
    }

    /// Visit every entry in key order until `visit` breaks.
    ///
    /// The visitor must not touch the store; collect what you need and act
    /// after this returns.
    pub fn for_each<F>(&self, kv: &impl KeyValue, mut visit: F) -> Result<(), CoreError>
    where
        F: FnMut(&str, T) -> Result<ControlFlow<()>, CoreError>,
    {
        let prefix = self.namespace.as_bytes();
        kv.scan(prefix, &mut |raw_key, raw_value| {
            let key = String::from_utf8_lossy(&raw_key[prefix.len()..]);
            let value = self.decode(&key, raw_value)?;
            visit(&key, value)
        })
    }

    /// Every entry, in key order.
    pub fn entries(&self, kv: &impl KeyValue) -> Result<Vec<(String, T)>, CoreError> {
        let mut entries = Vec::new();
        self.for_each(kv, |key, value| {
            entries.push((key.to_owned(), value));
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(entries)
    }

    /// Every key, in order.
    pub fn keys(&self, kv: &impl KeyValue) -> Result<Vec<String>, CoreError> {
        let prefix = self.namespace.as_bytes();
        let mut keys = Vec::new();
        kv.scan(prefix, &mut |raw_key, _| {
            keys.push(String::from_utf8_lossy(&raw_key[prefix.len()..]).into_owned());
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(keys)
    }

    /// Delete every entry in the namespace; returns the removed keys.
    pub fn clear(&self, kv: &impl KeyValueMut) -> Result<Vec<String>, CoreError> {
        let keys = self.keys(kv)?;
        for key in &keys {
            self.delete(kv, key)?;
        }
        Ok(keys)
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Result<T, CoreError> {
        serde_json::from_slice(bytes).map_err(|source| CoreError::Codec {
            namespace: self.namespace.to_string(),
            key: key.to_owned(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, KvStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = KvStore::open(dir.path()).expect("open");
        (dir, store)
    }

    fn numbers() -> Storage<u64> {
        Storage::new(Namespace::root("numbers"))
    }

    #[test]
    fn put_get_delete_has() {
        let (_dir, store) = open();
        let numbers = numbers();
        store
            .update(|txn| numbers.put(txn, "one", &1))
            .expect("put");

        let txn = store.read().unwrap();
        assert_eq!(numbers.get(&txn, "one").unwrap(), 1);
        assert!(numbers.has(&txn, "one").unwrap());
        drop(txn);

        store.update(|txn| numbers.delete(txn, "one")).expect("delete");
        let txn = store.read().unwrap();
        assert!(!numbers.has(&txn, "one").unwrap());
    }

    #[test]
    fn missing_key_is_not_found_not_default() {
        let (_dir, store) = open();
        let txn = store.read().unwrap();
        let err = numbers().get(&txn, "ghost").unwrap_err();
        assert!(err.is_not_found(), "got: {err}");
        assert!(err.to_string().contains("ghost"));
        assert_eq!(numbers().get_opt(&txn, "ghost").unwrap(), None);
    }

    #[test]
    fn failed_update_is_rolled_back() {
        let (_dir, store) = open();
        let numbers = numbers();
        let result: Result<(), CoreError> = store.update(|txn| {
            numbers.put(txn, "one", &1)?;
            Err(CoreError::HomeNotFound)
        });
        assert!(result.is_err());
        let txn = store.read().unwrap();
        assert!(!numbers.has(&txn, "one").unwrap());
    }

    #[test]
    fn iteration_is_ordered_and_scoped_to_namespace() {
        let (_dir, store) = open();
        let numbers = numbers();
        let neighbours: Storage<u64> = Storage::new(Namespace::root("numbersx"));
        let nested: Storage<u64> = Storage::new(Namespace::root("numbers").child("inner"));
        store
            .update(|txn| {
                numbers.put(txn, "b", &2)?;
                numbers.put(txn, "a", &1)?;
                numbers.put(txn, "c", &3)?;
                neighbours.put(txn, "z", &26)?;
                nested.put(txn, "q", &17)
            })
            .expect("seed");

        let txn = store.read().unwrap();
        let keys: Vec<_> = neighbours.keys(&txn).unwrap();
        assert_eq!(keys, vec!["z"]);

        let nested_entries = nested.entries(&txn).unwrap();
        assert_eq!(nested_entries, vec![("q".to_string(), 17)]);

        let mut seen = Vec::new();
        numbers
            .for_each(&txn, |key, value| {
                seen.push((key.to_owned(), value));
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();
        let plain: Vec<_> = seen.iter().filter(|(k, _)| !k.contains('\0')).cloned().collect();
        assert_eq!(
            plain,
            vec![("a".to_string(), 1), ("b".to_string(), 2), ("c".to_string(), 3)]
        );
    }

    #[test]
    fn iteration_stops_on_break() {
        let (_dir, store) = open();
        let numbers = numbers();
        store
            .update(|txn| {
                for (i, key) in ["a", "b", "c"].iter().enumerate() {
                    numbers.put(txn, key, &(i as u64))?;
                }
                Ok::<_, CoreError>(())
            })
            .unwrap();

        let txn = store.read().unwrap();
        let mut visited = 0;
        numbers
            .for_each(&txn, |_, _| {
                visited += 1;
                Ok(ControlFlow::Break(()))
            })
            .unwrap();
        assert_eq!(visited, 1);
    }

    #[test]
    fn visitor_error_propagates_and_store_stays_usable() {
        let (_dir, store) = open();
        let numbers = numbers();
        store.update(|txn| numbers.put(txn, "a", &1)).unwrap();

        let txn = store.read().unwrap();
        let err = numbers
            .for_each(&txn, |_, _| Err(CoreError::HomeNotFound))
            .unwrap_err();
        assert!(matches!(err, CoreError::HomeNotFound));
        assert_eq!(numbers.get(&txn, "a").unwrap(), 1);
    }

    #[test]
    fn clear_removes_only_namespace() {
        let (_dir, store) = open();
        let numbers = numbers();
        let other: Storage<u64> = Storage::new(Namespace::root("other"));
        store
            .update(|txn| {
                numbers.put(txn, "a", &1)?;
                other.put(txn, "a", &9)
            })
            .unwrap();
        let removed = store.update(|txn| numbers.clear(txn)).unwrap();
        assert_eq!(removed, vec!["a"]);

        let txn = store.read().unwrap();
        assert!(numbers.entries(&txn).unwrap().is_empty());
        assert_eq!(other.get(&txn, "a").unwrap(), 9);
    }

    #[test]
    fn reopen_preserves_data_and_checks_schema() {
        let dir = TempDir::new().unwrap();
        {
            let store = KvStore::open(dir.path()).unwrap();
            store.update(|txn| numbers().put(txn, "a", &1)).unwrap();
        }
        let store = KvStore::open(dir.path()).unwrap();
        let txn = store.read().unwrap();
        assert_eq!(numbers().get(&txn, "a").unwrap(), 1);
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        {
            let store = KvStore::open(dir.path()).unwrap();
            let meta: Storage<u32> = Storage::new(Namespace::root("meta"));
            store.update(|txn| meta.put(txn, "schema_version", &99)).unwrap();
        }
        let err = KvStore::open(dir.path()).unwrap_err();
        assert!(
            matches!(err, CoreError::SchemaMismatch { found: 99, .. }),
            "got: {err}"
        );
    }

    #[test]
    fn namespace_display_and_prefix_end() {
        let ns = Namespace::root("repo").child("org/core").child("vm");
        assert_eq!(ns.to_string(), "repo/org/core/vm");
        assert_eq!(prefix_end(b"ab\0").unwrap(), b"ab\x01".to_vec());
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
    }
}

//! `RocksDB` document store implementation.
//!
//! Each collection is a column family; documents are stored as CBOR under
//! the key encoding from [`crate::keys`]. `RocksDB` holds an exclusive lock
//! on its directory, so one process owns the store and an in-process write
//! lock is enough to make read-check-write sequences atomic.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, ErrorKind, IteratorMode,
    MultiThreaded, Options,
};

use crate::document::{DocId, Document, Fields};
use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::all_collections;
use crate::DocStore;

/// RocksDB-backed implementation of [`DocStore`].
pub struct RocksDocStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksDocStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_collections()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)
            .map_err(db_error)?;

        tracing::debug!(path = %path.as_ref().display(), "Opened document store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("unknown collection: {name}")))
    }

    /// Serialize a document using CBOR.
    fn serialize(doc: &Document) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(doc, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a document from CBOR.
    fn deserialize(data: &[u8]) -> Result<Document> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get(&self, collection: &str, key: &[u8]) -> Result<Option<Document>> {
        let cf = self.cf(collection)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_error)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Read a document and check it against `expected` under the write lock.
    fn check(&self, collection: &str, id: &DocId, key: &[u8], expected: &Fields) -> Result<Document> {
        let doc = self.get(collection, key)?.ok_or(StoreError::NotFound)?;
        if doc.matches(expected) {
            Ok(doc)
        } else {
            Err(StoreError::ConditionFailed {
                collection: collection.to_string(),
                id: id.to_string(),
            })
        }
    }
}

/// Classify a `RocksDB` error; transient kinds become `Unavailable`.
fn db_error(err: rocksdb::Error) -> StoreError {
    match err.kind() {
        ErrorKind::Busy
        | ErrorKind::TimedOut
        | ErrorKind::TryAgain
        | ErrorKind::Incomplete
        | ErrorKind::ShutdownInProgress => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Database(err.to_string()),
    }
}

impl DocStore for RocksDocStore {
    fn find_one(&self, collection: &str, id: &DocId) -> Result<Option<Document>> {
        self.get(collection, &keys::encode_id(id))
    }

    fn find_all(&self, collection: &str, filter: &Fields) -> Result<Vec<Document>> {
        let cf = self.cf(collection)?;

        let mut docs = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(db_error)?;
            let doc = Self::deserialize(&value)?;
            if doc.matches(filter) {
                docs.push(doc);
            }
        }

        Ok(docs)
    }

    fn insert(&self, collection: &str, doc: Document) -> Result<()> {
        let id = doc.id()?;
        let key = keys::encode_id(&id);
        let value = Self::serialize(&doc)?;
        let cf = self.cf(collection)?;

        let _guard = self.write_lock.lock();
        if self.db.get_pinned_cf(&cf, &key).map_err(db_error)?.is_some() {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        self.db.put_cf(&cf, &key, value).map_err(db_error)
    }

    fn conditional_update(
        &self,
        collection: &str,
        id: &DocId,
        expected: &Fields,
        changes: &Fields,
    ) -> Result<()> {
        let key = keys::encode_id(id);
        let cf = self.cf(collection)?;

        let _guard = self.write_lock.lock();
        let mut doc = self.check(collection, id, &key, expected)?;
        doc.apply(changes);
        let value = Self::serialize(&doc)?;
        self.db.put_cf(&cf, &key, value).map_err(db_error)
    }

    fn remove(&self, collection: &str, id: &DocId, expected: &Fields) -> Result<()> {
        let key = keys::encode_id(id);
        let cf = self.cf(collection)?;

        let _guard = self.write_lock.lock();
        self.check(collection, id, &key, expected)?;
        self.db.delete_cf(&cf, &key).map_err(db_error)
    }

    fn ping(&self) -> Result<()> {
        // Any cheap read proves the database handle is usable.
        self.db
            .property_value("rocksdb.estimate-num-keys")
            .map(|_| ())
            .map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::collection;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksDocStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksDocStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn doc(value: serde_json::Value) -> Document {
        Document::from_record(&value).unwrap()
    }

    #[test]
    fn document_crud() {
        let (store, _dir) = create_test_store();
        let id = DocId::from("wordpress");

        // Create
        store
            .insert(
                collection::SERVICES,
                doc(json!({"_id": "wordpress", "life": "alive", "unitcount": 0})),
            )
            .unwrap();

        // Read
        let stored = store.find_one(collection::SERVICES, &id).unwrap().unwrap();
        assert_eq!(stored.get("unitcount"), Some(&json!(0)));

        // Update
        store
            .conditional_update(
                collection::SERVICES,
                &id,
                &Fields::new().with("life", "alive").with("unitcount", 0),
                &Fields::new().with("life", "dead"),
            )
            .unwrap();

        // Delete
        store
            .remove(collection::SERVICES, &id, &Fields::new().with("life", "dead"))
            .unwrap();
        assert!(store.find_one(collection::SERVICES, &id).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_fails() {
        let (store, _dir) = create_test_store();
        store
            .insert(collection::MACHINES, doc(json!({"_id": 0, "life": "alive"})))
            .unwrap();
        let err = store
            .insert(collection::MACHINES, doc(json!({"_id": 0, "life": "alive"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn find_all_orders_numeric_ids() {
        let (store, _dir) = create_test_store();
        for id in [300u64, 1, 20] {
            store
                .insert(collection::MACHINES, doc(json!({"_id": id, "life": "alive"})))
                .unwrap();
        }
        let ids: Vec<_> = store
            .find_all(collection::MACHINES, &Fields::new().with("life", "alive"))
            .unwrap()
            .iter()
            .map(|d| d.id().unwrap())
            .collect();
        assert_eq!(ids, vec![DocId::Int(1), DocId::Int(20), DocId::Int(300)]);
    }

    #[test]
    fn condition_failures() {
        let (store, _dir) = create_test_store();
        store
            .insert(collection::UNITS, doc(json!({"_id": "mysql/0", "life": "alive"})))
            .unwrap();
        let id = DocId::from("mysql/0");

        let err = store
            .remove(collection::UNITS, &id, &Fields::new().with("life", "dead"))
            .unwrap_err();
        assert!(err.is_condition_failed());

        let err = store
            .conditional_update(
                collection::UNITS,
                &DocId::from("mysql/1"),
                &Fields::new(),
                &Fields::new().with("life", "dead"),
            )
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksDocStore::open(dir.path()).unwrap();
            store
                .insert(collection::CHARMS, doc(json!({"_id": "local:series/dummy-1"})))
                .unwrap();
        }
        let store = RocksDocStore::open(dir.path()).unwrap();
        assert!(store
            .find_one(collection::CHARMS, &DocId::from("local:series/dummy-1"))
            .unwrap()
            .is_some());
        store.ping().unwrap();
    }

    #[test]
    fn unknown_collection_is_an_error() {
        let (store, _dir) = create_test_store();
        let err = store.find_all("nope", &Fields::new()).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}

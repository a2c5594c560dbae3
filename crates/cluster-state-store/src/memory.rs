//! In-memory document store.
//!
//! Used for tests and development. Besides the [`DocStore`] contract it can
//! inject `Unavailable` failures and run an interfering write right before
//! the next write, which is how tests provoke lost conditional-write races
//! deterministically.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use parking_lot::{Mutex, RwLock};

use crate::document::{DocId, Document, Fields};
use crate::error::{Result, StoreError};
use crate::keys;
use crate::DocStore;

type Collection = BTreeMap<Vec<u8>, Document>;
type WriteHook = Box<dyn FnOnce(&MemoryDocStore) + Send>;

#[derive(Default)]
struct Faults {
    unavailable: usize,
    before_write: VecDeque<WriteHook>,
}

/// In-memory implementation of [`DocStore`].
#[derive(Default)]
pub struct MemoryDocStore {
    collections: RwLock<HashMap<String, Collection>>,
    faults: Mutex<Faults>,
}

impl MemoryDocStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.faults.lock().unavailable = count;
    }

    /// Queue a hook that runs immediately before the next write operation.
    ///
    /// Hooks run in FIFO order, one per write. A write made by a hook
    /// consumes the next queued hook, if any.
    pub fn before_next_write(&self, hook: impl FnOnce(&MemoryDocStore) + Send + 'static) {
        self.faults.lock().before_write.push_back(Box::new(hook));
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn check_available(&self) -> Result<()> {
        let mut faults = self.faults.lock();
        if faults.unavailable > 0 {
            faults.unavailable -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn run_write_hook(&self) {
        // Take the hook before running it so it may write without deadlocking.
        let hook = self.faults.lock().before_write.pop_front();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    fn before_write(&self) -> Result<()> {
        self.run_write_hook();
        self.check_available()
    }
}

impl fmt::Debug for MemoryDocStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let collections = self.collections.read();
        f.debug_struct("MemoryDocStore")
            .field(
                "collections",
                &collections
                    .iter()
                    .map(|(name, docs)| (name.as_str(), docs.len()))
                    .collect::<BTreeMap<_, _>>(),
            )
            .finish_non_exhaustive()
    }
}

impl DocStore for MemoryDocStore {
    fn find_one(&self, collection: &str, id: &DocId) -> Result<Option<Document>> {
        self.check_available()?;
        let key = keys::encode_id(id);
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(&key))
            .cloned())
    }

    fn find_all(&self, collection: &str, filter: &Fields) -> Result<Vec<Document>> {
        self.check_available()?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc.matches(filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert(&self, collection: &str, doc: Document) -> Result<()> {
        self.before_write()?;
        let id = doc.id()?;
        let key = keys::encode_id(&id);

        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(key, doc);
        Ok(())
    }

    fn conditional_update(
        &self,
        collection: &str,
        id: &DocId,
        expected: &Fields,
        changes: &Fields,
    ) -> Result<()> {
        self.before_write()?;
        let key = keys::encode_id(id);

        let mut collections = self.collections.write();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(&key))
            .ok_or(StoreError::NotFound)?;
        if !doc.matches(expected) {
            return Err(StoreError::ConditionFailed {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        doc.apply(changes);
        Ok(())
    }

    fn remove(&self, collection: &str, id: &DocId, expected: &Fields) -> Result<()> {
        self.before_write()?;
        let key = keys::encode_id(id);

        let mut collections = self.collections.write();
        let docs = collections
            .get_mut(collection)
            .ok_or(StoreError::NotFound)?;
        let doc = docs.get(&key).ok_or(StoreError::NotFound)?;
        if !doc.matches(expected) {
            return Err(StoreError::ConditionFailed {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.remove(&key);
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

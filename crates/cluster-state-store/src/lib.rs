//! Document store adapter for the cluster state layer.
//!
//! This crate provides a collection-oriented document store whose only
//! atomicity primitive is the single-document conditional write: an update
//! or delete is applied only if the document's current fields match an
//! expected snapshot. There are no multi-document transactions.
//!
//! # Backends
//!
//! - [`RocksDocStore`]: `RocksDB`, one column family per collection, CBOR values
//! - [`MemoryDocStore`]: in-memory, with fault injection for tests
//!
//! # Example
//!
//! ```
//! use cluster_state_store::{collection, DocId, DocStore, Document, Fields, MemoryDocStore};
//!
//! let store = MemoryDocStore::new();
//! let doc = Document::from_record(&serde_json::json!({"_id": 0, "life": "alive"})).unwrap();
//! store.insert(collection::MACHINES, doc).unwrap();
//!
//! // Only succeeds while the machine is still alive.
//! store
//!     .conditional_update(
//!         collection::MACHINES,
//!         &DocId::Int(0),
//!         &Fields::new().with("life", "alive"),
//!         &Fields::new().with("life", "dead"),
//!     )
//!     .unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod document;
pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;

pub use document::{DocId, Document, Fields, ID_FIELD};
pub use error::{Result, StoreError};
pub use memory::MemoryDocStore;
pub use rocks::RocksDocStore;
pub use schema::collection;

/// The document store contract.
///
/// All operations may contact a replicated backend and fail with
/// `StoreError::Unavailable`, which callers must treat as "outcome unknown".
pub trait DocStore: Send + Sync {
    /// Look up a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn find_one(&self, collection: &str, id: &DocId) -> Result<Option<Document>>;

    /// Return every document whose fields match `filter`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn find_all(&self, collection: &str, filter: &Fields) -> Result<Vec<Document>>;

    /// Insert a new document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a document with the same id exists.
    fn insert(&self, collection: &str, doc: Document) -> Result<()>;

    /// Apply `changes` to a document only if it currently matches `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the document does not exist and
    /// `StoreError::ConditionFailed` if it exists but does not match.
    fn conditional_update(
        &self,
        collection: &str,
        id: &DocId,
        expected: &Fields,
        changes: &Fields,
    ) -> Result<()>;

    /// Delete a document only if it currently matches `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the document does not exist and
    /// `StoreError::ConditionFailed` if it exists but does not match.
    fn remove(&self, collection: &str, id: &DocId, expected: &Fields) -> Result<()>;

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if it is not.
    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

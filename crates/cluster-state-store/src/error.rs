//! Error types for the document store.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during document store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("document not found")]
    NotFound,

    /// A document with the same id already exists in the collection.
    #[error("duplicate key {id} in collection {collection}")]
    DuplicateKey {
        /// The collection written to.
        collection: String,
        /// The colliding id.
        id: String,
    },

    /// The document exists but its fields did not match the expected values.
    #[error("condition failed for {id} in collection {collection}")]
    ConditionFailed {
        /// The collection written to.
        collection: String,
        /// The id of the document whose condition failed.
        id: String,
    },

    /// The backend could not be reached; the outcome of a write is unknown.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A non-transient database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The document is not usable, e.g. it lacks an `_id` field.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl StoreError {
    /// Returns true if the error reports a lost conditional-write race.
    #[must_use]
    pub const fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }

    /// Returns true if the backend was unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

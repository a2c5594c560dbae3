//! Error types for the state layer.
//!
//! Every error returned by a [`State`](crate::State) operation names the
//! operation and entity it concerns (`can't remove machine 3`) together with
//! an [`ErrorKind`] describing what went wrong.

use cluster_state_core::IdError;
use cluster_state_store::StoreError;
use thiserror::Error;

use crate::docs::Life;

/// A result type using `StateError`.
pub type Result<T> = std::result::Result<T, StateError>;

/// Result of an internal step, before the operation context is attached.
pub(crate) type OpResult<T> = std::result::Result<T, ErrorKind>;

/// An error from a state operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context}: {kind}")]
pub struct StateError {
    context: String,
    kind: ErrorKind,
}

impl StateError {
    /// Attach an operation context to an error kind.
    ///
    /// `AlreadyRemoved` is reported as `NotFound`: callers of the state
    /// handle cannot act differently on the two.
    #[must_use]
    pub fn new(context: impl Into<String>, kind: impl Into<ErrorKind>) -> Self {
        let kind = match kind.into() {
            ErrorKind::AlreadyRemoved => ErrorKind::NotFound,
            kind => kind,
        };
        Self {
            context: context.into(),
            kind,
        }
    }

    /// What went wrong.
    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The operation that failed, e.g. `can't remove machine 0`.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns true if the addressed entity does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }

    /// Returns true if the caller may retry the whole operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// The kinds of failure a state operation can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// The entity does not exist.
    #[error("not found")]
    NotFound,

    /// An entity with the same identity already exists.
    #[error("already exists")]
    AlreadyExists,

    /// A conditional write lost a race.
    #[error("state changed concurrently")]
    ConditionFailed,

    /// Removal is blocked by dependents that are not dead.
    #[error("in use: {0}")]
    InUse(String),

    /// A referenced charm cannot be resolved or is unusable.
    #[error("invalid charm: {0}")]
    InvalidCharm(String),

    /// An idempotency violation, or a race that kept being lost.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The entity is no longer alive.
    #[error("not alive")]
    NotAlive,

    /// The document was deleted before this caller could delete it.
    #[error("already removed")]
    AlreadyRemoved,

    /// The lifecycle does not allow this transition.
    #[error("cannot go from {from} to {to}")]
    InvalidTransition {
        /// The current life.
        from: Life,
        /// The requested life.
        to: Life,
    },

    /// The backend could not be reached; the outcome is unknown.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An identity failed to parse.
    #[error(transparent)]
    InvalidId(#[from] IdError),

    /// The state handle has been closed.
    #[error("state has been closed")]
    Closed,

    /// Any other store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl ErrorKind {
    /// Returns true if retrying the whole operation might succeed.
    ///
    /// Only an unreachable backend qualifies; lost races are retried inside
    /// the state layer already.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StoreError> for ErrorKind {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::DuplicateKey { .. } => Self::AlreadyExists,
            StoreError::ConditionFailed { .. } => Self::ConditionFailed,
            StoreError::Unavailable(reason) => Self::Unavailable(reason),
            other => Self::Store(other),
        }
    }
}

impl From<serde_json::Error> for ErrorKind {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(StoreError::from(err))
    }
}

/// Attach operation context to internal results.
pub(crate) trait ResultExt<T> {
    fn context<F: FnOnce() -> String>(self, context: F) -> Result<T>;
}

impl<T, E: Into<ErrorKind>> ResultExt<T> for std::result::Result<T, E> {
    fn context<F: FnOnce() -> String>(self, context: F) -> Result<T> {
        self.map_err(|kind| StateError::new(context(), kind))
    }
}

//! The state handle.
//!
//! `State` owns the document store connection for the life of the process.
//! Entity operations live in impl blocks in the per-entity modules; this
//! module holds construction, shutdown, watching and the helpers they share.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cluster_state_store::{DocId, DocStore, Document};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::docs;
use crate::error::{ErrorKind, OpResult, Result, ResultExt};
use crate::retry::RetryPolicy;
use crate::watcher::{Hub, Scope, Watcher};

/// Configuration for the state handle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateConfig {
    /// Attempts made by a read-check-write sequence before giving up.
    #[serde(default = "StateConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts, in milliseconds.
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            retry_backoff_ms: 0,
        }
    }
}

impl StateConfig {
    const fn default_max_attempts() -> u32 {
        5
    }

    /// The retry policy this configuration describes.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

/// The handle through which all entity state is read and changed.
///
/// Construct it once per process and share it (`Arc<State<S>>`). Call
/// [`State::close`] on shutdown.
pub struct State<S: DocStore> {
    store: Arc<S>,
    hub: Arc<Hub>,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl<S: DocStore> State<S> {
    /// Create a state handle over an open document store.
    #[must_use]
    pub fn new(store: Arc<S>, config: &StateConfig) -> Self {
        Self {
            store,
            hub: Arc::new(Hub::default()),
            retry: config.retry_policy(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, &StateConfig::default())
    }

    /// The underlying document store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Subscribe to changes in one or more scopes.
    ///
    /// The watcher starts with one pending signal.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Closed` if the state has been closed.
    pub fn watch(&self, scopes: impl IntoIterator<Item = Scope>) -> Result<Watcher> {
        self.check_open()
            .and_then(|()| {
                // A close racing with this call wins; the hub refuses under its lock.
                self.hub
                    .subscribe(scopes.into_iter().collect())
                    .ok_or(ErrorKind::Closed)
            })
            .context(|| "can't start watcher".to_string())
    }

    /// Check that the backing store answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the state is closed or the store is unreachable.
    pub fn ping(&self) -> Result<()> {
        self.check_open()
            .and_then(|()| self.store.ping().map_err(ErrorKind::from))
            .context(|| "can't reach state".to_string())
    }

    /// Close the handle.
    ///
    /// Every live watcher is stopped and later operations fail with
    /// `ErrorKind::Closed`. Closing twice is harmless.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.hub.close();
            tracing::info!("State closed");
        }
    }

    /// Returns true once [`State::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.hub.len()
    }

    pub(crate) fn check_open(&self) -> OpResult<()> {
        if self.is_closed() {
            Err(ErrorKind::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn publish(&self, scopes: &[Scope]) {
        self.hub.publish(scopes);
    }

    /// Fetch a raw document.
    pub(crate) fn find(&self, collection: &str, id: &DocId) -> OpResult<Option<Document>> {
        self.store.find_one(collection, id).map_err(ErrorKind::from)
    }

    /// Fetch and decode a document that must exist.
    pub(crate) fn get<T: DeserializeOwned>(&self, collection: &str, id: &DocId) -> OpResult<T> {
        self.find(collection, id)?
            .ok_or(ErrorKind::NotFound)
            .and_then(docs::decode)
    }

    /// Insert a record.
    pub(crate) fn insert<T: serde::Serialize>(&self, collection: &str, record: &T) -> OpResult<()> {
        let doc = Document::from_record(record)?;
        self.store.insert(collection, doc).map_err(ErrorKind::from)
    }
}

impl<S: DocStore> std::fmt::Debug for State<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("retry", &self.retry)
            .field("watchers", &self.hub.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

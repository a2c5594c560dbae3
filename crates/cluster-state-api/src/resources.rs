//! Registry of server-side watchers handed out to API clients.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cluster_state::{StopHandle, Watcher};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ApiError, Result};

struct Entry {
    watcher: Arc<tokio::sync::Mutex<Watcher>>,
    stop: StopHandle,
}

/// Live watchers, keyed by the id clients use to reach them.
#[derive(Default)]
pub struct Resources {
    next_id: AtomicU64,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Resources {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher and return its id. Ids are `"1"`, `"2"`, ...
    pub fn register(&self, watcher: Watcher) -> String {
        let id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        let entry = Entry {
            stop: watcher.stop_handle(),
            watcher: Arc::new(tokio::sync::Mutex::new(watcher)),
        };
        self.entries.lock().insert(id.clone(), entry);
        debug!(watcher_id = %id, "Registered watcher");
        id
    }

    /// The watcher registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownWatcher` if no live watcher has this id.
    pub fn get(&self, id: &str) -> Result<Arc<tokio::sync::Mutex<Watcher>>> {
        self.entries
            .lock()
            .get(id)
            .map(|entry| Arc::clone(&entry.watcher))
            .ok_or_else(|| ApiError::UnknownWatcher(id.to_string()))
    }

    /// Stop the watcher registered under `id` and forget it.
    ///
    /// A reader blocked on the watcher is woken and sees it stopped.
    ///
    /// # Errors
    ///
    /// Returns `UnknownWatcher` if no live watcher has this id.
    pub fn stop(&self, id: &str) -> Result<()> {
        let entry = self
            .entries
            .lock()
            .remove(id)
            .ok_or_else(|| ApiError::UnknownWatcher(id.to_string()))?;
        entry.stop.stop();
        debug!(watcher_id = %id, "Stopped watcher");
        Ok(())
    }

    /// Stop and forget every watcher.
    pub fn stop_all(&self) {
        let entries: Vec<Entry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in entries {
            entry.stop.stop();
        }
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no watchers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("watchers", &self.len())
            .finish_non_exhaustive()
    }
}

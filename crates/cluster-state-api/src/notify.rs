//! The `NotifyWatcher` facade and its client.

use std::sync::Arc;

use serde_json::Value;

use crate::caller::{call_typed, ApiCaller};
use crate::error::{ApiError, Result};
use crate::resources::Resources;

/// Facade name.
pub const NOTIFY_WATCHER_FACADE: &str = "NotifyWatcher";

/// Server side of a notify watcher: serves `Next` and `Stop` by watcher id.
#[derive(Debug, Clone)]
pub struct NotifyWatcherFacade {
    resources: Arc<Resources>,
}

impl NotifyWatcherFacade {
    /// Serve the watchers registered in `resources`.
    #[must_use]
    pub const fn new(resources: Arc<Resources>) -> Self {
        Self { resources }
    }

    /// Wait for the watcher's next change.
    ///
    /// # Errors
    ///
    /// Returns `UnknownWatcher` for an unknown id and `WatcherStopped` if
    /// the watcher stops while waiting.
    pub async fn next(&self, id: &str) -> Result<()> {
        let watcher = self.resources.get(id)?;
        let mut watcher = watcher.lock().await;
        watcher.changes().await.ok_or(ApiError::WatcherStopped)
    }

    /// Stop the watcher.
    ///
    /// # Errors
    ///
    /// Returns `UnknownWatcher` for an unknown id.
    pub fn stop(&self, id: &str) -> Result<()> {
        self.resources.stop(id)
    }
}

/// Client side of a notify watcher living on the server.
pub struct RemoteNotifyWatcher<C: ApiCaller + ?Sized> {
    caller: Arc<C>,
    id: String,
}

impl<C: ApiCaller + ?Sized> RemoteNotifyWatcher<C> {
    /// Wrap the server watcher with `id`.
    pub fn new(caller: Arc<C>, id: impl Into<String>) -> Self {
        Self {
            caller,
            id: id.into(),
        }
    }

    /// The server-side watcher id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next change.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the watcher has stopped.
    pub async fn next(&self) -> Result<()> {
        let _: Value = call_typed(
            self.caller.as_ref(),
            NOTIFY_WATCHER_FACADE,
            &self.id,
            "Next",
            &Value::Null,
        )
        .await?;
        Ok(())
    }

    /// Stop the server-side watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the watcher is unknown.
    pub async fn stop(&self) -> Result<()> {
        let _: Value = call_typed(
            self.caller.as_ref(),
            NOTIFY_WATCHER_FACADE,
            &self.id,
            "Stop",
            &Value::Null,
        )
        .await?;
        Ok(())
    }
}

impl<C: ApiCaller + ?Sized> std::fmt::Debug for RemoteNotifyWatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteNotifyWatcher")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

//! The `ProxyUpdater` facade.
//!
//! Agents use it to learn the environment's proxy settings and to be told
//! when those settings, or the API server addresses, change.

use std::sync::Arc;

use cluster_state::{ProxySettings, Scope, State};
use cluster_state_core::Tag;
use cluster_state_store::DocStore;
use tracing::{debug, warn};

use crate::caller::{call_typed, ApiCaller};
use crate::error::{ApiError, Result};
use crate::notify::RemoteNotifyWatcher;
use crate::params::{
    single, Entities, NotifyWatchResult, NotifyWatchResults, ProxyConfigResult,
    ProxyConfigResults, ServerError,
};
use crate::resources::Resources;

/// Facade name.
pub const PROXY_UPDATER_FACADE: &str = "ProxyUpdater";

/// Method starting a watcher on proxy settings and API addresses.
pub const WATCH_METHOD: &str = "WatchForProxyConfigAndAPIHostPortChanges";

/// Method reading the proxy settings.
pub const PROXY_CONFIG_METHOD: &str = "ProxyConfig";

/// Client for the `ProxyUpdater` facade, acting for one agent.
pub struct ProxyUpdaterClient<C: ApiCaller + ?Sized> {
    caller: Arc<C>,
    tag: Tag,
}

impl<C: ApiCaller + ?Sized> ProxyUpdaterClient<C> {
    /// Create a client acting for the entity with `tag`. No call is made.
    pub fn new(caller: Arc<C>, tag: Tag) -> Self {
        Self { caller, tag }
    }

    /// The entity this client acts for.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }

    fn entities(&self) -> Entities {
        Entities::one(self.tag.to_string())
    }

    /// Start watching proxy settings and API addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails, the server does not return
    /// exactly one result, or the result carries an error.
    pub async fn watch_for_proxy_config_and_api_host_port_changes(
        &self,
    ) -> Result<RemoteNotifyWatcher<C>> {
        let results: NotifyWatchResults = call_typed(
            self.caller.as_ref(),
            PROXY_UPDATER_FACADE,
            "",
            WATCH_METHOD,
            &self.entities(),
        )
        .await?;
        let result = single(results.results)?;
        if let Some(err) = result.error {
            return Err(err.into());
        }
        Ok(RemoteNotifyWatcher::new(
            Arc::clone(&self.caller),
            result.notify_watcher_id,
        ))
    }

    /// The current proxy settings, general and for the package manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails, the server does not return
    /// exactly one result, or the result carries an error.
    pub async fn proxy_config(&self) -> Result<(ProxySettings, ProxySettings)> {
        let results: ProxyConfigResults = call_typed(
            self.caller.as_ref(),
            PROXY_UPDATER_FACADE,
            "",
            PROXY_CONFIG_METHOD,
            &self.entities(),
        )
        .await?;
        let result = single(results.results)?;
        if let Some(err) = result.error {
            return Err(err.into());
        }
        Ok((
            result.proxy_settings.into(),
            result.apt_proxy_settings.into(),
        ))
    }
}

impl<C: ApiCaller + ?Sized> std::fmt::Debug for ProxyUpdaterClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyUpdaterClient")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Server side of the `ProxyUpdater` facade for one authenticated agent.
pub struct ProxyUpdaterFacade<S: DocStore> {
    state: Arc<State<S>>,
    resources: Arc<Resources>,
    authorized: Tag,
}

impl<S: DocStore> ProxyUpdaterFacade<S> {
    /// Serve the agent with tag `authorized`.
    pub fn new(state: Arc<State<S>>, resources: Arc<Resources>, authorized: Tag) -> Self {
        Self {
            state,
            resources,
            authorized,
        }
    }

    fn authorize(&self, tag: &str) -> Result<()> {
        if tag == self.authorized.to_string() {
            Ok(())
        } else {
            warn!(requested = tag, authorized = %self.authorized, "Permission denied");
            Err(ApiError::PermissionDenied)
        }
    }

    async fn watch_one(&self, tag: &str) -> Result<String> {
        self.authorize(tag)?;
        let mut watcher = self
            .state
            .watch([Scope::EnvironConfig, Scope::ApiHostPorts])?;
        // The client's first Next should wait for an actual change.
        watcher.changes().await.ok_or(ApiError::WatcherStopped)?;
        let id = self.resources.register(watcher);
        debug!(tag, watcher_id = %id, "Watching proxy config");
        Ok(id)
    }

    /// Start one watcher per requested entity.
    pub async fn watch_for_proxy_config_and_api_host_port_changes(
        &self,
        args: &Entities,
    ) -> NotifyWatchResults {
        let mut results = Vec::with_capacity(args.entities.len());
        for entity in &args.entities {
            results.push(match self.watch_one(&entity.tag).await {
                Ok(id) => NotifyWatchResult {
                    notify_watcher_id: id,
                    error: None,
                },
                Err(err) => NotifyWatchResult {
                    notify_watcher_id: String::new(),
                    error: Some(ServerError::from(&err)),
                },
            });
        }
        NotifyWatchResults { results }
    }

    fn config_one(&self, tag: &str) -> Result<ProxyConfigResult> {
        self.authorize(tag)?;
        let settings = self.state.environ_settings()?;
        Ok(ProxyConfigResult {
            proxy_settings: (&settings.proxy).into(),
            apt_proxy_settings: (&settings.aptproxy).into(),
            error: None,
        })
    }

    /// The committed proxy settings, once per requested entity.
    #[must_use]
    pub fn proxy_config(&self, args: &Entities) -> ProxyConfigResults {
        ProxyConfigResults {
            results: args
                .entities
                .iter()
                .map(|entity| {
                    self.config_one(&entity.tag)
                        .unwrap_or_else(|err| ProxyConfigResult {
                            error: Some(ServerError::from(&err)),
                            ..ProxyConfigResult::default()
                        })
                })
                .collect(),
        }
    }
}

impl<S: DocStore> std::fmt::Debug for ProxyUpdaterFacade<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyUpdaterFacade")
            .field("authorized", &self.authorized)
            .finish_non_exhaustive()
    }
}

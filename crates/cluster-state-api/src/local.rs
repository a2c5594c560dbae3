//! In-process dispatch of facade calls.

use std::sync::Arc;

use async_trait::async_trait;
use cluster_state::State;
use cluster_state_core::Tag;
use cluster_state_store::DocStore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::caller::ApiCaller;
use crate::error::{ApiError, Result};
use crate::notify::{NotifyWatcherFacade, NOTIFY_WATCHER_FACADE};
use crate::params::Entities;
use crate::proxyupdater::{
    ProxyUpdaterFacade, PROXY_CONFIG_METHOD, PROXY_UPDATER_FACADE, WATCH_METHOD,
};
use crate::resources::Resources;

/// Routes calls straight to the server facades of one authenticated agent.
pub struct LocalCaller<S: DocStore> {
    proxy_updater: ProxyUpdaterFacade<S>,
    notify_watcher: NotifyWatcherFacade,
    resources: Arc<Resources>,
}

impl<S: DocStore> LocalCaller<S> {
    /// Serve the agent with tag `authorized` from `state`.
    pub fn new(state: Arc<State<S>>, authorized: Tag) -> Self {
        let resources = Arc::new(Resources::new());
        Self {
            proxy_updater: ProxyUpdaterFacade::new(state, Arc::clone(&resources), authorized),
            notify_watcher: NotifyWatcherFacade::new(Arc::clone(&resources)),
            resources,
        }
    }

    /// The watchers this caller's facades have handed out.
    #[must_use]
    pub const fn resources(&self) -> &Arc<Resources> {
        &self.resources
    }
}

fn decode<T: DeserializeOwned>(args: Value) -> Result<T> {
    Ok(serde_json::from_value(args)?)
}

fn unknown_method(facade: &str, method: &str) -> ApiError {
    ApiError::UnknownMethod {
        facade: facade.to_string(),
        method: method.to_string(),
    }
}

#[async_trait]
impl<S: DocStore + 'static> ApiCaller for LocalCaller<S> {
    async fn call(
        &self,
        facade: &str,
        version: u32,
        id: &str,
        method: &str,
        args: Value,
    ) -> Result<Value> {
        trace!(facade, version, id, method, "API call");
        match facade {
            PROXY_UPDATER_FACADE => match method {
                WATCH_METHOD => {
                    let args: Entities = decode(args)?;
                    let results = self
                        .proxy_updater
                        .watch_for_proxy_config_and_api_host_port_changes(&args)
                        .await;
                    Ok(serde_json::to_value(results)?)
                }
                PROXY_CONFIG_METHOD => {
                    let args: Entities = decode(args)?;
                    Ok(serde_json::to_value(self.proxy_updater.proxy_config(&args))?)
                }
                _ => Err(unknown_method(facade, method)),
            },
            NOTIFY_WATCHER_FACADE => match method {
                "Next" => self.notify_watcher.next(id).await.map(|()| Value::Null),
                "Stop" => self.notify_watcher.stop(id).map(|()| Value::Null),
                _ => Err(unknown_method(facade, method)),
            },
            _ => Err(ApiError::UnknownFacade(facade.to_string())),
        }
    }
}

impl<S: DocStore> Drop for LocalCaller<S> {
    fn drop(&mut self) {
        self.resources.stop_all();
    }
}

impl<S: DocStore> std::fmt::Debug for LocalCaller<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCaller")
            .field("proxy_updater", &self.proxy_updater)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

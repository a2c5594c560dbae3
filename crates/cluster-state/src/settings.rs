//! Environment-wide settings: proxy configuration and API server addresses.
//!
//! Both documents carry a revision number and every write is conditional on
//! the revision that was read.

use cluster_state_store::{collection, DocId, DocStore, Fields, ID_FIELD};
use serde_json::{Map, Value};

use crate::docs::{self, counter, field, ApiHostPortsDoc, EnvironSettings, ProxySettings};
use crate::error::{ErrorKind, OpResult, Result, ResultExt};
use crate::state::State;
use crate::watcher::Scope;

const ENVIRON_SETTINGS: &str = "environ";
const API_HOST_PORTS: &str = "apiHostPorts";

impl<S: DocStore> State<S> {
    /// The current environment settings.
    ///
    /// Settings that were never written read as the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn environ_settings(&self) -> Result<EnvironSettings> {
        self.check_open()
            .and_then(|()| self.read_settings(ENVIRON_SETTINGS))
            .context(|| "can't get environment settings".to_string())
    }

    /// Replace the proxy settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn update_environ_settings(
        &self,
        proxy: &ProxySettings,
        apt_proxy: &ProxySettings,
    ) -> Result<EnvironSettings> {
        self.check_open()
            .and_then(|()| {
                let changes = Fields::new()
                    .with("proxy", serde_json::to_value(proxy)?)
                    .with("aptproxy", serde_json::to_value(apt_proxy)?);
                self.write_settings(ENVIRON_SETTINGS, &changes)?;
                tracing::info!(http_proxy = %proxy.http, "Updated environment settings");
                self.publish(&[Scope::EnvironConfig]);
                self.read_settings(ENVIRON_SETTINGS)
            })
            .context(|| "can't update environment settings".to_string())
    }

    /// The `host:port` addresses of the API servers.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn api_host_ports(&self) -> Result<Vec<String>> {
        self.check_open()
            .and_then(|()| self.read_settings::<ApiHostPortsDoc>(API_HOST_PORTS))
            .map(|doc| doc.hostports)
            .context(|| "can't get API addresses".to_string())
    }

    /// Record the API server addresses.
    ///
    /// Watchers are only notified if the addresses changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_api_host_ports(&self, host_ports: &[String]) -> Result<()> {
        self.check_open()
            .and_then(|()| {
                let current: ApiHostPortsDoc = self.read_settings(API_HOST_PORTS)?;
                if current.revno > 0 && current.hostports == host_ports {
                    return Ok(());
                }
                self.write_settings(
                    API_HOST_PORTS,
                    &Fields::new().with("hostports", serde_json::to_value(host_ports)?),
                )?;
                tracing::info!(addresses = ?host_ports, "Updated API addresses");
                self.publish(&[Scope::ApiHostPorts]);
                Ok(())
            })
            .context(|| "can't set API addresses".to_string())
    }

    fn read_settings<T: serde::de::DeserializeOwned + Default>(&self, id: &str) -> OpResult<T> {
        self.find(collection::SETTINGS, &DocId::from(id))?
            .map_or_else(|| Ok(T::default()), docs::decode)
    }

    /// Apply `changes` to a settings document, bumping its revision.
    fn write_settings(&self, id: &str, changes: &Fields) -> OpResult<()> {
        let doc_id = DocId::from(id);
        self.retry().run("write settings", || {
            match self.find(collection::SETTINGS, &doc_id)? {
                Some(raw) => {
                    let (revno, revno_raw) = counter(&raw, field::REVNO);
                    let mut update = changes.clone();
                    update.set(field::REVNO, revno + 1);
                    self.store()
                        .conditional_update(
                            collection::SETTINGS,
                            &doc_id,
                            &Fields::new().with(field::REVNO, revno_raw),
                            &update,
                        )
                        .map_err(ErrorKind::from)
                }
                None => {
                    let mut record = Map::new();
                    record.insert(ID_FIELD.to_string(), Value::from(id));
                    record.insert(field::REVNO.to_string(), Value::from(1u64));
                    for (name, value) in changes.iter() {
                        record.insert(name.to_string(), value.clone());
                    }
                    match self.insert(collection::SETTINGS, &record) {
                        // Created concurrently; update it instead.
                        Err(ErrorKind::AlreadyExists) => Err(ErrorKind::ConditionFailed),
                        other => other,
                    }
                }
            }
        })
    }
}

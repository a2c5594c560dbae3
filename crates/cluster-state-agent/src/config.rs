//! The in-memory agent configuration record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cluster_state_core::Tag;

/// Keys of the `values` map that migration fills in.
pub mod keys {
    /// The cloud provider the environment runs on.
    pub const PROVIDER_TYPE: &str = "PROVIDER_TYPE";
    /// The container type the agent runs in.
    pub const CONTAINER_TYPE: &str = "CONTAINER_TYPE";
    /// Bridge device for LXC containers.
    pub const LXC_BRIDGE: &str = "LXC_BRIDGE";
    /// Local storage directory.
    pub const STORAGE_DIR: &str = "STORAGE_DIR";
    /// Local storage address.
    pub const STORAGE_ADDR: &str = "STORAGE_ADDR";
}

/// Where and how to connect to a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// `host:port` addresses.
    pub addresses: Vec<String>,
    /// Password for the agent's entity.
    pub password: String,
}

/// An agent's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    dir: PathBuf,
    tag: Tag,
    nonce: String,
    ca_cert: Vec<u8>,
    state: Option<ConnectionDetails>,
    api: Option<ConnectionDetails>,
    old_password: String,
    state_server_cert: Vec<u8>,
    state_server_key: Vec<u8>,
    api_port: u16,
    values: BTreeMap<String, String>,
}

impl AgentConfig {
    /// Create a configuration for the agent with `tag`, stored in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, tag: Tag, nonce: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            tag,
            nonce: nonce.into(),
            ca_cert: Vec::new(),
            state: None,
            api: None,
            old_password: String::new(),
            state_server_cert: Vec::new(),
            state_server_key: Vec::new(),
            api_port: 0,
            values: BTreeMap::new(),
        }
    }

    /// Set the CA certificate.
    #[must_use]
    pub fn with_ca_cert(mut self, cert: impl Into<Vec<u8>>) -> Self {
        self.ca_cert = cert.into();
        self
    }

    /// Set how to reach the state servers.
    #[must_use]
    pub fn with_state(mut self, details: ConnectionDetails) -> Self {
        self.state = Some(details);
        self
    }

    /// Set how to reach the API servers.
    #[must_use]
    pub fn with_api(mut self, details: ConnectionDetails) -> Self {
        self.api = Some(details);
        self
    }

    /// Set the password used before the current one.
    #[must_use]
    pub fn with_old_password(mut self, password: impl Into<String>) -> Self {
        self.old_password = password.into();
        self
    }

    /// Set the certificate, key and API port of a state server.
    #[must_use]
    pub fn with_state_server(
        mut self,
        cert: impl Into<Vec<u8>>,
        key: impl Into<Vec<u8>>,
        api_port: u16,
    ) -> Self {
        self.state_server_cert = cert.into();
        self.state_server_key = key.into();
        self.api_port = api_port;
        self
    }

    /// Set a free-form value.
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// The directory the configuration lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The agent's entity tag.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }

    /// The provisioning nonce.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// The CA certificate.
    #[must_use]
    pub fn ca_cert(&self) -> &[u8] {
        &self.ca_cert
    }

    /// State server connection, if the agent talks to state directly.
    #[must_use]
    pub const fn state(&self) -> Option<&ConnectionDetails> {
        self.state.as_ref()
    }

    /// API server connection.
    #[must_use]
    pub const fn api(&self) -> Option<&ConnectionDetails> {
        self.api.as_ref()
    }

    /// The password used before the current one.
    #[must_use]
    pub fn old_password(&self) -> &str {
        &self.old_password
    }

    /// State server certificate; empty unless the agent runs a state server.
    #[must_use]
    pub fn state_server_cert(&self) -> &[u8] {
        &self.state_server_cert
    }

    /// State server private key.
    #[must_use]
    pub fn state_server_key(&self) -> &[u8] {
        &self.state_server_key
    }

    /// Port the API server listens on; zero if none.
    #[must_use]
    pub const fn api_port(&self) -> u16 {
        self.api_port
    }

    /// A free-form value.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// All free-form values.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub(crate) fn set_values(&mut self, values: BTreeMap<String, String>) {
        self.values = values;
    }

    pub(crate) fn set_state_server(&mut self, cert: Vec<u8>, key: Vec<u8>, api_port: u16) {
        self.state_server_cert = cert;
        self.state_server_key = key;
        self.api_port = api_port;
    }
}

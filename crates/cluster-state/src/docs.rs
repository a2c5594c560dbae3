//! Persisted entity documents.
//!
//! Field names are part of the on-disk format and must not change.

use std::fmt;

use cluster_state_core::{CharmUrl, MachineId, ServiceName, UnitName};
use cluster_state_store::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, OpResult};

/// Field names used in conditions and updates.
pub mod field {
    /// Lifecycle state.
    pub const LIFE: &str = "life";
    /// Names of the units holding a slot on the document.
    pub const UNITS: &str = "units";
    /// Next unit ordinal of a service.
    pub const UNIT_SEQ: &str = "unitseq";
    /// Machine a unit is assigned to.
    pub const MACHINE_ID: &str = "machineid";
    /// Owning service of a unit.
    pub const SERVICE: &str = "service";
    /// Next value of a sequence.
    pub const COUNTER: &str = "counter";
    /// Revision of a settings document.
    pub const REVNO: &str = "revno";
}

/// The lifecycle state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Life {
    /// In normal use.
    Alive,
    /// Removal requested; waiting for dependents to go away.
    Dying,
    /// Ready for physical deletion.
    Dead,
}

impl Life {
    /// The stored symbolic value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Dying => "dying",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for Life {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Life> for Value {
    fn from(life: Life) -> Self {
        Self::from(life.as_str())
    }
}

/// A machine document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDoc {
    /// Machine id.
    #[serde(rename = "_id")]
    pub id: MachineId,
    /// Lifecycle state.
    pub life: Life,
    /// Units assigned to this machine.
    #[serde(default)]
    pub units: Vec<UnitName>,
}

/// A service document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDoc {
    /// Service name.
    #[serde(rename = "_id")]
    pub name: ServiceName,
    /// The charm the service currently runs.
    pub charmurl: CharmUrl,
    /// Lifecycle state.
    pub life: Life,
    /// Ordinal the next unit will get.
    #[serde(default)]
    pub unitseq: u64,
    /// Units of this service that are not yet removed.
    #[serde(default)]
    pub units: Vec<UnitName>,
}

/// A unit document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDoc {
    /// Unit name.
    #[serde(rename = "_id")]
    pub name: UnitName,
    /// Owning service.
    pub service: ServiceName,
    /// Lifecycle state.
    pub life: Life,
    /// Machine the unit is assigned to, if any.
    #[serde(default)]
    pub machineid: Option<MachineId>,
}

/// Descriptive charm metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharmMeta {
    /// Charm name.
    pub name: String,
    /// One-line summary.
    #[serde(default)]
    pub summary: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Charm revision.
    #[serde(default)]
    pub revision: u32,
}

/// A charm document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharmDoc {
    /// Charm URL, including the revision.
    #[serde(rename = "_id")]
    pub url: CharmUrl,
    /// Charm metadata.
    pub meta: CharmMeta,
    /// Location of the packaged bundle.
    pub bundleurl: String,
    /// SHA-256 digest of the bundle.
    pub bundlesha256: String,
}

/// An id allocation counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDoc {
    /// Sequence name.
    #[serde(rename = "_id")]
    pub name: String,
    /// The next value to hand out.
    pub counter: u64,
}

/// HTTP, HTTPS and FTP proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    /// HTTP proxy URL.
    #[serde(default)]
    pub http: String,
    /// HTTPS proxy URL.
    #[serde(default)]
    pub https: String,
    /// FTP proxy URL.
    #[serde(default)]
    pub ftp: String,
    /// Comma-separated hosts that bypass the proxy.
    #[serde(default)]
    pub noproxy: String,
}

/// Environment-wide settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironSettings {
    /// Revision, bumped on every update. Zero means never written.
    #[serde(default)]
    pub revno: u64,
    /// Proxy settings for general traffic.
    #[serde(default)]
    pub proxy: ProxySettings,
    /// Proxy settings for the package manager.
    #[serde(default)]
    pub aptproxy: ProxySettings,
}

/// The `host:port` addresses API servers listen on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHostPortsDoc {
    /// Revision, bumped on every update.
    #[serde(default)]
    pub revno: u64,
    /// Addresses in preference order.
    #[serde(default)]
    pub hostports: Vec<String>,
}

/// Decode a stored document into its record type.
pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> OpResult<T> {
    doc.into_record().map_err(ErrorKind::from)
}

/// Read a counter field together with the exact stored value.
///
/// The stored value (possibly `null` for an absent field) is what a
/// condition on the counter has to expect.
pub(crate) fn counter(doc: &Document, name: &str) -> (u64, Value) {
    let raw = doc.get(name).cloned().unwrap_or(Value::Null);
    (raw.as_u64().unwrap_or(0), raw)
}

/// Read a unit list field together with the exact stored value.
pub(crate) fn members(doc: &Document, name: &str) -> OpResult<(Vec<UnitName>, Value)> {
    let raw = doc.get(name).cloned().unwrap_or(Value::Null);
    if raw.is_null() {
        return Ok((Vec::new(), raw));
    }
    let units = serde_json::from_value(raw.clone())?;
    Ok((units, raw))
}

/// The stored lifecycle state of any entity document.
pub(crate) fn life(doc: &Document) -> OpResult<Life> {
    let raw = doc.get(field::LIFE).cloned().unwrap_or(Value::Null);
    Ok(serde_json::from_value(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn life_uses_symbolic_values() {
        assert_eq!(serde_json::to_value(Life::Dying).unwrap(), json!("dying"));
        assert_eq!(Value::from(Life::Dead), json!("dead"));
        let life: Life = serde_json::from_value(json!("alive")).unwrap();
        assert_eq!(life, Life::Alive);
    }

    #[test]
    fn machine_doc_layout() {
        let doc = MachineDoc {
            id: MachineId::new(4),
            life: Life::Alive,
            units: vec!["wordpress/0".parse().unwrap()],
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"_id": 4, "life": "alive", "units": ["wordpress/0"]})
        );
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let doc = Document::from_record(&json!({"_id": 1, "life": "alive"})).unwrap();
        let (count, raw) = counter(&doc, field::COUNTER);
        assert_eq!(count, 0);
        assert_eq!(raw, Value::Null);
        let (units, raw) = members(&doc, field::UNITS).unwrap();
        assert!(units.is_empty());
        assert_eq!(raw, Value::Null);
        assert_eq!(life(&doc).unwrap(), Life::Alive);

        let machine: MachineDoc = decode(doc).unwrap();
        assert!(machine.units.is_empty());
    }

    #[test]
    fn unit_doc_layout() {
        let service = ServiceName::new("wordpress").unwrap();
        let doc = UnitDoc {
            name: UnitName::new(&service, 2),
            service,
            life: Life::Alive,
            machineid: None,
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"_id": "wordpress/2", "service": "wordpress", "life": "alive", "machineid": null})
        );
    }
}

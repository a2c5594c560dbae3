//! Documents, document ids, and field sets.
//!
//! A [`Document`] is a JSON object carrying its identity in the `_id` field.
//! [`Fields`] is a set of field/value pairs used both as the expected
//! snapshot of a conditional write and as the changes it applies.

use std::collections::BTreeMap;
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// The field every document stores its identity in.
pub const ID_FIELD: &str = "_id";

/// A document identity: either a non-negative integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocId {
    /// Numeric id, e.g. a machine id.
    Int(u64),
    /// String id, e.g. a service name or charm URL.
    Str(String),
}

impl DocId {
    /// Convert to the JSON value stored in `_id`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }

    /// Interpret a stored `_id` value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for DocId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// An ordered set of field/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// An empty field set. As a filter or condition it matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style.
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Add or replace a field.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Iterate over the pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true if no fields are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Build a document from a serializable record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidDocument` if the record does not serialize
    /// to an object with a usable `_id` field.
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self> {
        match serde_json::to_value(record)? {
            Value::Object(map) => {
                let doc = Self(map);
                doc.id()?;
                Ok(doc)
            }
            other => Err(StoreError::InvalidDocument(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    /// Decode the document into a typed record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the fields do not fit `T`.
    pub fn into_record<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0))?)
    }

    /// The document's identity.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidDocument` if `_id` is missing or not an
    /// integer or string.
    pub fn id(&self) -> Result<DocId> {
        self.0
            .get(ID_FIELD)
            .and_then(DocId::from_value)
            .ok_or_else(|| StoreError::InvalidDocument("missing or invalid _id".to_string()))
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Check the document against an expected field snapshot.
    ///
    /// A field absent from the document matches an expected `null`.
    #[must_use]
    pub fn matches(&self, expected: &Fields) -> bool {
        expected
            .iter()
            .all(|(field, want)| self.0.get(field).unwrap_or(&Value::Null) == want)
    }

    /// Apply a set of field changes. The `_id` field is never modified.
    pub fn apply(&mut self, changes: &Fields) {
        for (field, value) in changes.iter() {
            if field != ID_FIELD {
                self.0.insert(field.to_string(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        #[serde(rename = "_id")]
        id: u64,
        life: String,
        #[serde(default)]
        machineid: Option<u64>,
    }

    #[test]
    fn record_round_trip() {
        let record = Record {
            id: 3,
            life: "alive".into(),
            machineid: None,
        };
        let doc = Document::from_record(&record).unwrap();
        assert_eq!(doc.id().unwrap(), DocId::Int(3));
        assert_eq!(doc.into_record::<Record>().unwrap(), record);
    }

    #[test]
    fn record_without_id_is_rejected() {
        #[derive(Serialize)]
        struct NoId {
            life: &'static str,
        }
        let err = Document::from_record(&NoId { life: "alive" }).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }

    #[test]
    fn absent_field_matches_null() {
        let doc = Document::from_record(&serde_json::json!({"_id": "wordpress/0", "life": "alive"}))
            .unwrap();
        assert!(doc.matches(&Fields::new().with("machineid", Value::Null)));
        assert!(doc.matches(&Fields::new().with("life", "alive")));
        assert!(!doc.matches(&Fields::new().with("life", "dead")));
        assert!(doc.matches(&Fields::new()));
    }

    #[test]
    fn apply_never_changes_id() {
        let mut doc = Document::from_record(&serde_json::json!({"_id": 1, "life": "alive"})).unwrap();
        doc.apply(&Fields::new().with("_id", 9).with("life", "dead"));
        assert_eq!(doc.id().unwrap(), DocId::Int(1));
        assert_eq!(doc.get("life"), Some(&Value::from("dead")));
    }
}

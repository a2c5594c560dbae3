//! Core identifier types.
//!
//! Machines are identified by small sequential integers, services by a
//! validated lowercase name, and units by their service name plus an ordinal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A machine identifier.
///
/// Machine ids are allocated sequentially starting at 0 and are never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(u64);

impl MachineId {
    /// Create a `MachineId` from its numeric value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Return the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Return the zero-padded enumeration form, e.g. `machine-0000000001`.
    #[must_use]
    pub fn tag_string(self) -> String {
        format!("machine-{:010}", self.0)
    }
}

impl fmt::Debug for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MachineId({})", self.0)
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MachineId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for MachineId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal(s)
            .map(Self)
            .ok_or_else(|| IdError::InvalidMachineId(s.to_string()))
    }
}

/// Parse an unsigned decimal without sign or whitespace.
fn parse_decimal(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// A validated service name, e.g. `wordpress` or `my-db2`.
///
/// Names start with a lowercase letter, contain only lowercase letters,
/// digits and hyphens, and every hyphen-separated segment after the first
/// contains at least one letter.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

impl ServiceName {
    /// Validate and wrap a service name.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidServiceName` if the name is malformed.
    pub fn new(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if is_valid_service_name(&name) {
            Ok(Self(name))
        } else {
            Err(IdError::InvalidServiceName(name))
        }
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_service_name(name: &str) -> bool {
    let mut segments = name.split('-');
    let Some(first) = segments.next() else {
        return false;
    };
    let first_ok = first.starts_with(|c: char| c.is_ascii_lowercase())
        && first
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    first_ok
        && segments.all(|seg| {
            seg.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && seg.chars().any(|c| c.is_ascii_lowercase())
        })
}

impl fmt::Debug for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceName({})", self.0)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServiceName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ServiceName {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> Self {
        name.0
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A unit name of the form `<service>/<ordinal>`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitName {
    service: ServiceName,
    ordinal: u64,
}

impl UnitName {
    /// Build the name of the `ordinal`-th unit of `service`.
    #[must_use]
    pub fn new(service: &ServiceName, ordinal: u64) -> Self {
        Self {
            service: service.clone(),
            ordinal,
        }
    }

    /// The service this unit belongs to.
    #[must_use]
    pub const fn service(&self) -> &ServiceName {
        &self.service
    }

    /// The unit's ordinal within its service.
    #[must_use]
    pub const fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

impl fmt::Debug for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitName({}/{})", self.service, self.ordinal)
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.ordinal)
    }
}

impl FromStr for UnitName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdError::InvalidUnitName(s.to_string());
        let (service, ordinal) = s.split_once('/').ok_or_else(invalid)?;
        let service = ServiceName::new(service).map_err(|_| invalid())?;
        let ordinal = parse_decimal(ordinal).ok_or_else(invalid)?;
        Ok(Self { service, ordinal })
    }
}

impl TryFrom<String> for UnitName {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UnitName> for String {
    fn from(name: UnitName) -> Self {
        name.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The machine id is not a non-negative integer.
    #[error("invalid machine id {0:?}")]
    InvalidMachineId(String),

    /// The service name does not follow the naming rules.
    #[error("invalid service name {0:?}")]
    InvalidServiceName(String),

    /// The unit name is not `<service>/<ordinal>`.
    #[error("invalid unit name {0:?}")]
    InvalidUnitName(String),

    /// The charm URL is malformed.
    #[error("invalid charm URL {url:?}: {reason}")]
    InvalidCharmUrl {
        /// The offending input.
        url: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The entity tag is malformed.
    #[error("invalid entity tag {0:?}")]
    InvalidTag(String),
}

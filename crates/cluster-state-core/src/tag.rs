//! Entity tags.
//!
//! Tags are the string form agents use to name the entity they act for:
//! `machine-3`, `service-wordpress`, `unit-wordpress-0`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{IdError, MachineId, ServiceName, UnitName};

/// A tagged reference to one entity.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tag {
    /// A machine.
    Machine(MachineId),
    /// A service.
    Service(ServiceName),
    /// A unit.
    Unit(UnitName),
}

impl Tag {
    /// The entity kind, as used in the tag prefix.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Machine(_) => "machine",
            Self::Service(_) => "service",
            Self::Unit(_) => "unit",
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Machine(id) => write!(f, "machine-{id}"),
            Self::Service(name) => write!(f, "service-{name}"),
            Self::Unit(name) => write!(f, "unit-{}-{}", name.service(), name.ordinal()),
        }
    }
}

impl FromStr for Tag {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdError::InvalidTag(s.to_string());
        let (kind, rest) = s.split_once('-').ok_or_else(invalid)?;
        match kind {
            // Accepts both `machine-1` and the padded `machine-0000000001`.
            "machine" => rest.parse().map(Self::Machine).map_err(|_| invalid()),
            "service" => ServiceName::new(rest).map(Self::Service).map_err(|_| invalid()),
            "unit" => {
                // Service names may contain hyphens; the ordinal is the last segment.
                let (service, ordinal) = rest.rsplit_once('-').ok_or_else(invalid)?;
                format!("{service}/{ordinal}")
                    .parse()
                    .map(Self::Unit)
                    .map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Tag {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

impl From<MachineId> for Tag {
    fn from(id: MachineId) -> Self {
        Self::Machine(id)
    }
}

impl From<ServiceName> for Tag {
    fn from(name: ServiceName) -> Self {
        Self::Service(name)
    }
}

impl From<UnitName> for Tag {
    fn from(name: UnitName) -> Self {
        Self::Unit(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Tag::Machine(MachineId::new(3)).to_string(), "machine-3");
        let svc = ServiceName::new("my-db").unwrap();
        assert_eq!(Tag::Service(svc.clone()).to_string(), "service-my-db");
        assert_eq!(
            Tag::Unit(UnitName::new(&svc, 2)).to_string(),
            "unit-my-db-2"
        );
    }

    #[test]
    fn parse_round_trip() {
        for raw in ["machine-0", "service-wordpress", "unit-u-0", "unit-my-db-12"] {
            let tag: Tag = raw.parse().unwrap();
            assert_eq!(tag.to_string(), raw);
        }
    }

    #[test]
    fn parse_padded_machine_tag() {
        let tag: Tag = "machine-0000000001".parse().unwrap();
        assert_eq!(tag, Tag::Machine(MachineId::new(1)));
    }

    #[test]
    fn parse_rejects_garbage() {
        for raw in ["", "machine", "machine-x", "user-bob", "unit-wordpress", "service-Bad"] {
            assert!(raw.parse::<Tag>().is_err(), "{raw} should be rejected");
        }
    }
}

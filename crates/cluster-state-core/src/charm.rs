//! Charm URLs.
//!
//! A charm URL identifies one revision of a charm:
//! `schema:series/name-revision`, e.g. `local:series/dummy-1` or
//! `cs:precise/wordpress-3`. The revision may be omitted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::IdError;

/// A parsed charm URL.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CharmUrl {
    schema: String,
    series: String,
    name: String,
    revision: Option<u32>,
}

impl CharmUrl {
    /// Parse a charm URL.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidCharmUrl` if the URL is malformed.
    pub fn parse(url: &str) -> Result<Self, IdError> {
        let invalid = |reason| IdError::InvalidCharmUrl {
            url: url.to_string(),
            reason,
        };

        let (schema, rest) = url.split_once(':').ok_or(invalid("missing schema"))?;
        if schema != "local" && schema != "cs" {
            return Err(invalid("schema must be \"local\" or \"cs\""));
        }
        let (series, ident) = rest.split_once('/').ok_or(invalid("missing series"))?;
        if !is_valid_series(series) {
            return Err(invalid("invalid series"));
        }

        // The revision is the trailing all-digit segment, if any.
        let (name, revision) = match ident.rsplit_once('-') {
            Some((name, rev)) if !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) => {
                let rev = rev.parse().map_err(|_| invalid("revision out of range"))?;
                (name, Some(rev))
            }
            _ => (ident, None),
        };
        if !is_valid_charm_name(name) {
            return Err(invalid("invalid charm name"));
        }

        Ok(Self {
            schema: schema.to_string(),
            series: series.to_string(),
            name: name.to_string(),
            revision,
        })
    }

    /// The URL schema, `local` or `cs`.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The series the charm targets.
    #[must_use]
    pub fn series(&self) -> &str {
        &self.series
    }

    /// The charm name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The charm revision, if the URL names one.
    #[must_use]
    pub const fn revision(&self) -> Option<u32> {
        self.revision
    }

    /// Return a copy of this URL pinned to `revision`.
    #[must_use]
    pub fn with_revision(&self, revision: u32) -> Self {
        Self {
            revision: Some(revision),
            ..self.clone()
        }
    }
}

fn is_valid_series(series: &str) -> bool {
    series.starts_with(|c: char| c.is_ascii_lowercase())
        && series
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_valid_charm_name(name: &str) -> bool {
    // Charm names follow the same rules as service names.
    crate::ids::ServiceName::new(name).is_ok()
}

impl fmt::Debug for CharmUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharmUrl({self})")
    }
}

impl fmt::Display for CharmUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.schema, self.series, self.name)?;
        if let Some(rev) = self.revision {
            write!(f, "-{rev}")?;
        }
        Ok(())
    }
}

impl FromStr for CharmUrl {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CharmUrl {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CharmUrl> for String {
    fn from(url: CharmUrl) -> Self {
        url.to_string()
    }
}

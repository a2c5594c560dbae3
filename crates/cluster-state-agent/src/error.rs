//! Error types for agent configuration.

use std::path::PathBuf;

use thiserror::Error;

/// A result type using `ConfigError`.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur reading, writing or upgrading agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for its format.
    #[error("invalid agent config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A base64-encoded field could not be decoded.
    #[error("invalid base64 in {field}: {source}")]
    Base64 {
        /// The offending field.
        field: &'static str,
        /// The underlying error.
        #[source]
        source: base64::DecodeError,
    },

    /// The format file names a format this version does not know.
    #[error("unknown agent config format {0:?}")]
    UnknownFormat(String),

    /// The record does not have the shape of the format the format file names.
    #[error("agent config is not in {format}: {reason}")]
    FormatMismatch {
        /// The format line read.
        format: &'static str,
        /// What gave the record away.
        reason: &'static str,
    },

    /// A required field is empty.
    #[error("agent config is missing {0}")]
    MissingField(&'static str),

    /// The entity tag is malformed.
    #[error("invalid agent tag: {0}")]
    InvalidTag(#[from] cluster_state_core::IdError),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the error means the file does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

//! API error types.

use cluster_state::{ErrorKind, StateError};
use thiserror::Error;

use crate::params::ServerError;

/// A result type using `ApiError`.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors raised by API clients and facades.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The call could not be delivered.
    #[error("transport error: {0}")]
    Transport(String),

    /// Arguments or results did not have the expected shape.
    #[error("cannot decode: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server reported an error.
    #[error("{message}")]
    Server {
        /// Machine-readable error code, empty if none.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// A bulk call returned the wrong number of results.
    #[error("expected {expected} result(s), got {got}")]
    ResultCount {
        /// Results expected.
        expected: usize,
        /// Results received.
        got: usize,
    },

    /// No facade with this name is served.
    #[error("unknown facade {0:?}")]
    UnknownFacade(String),

    /// The facade has no such method.
    #[error("no such request - method {facade}.{method} is not implemented")]
    UnknownMethod {
        /// The facade called.
        facade: String,
        /// The method called.
        method: String,
    },

    /// No live watcher has this id.
    #[error("unknown watcher id {0:?}")]
    UnknownWatcher(String),

    /// The watcher was stopped while being read.
    #[error("watcher was stopped")]
    WatcherStopped,

    /// The caller may not act for the requested entity.
    #[error("permission denied")]
    PermissionDenied,

    /// The state layer failed.
    #[error(transparent)]
    State(#[from] StateError),
}

impl ApiError {
    /// The wire error code for this error.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Server { code, .. } => code.as_str(),
            Self::UnknownFacade(_) | Self::UnknownMethod { .. } => "not implemented",
            Self::UnknownWatcher(_) => "not found",
            Self::WatcherStopped => "stopped",
            Self::PermissionDenied => "unauthorized access",
            Self::State(err) => match err.kind() {
                ErrorKind::NotFound | ErrorKind::AlreadyRemoved => "not found",
                ErrorKind::AlreadyExists => "already exists",
                ErrorKind::NotAlive => "not alive",
                ErrorKind::Closed | ErrorKind::Unavailable(_) => "unavailable",
                _ => "",
            },
            Self::Transport(_) | Self::Decode(_) | Self::ResultCount { .. } => "",
        }
    }

    /// Whether this is a permission failure.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.code() == "unauthorized access"
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self::Server {
            code: err.code,
            message: err.message,
        }
    }
}

impl From<&ApiError> for ServerError {
    fn from(err: &ApiError) -> Self {
        Self {
            message: err.to_string(),
            code: err.code().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_round_trip_through_params() {
        let wire = ServerError::from(&ApiError::PermissionDenied);
        assert_eq!(wire.code, "unauthorized access");

        let err = ApiError::from(wire);
        assert!(err.is_permission_denied());
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn state_errors_keep_their_context() {
        let err = ApiError::from(StateError::new("can't get machine 3", ErrorKind::NotFound));
        assert_eq!(err.code(), "not found");
        assert_eq!(err.to_string(), "can't get machine 3: not found");
    }
}

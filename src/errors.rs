use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CONNECTION_LOST_MESSAGE;

/// Failure response returned by the backend (any non-2xx status).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpError {
    pub status: u16,
    pub message: String,
    /// Raw response body for debugging (when available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            raw_body: None,
        }
    }

    /// Whether the backend rejected the bearer credential.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

/// Convenience alias for fallible results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad error kinds for classification and metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Network,
    Http,
    EmptyBody,
    Unclassified,
    Config,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Http => "http",
            ErrorKind::EmptyBody => "empty_body",
            ErrorKind::Unclassified => "unclassified",
            ErrorKind::Config => "config",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type surfaced by the ask client.
///
/// `Timeout` and `Network` carry the same user-facing message: from the
/// caller's side both mean no usable response arrived.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    Timeout { message: String },

    #[error("{message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("{0}")]
    Http(#[from] HttpError),

    #[error("response completed without a body")]
    EmptyBody,

    #[error(transparent)]
    Unclassified(reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn timeout() -> Self {
        Error::Timeout {
            message: CONNECTION_LOST_MESSAGE.to_string(),
        }
    }

    pub(crate) fn network(source: Option<reqwest::Error>) -> Self {
        Error::Network {
            message: CONNECTION_LOST_MESSAGE.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Network { .. } => ErrorKind::Network,
            Error::Http(_) => ErrorKind::Http,
            Error::EmptyBody => ErrorKind::EmptyBody,
            Error::Unclassified(_) => ErrorKind::Unclassified,
            Error::Config(_) => ErrorKind::Config,
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// HTTP status of the failure response, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(err) => Some(err.status),
            Error::Unclassified(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the failure was a 401 and the stored credential has been cleared.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Error::Http(err) if err.is_unauthorized())
    }
}

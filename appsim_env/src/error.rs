//! Error types for the appsim environment abstraction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known conditions reported by an emulator service.
///
/// These are sentinels: callers compare them by value
/// (`err == CallError::Service(ServiceError::CacheMiss)`), never by message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum ServiceError {
    /// Cache key not present
    #[error("memcache: cache miss")]
    CacheMiss,

    /// Conditional cache write refused (key already present)
    #[error("memcache: item not stored")]
    NotStored,

    /// Datastore entity not found
    #[error("datastore: no such entity")]
    NoSuchEntity,

    /// Task queue was never provisioned
    #[error("taskqueue: unknown queue {0:?}")]
    UnknownQueue(String),

    /// A named task already exists in its queue
    #[error("taskqueue: task {0:?} already exists")]
    TaskAlreadyExists(String),

    /// Namespace string rejected by the emulator
    #[error("invalid namespace {0:?}")]
    InvalidNamespace(String),

    /// Malformed request payload
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Any other failure, carried opaquely
    #[error("application error {code}: {message}")]
    Application {
        code: String,
        message: String,
    },
}

impl ServiceError {
    /// Creates a bad-request error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Creates an opaque application error.
    pub fn application(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by a call dispatched through an [`AppContext`](crate::AppContext).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Sentinel or opaque error reported by the service itself
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The context was already closed
    #[error("context is closed")]
    Closed,

    /// No ready module instance with this name
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Connecting to or talking with the emulator failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The emulator replied with something we could not understand
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl CallError {
    /// Creates a transport error.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Creates a protocol error.
    pub fn protocol(msg: impl std::fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    /// Returns the service sentinel, if this error carries one.
    pub fn service(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(err) => Some(err),
            _ => None,
        }
    }
}

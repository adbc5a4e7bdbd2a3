//! Error types for entity stores.

use std::fmt;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for entity stores.
///
/// `Error` is `Clone`: a single fetch outcome is handed to every caller that
/// coalesced onto it, so the same error value may be observed many times.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The transport reported a failed request.
    ///
    /// Propagated unchanged to whoever directly awaited the operation
    /// (`get`, `create`, `update`, `remove`, or a listing call).
    /// Common causes:
    /// - Entity does not exist (404)
    /// - Server error (5xx)
    /// - Permission denied (401/403)
    ///
    /// **Recovery:** a failed `get` leaves a `Failed` entry; the next `get`
    /// re-attempts the fetch.
    Transport {
        /// Status code reported by the transport (HTTP-like).
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// A request payload could not be encoded to JSON.
    ///
    /// Raised by `create`/`update` before anything is sent.
    SerializationError(String),

    /// A response payload could not be decoded into the entity type.
    ///
    /// Common causes:
    /// - Server payload shape changed
    /// - Required field missing from a shallow fetch
    DeserializationError(String),

    /// Validation failed on a decoded entity.
    ///
    /// Raised when `Entity::validate()` returns an error.
    ValidationError(String),

    /// The server answered, but not with something usable.
    ///
    /// Returned when a create response carries no id, or a listing response
    /// is not a list of ids.
    InvalidResponse(String),

    /// No ready value in cache.
    ///
    /// Only returned with `FetchStrategy::CacheOnly`.
    CacheMiss,

    /// The fetch was cancelled through `EntityStore::cancel` before it settled.
    Cancelled,

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Build a transport error.
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        Error::Transport {
            status,
            message: message.into(),
        }
    }

    /// Status code, if this error came from the transport.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a transport 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport { status, message } => {
                write!(f, "Transport error ({}): {}", status, message)
            }
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            Error::CacheMiss => write!(f, "Cache miss"),
            Error::Cancelled => write!(f, "Fetch cancelled"),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            Error::Cancelled
        } else {
            Error::Other(format!("fetch task panicked: {}", e))
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

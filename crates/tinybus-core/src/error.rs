//! Error handling for tinybus
//!
//! Every fallible bus operation returns [`BusError`]. The variants mirror the
//! failure classes a caller can observe:
//! - Argument errors (malformed pattern, empty name)
//! - Lookup errors (unknown module under strict mode)
//! - Capability errors (module without a request handler)
//! - Resource errors (payload copy failed, queue full, deadline exceeded)
//! - Lifecycle errors (duplicate registration, bus not initialized)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Coarse classification of a [`BusError`].
///
/// Handy for error callbacks and tests that only care about the class of
/// failure and not its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed pattern or missing required parameter.
    InvalidArgument,
    /// Unknown module (strict mode only).
    NotFound,
    /// Module has no handler for the request, or the action is unimplemented.
    NotSupported,
    /// Allocation of a payload copy or registry entry failed.
    NoMemory,
    /// Blocking call exceeded its deadline, or the queue was full.
    Timeout,
    /// Duplicate registration, or bus not initialized.
    InvalidState,
    /// A handler reported a generic failure or panicked.
    Failed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::NotFound => "not-found",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::NoMemory => "no-memory",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidState => "invalid-state",
            ErrorKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Bus error type
///
/// Returned by registration, request, emit, routing and timer operations,
/// and passed to the error-reporting callback for failures that have no
/// caller to return to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Malformed pattern or missing required parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Target module does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Module cannot service the request
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Allocation failed
    #[error("Out of memory")]
    NoMemory,

    /// Deadline exceeded or queue full
    #[error("Operation timed out")]
    Timeout,

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Handler failure
    #[error("Handler failed: {0}")]
    Failed(String),
}

impl BusError {
    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        BusError::InvalidArgument(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        BusError::NotFound(msg.into())
    }

    /// Create a not-supported error
    pub fn not_supported(msg: impl Into<String>) -> Self {
        BusError::NotSupported(msg.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        BusError::InvalidState(msg.into())
    }

    /// Create a generic handler failure
    pub fn failed(msg: impl Into<String>) -> Self {
        BusError::Failed(msg.into())
    }

    pub(crate) fn not_initialized() -> Self {
        BusError::InvalidState("bus not initialized".to_string())
    }

    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BusError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            BusError::NotFound(_) => ErrorKind::NotFound,
            BusError::NotSupported(_) => ErrorKind::NotSupported,
            BusError::NoMemory => ErrorKind::NoMemory,
            BusError::Timeout => ErrorKind::Timeout,
            BusError::InvalidState(_) => ErrorKind::InvalidState,
            BusError::Failed(_) => ErrorKind::Failed,
        }
    }

    /// Check if this is an invalid-argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, BusError::InvalidArgument(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout)
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, BusError::NotFound(_))
    }

    /// Check if this is a not-supported error
    pub fn is_not_supported(&self) -> bool {
        matches!(self, BusError::NotSupported(_))
    }

    /// Check if this is an invalid-state error
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, BusError::InvalidState(_))
    }
}

impl From<crate::config::ConfigError> for BusError {
    fn from(err: crate::config::ConfigError) -> Self {
        BusError::InvalidArgument(err.to_string())
    }
}

/// Result type using BusError
pub type BusResult<T> = std::result::Result<T, BusError>;

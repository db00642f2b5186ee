//! Error types for target reconciliation

use std::fmt;

use crate::storage::StorageError;

/// Result type alias for probe and reconciliation operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors raised while refreshing a target's connectivity state
#[derive(Debug)]
pub enum ConnectionError {
    /// The operation exceeded the configured connection timeout
    ///
    /// Treated identically to an explicit refusal for state-update purposes.
    Timeout,

    /// The target refused or dropped the connection
    Refused(String),

    /// The probe failed for another reason (handshake, identity fetch, ...)
    Probe(String),

    /// Persisting the updated target state failed
    Storage(StorageError),

    /// The reconciler actor is not running (its channel is closed)
    Unavailable,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Timeout => write!(f, "connection attempt timed out"),
            ConnectionError::Refused(msg) => write!(f, "connection refused: {}", msg),
            ConnectionError::Probe(msg) => write!(f, "probe failure: {}", msg),
            ConnectionError::Storage(err) => write!(f, "storage failure: {}", err),
            ConnectionError::Unavailable => write!(f, "reconciler is unavailable"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ConnectionError {
    fn from(err: StorageError) -> Self {
        ConnectionError::Storage(err)
    }
}

//! Error types for the discovery registry

use std::fmt;

use crate::storage::StorageError;

/// Result type alias for registry operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors surfaced by the discovery registry
///
/// These represent caller misuse and are returned directly - no retry,
/// no silent recovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The referenced plugin does not exist
    NotFound(String),

    /// The operation is not permitted (e.g. deregistering the built-in realm)
    Forbidden(String),

    /// Unparseable callback URI, invalid subtree, or missing required fields
    MalformedInput(String),

    /// The storage collaborator failed
    Storage(StorageError),

    /// The registry actor is not running (its channel is closed)
    Unavailable,
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NotFound(msg) => write!(f, "not found: {}", msg),
            DiscoveryError::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            DiscoveryError::MalformedInput(msg) => write!(f, "malformed input: {}", msg),
            DiscoveryError::Storage(err) => write!(f, "storage failure: {}", err),
            DiscoveryError::Unavailable => write!(f, "discovery registry is unavailable"),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for DiscoveryError {
    fn from(err: StorageError) -> Self {
        DiscoveryError::Storage(err)
    }
}

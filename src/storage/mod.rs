//! Storage backends for the discovery tree and target store
//!
//! This module provides a trait-based abstraction for persisting the
//! discovery tree, the plugin table and per-target connectivity state.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Transactional**: Multi-record mutations (publish, deregister) are
//!   single all-or-nothing units inside the backend
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, survives restarts
//! - **In-Memory**: No persistence, for testing or ephemeral deployments

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

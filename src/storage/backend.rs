//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement. The backend is the
//! transaction/unit-of-work collaborator: every multi-record mutation
//! (plugin + realm creation, replace-all-children, cascade delete) is a
//! single all-or-nothing operation inside the implementation.

use async_trait::async_trait;
use uuid::Uuid;

use super::error::StorageResult;
use crate::discovery::{DiscoveryNode, DiscoveryPlugin};
use crate::targets::TargetRecord;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,
}

/// Trait for persistent storage backends
///
/// Implementations must be `Send + Sync`; the registry actor and every
/// reconciliation task hold the backend behind an `Arc` and call it from
/// independent tasks.
///
/// ## Atomicity contract
///
/// `insert_plugin`, `replace_realm_children` and `delete_plugin` each
/// execute as one transaction: a failure anywhere inside leaves the
/// stored tree exactly as it was. Callers rely on this for rollback - no
/// compensation logic exists above this trait.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Discovery tree
    // ========================================================================

    /// Ensure the Universe root exists (idempotent create-if-absent)
    async fn ensure_universe(&self) -> StorageResult<()>;

    /// Load the full tree rooted at the Universe
    async fn load_universe(&self) -> StorageResult<DiscoveryNode>;

    /// Persist a new plugin together with its (empty) realm node
    ///
    /// One transaction: either both records exist afterwards or neither.
    async fn insert_plugin(&self, plugin: &DiscoveryPlugin) -> StorageResult<()>;

    /// Atomically replace all children of the named realm
    ///
    /// Total replacement, not a merge: children absent from `children`
    /// disappear from the stored tree.
    async fn replace_realm_children(
        &self,
        realm: &str,
        children: &[DiscoveryNode],
    ) -> StorageResult<()>;

    /// Delete a plugin and cascade-delete its realm subtree
    async fn delete_plugin(&self, id: Uuid) -> StorageResult<()>;

    /// All registered plugins
    async fn list_plugins(&self) -> StorageResult<Vec<DiscoveryPlugin>>;

    /// Look up one plugin by identity
    async fn get_plugin(&self, id: Uuid) -> StorageResult<Option<DiscoveryPlugin>>;

    // ========================================================================
    // Target store
    // ========================================================================

    /// Look up a target's last-known connectivity state
    async fn get_target(&self, connect_url: &str) -> StorageResult<Option<TargetRecord>>;

    /// Insert or update a target record (one transaction per call)
    async fn upsert_target(&self, record: &TargetRecord) -> StorageResult<()>;

    /// All targets currently lacking a confirmed stable ID
    async fn list_unconnected_targets(&self) -> StorageResult<Vec<TargetRecord>>;

    /// All known targets
    async fn list_targets(&self) -> StorageResult<Vec<TargetRecord>>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}

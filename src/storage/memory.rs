//! In-memory storage backend (no persistence)
//!
//! This backend keeps the discovery tree, plugin table and target store
//! in process memory behind an `RwLock`. It's useful for:
//! - Testing without database dependencies
//! - Deployments that accept losing discovery state on restart
//!   (plugins re-publish on their next cycle anyway)
//!
//! ## Atomicity
//!
//! Every trait method takes the write lock once and performs its whole
//! mutation under it, which gives the same all-or-nothing visibility the
//! SQLite backend gets from transactions.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use crate::discovery::{DiscoveryNode, DiscoveryPlugin};
use crate::targets::TargetRecord;

#[derive(Debug, Default)]
struct MemoryState {
    universe: Option<DiscoveryNode>,
    plugins: HashMap<Uuid, DiscoveryPlugin>,
    targets: HashMap<String, TargetRecord>,
}

/// In-memory storage backend
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    /// Create a new in-memory backend (no universe yet; see `ensure_universe`)
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn ensure_universe(&self) -> StorageResult<()> {
        let mut state = self.write();
        if state.universe.is_none() {
            debug!("creating universe root");
            state.universe = Some(DiscoveryNode::universe());
        }
        Ok(())
    }

    async fn load_universe(&self) -> StorageResult<DiscoveryNode> {
        self.read()
            .universe
            .clone()
            .ok_or_else(|| StorageError::QueryFailed("universe row missing".to_string()))
    }

    async fn insert_plugin(&self, plugin: &DiscoveryPlugin) -> StorageResult<()> {
        let mut state = self.write();
        let universe = state
            .universe
            .as_mut()
            .ok_or_else(|| StorageError::QueryFailed("universe row missing".to_string()))?;

        if universe.find_realm(&plugin.realm).is_some() {
            return Err(StorageError::QueryFailed(format!(
                "realm already exists: {}",
                plugin.realm
            )));
        }

        universe
            .children_mut()
            .expect("universe carries children")
            .push(DiscoveryNode::realm(&plugin.realm));
        state.plugins.insert(plugin.id, plugin.clone());
        Ok(())
    }

    async fn replace_realm_children(
        &self,
        realm: &str,
        children: &[DiscoveryNode],
    ) -> StorageResult<()> {
        let mut state = self.write();
        let universe = state
            .universe
            .as_mut()
            .ok_or_else(|| StorageError::QueryFailed("universe row missing".to_string()))?;

        let realm_node = universe
            .children_mut()
            .expect("universe carries children")
            .iter_mut()
            .find(|c| matches!(c, DiscoveryNode::Realm { .. }) && c.name() == realm)
            .ok_or_else(|| StorageError::QueryFailed(format!("realm not found: {realm}")))?;

        let slot = realm_node
            .children_mut()
            .expect("realm carries children");
        slot.clear();
        slot.extend_from_slice(children);
        Ok(())
    }

    async fn delete_plugin(&self, id: Uuid) -> StorageResult<()> {
        let mut state = self.write();
        let realm = state
            .plugins
            .remove(&id)
            .map(|p| p.realm)
            .ok_or_else(|| StorageError::QueryFailed(format!("plugin not found: {id}")))?;

        if let Some(universe) = state.universe.as_mut() {
            universe
                .children_mut()
                .expect("universe carries children")
                .retain(|c| c.name() != realm);
        }
        Ok(())
    }

    async fn list_plugins(&self) -> StorageResult<Vec<DiscoveryPlugin>> {
        Ok(self.read().plugins.values().cloned().collect())
    }

    async fn get_plugin(&self, id: Uuid) -> StorageResult<Option<DiscoveryPlugin>> {
        Ok(self.read().plugins.get(&id).cloned())
    }

    async fn get_target(&self, connect_url: &str) -> StorageResult<Option<TargetRecord>> {
        Ok(self.read().targets.get(connect_url).cloned())
    }

    async fn upsert_target(&self, record: &TargetRecord) -> StorageResult<()> {
        self.write()
            .targets
            .insert(record.connect_url.clone(), record.clone());
        Ok(())
    }

    async fn list_unconnected_targets(&self) -> StorageResult<Vec<TargetRecord>> {
        Ok(self
            .read()
            .targets
            .values()
            .filter(|t| !t.is_connected())
            .cloned()
            .collect())
    }

    async fn list_targets(&self) -> StorageResult<Vec<TargetRecord>> {
        Ok(self.read().targets.values().cloned().collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.read();
        Ok(HealthStatus {
            healthy: true,
            message: format!(
                "in-memory storage: {} plugins, {} targets",
                state.plugins.len(),
                state.targets.len()
            ),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}

//! Database schema and row definitions
//!
//! ## Design Philosophy
//!
//! We use a **hybrid approach** to balance queryability with flexibility:
//!
//! ### Identity and structure (columns)
//! Node kind, name and parent linkage are typed columns so the tree can
//! be reassembled and realms located with plain indexed queries.
//!
//! ### Payloads (JSON)
//! Target definitions and recording lists are stored as JSON text. They
//! are only ever read back whole, and new fields do not require a
//! migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{StorageError, StorageResult};
use crate::discovery::{DiscoveryNode, DiscoveryPlugin};
use crate::targets::{ActiveRecording, TargetDef, TargetRecord};

/// One row of the `nodes` table
///
/// `realm` carries the owning top-level realm's name on every descendant
/// row, which is what makes replace-all-children and cascade deletes a
/// single indexed DELETE.
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    /// Owning realm name; None only for the universe row
    pub realm: Option<String>,
    pub kind: String,
    pub name: String,
    /// JSON-encoded [`TargetDef`] for target rows
    pub payload: Option<String>,
}

/// One row of the `plugins` table
#[derive(Debug, Clone)]
pub struct PluginRow {
    pub id: String,
    pub realm: String,
    pub callback: Option<String>,
    pub credential: String,
    pub builtin: bool,
    pub registered_at: i64,
}

/// One row of the `targets` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRow {
    pub connect_url: String,
    pub alias: Option<String>,
    pub jvm_id: Option<String>,
    /// JSON-encoded `Vec<ActiveRecording>`
    pub recordings: String,
    pub last_reconciled: i64,
}

impl PluginRow {
    pub fn from_plugin(plugin: &DiscoveryPlugin) -> Self {
        Self {
            id: plugin.id.to_string(),
            realm: plugin.realm.clone(),
            callback: plugin.callback.as_ref().map(|u| u.to_string()),
            credential: plugin.credential.clone(),
            builtin: plugin.builtin,
            registered_at: plugin.registered_at.timestamp_millis(),
        }
    }

    pub fn into_plugin(self) -> StorageResult<DiscoveryPlugin> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StorageError::SerializationError(format!("bad plugin id: {e}")))?;
        let callback = self
            .callback
            .map(|raw| {
                url::Url::parse(&raw)
                    .map_err(|e| StorageError::SerializationError(format!("bad callback: {e}")))
            })
            .transpose()?;

        Ok(DiscoveryPlugin {
            id,
            realm: self.realm,
            callback,
            credential: self.credential,
            builtin: self.builtin,
            registered_at: millis_to_timestamp(self.registered_at),
        })
    }
}

impl TargetRow {
    pub fn from_record(record: &TargetRecord) -> StorageResult<Self> {
        Ok(Self {
            connect_url: record.connect_url.clone(),
            alias: record.alias.clone(),
            jvm_id: record.jvm_id.clone(),
            recordings: serde_json::to_string(&record.recordings)?,
            last_reconciled: record.last_reconciled.timestamp_millis(),
        })
    }

    pub fn into_record(self) -> StorageResult<TargetRecord> {
        let recordings: Vec<ActiveRecording> = serde_json::from_str(&self.recordings)?;
        Ok(TargetRecord {
            connect_url: self.connect_url,
            alias: self.alias,
            jvm_id: self.jvm_id,
            recordings,
            last_reconciled: millis_to_timestamp(self.last_reconciled),
        })
    }
}

/// Reassemble the tree from its flat row set.
pub fn build_tree(rows: Vec<NodeRow>) -> StorageResult<DiscoveryNode> {
    let root = rows
        .iter()
        .find(|r| r.parent_id.is_none())
        .ok_or_else(|| StorageError::QueryFailed("universe row missing".to_string()))?;

    build_node(root, &rows)
}

fn build_node(row: &NodeRow, rows: &[NodeRow]) -> StorageResult<DiscoveryNode> {
    let mut children = vec![];
    for child in rows.iter().filter(|r| r.parent_id == Some(row.id)) {
        children.push(build_node(child, rows)?);
    }

    match row.kind.as_str() {
        "universe" => Ok(DiscoveryNode::Universe { children }),
        "realm" => Ok(DiscoveryNode::Realm {
            name: row.name.clone(),
            children,
        }),
        "target" => {
            let payload = row.payload.as_deref().ok_or_else(|| {
                StorageError::SerializationError(format!("target row {} has no payload", row.id))
            })?;
            let target: TargetDef = serde_json::from_str(payload)?;
            Ok(DiscoveryNode::Target {
                name: row.name.clone(),
                target,
            })
        }
        other => Err(StorageError::SerializationError(format!(
            "unknown node kind: {other}"
        ))),
    }
}

fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

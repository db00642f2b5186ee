//! Message types for actor communication
//!
//! This module defines all message types used for communication between actors.
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: Broadcast notifications published to multiple subscribers
//! 3. **Immutability**: All events are cloneable for multi-subscriber patterns

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::discovery::{DiscoveryNode, DiscoveryPlugin, DiscoveryResult};
use crate::targets::{ConnectionResult, TargetDef};

/// Identity and credential returned from a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: Uuid,
    pub token: String,
}

/// Commands that can be sent to the RegistryActor
///
/// Bearer tokens ride along on publish/deregister for the wire contract;
/// verifying them is the authorization collaborator's job upstream, the
/// registry only resolves the plugin identity.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a plugin (or re-acknowledge a prior registration)
    Register {
        realm: String,
        callback: String,
        /// Previously issued identity + credential for idempotent re-registration
        prior: Option<(Uuid, String)>,
        respond_to: oneshot::Sender<DiscoveryResult<Registration>>,
    },

    /// Atomically replace the plugin realm's children with a new subtree
    Publish {
        plugin_id: Uuid,
        token: String,
        children: Vec<DiscoveryNode>,
        respond_to: oneshot::Sender<DiscoveryResult<Uuid>>,
    },

    /// Remove a plugin and cascade-delete its realm subtree
    Deregister {
        plugin_id: Uuid,
        token: String,
        respond_to: oneshot::Sender<DiscoveryResult<Uuid>>,
    },

    /// Snapshot of the full tree rooted at the Universe
    GetUniverse {
        respond_to: oneshot::Sender<DiscoveryResult<DiscoveryNode>>,
    },

    /// List registered plugins, optionally filtered by exact realm name
    ListPlugins {
        realm: Option<String>,
        respond_to: oneshot::Sender<DiscoveryResult<Vec<DiscoveryPlugin>>>,
    },

    /// Look up one plugin
    GetPlugin {
        id: Uuid,
        respond_to: oneshot::Sender<DiscoveryResult<Option<DiscoveryPlugin>>>,
    },

    /// Gracefully shut down the registry actor
    Shutdown,
}

/// Event published when the discovery tree changes
///
/// Broadcast to all interested actors (reconciler, notifier). The channel
/// may lag for slow subscribers - acceptable, since the tree can always be
/// re-read through the registry handle.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A new plugin registered and its realm was created
    PluginRegistered { plugin_id: Uuid, realm: String },

    /// A plugin replaced its realm's children
    RealmPublished {
        plugin_id: Uuid,
        realm: String,
        /// Targets present after the publish but not before
        found: Vec<TargetDef>,
        /// Targets present before the publish but not after
        lost: Vec<TargetDef>,
    },

    /// A plugin deregistered; its realm subtree is gone
    PluginDeregistered { plugin_id: Uuid, realm: String },
}

impl DiscoveryEvent {
    /// The plugin that caused this event
    pub fn origin(&self) -> Uuid {
        match self {
            DiscoveryEvent::PluginRegistered { plugin_id, .. } => *plugin_id,
            DiscoveryEvent::RealmPublished { plugin_id, .. } => *plugin_id,
            DiscoveryEvent::PluginDeregistered { plugin_id, .. } => *plugin_id,
        }
    }

    /// The realm the event concerns
    pub fn realm(&self) -> &str {
        match self {
            DiscoveryEvent::PluginRegistered { realm, .. } => realm,
            DiscoveryEvent::RealmPublished { realm, .. } => realm,
            DiscoveryEvent::PluginDeregistered { realm, .. } => realm,
        }
    }
}

/// Event published when a target's connectivity state transitions
#[derive(Debug, Clone)]
pub enum TargetEvent {
    /// A target gained a confirmed stable ID
    Connected { connect_url: String, jvm_id: String },

    /// A previously confirmed target failed its connection attempt
    Lost { connect_url: String },
}

/// Commands that can be sent to the ReconcilerActor
#[derive(Debug)]
pub enum ReconcilerCommand {
    /// Trigger reconciliation immediately
    ///
    /// With a target: reconcile exactly that target inline, surfacing its
    /// failure to the caller. Without: run a sweep over all unconnected
    /// targets, with per-target failures absorbed.
    ReconcileNow {
        target: Option<String>,
        respond_to: oneshot::Sender<ConnectionResult<()>>,
    },

    /// Get reconciliation statistics
    GetStats {
        respond_to: oneshot::Sender<ReconcilerStats>,
    },

    /// Gracefully shut down the reconciler
    Shutdown,
}

/// Reconciliation statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcilerStats {
    /// Sweep passes started
    pub sweeps: u64,

    /// Reconciliations performed inline (targeted or single-target sweeps)
    pub inline_runs: u64,

    /// Units of work dispatched to the pool by multi-target sweeps
    pub dispatched: u64,
}

/// Commands that can be sent to the NotifierActor
#[derive(Debug)]
pub enum NotifierCommand {
    /// Gracefully shut down the notifier
    Shutdown,
}

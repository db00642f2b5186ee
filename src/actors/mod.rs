//! Actor-based discovery and reconciliation core
//!
//! This module implements the coordinator as a set of independent async
//! tasks communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌─────────────────┐
//!                  │   Hub (main)    │
//!                  └────────┬────────┘
//!                           │ spawns
//!          ┌────────────────┼────────────────┐
//!          │                │                │
//!  ┌───────▼───────┐ ┌──────▼───────┐ ┌──────▼───────┐
//!  │ RegistryActor │ │  Reconciler  │ │   Notifier   │
//!  │ (tree owner)  │ │ (store owner)│ │ (callbacks)  │
//!  └───────┬───────┘ └──────▲───────┘ └──────▲───────┘
//!          │                │                │
//!          │     DiscoveryEvent broadcast    │
//!          └────────────────┴────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **RegistryActor**: the transactional protocol surface for plugin
//!   registration, subtree publication and deregistration; sole owner of
//!   the discovery tree
//! - **ReconcilerActor**: refreshes per-target connectivity state under a
//!   bounded timeout; sole owner of the target store
//! - **NotifierActor**: POSTs change notifications to plugin callbacks
//!
//! The two stateful actors cross-reference by identity only (connect
//! URLs, plugin IDs) - there is no shared mutable object between them, so
//! they run correctness-independently of each other.
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: Actors publish events to broadcast channels for fan-out
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod notifier;
pub mod reconciler;
pub mod registry;

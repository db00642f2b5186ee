//! Discovery tree domain model
//!
//! This module defines the hierarchical inventory of monitorable targets
//! (universe → realms → targets), the plugin records that own realms, and
//! the error taxonomy of the registry protocol.
//!
//! ## Design
//!
//! - **Closed variant tree**: [`DiscoveryNode`] is a tagged enum, so
//!   traversal and serialization are exhaustive matches
//! - **Validation at the boundary**: published subtrees are validated
//!   before any mutation happens
//! - **Credentials stay internal**: plugin credentials are skipped during
//!   serialization
//!
//! The registry actor that mutates the tree lives in
//! [`crate::actors::registry`]; this module is pure data.

pub mod error;
pub mod node;
pub mod plugin;

pub use error::{DiscoveryError, DiscoveryResult};
pub use node::{DiscoveryNode, UNIVERSE_NAME, diff_targets, validate_subtree};
pub use plugin::{BUILTIN_REALM, DiscoveryPlugin, issue_credential};

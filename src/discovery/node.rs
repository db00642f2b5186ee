//! The discovery tree
//!
//! The tree has exactly one [`DiscoveryNode::Universe`] root. Its children
//! are realms, one per registered plugin (plus the built-in realm), and
//! each realm holds the target subtree its plugin last published. Nested
//! realms are allowed below the top level; targets are always leaves.
//!
//! Node kinds are a closed tagged variant so traversal and serialization
//! are exhaustive-match over three cases, nothing more.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::error::DiscoveryError;
use crate::targets::TargetDef;

/// Name of the single root node
pub const UNIVERSE_NAME: &str = "Universe";

/// A node in the discovery tree
///
/// Serialized with a `kind` discriminant so consumers can dispatch without
/// probing for fields:
///
/// ```json
/// { "kind": "realm", "name": "my-agent", "children": [ ... ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiscoveryNode {
    /// The single root of the tree; children are realms only
    Universe { children: Vec<DiscoveryNode> },

    /// A named grouping owned by exactly one plugin
    Realm {
        name: String,
        children: Vec<DiscoveryNode>,
    },

    /// A leaf describing one monitorable JVM process
    Target { name: String, target: TargetDef },
}

impl DiscoveryNode {
    /// Create an empty universe root
    pub fn universe() -> Self {
        DiscoveryNode::Universe { children: vec![] }
    }

    /// Create an empty realm node
    pub fn realm(name: impl Into<String>) -> Self {
        DiscoveryNode::Realm {
            name: name.into(),
            children: vec![],
        }
    }

    /// Create a target leaf
    pub fn target(name: impl Into<String>, target: TargetDef) -> Self {
        DiscoveryNode::Target {
            name: name.into(),
            target,
        }
    }

    /// The node's name (the universe has a fixed one)
    pub fn name(&self) -> &str {
        match self {
            DiscoveryNode::Universe { .. } => UNIVERSE_NAME,
            DiscoveryNode::Realm { name, .. } => name,
            DiscoveryNode::Target { name, .. } => name,
        }
    }

    /// Child nodes (empty slice for targets)
    pub fn children(&self) -> &[DiscoveryNode] {
        match self {
            DiscoveryNode::Universe { children } => children,
            DiscoveryNode::Realm { children, .. } => children,
            DiscoveryNode::Target { .. } => &[],
        }
    }

    /// Mutable child list, if the node kind can carry children
    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<DiscoveryNode>> {
        match self {
            DiscoveryNode::Universe { children } => Some(children),
            DiscoveryNode::Realm { children, .. } => Some(children),
            DiscoveryNode::Target { .. } => None,
        }
    }

    /// Find a direct child realm by name
    pub fn find_realm(&self, name: &str) -> Option<&DiscoveryNode> {
        self.children()
            .iter()
            .find(|c| matches!(c, DiscoveryNode::Realm { .. }) && c.name() == name)
    }

    /// Every target definition in this subtree, depth-first
    pub fn walk_targets(&self) -> Vec<&TargetDef> {
        let mut out = vec![];
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a TargetDef>) {
        match self {
            DiscoveryNode::Target { target, .. } => out.push(target),
            _ => {
                for child in self.children() {
                    child.collect_targets(out);
                }
            }
        }
    }

    /// Total node count of this subtree, root included
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(DiscoveryNode::size).sum::<usize>()
    }
}

/// Validate a subtree supplied by a plugin for publication.
///
/// Rejects with [`DiscoveryError::MalformedInput`] when:
/// - a universe node appears anywhere in the subtree,
/// - sibling names collide at any level,
/// - a target's connect URL does not parse (neither a full URL nor a
///   `host:port` shorthand).
pub fn validate_subtree(nodes: &[DiscoveryNode]) -> Result<(), DiscoveryError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if let DiscoveryNode::Universe { .. } = node {
            return Err(DiscoveryError::MalformedInput(
                "a published subtree may not contain a universe node".into(),
            ));
        }
        if !seen.insert(node.name().to_string()) {
            return Err(DiscoveryError::MalformedInput(format!(
                "duplicate sibling node name: {}",
                node.name()
            )));
        }
        if let DiscoveryNode::Target { target, .. } = node {
            crate::targets::canonical_connect_url(&target.connect_url).map_err(|e| {
                DiscoveryError::MalformedInput(format!(
                    "target {}: invalid connect URL: {e}",
                    node.name()
                ))
            })?;
        }
        validate_subtree(node.children())?;
    }
    Ok(())
}

/// Diff two child sets of a realm by the targets they contain.
///
/// Returns `(found, lost)`: definitions present only in `next`, and
/// definitions present only in `prev`, keyed by connect URL.
pub fn diff_targets(prev: &[DiscoveryNode], next: &[DiscoveryNode]) -> (Vec<TargetDef>, Vec<TargetDef>) {
    let index = |nodes: &[DiscoveryNode]| -> HashMap<String, TargetDef> {
        let mut map = HashMap::new();
        for node in nodes {
            for def in node.walk_targets() {
                map.insert(def.connect_url.clone(), def.clone());
            }
        }
        map
    };

    let before = index(prev);
    let after = index(next);

    let found = after
        .iter()
        .filter(|(url, _)| !before.contains_key(*url))
        .map(|(_, def)| def.clone())
        .collect();
    let lost = before
        .iter()
        .filter(|(url, _)| !after.contains_key(*url))
        .map(|(_, def)| def.clone())
        .collect();

    (found, lost)
}

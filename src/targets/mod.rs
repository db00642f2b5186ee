//! Target connectivity domain model
//!
//! A *target* is one monitorable JVM process. Its identity is its connect
//! URL; once a connection has succeeded, it also carries a hash-derived
//! stable ID that confirms identity across reconnects. The reconciler
//! ([`crate::actors::reconciler`]) keeps these records fresh.

pub mod error;
pub mod probe;

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use error::{ConnectionError, ConnectionResult};
pub use probe::{ConnectivityProbe, JvmIdentity, ProbeConnection};

/// `host:port` shorthand accepted in place of a full connect URL
static HOST_PORT_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:\s]+)(?::(\d{1,5}))$").expect("static pattern"));

/// Expand a target address into the canonical JMX service URL.
///
/// Accepts either a full URL (returned unchanged) or a `host:port`
/// shorthand, which becomes `service:jmx:rmi:///jndi/rmi://host:port/jmxrmi`.
pub fn canonical_connect_url(addr: &str) -> Result<String, url::ParseError> {
    if let Some(captures) = HOST_PORT_PAIR.captures(addr) {
        let host = &captures[1];
        let port = &captures[2];
        return Ok(format!(
            "service:jmx:rmi:///jndi/rmi://{host}:{port}/jmxrmi"
        ));
    }
    url::Url::parse(addr).map(|_| addr.to_string())
}

/// Target description carried by a tree leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDef {
    /// Connection address (full URL or `host:port` shorthand)
    pub connect_url: String,

    /// Optional human-readable alias
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,

    /// Stable ID, when the publisher already knows it
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub jvm_id: Option<String>,

    /// Free-form annotations attached by the publishing plugin
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub annotations: HashMap<String, String>,
}

impl TargetDef {
    pub fn new(connect_url: impl Into<String>) -> Self {
        Self {
            connect_url: connect_url.into(),
            alias: None,
            jvm_id: None,
            annotations: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// State of an active flight recording on a target JVM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Running,
    Stopped,
    Closed,
}

/// A flight recording reported by a connected target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRecording {
    pub id: u64,
    pub name: String,
    pub state: RecordingState,
    pub start_time: DateTime<Utc>,
}

/// Last-known connectivity state of one target (a TargetStore entry)
///
/// Created lazily on the first reconciliation attempt, updated on every
/// pass, never deleted by this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Target identity
    pub connect_url: String,

    /// Optional alias carried over from discovery
    pub alias: Option<String>,

    /// Confirmed stable ID; None means unconnected or connection lost
    pub jvm_id: Option<String>,

    /// Active recordings as of the last successful reconciliation
    pub recordings: Vec<ActiveRecording>,

    /// When the record was last written by the reconciler
    pub last_reconciled: DateTime<Utc>,
}

impl TargetRecord {
    /// Fresh, unconnected record for a target seen for the first time
    pub fn new(connect_url: impl Into<String>) -> Self {
        Self {
            connect_url: connect_url.into(),
            alias: None,
            jvm_id: None,
            recordings: vec![],
            last_reconciled: Utc::now(),
        }
    }

    /// Seed a record from a published target definition
    pub fn from_def(def: &TargetDef) -> Self {
        Self {
            connect_url: def.connect_url.clone(),
            alias: def.alias.clone(),
            jvm_id: None,
            recordings: vec![],
            last_reconciled: Utc::now(),
        }
    }

    /// A target is connected exactly when it has a confirmed stable ID
    pub fn is_connected(&self) -> bool {
        self.jvm_id.is_some()
    }

    /// Drop the confirmed identity after a failed connection attempt
    pub fn clear_connection(&mut self) {
        self.jvm_id = None;
        self.last_reconciled = Utc::now();
    }
}

//! Connectivity probe boundary
//!
//! The probe is an external collaborator: it knows how to open a
//! management connection to a JVM and, under an open connection, how to
//! fetch the remote identity and recording list. This module only defines
//! the trait boundary and the hash derivation for the stable ID - the
//! actual JMX/attach transport lives outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::ConnectionResult;
use super::{ActiveRecording, TargetRecord};

/// Identity attributes reported by a remote JVM
///
/// The stable ID is derived from these, so two connections to the same
/// JVM process agree on it and a restarted process gets a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JvmIdentity {
    pub main_class: String,
    pub jvm_name: String,
    pub jvm_version: String,
    pub start_time: DateTime<Utc>,
}

impl JvmIdentity {
    /// Derive the hash-based stable ID for this JVM
    pub fn stable_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.main_class.as_bytes());
        hasher.update(b"|");
        hasher.update(self.jvm_name.as_bytes());
        hasher.update(b"|");
        hasher.update(self.jvm_version.as_bytes());
        hasher.update(b"|");
        hasher.update(self.start_time.timestamp_millis().to_be_bytes());

        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// An open management connection to one target
#[async_trait]
pub trait ProbeConnection: Send + Sync {
    /// Fetch the remote JVM's identity attributes
    async fn jvm_identity(&self) -> ConnectionResult<JvmIdentity>;

    /// List the target's currently active flight recordings
    async fn list_recordings(&self) -> ConnectionResult<Vec<ActiveRecording>>;
}

/// Opens management connections to targets
///
/// Implementations may block while dialing; callers bound every call with
/// the configured connection timeout.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Attempt to open a management connection to the given target
    async fn connect(&self, target: &TargetRecord)
    -> ConnectionResult<Box<dyn ProbeConnection>>;
}

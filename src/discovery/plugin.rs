//! Discovery plugin records and credential issuance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Name of the system-managed realm that exists on every deployment
pub const BUILTIN_REALM: &str = "Custom Targets";

/// A registered discovery plugin
///
/// Created together with its realm at registration time, destroyed
/// together with it at deregistration. The bearer credential is held here
/// for the re-registration handshake but is never serialized, so read
/// APIs cannot leak it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryPlugin {
    /// Opaque plugin identity
    pub id: Uuid,

    /// Name of the realm this plugin owns (1:1)
    pub realm: String,

    /// Where the coordinator may push notifications (None for the built-in plugin)
    pub callback: Option<Url>,

    /// Issued bearer credential
    #[serde(skip_serializing, default)]
    pub credential: String,

    /// True only for the implicit system-managed realm
    pub builtin: bool,

    /// When the plugin registered
    pub registered_at: DateTime<Utc>,
}

impl DiscoveryPlugin {
    /// Create a freshly registered external plugin with a new credential
    pub fn new(realm: impl Into<String>, callback: Url) -> Self {
        Self {
            id: Uuid::new_v4(),
            realm: realm.into(),
            callback: Some(callback),
            credential: issue_credential(),
            builtin: false,
            registered_at: Utc::now(),
        }
    }

    /// Create the built-in plugin owning the system-managed realm
    pub fn builtin() -> Self {
        Self {
            id: Uuid::new_v4(),
            realm: BUILTIN_REALM.to_string(),
            callback: None,
            credential: issue_credential(),
            builtin: true,
            registered_at: Utc::now(),
        }
    }
}

/// Issue a fresh opaque bearer credential
pub fn issue_credential() -> String {
    Uuid::new_v4().to_string()
}

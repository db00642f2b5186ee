//! RegistryActor - Transactional entry point for plugin lifecycle and tree mutation
//!
//! ## Architecture
//!
//! The registry actor is the only component allowed to mutate the
//! discovery tree. It processes one command at a time, and every mutating
//! command maps to exactly one storage transaction, which together give
//! the serializable-per-call atomicity the protocol promises: a reader
//! asking for the universe mid-publish observes either the old or the new
//! children set, never a mix.
//!
//! ## Message Flow
//!
//! ```text
//! RegistryHandle ──commands──▶ RegistryActor ──tx──▶ StorageBackend
//!                                   │
//!                                   └─── DiscoveryEvent broadcast ──▶ [Reconciler, Notifier]
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, instrument};
use url::Url;
use uuid::Uuid;

use crate::discovery::{
    DiscoveryError, DiscoveryNode, DiscoveryPlugin, DiscoveryResult, diff_targets,
    validate_subtree,
};
use crate::storage::StorageBackend;

use super::messages::{DiscoveryEvent, Registration, RegistryCommand};

/// Actor owning all discovery tree mutation
pub struct RegistryActor {
    /// Storage collaborator; provides the transaction boundary
    backend: Arc<dyn StorageBackend>,

    /// Command receiver
    command_rx: mpsc::Receiver<RegistryCommand>,

    /// Broadcast sender for tree-change events
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl RegistryActor {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        command_rx: mpsc::Receiver<RegistryCommand>,
        event_tx: broadcast::Sender<DiscoveryEvent>,
    ) -> Self {
        Self {
            backend,
            command_rx,
            event_tx,
        }
    }

    /// Run the actor's main loop
    ///
    /// Bootstraps the universe and the built-in realm first; commands
    /// queue on the channel until that is done, so callers never observe
    /// a rootless tree.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting registry actor");

        if let Err(e) = self.bootstrap().await {
            error!("registry bootstrap failed: {e}");
            return;
        }

        while let Some(cmd) = self.command_rx.recv().await {
            if !self.handle_command(cmd).await {
                break;
            }
        }

        debug!("registry actor stopped");
    }

    /// Idempotent startup bootstrap: universe root + built-in realm
    async fn bootstrap(&self) -> DiscoveryResult<()> {
        self.backend.ensure_universe().await?;

        let has_builtin = self
            .backend
            .list_plugins()
            .await?
            .iter()
            .any(|p| p.builtin);
        if !has_builtin {
            let builtin = DiscoveryPlugin::builtin();
            info!("creating built-in realm: {}", builtin.realm);
            self.backend.insert_plugin(&builtin).await?;
        }

        Ok(())
    }

    /// Handle a command; returns false when the actor should stop
    async fn handle_command(&mut self, cmd: RegistryCommand) -> bool {
        match cmd {
            RegistryCommand::Register {
                realm,
                callback,
                prior,
                respond_to,
            } => {
                let result = self.register(realm, callback, prior).await;
                let _ = respond_to.send(result);
            }

            RegistryCommand::Publish {
                plugin_id,
                token: _,
                children,
                respond_to,
            } => {
                let result = self.publish(plugin_id, children).await;
                let _ = respond_to.send(result);
            }

            RegistryCommand::Deregister {
                plugin_id,
                token: _,
                respond_to,
            } => {
                let result = self.deregister(plugin_id).await;
                let _ = respond_to.send(result);
            }

            RegistryCommand::GetUniverse { respond_to } => {
                let result = self.backend.load_universe().await.map_err(Into::into);
                let _ = respond_to.send(result);
            }

            RegistryCommand::ListPlugins { realm, respond_to } => {
                let result = self.list_plugins(realm).await;
                let _ = respond_to.send(result);
            }

            RegistryCommand::GetPlugin { id, respond_to } => {
                let result = self.backend.get_plugin(id).await.map_err(Into::into);
                let _ = respond_to.send(result);
            }

            RegistryCommand::Shutdown => {
                debug!("received shutdown command");
                return false;
            }
        }
        true
    }

    #[instrument(skip(self, prior), fields(realm = %realm))]
    async fn register(
        &mut self,
        realm: String,
        callback: String,
        prior: Option<(Uuid, String)>,
    ) -> DiscoveryResult<Registration> {
        // Re-registration handshake: acknowledge a known pair unchanged.
        // TODO rotate the credential here once a refresh contract exists
        if let Some((id, token)) = prior {
            return match self.backend.get_plugin(id).await? {
                Some(plugin) if plugin.credential == token => {
                    debug!("re-acknowledging registration of {id}");
                    Ok(Registration { id, token })
                }
                Some(_) => Err(DiscoveryError::Forbidden(format!(
                    "credential mismatch for plugin {id}"
                ))),
                None => Err(DiscoveryError::NotFound(format!("plugin {id}"))),
            };
        }

        let callback = Url::parse(&callback)
            .map_err(|e| DiscoveryError::MalformedInput(format!("callback URI: {e}")))?;

        let realm = if realm.trim().is_empty() {
            format!("realm-{}", Uuid::new_v4())
        } else {
            realm
        };

        let universe = self.backend.load_universe().await?;
        if universe.find_realm(&realm).is_some() {
            return Err(DiscoveryError::MalformedInput(format!(
                "realm name already registered: {realm}"
            )));
        }

        let plugin = DiscoveryPlugin::new(&realm, callback);
        self.backend.insert_plugin(&plugin).await?;

        info!("registered plugin {} for realm {realm}", plugin.id);
        let _ = self.event_tx.send(DiscoveryEvent::PluginRegistered {
            plugin_id: plugin.id,
            realm,
        });

        Ok(Registration {
            id: plugin.id,
            token: plugin.credential,
        })
    }

    #[instrument(skip(self, children), fields(count = children.len()))]
    async fn publish(
        &mut self,
        plugin_id: Uuid,
        children: Vec<DiscoveryNode>,
    ) -> DiscoveryResult<Uuid> {
        let plugin = self
            .backend
            .get_plugin(plugin_id)
            .await?
            .ok_or_else(|| DiscoveryError::NotFound(format!("plugin {plugin_id}")))?;

        validate_subtree(&children)?;

        let previous = self
            .backend
            .load_universe()
            .await?
            .find_realm(&plugin.realm)
            .map(|realm| realm.children().to_vec())
            .unwrap_or_default();

        self.backend
            .replace_realm_children(&plugin.realm, &children)
            .await?;

        let (found, lost) = diff_targets(&previous, &children);
        debug!(
            "published realm {}: {} targets found, {} lost",
            plugin.realm,
            found.len(),
            lost.len()
        );

        let _ = self.event_tx.send(DiscoveryEvent::RealmPublished {
            plugin_id,
            realm: plugin.realm,
            found,
            lost,
        });

        Ok(plugin_id)
    }

    #[instrument(skip(self))]
    async fn deregister(&mut self, plugin_id: Uuid) -> DiscoveryResult<Uuid> {
        let plugin = self
            .backend
            .get_plugin(plugin_id)
            .await?
            .ok_or_else(|| DiscoveryError::NotFound(format!("plugin {plugin_id}")))?;

        if plugin.builtin {
            return Err(DiscoveryError::Forbidden(
                "the built-in realm cannot be deregistered".to_string(),
            ));
        }

        self.backend.delete_plugin(plugin_id).await?;

        info!("deregistered plugin {plugin_id} (realm {})", plugin.realm);
        let _ = self.event_tx.send(DiscoveryEvent::PluginDeregistered {
            plugin_id,
            realm: plugin.realm,
        });

        Ok(plugin_id)
    }

    async fn list_plugins(
        &self,
        realm: Option<String>,
    ) -> DiscoveryResult<Vec<DiscoveryPlugin>> {
        let mut plugins = self.backend.list_plugins().await?;
        if let Some(filter) = realm {
            plugins.retain(|p| p.realm == filter);
        }
        Ok(plugins)
    }
}

/// Handle for the RegistryActor - the protocol surface plugins talk to
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn a new registry actor on the given backend
    ///
    /// Tree-change events are published on `event_tx`.
    pub fn spawn(
        backend: Arc<dyn StorageBackend>,
        event_tx: broadcast::Sender<DiscoveryEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = RegistryActor::new(backend, cmd_rx, event_tx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    async fn request<T>(
        &self,
        cmd: RegistryCommand,
        rx: oneshot::Receiver<DiscoveryResult<T>>,
    ) -> DiscoveryResult<T> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| DiscoveryError::Unavailable)?;
        rx.await.map_err(|_| DiscoveryError::Unavailable)?
    }

    /// Register a plugin, or re-acknowledge a prior registration
    pub async fn register(
        &self,
        realm: impl Into<String>,
        callback: impl Into<String>,
        prior: Option<(Uuid, String)>,
    ) -> DiscoveryResult<Registration> {
        let (tx, rx) = oneshot::channel();
        self.request(
            RegistryCommand::Register {
                realm: realm.into(),
                callback: callback.into(),
                prior,
                respond_to: tx,
            },
            rx,
        )
        .await
    }

    /// Replace the plugin realm's children with the supplied subtree
    pub async fn publish(
        &self,
        plugin_id: Uuid,
        token: impl Into<String>,
        children: Vec<DiscoveryNode>,
    ) -> DiscoveryResult<Uuid> {
        let (tx, rx) = oneshot::channel();
        self.request(
            RegistryCommand::Publish {
                plugin_id,
                token: token.into(),
                children,
                respond_to: tx,
            },
            rx,
        )
        .await
    }

    /// Deregister a plugin, cascading deletion of its realm subtree
    pub async fn deregister(
        &self,
        plugin_id: Uuid,
        token: impl Into<String>,
    ) -> DiscoveryResult<Uuid> {
        let (tx, rx) = oneshot::channel();
        self.request(
            RegistryCommand::Deregister {
                plugin_id,
                token: token.into(),
                respond_to: tx,
            },
            rx,
        )
        .await
    }

    /// Consistent snapshot of the full discovery tree
    pub async fn get_universe(&self) -> DiscoveryResult<DiscoveryNode> {
        let (tx, rx) = oneshot::channel();
        self.request(RegistryCommand::GetUniverse { respond_to: tx }, rx)
            .await
    }

    /// List plugins, optionally filtered by exact realm name
    pub async fn list_plugins(
        &self,
        realm: Option<String>,
    ) -> DiscoveryResult<Vec<DiscoveryPlugin>> {
        let (tx, rx) = oneshot::channel();
        self.request(RegistryCommand::ListPlugins { realm, respond_to: tx }, rx)
            .await
    }

    /// Look up one plugin by identity
    pub async fn get_plugin(&self, id: Uuid) -> DiscoveryResult<Option<DiscoveryPlugin>> {
        let (tx, rx) = oneshot::channel();
        self.request(RegistryCommand::GetPlugin { id, respond_to: tx }, rx)
            .await
    }

    /// Shutdown the registry actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(RegistryCommand::Shutdown).await;
    }
}

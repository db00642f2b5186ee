//! NotifierActor - Pushes discovery-change notifications to plugin callbacks
//!
//! Registered plugins supply a callback URI at registration time. Whenever
//! the discovery tree changes, this actor POSTs a small JSON notification
//! to every registered callback except the plugin that caused the change,
//! so plugins can react (re-publish, refresh their caches) without polling.
//!
//! Delivery is fire-and-forget: a dead callback endpoint is logged and
//! skipped, never retried here, and never affects the tree.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, instrument, trace, warn};
use uuid::Uuid;

use super::messages::{DiscoveryEvent, NotifierCommand};
use super::registry::RegistryHandle;

/// Request timeout for callback deliveries
const DELIVERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Notification body POSTed to plugin callbacks
#[derive(Debug, Clone, Serialize)]
pub struct CallbackNotification {
    /// What happened: `plugin_registered`, `realm_published`, `plugin_deregistered`
    pub event: &'static str,

    /// The realm the change concerns
    pub realm: String,

    /// The plugin that caused the change
    pub origin: Uuid,
}

impl CallbackNotification {
    fn from_event(event: &DiscoveryEvent) -> Self {
        let kind = match event {
            DiscoveryEvent::PluginRegistered { .. } => "plugin_registered",
            DiscoveryEvent::RealmPublished { .. } => "realm_published",
            DiscoveryEvent::PluginDeregistered { .. } => "plugin_deregistered",
        };
        Self {
            event: kind,
            realm: event.realm().to_string(),
            origin: event.origin(),
        }
    }
}

/// Actor that delivers callback notifications
pub struct NotifierActor {
    /// Registry handle, used to resolve current callbacks per delivery
    registry: RegistryHandle,

    /// HTTP client (reused across requests for efficiency)
    client: reqwest::Client,

    /// Command receiver
    command_rx: mpsc::Receiver<NotifierCommand>,

    /// Tree-change events (broadcast subscription)
    discovery_rx: broadcast::Receiver<DiscoveryEvent>,
}

impl NotifierActor {
    pub fn new(
        registry: RegistryHandle,
        command_rx: mpsc::Receiver<NotifierCommand>,
        discovery_rx: broadcast::Receiver<DiscoveryEvent>,
    ) -> Self {
        Self {
            registry,
            client: reqwest::Client::builder()
                .timeout(DELIVERY_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            command_rx,
            discovery_rx,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting notifier actor");

        loop {
            tokio::select! {
                result = self.discovery_rx.recv() => {
                    match result {
                        Ok(event) => self.deliver(&event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("notifier lagged, skipped {skipped} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("discovery event channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        NotifierCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("notifier actor stopped");
    }

    /// Deliver one event to every registered callback except the origin
    ///
    /// Deliveries run concurrently so one slow endpoint cannot delay the
    /// others past its own request timeout.
    #[instrument(skip(self, event), fields(realm = %event.realm()))]
    async fn deliver(&self, event: &DiscoveryEvent) {
        let plugins = match self.registry.list_plugins(None).await {
            Ok(plugins) => plugins,
            Err(e) => {
                error!("cannot resolve callbacks: {e}");
                return;
            }
        };

        let notification = CallbackNotification::from_event(event);

        let posts = plugins
            .into_iter()
            .filter(|p| p.id != notification.origin)
            .filter_map(|p| p.callback)
            .map(|callback| {
                let client = self.client.clone();
                let notification = notification.clone();
                async move {
                    trace!("notifying callback at {callback}");
                    match client.post(callback.clone()).json(&notification).send().await {
                        Ok(response) if response.status().is_success() => {
                            trace!("callback {callback} acknowledged");
                        }
                        Ok(response) => {
                            warn!("callback {callback} answered {}", response.status());
                        }
                        Err(e) => {
                            warn!("callback {callback} unreachable: {e}");
                        }
                    }
                }
            });

        futures::future::join_all(posts).await;
    }
}

/// Handle for controlling the NotifierActor
#[derive(Clone)]
pub struct NotifierHandle {
    sender: mpsc::Sender<NotifierCommand>,
}

impl NotifierHandle {
    /// Spawn a new notifier actor
    pub fn spawn(
        registry: RegistryHandle,
        discovery_rx: broadcast::Receiver<DiscoveryEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = NotifierActor::new(registry, cmd_rx, discovery_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Shutdown the notifier
    pub async fn shutdown(&self) {
        let _ = self.sender.send(NotifierCommand::Shutdown).await;
    }
}

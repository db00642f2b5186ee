//! ReconcilerActor - Keeps the target store's connectivity snapshot fresh
//!
//! ## Trigger modes
//!
//! 1. **Targeted** - `reconcile_now(Some(url))`: one target, inline, the
//!    caller observes the failure
//! 2. **Sweep** - the periodic tick or `reconcile_now(None)`: all targets
//!    without a confirmed stable ID. One unit of work per target on the
//!    shared runtime, so a stuck probe cannot starve its siblings
//! 3. **Discovery-driven** - targets announced by a publish are lazily
//!    created in the store and reconciled immediately
//!
//! ## Failure isolation
//!
//! Each sweep unit performs its own storage calls and absorbs its own
//! failure at the task boundary. The single-target sweep case runs inline
//! to skip the dispatch overhead; its failure is absorbed the same way.
//!
//! Connection attempts are the only operation allowed to block, and every
//! probe call is bounded by the configured timeout - exceeding it is
//! treated exactly like an explicit refusal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, timeout};
use tracing::{debug, instrument, trace, warn};

use crate::storage::StorageBackend;
use crate::targets::{
    ConnectionError, ConnectionResult, ConnectivityProbe, TargetDef, TargetRecord,
    canonical_connect_url,
};

use super::messages::{DiscoveryEvent, ReconcilerCommand, ReconcilerStats, TargetEvent};

/// Actor that reconciles target connectivity state
pub struct ReconcilerActor {
    /// Target store; every unit of work calls it independently
    backend: Arc<dyn StorageBackend>,

    /// Connectivity probe collaborator
    probe: Arc<dyn ConnectivityProbe>,

    /// Bound on every probe call ("connections-failed" timeout)
    connection_timeout: Duration,

    /// How often to sweep unconnected targets
    sweep_interval: Duration,

    /// Command receiver
    command_rx: mpsc::Receiver<ReconcilerCommand>,

    /// Tree-change events from the registry (broadcast subscription)
    discovery_rx: broadcast::Receiver<DiscoveryEvent>,

    /// Broadcast sender for connectivity transitions
    event_tx: broadcast::Sender<TargetEvent>,

    stats: ReconcilerStats,
}

impl ReconcilerActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        probe: Arc<dyn ConnectivityProbe>,
        connection_timeout: Duration,
        sweep_interval: Duration,
        command_rx: mpsc::Receiver<ReconcilerCommand>,
        discovery_rx: broadcast::Receiver<DiscoveryEvent>,
        event_tx: broadcast::Sender<TargetEvent>,
    ) -> Self {
        Self {
            backend,
            probe,
            connection_timeout,
            sweep_interval,
            command_rx,
            discovery_rx,
            event_tx,
            stats: ReconcilerStats::default(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting reconciler (timeout: {:?}, sweep every {:?})",
            self.connection_timeout, self.sweep_interval
        );

        let mut ticker = interval(self.sweep_interval);

        loop {
            tokio::select! {
                // Periodic sweep over unconnected targets
                _ = ticker.tick() => {
                    self.sweep().await;
                }

                // Targets announced by a publish
                result = self.discovery_rx.recv() => {
                    match result {
                        Ok(DiscoveryEvent::RealmPublished { found, .. }) => {
                            self.absorb_published(found).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("reconciler lagged, skipped {skipped} discovery events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            trace!("discovery event channel closed");
                            // Sweeps and commands still work without it
                        }
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ReconcilerCommand::ReconcileNow { target, respond_to } => {
                            let result = match target {
                                Some(url) => self.reconcile_targeted(url).await,
                                None => {
                                    self.sweep().await;
                                    Ok(())
                                }
                            };
                            let _ = respond_to.send(result);
                        }

                        ReconcilerCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats);
                        }

                        ReconcilerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                // Command channel closed - exit
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("reconciler stopped");
    }

    /// Reconcile one specific target inline, surfacing the failure.
    ///
    /// The record is created lazily if the target has never been seen.
    async fn reconcile_targeted(&mut self, connect_url: String) -> ConnectionResult<()> {
        let record = match self.backend.get_target(&connect_url).await? {
            Some(record) => record,
            None => TargetRecord::new(&connect_url),
        };

        self.stats.inline_runs += 1;
        update_target(
            self.backend.clone(),
            self.probe.clone(),
            self.connection_timeout,
            self.event_tx.clone(),
            record,
        )
        .await
    }

    /// Sweep all targets lacking a confirmed stable ID
    #[instrument(skip(self))]
    async fn sweep(&mut self) {
        self.stats.sweeps += 1;

        let targets = match self.backend.list_unconnected_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!("sweep aborted, target query failed: {e}");
                return;
            }
        };

        trace!("sweeping {} unconnected targets", targets.len());
        self.dispatch(targets).await;
    }

    /// Lazily create records for freshly published targets and reconcile them
    async fn absorb_published(&mut self, found: Vec<TargetDef>) {
        let mut records = vec![];
        for def in found {
            let url = canonical_connect_url(&def.connect_url)
                .unwrap_or_else(|_| def.connect_url.clone());

            match self.backend.get_target(&url).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    let mut record = TargetRecord::from_def(&def);
                    record.connect_url = url;
                    records.push(record);
                }
                Err(e) => warn!("skipping published target {url}: {e}"),
            }
        }

        self.dispatch(records).await;
    }

    /// Fan reconciliation out: one target runs inline, many run as
    /// independent units of work on the shared pool.
    async fn dispatch(&mut self, mut targets: Vec<TargetRecord>) {
        match targets.len() {
            0 => trace!("nothing to reconcile"),
            1 => {
                let record = targets.remove(0);
                let url = record.connect_url.clone();
                self.stats.inline_runs += 1;

                if let Err(e) = update_target(
                    self.backend.clone(),
                    self.probe.clone(),
                    self.connection_timeout,
                    self.event_tx.clone(),
                    record,
                )
                .await
                {
                    warn!("reconciliation of {url} failed: {e}");
                }
            }
            n => {
                self.stats.dispatched += n as u64;
                for record in targets {
                    let backend = self.backend.clone();
                    let probe = self.probe.clone();
                    let event_tx = self.event_tx.clone();
                    let connection_timeout = self.connection_timeout;
                    let url = record.connect_url.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            update_target(backend, probe, connection_timeout, event_tx, record)
                                .await
                        {
                            warn!("reconciliation of {url} failed: {e}");
                        }
                    });
                }
            }
        }
    }
}

/// Refresh one target's connectivity state.
///
/// A free function so sweep units own everything they touch; each call is
/// its own isolated transaction scope against the backend.
async fn update_target(
    backend: Arc<dyn StorageBackend>,
    probe: Arc<dyn ConnectivityProbe>,
    connection_timeout: Duration,
    event_tx: broadcast::Sender<TargetEvent>,
    mut record: TargetRecord,
) -> ConnectionResult<()> {
    let was_connected = record.is_connected();

    let connection = match timeout(connection_timeout, probe.connect(&record)).await {
        Ok(Ok(connection)) => connection,
        Ok(Err(e)) => {
            return clear_and_raise(backend, event_tx, record, was_connected, e).await;
        }
        Err(_elapsed) => {
            return clear_and_raise(
                backend,
                event_tx,
                record,
                was_connected,
                ConnectionError::Timeout,
            )
            .await;
        }
    };

    let identity = match timeout(connection_timeout, connection.jvm_identity()).await {
        Ok(Ok(identity)) => identity,
        Ok(Err(e)) => {
            return clear_and_raise(backend, event_tx, record, was_connected, e).await;
        }
        Err(_elapsed) => {
            return clear_and_raise(
                backend,
                event_tx,
                record,
                was_connected,
                ConnectionError::Timeout,
            )
            .await;
        }
    };

    let jvm_id = identity.stable_hash();

    // A failure past this point propagates without persisting, leaving
    // the previous record intact
    record.recordings = timeout(connection_timeout, connection.list_recordings())
        .await
        .map_err(|_| ConnectionError::Timeout)??;

    record.jvm_id = Some(jvm_id.clone());
    record.last_reconciled = Utc::now();
    backend.upsert_target(&record).await?;

    trace!("target {} confirmed as {jvm_id}", record.connect_url);
    if !was_connected {
        let _ = event_tx.send(TargetEvent::Connected {
            connect_url: record.connect_url.clone(),
            jvm_id,
        });
    }

    Ok(())
}

/// Failure path: persist the cleared state first, then re-signal.
///
/// The store must never keep a stale stable ID that falsely implies
/// reachability, even though the caller also sees the error.
async fn clear_and_raise(
    backend: Arc<dyn StorageBackend>,
    event_tx: broadcast::Sender<TargetEvent>,
    mut record: TargetRecord,
    was_connected: bool,
    error: ConnectionError,
) -> ConnectionResult<()> {
    record.clear_connection();
    backend.upsert_target(&record).await?;

    if was_connected {
        let _ = event_tx.send(TargetEvent::Lost {
            connect_url: record.connect_url.clone(),
        });
    }

    Err(error)
}

/// Handle for controlling the ReconcilerActor
#[derive(Clone)]
pub struct ReconcilerHandle {
    sender: mpsc::Sender<ReconcilerCommand>,
}

impl ReconcilerHandle {
    /// Spawn a new reconciler actor
    pub fn spawn(
        backend: Arc<dyn StorageBackend>,
        probe: Arc<dyn ConnectivityProbe>,
        connection_timeout: Duration,
        sweep_interval: Duration,
        discovery_rx: broadcast::Receiver<DiscoveryEvent>,
        event_tx: broadcast::Sender<TargetEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = ReconcilerActor::new(
            backend,
            probe,
            connection_timeout,
            sweep_interval,
            cmd_rx,
            discovery_rx,
            event_tx,
        );
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Trigger reconciliation: one target (failure surfaced) or a sweep
    pub async fn reconcile_now(&self, target: Option<String>) -> ConnectionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReconcilerCommand::ReconcileNow {
                target,
                respond_to: tx,
            })
            .await
            .map_err(|_| ConnectionError::Unavailable)?;

        rx.await.map_err(|_| ConnectionError::Unavailable)?
    }

    /// Get reconciliation statistics
    pub async fn stats(&self) -> Option<ReconcilerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReconcilerCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Shutdown the reconciler
    pub async fn shutdown(&self) {
        let _ = self.sender.send(ReconcilerCommand::Shutdown).await;
    }
}

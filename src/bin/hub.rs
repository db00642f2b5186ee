use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use dotenv::dotenv;
use fleet_monitoring::{
    actors::{
        messages::TargetEvent, notifier::NotifierHandle, reconciler::ReconcilerHandle,
        registry::RegistryHandle,
    },
    config::{Config, StorageConfig, read_config_file},
    storage::{MemoryBackend, StorageBackend},
    targets::{ConnectionError, ConnectionResult, ConnectivityProbe, ProbeConnection, TargetRecord},
    util,
};
use tokio::sync::broadcast;
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_monitoring", LevelFilter::TRACE),
        ("hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Placeholder probe for deployments that have not linked a management
/// transport: every connection attempt is reported as refused, so targets
/// stay visibly unconnected instead of silently stale. The embedding
/// deployment swaps in its JMX/attach probe here.
struct UnroutableProbe;

#[async_trait]
impl ConnectivityProbe for UnroutableProbe {
    async fn connect(
        &self,
        _target: &TargetRecord,
    ) -> ConnectionResult<Box<dyn ProbeConnection>> {
        Err(ConnectionError::Refused(
            "no management transport configured".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match args.file.or_else(util::get_config_path) {
        Some(path) => read_config_file(&path)?,
        None => Config::default(),
    };

    let backend = build_backend(&config).await?;

    let (discovery_tx, _) = broadcast::channel(256);
    let (target_tx, target_rx) = broadcast::channel(256);

    let registry = RegistryHandle::spawn(backend.clone(), discovery_tx.clone());

    let reconciler = ReconcilerHandle::spawn(
        backend.clone(),
        Arc::new(UnroutableProbe),
        config.reconcile.connection_timeout(),
        config.reconcile.sweep_interval(),
        discovery_tx.subscribe(),
        target_tx,
    );

    let notifier = if config.notify {
        Some(NotifierHandle::spawn(
            registry.clone(),
            discovery_tx.subscribe(),
        ))
    } else {
        None
    };

    tokio::spawn(log_target_events(target_rx));

    info!("fleet hub running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    if let Some(notifier) = notifier {
        notifier.shutdown().await;
    }
    reconciler.shutdown().await;
    registry.shutdown().await;
    backend.close().await?;

    Ok(())
}

async fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.storage.clone().unwrap_or_default() {
        StorageConfig::None => {
            debug!("using in-memory storage");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let path = util::get_db_path().map(Into::into).unwrap_or(path);
            debug!("using SQLite storage at {}", path.display());
            Ok(Arc::new(
                fleet_monitoring::storage::sqlite::SqliteBackend::new(&path).await?,
            ))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("this build does not include the storage-sqlite feature")
        }
    }
}

async fn log_target_events(mut rx: broadcast::Receiver<TargetEvent>) {
    loop {
        match rx.recv().await {
            Ok(TargetEvent::Connected { connect_url, jvm_id }) => {
                info!("target {connect_url} connected as {jvm_id}");
            }
            Ok(TargetEvent::Lost { connect_url }) => {
                warn!("target {connect_url} lost its connection");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("target event logger lagged, skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

//! Gateway daemon entry point.
//!
//! Loads the config document, starts the filesystem watcher for
//! hot-reload, wires every subsystem via [`imgate_gateway::app::build`],
//! and runs until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use imgate_config::{ConfigWatcher, StorageBackend};
use imgate_storage::{DurableBus, KafkaBus, KvStore, MemoryKvStore, NoopBus, RedisKvStore};
use imgate_telemetry::{setup_logging, LogConfig, LogFormat};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("IMGATE_CONFIG").unwrap_or_else(|_| "imgate-gateway.yaml".to_string());

    let (_watcher, config_rx) = ConfigWatcher::start(config_path.as_str())?;
    let initial = config_rx.borrow().clone();

    let log_config = LogConfig::new("info,imgate=debug").with_format(LogFormat::Json);
    setup_logging(&log_config)?;

    info!(config_path, "imgate-gateway starting");

    let kv: Arc<dyn KvStore> = match initial.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryKvStore::new()),
        StorageBackend::Redis => Arc::new(RedisKvStore::connect(&initial.storage.redis_url).await?),
    };
    let bus: Arc<dyn DurableBus> = if initial.storage.kafka_enabled {
        Arc::new(KafkaBus::new(&initial.storage.kafka_brokers, initial.storage.kafka_topic.clone())?)
    } else {
        Arc::new(NoopBus)
    };

    let datacenter_id: u16 = std::env::var("IMGATE_DATACENTER_ID").ok().and_then(|v| v.parse().ok()).unwrap_or(0);
    let machine_id: u16 = std::env::var("IMGATE_MACHINE_ID").ok().and_then(|v| v.parse().ok()).unwrap_or(0);

    let gateway = imgate_gateway::app::build(config_rx, kv, bus, datacenter_id, machine_id)?;

    let accept_addr = SocketAddr::from(([0, 0, 0, 0], initial.server.port));
    let rpc_addr = SocketAddr::from(([0, 0, 0, 0], initial.server.port + 1));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown_tx = gateway.shutdown_sender();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    gateway.run(accept_addr, rpc_addr).await?;
    Ok(())
}

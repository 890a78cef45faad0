//! Service registrar binary.
//!
//! Serves the catalog over HTTP and, when a broker is configured, mirrors it
//! onto MQTT.

use std::sync::Arc;

use registrar_catalog::{
    Controller, MemoryStorage, Storage, StorageBackend, StorageConfig, ValkeyStorage,
};
use registrar_mqtt::{MqttBridge, RumqttcConnector};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use registrar_server::{api, RegistrarConfig, Result};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("registrar_server=info".parse()?)
                .add_directive("registrar_catalog=info".parse()?)
                .add_directive("registrar_mqtt=info".parse()?),
        )
        .init();

    info!("Service registrar starting");

    let mut config = RegistrarConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        RegistrarConfig::default()
    });
    config.ensure_id();
    config.validate()?;

    info!(
        id = %config.id,
        listen = %config.http.listen_addr,
        storage = ?config.storage.backend,
        mqtt = config.mqtt.is_enabled(),
        "configuration loaded"
    );

    run(config).await?;

    info!("registrar shutdown complete");
    Ok(())
}

/// Runs the registrar until a shutdown signal arrives.
async fn run(config: RegistrarConfig) -> Result<()> {
    let storage = open_storage(&config.storage).await?;
    let controller = Controller::start(storage, config.catalog.clone()).await?;

    let bridge = if config.mqtt.is_enabled() {
        let bridge = MqttBridge::start(
            Arc::clone(&controller),
            &config.mqtt,
            config.id.clone(),
            Arc::new(RumqttcConnector::new()),
        )
        .await?;
        Some(bridge)
    } else {
        info!("no broker configured, mqtt bridge disabled");
        None
    };

    let state = Arc::new(api::AppState {
        controller: Arc::clone(&controller),
        id: config.id.clone(),
        description: config.description.clone(),
    });
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(config.http.listen_addr).await?;
    info!(listen = %config.http.listen_addr, "registrar listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(bridge) = bridge {
        bridge.stop().await;
    }
    if let Err(e) = controller.stop().await {
        error!(error = %e, "error stopping controller");
    }

    served?;
    Ok(())
}

async fn open_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::Valkey => {
            let storage = ValkeyStorage::new(config).await?;
            info!("connected to valkey storage");
            Ok(Arc::new(storage))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}

//! QR Locker daemon - Main entry point
//!
//! Serves encrypt and decrypt requests over a local socket and reclaims
//! expired session data in the background.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qrlock_daemon::{
    DaemonConfig, EphemeralStore, IpcServer, LockerService, Reclaimer, ServiceSettings,
    SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qrlock_daemon=info,qrlock_qr=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting QR Locker daemon v{}", env!("CARGO_PKG_VERSION"));

    let config_path = DaemonConfig::default_path();
    let config = DaemonConfig::load_or_create(&config_path)?;
    config.ensure_directories()?;

    let store = Arc::new(EphemeralStore::new(Arc::new(SystemClock)));
    let service = Arc::new(LockerService::new(
        Arc::clone(&store),
        ServiceSettings::from(&config),
    ));

    let reclaimer = Reclaimer::new(store.clone(), config.sweep_interval()).spawn();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let ipc_server = IpcServer::new(config.ipc_socket_path.clone(), Arc::clone(&service));
    let mut ipc_handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = stop_rx.await;
        };
        if let Err(e) = ipc_server.run_until(shutdown).await {
            error!("IPC server error: {}", e);
        }
    });

    info!("Daemon started successfully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = &mut ipc_handle => {
            error!("IPC server exited unexpectedly");
        }
    }

    info!("Daemon shutting down");

    let _ = stop_tx.send(());
    if !ipc_handle.is_finished() {
        let _ = ipc_handle.await;
    }
    reclaimer.stop().await;

    let report = store.purge();
    info!(
        "Purged {} record(s) and {} path(s)",
        report.records_evicted, report.paths_deleted
    );

    Ok(())
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Discovery daemon entry point.

use discovery::config::{ConfigError, DiscoveryConfig};
use discovery::daemon::{Discovery, Identity};
use discovery::hostip::{self, DEFAULT_PROBE};
use discovery::socket::{DiscoverySocket, SocketError};
use discovery::store::FileStore;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot initialize data directory: {0}")]
    DataDir(std::io::Error),
    #[error("cannot detect host IP: {0}")]
    HostIp(std::io::Error),
    #[error(transparent)]
    Socket(#[from] SocketError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    if let Err(err) = run().await {
        error!("discovery failed to start: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let cfg = DiscoveryConfig::from_env()?;
    info!(
        stack = %cfg.stack_id,
        vni = %cfg.vni,
        group = %cfg.multicast_group,
        port = cfg.port,
        "starting discovery"
    );

    let store = FileStore::new(&cfg.data_dir);
    store.init().map_err(StartupError::DataDir)?;

    let host_ip = hostip::detect_host_ip(DEFAULT_PROBE).map_err(StartupError::HostIp)?;
    let socket = DiscoverySocket::open(cfg.multicast_group, cfg.port)?;

    let identity = Identity {
        stack_id: cfg.stack_id.clone(),
        host_ip,
        vni: cfg.vni,
    };
    let daemon = Discovery::start(&cfg, identity, socket, store);

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    daemon.shutdown().await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(stream) => stream,
        Err(err) => {
            error!(%err, "cannot install SIGTERM handler");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Router daemon entry point.

use router::config::{RouterConfig, DEFAULT_CONFIG_FILE};
use router::daemon::{self, DEFAULT_DISCOVERY_FILE};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    let config_file = std::env::var("CONFIG_FILE")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);

    let cfg = match RouterConfig::load(&config_file) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("cannot load router configuration: {err}");
            std::process::exit(1);
        }
    };

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    if let Err(err) = daemon::run(cfg, Path::new(DEFAULT_DISCOVERY_FILE), token).await {
        error!("router failed: {err}");
        std::process::exit(1);
    }
}

fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
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
        info!("shutdown signal received");
        token.cancel();
    });
}

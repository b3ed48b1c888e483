// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route-only router for deployments where VXLAN device and FDB programming
//! is delegated to an out-of-band manager.  Watches the same peer view and
//! runs only the route reconciler.

use net::InterfaceName;
use router::admin::Netlink;
use router::config::{RouterConfig, DEFAULT_CONFIG_FILE};
use router::daemon::DEFAULT_DISCOVERY_FILE;
use router::routes::RouteReconciler;
use router::watch::{self, PeerWatcher};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

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
    {
        let token = token.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            token.cancel();
        });
    }

    if let Err(err) = run(cfg, Path::new(DEFAULT_DISCOVERY_FILE), token).await {
        error!("unprivileged router failed: {err}");
        std::process::exit(1);
    }
}

async fn run(
    cfg: RouterConfig,
    discovery_file: &Path,
    token: CancellationToken,
) -> Result<(), router::daemon::RouterError> {
    info!(stack = %cfg.stack_id, vni = %cfg.vni, "starting unprivileged router");

    if !watch::wait_for_file(discovery_file, &token).await {
        return Ok(());
    }

    let netlink = Netlink::connect().map_err(router::admin::AdminError::Io)?;
    let routes = RouteReconciler::new(
        netlink,
        InterfaceName::for_vni(cfg.vni),
        cfg.stack_id.clone(),
        cfg.stack_mappings.clone(),
    );

    let mut watcher = PeerWatcher::new(discovery_file)?;
    reconcile(&watcher, &routes).await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            changed = watcher.changed() => {
                if !changed {
                    warn!("discovery watcher stopped delivering events");
                    break;
                }
                reconcile(&watcher, &routes).await;
            }
        }
    }

    info!(stack = %cfg.stack_id, "unprivileged router stopped");
    Ok(())
}

async fn reconcile(watcher: &PeerWatcher, routes: &RouteReconciler<Netlink>) {
    match watcher.load() {
        Ok(peers) => {
            info!(peers = peers.len(), "applying peer update");
            routes.update(&peers).await;
        }
        Err(err) => warn!(%err, "failed to load discovery data"),
    }
}

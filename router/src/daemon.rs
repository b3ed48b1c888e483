// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Router daemon assembly.

use crate::admin::{self, AdminError, BridgeCli, Netlink};
use crate::config::{ConfigError, RouterConfig};
use crate::fdb::FdbReconciler;
use crate::routes::RouteReconciler;
use crate::vtep::{VtepManager, VtepSpec};
use crate::watch::{self, PeerWatcher, WatchError};
use discovery::hostip;
use discovery::peers::Peer;
use discovery::store::{self, StoreError};
use net::VXLAN_PORT;
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default location of the peer view published by discovery.
pub const DEFAULT_DISCOVERY_FILE: &str = "/var/lib/docker-router/discovery.json";

/// Fatal router failures.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("cannot enable IPv4 forwarding: {0}")]
    Forwarding(std::io::Error),
    #[error("cannot detect host IP: {0}")]
    HostIp(std::io::Error),
    #[error("discovery file lists no peers; cannot detect the underlay address")]
    NoPeers,
}

/// Detect the local underlay address by routing toward `peer`, and report
/// the underlay device it lives on (best effort).
pub fn detect_underlay(peer: &Peer) -> Result<Ipv4Addr, RouterError> {
    let probe = SocketAddrV4::new(peer.host_ip, VXLAN_PORT);
    let host_ip = hostip::detect_host_ip(probe).map_err(RouterError::HostIp)?;
    match hostip::device_for_ip(host_ip) {
        Some(device) => info!(%host_ip, %device, "detected underlay"),
        None => warn!(%host_ip, "could not detect the underlay device"),
    }
    Ok(host_ip)
}

/// Run the full router: VXLAN device, FDB, and routes.
///
/// # Errors
///
/// Returns [`RouterError`] on the fatal startup conditions: unreadable
/// discovery data, failed host-IP detection, failed device creation, or a
/// failed watch registration.
pub async fn run(
    cfg: RouterConfig,
    discovery_file: &Path,
    token: CancellationToken,
) -> Result<(), RouterError> {
    info!(stack = %cfg.stack_id, vni = %cfg.vni, "starting router");

    if !watch::wait_for_file(discovery_file, &token).await {
        info!("shutdown requested before the discovery file appeared");
        return Ok(());
    }

    admin::enable_ipv4_forwarding().map_err(RouterError::Forwarding)?;

    let peers = store::load_active(discovery_file)?;
    let first = peers.first().ok_or(RouterError::NoPeers)?;
    let host_ip = detect_underlay(first)?;

    let netlink = Netlink::connect().map_err(AdminError::Io)?;
    let vtep = VtepManager::new(
        netlink.clone(),
        VtepSpec::new(cfg.vni, host_ip, cfg.local_vxlan_ip),
    );
    vtep.ensure().await?;

    let device = vtep.spec().name.clone();
    let fdb = FdbReconciler::new(BridgeCli, device.clone());
    let routes = RouteReconciler::new(
        netlink,
        device,
        cfg.stack_id.clone(),
        cfg.stack_mappings.clone(),
    );

    let mut watcher = PeerWatcher::new(discovery_file)?;
    reconcile(&watcher, &fdb, &routes).await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            changed = watcher.changed() => {
                if !changed {
                    warn!("discovery watcher stopped delivering events");
                    break;
                }
                reconcile(&watcher, &fdb, &routes).await;
            }
        }
    }

    drop(watcher);
    if let Err(err) = vtep.teardown().await {
        warn!(%err, "failed to delete vxlan device on shutdown");
    }
    info!(stack = %cfg.stack_id, "router stopped");
    Ok(())
}

async fn reconcile(
    watcher: &PeerWatcher,
    fdb: &FdbReconciler<BridgeCli>,
    routes: &RouteReconciler<Netlink>,
) {
    let peers = match watcher.load() {
        Ok(peers) => peers,
        Err(err) => {
            warn!(%err, "failed to load discovery data");
            return;
        }
    };
    info!(peers = peers.len(), "applying peer update");

    let endpoints: BTreeSet<Ipv4Addr> = peers.iter().map(|peer| peer.host_ip).collect();
    if let Err(err) = fdb.update(&endpoints).await {
        warn!(%err, "fdb update incomplete; will retry on the next change");
    }
    routes.update(&peers).await;
}

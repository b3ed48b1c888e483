// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Standalone VXLAN device and FDB manager.
//!
//! Co-deployed with the discovery daemon on hosts where the full router is
//! not wanted: ensures the VXLAN device exists and keeps its FDB entries in
//! step with the peers sharing this manager's VNI.  Polls the discovery
//! file on a fixed interval instead of watching it.

use discovery::store;
use net::{StackId, Vni};
use router::admin::{AdminError, BridgeCli, Netlink};
use router::daemon::{detect_underlay, RouterError, DEFAULT_DISCOVERY_FILE};
use router::fdb::FdbReconciler;
use router::vtep::{VtepManager, VtepSpec};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum SetupError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {name}: {message}")]
    Invalid {
        name: &'static str,
        message: String,
    },
}

struct ManagerConfig {
    stack_id: StackId,
    vni: Vni,
    local_vxlan_ip: Ipv4Addr,
    discovery_file: PathBuf,
}

fn config_from_env() -> Result<ManagerConfig, SetupError> {
    let var = |name: &'static str| std::env::var(name).ok().filter(|v| !v.is_empty());
    let required = |name: &'static str| var(name).ok_or(SetupError::Missing(name));
    let invalid = |name: &'static str, message: String| SetupError::Invalid { name, message };

    let stack_id = StackId::try_from(required("STACK_ID")?)
        .map_err(|err| invalid("STACK_ID", err.to_string()))?;
    let vni = required("VNI")?
        .parse::<u32>()
        .map_err(|err| invalid("VNI", err.to_string()))
        .and_then(|raw| Vni::new_checked(raw).map_err(|err| invalid("VNI", err.to_string())))?;
    let local_vxlan_ip = required("LOCAL_VXLAN_IP")?
        .parse::<Ipv4Addr>()
        .map_err(|err| invalid("LOCAL_VXLAN_IP", err.to_string()))?;
    let discovery_file = var("DISCOVERY_FILE")
        .map_or_else(|| PathBuf::from(DEFAULT_DISCOVERY_FILE), PathBuf::from);

    Ok(ManagerConfig {
        stack_id,
        vni,
        local_vxlan_ip,
        discovery_file,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    let cfg = match config_from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("vxlan manager misconfigured: {err}");
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

    if let Err(err) = run(cfg, token).await {
        error!("vxlan manager failed: {err}");
        std::process::exit(1);
    }
}

async fn run(cfg: ManagerConfig, token: CancellationToken) -> Result<(), RouterError> {
    info!(stack = %cfg.stack_id, vni = %cfg.vni, "starting vxlan manager");

    let peers = load_vni_peers(&cfg.discovery_file, cfg.vni)?;
    let first = peers.first().ok_or(RouterError::NoPeers)?;
    let host_ip = detect_underlay(first)?;

    let netlink = Netlink::connect().map_err(AdminError::Io)?;
    let vtep = VtepManager::new(
        netlink,
        VtepSpec::new(cfg.vni, host_ip, cfg.local_vxlan_ip),
    );
    vtep.ensure().await?;

    let fdb = FdbReconciler::new(BridgeCli, vtep.spec().name.clone());
    reconcile(&cfg, &fdb).await;

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => reconcile(&cfg, &fdb).await,
        }
    }

    if let Err(err) = vtep.teardown().await {
        warn!(%err, "failed to delete vxlan device on shutdown");
    }
    info!(stack = %cfg.stack_id, "vxlan manager stopped");
    Ok(())
}

async fn reconcile(cfg: &ManagerConfig, fdb: &FdbReconciler<BridgeCli>) {
    match load_vni_peers(&cfg.discovery_file, cfg.vni) {
        Ok(peers) => {
            let endpoints: BTreeSet<Ipv4Addr> = peers.iter().map(|peer| peer.host_ip).collect();
            if let Err(err) = fdb.update(&endpoints).await {
                warn!(%err, "fdb update incomplete; will retry on the next poll");
            }
        }
        Err(err) => warn!(%err, "failed to load discovery data"),
    }
}

fn load_vni_peers(
    path: &Path,
    vni: Vni,
) -> Result<Vec<discovery::peers::Peer>, discovery::store::StoreError> {
    Ok(store::load_active(path)?
        .into_iter()
        .filter(|peer| peer.vni == vni)
        .collect())
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel route reconciliation.
//!
//! One route per remote stack: the stack's container subnet via its overlay
//! VXLAN address, out the VXLAN device.  The desired map is derived from the
//! active peer set crossed with the static stack topology; peers missing
//! from the topology get a warning and no route.

use crate::admin::RouteAdmin;
use crate::config::StackMapping;
use discovery::peers::Peer;
use ipnet::Ipv4Net;
use net::{InterfaceName, StackId};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The mutations needed to move `tracked` to `desired`.
///
/// A route whose next hop changed appears on both sides: deleted with its
/// old hop, added with the new one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutePlan {
    pub add: Vec<(Ipv4Net, Ipv4Addr)>,
    pub del: Vec<Ipv4Net>,
}

impl RoutePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.del.is_empty()
    }
}

/// Diff the tracked routes against the desired map.
#[must_use]
pub fn plan(
    tracked: &HashMap<Ipv4Net, Ipv4Addr>,
    desired: &HashMap<Ipv4Net, Ipv4Addr>,
) -> RoutePlan {
    let mut out = RoutePlan::default();
    for (subnet, next_hop) in tracked {
        if desired.get(subnet) != Some(next_hop) {
            out.del.push(*subnet);
        }
    }
    for (subnet, next_hop) in desired {
        if tracked.get(subnet) != Some(next_hop) {
            out.add.push((*subnet, *next_hop));
        }
    }
    out.del.sort();
    out.add.sort();
    out
}

/// The routes implied by `peers` under `mappings`, excluding `local`.
#[must_use]
pub fn desired_routes(
    local: &StackId,
    mappings: &HashMap<StackId, StackMapping>,
    peers: &[Peer],
) -> HashMap<Ipv4Net, Ipv4Addr> {
    let mut desired = HashMap::new();
    for peer in peers {
        if peer.stack_id == *local {
            continue;
        }
        match mappings.get(&peer.stack_id) {
            Some(mapping) => {
                desired.insert(mapping.container_subnet, mapping.vxlan_ip);
            }
            None => warn!(stack = %peer.stack_id, "no stack mapping for peer; skipping route"),
        }
    }
    desired
}

/// Keeps the kernel routing table in step with the peer set.
#[derive(Debug)]
pub struct RouteReconciler<A> {
    admin: A,
    device: InterfaceName,
    local: StackId,
    mappings: HashMap<StackId, StackMapping>,
    routes: Mutex<HashMap<Ipv4Net, Ipv4Addr>>,
}

impl<A: RouteAdmin> RouteReconciler<A> {
    pub fn new(
        admin: A,
        device: InterfaceName,
        local: StackId,
        mappings: HashMap<StackId, StackMapping>,
    ) -> RouteReconciler<A> {
        RouteReconciler {
            admin,
            device,
            local,
            mappings,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile the routing table toward the state implied by `peers`.
    ///
    /// Deletion failures warn and untrack; addition failures warn and stay
    /// untracked so the next reconciliation retries.  Re-running with the
    /// same peers issues no kernel mutations.
    pub async fn update(&self, peers: &[Peer]) {
        let desired = desired_routes(&self.local, &self.mappings, peers);
        let mut routes = self.routes.lock().await;
        let plan = plan(&routes, &desired);
        if plan.is_empty() {
            return;
        }
        debug!(
            device = %self.device,
            add = plan.add.len(),
            del = plan.del.len(),
            "updating routes"
        );

        for subnet in plan.del {
            if let Err(err) = self.admin.del_route(subnet, &self.device).await {
                warn!(%subnet, %err, "failed to delete route");
            }
            routes.remove(&subnet);
        }
        for (subnet, next_hop) in plan.add {
            match self.admin.add_route(subnet, next_hop, &self.device).await {
                Ok(()) => {
                    routes.insert(subnet, next_hop);
                }
                Err(err) => warn!(%subnet, via = %next_hop, %err, "failed to add route"),
            }
        }
    }

    /// The currently tracked routes.
    pub async fn tracked(&self) -> HashMap<Ipv4Net, Ipv4Addr> {
        self.routes.lock().await.clone()
    }
}

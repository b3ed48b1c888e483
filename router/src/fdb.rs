// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Forwarding-database reconciliation.
//!
//! One head-end replication entry per remote underlay host: all-zeros MAC,
//! destination `host_ip`, on the VXLAN device.  The reconciler mirrors the
//! set of programmed destinations in memory and only issues the difference.

use crate::admin::{AdminError, FdbAdmin};
use net::InterfaceName;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The mutations needed to move `tracked` to `desired`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FdbPlan {
    pub add: Vec<Ipv4Addr>,
    pub del: Vec<Ipv4Addr>,
}

impl FdbPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.del.is_empty()
    }
}

/// Diff the tracked entries against the desired set.
#[must_use]
pub fn plan(tracked: &BTreeSet<Ipv4Addr>, desired: &BTreeSet<Ipv4Addr>) -> FdbPlan {
    FdbPlan {
        add: desired.difference(tracked).copied().collect(),
        del: tracked.difference(desired).copied().collect(),
    }
}

/// Keeps the kernel FDB in step with the peer set.
#[derive(Debug)]
pub struct FdbReconciler<A> {
    admin: A,
    device: InterfaceName,
    entries: Mutex<BTreeSet<Ipv4Addr>>,
}

impl<A: FdbAdmin> FdbReconciler<A> {
    pub fn new(admin: A, device: InterfaceName) -> FdbReconciler<A> {
        FdbReconciler {
            admin,
            device,
            entries: Mutex::new(BTreeSet::new()),
        }
    }

    /// Reconcile toward `desired`.
    ///
    /// Deletions that fail are logged and dropped from the tracked set
    /// anyway (the entry is unreachable either way).  Additions that fail
    /// stay untracked so the next reconciliation retries them.
    ///
    /// # Errors
    ///
    /// Returns the first addition failure after the whole plan has been
    /// attempted.
    pub async fn update(&self, desired: &BTreeSet<Ipv4Addr>) -> Result<(), AdminError> {
        let mut entries = self.entries.lock().await;
        let plan = plan(&entries, desired);
        if plan.is_empty() {
            return Ok(());
        }
        debug!(
            device = %self.device,
            add = plan.add.len(),
            del = plan.del.len(),
            "updating fdb entries"
        );

        for dst in plan.del {
            if let Err(err) = self.admin.delete_entry(&self.device, dst).await {
                warn!(device = %self.device, %dst, %err, "failed to delete fdb entry");
            }
            entries.remove(&dst);
        }

        let mut first_failure = None;
        for dst in plan.add {
            match self.admin.append_entry(&self.device, dst).await {
                Ok(()) => {
                    entries.insert(dst);
                }
                Err(err) => {
                    warn!(device = %self.device, %dst, %err, "failed to append fdb entry");
                    first_failure.get_or_insert(err);
                }
            }
        }
        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// The currently tracked destinations.
    pub async fn tracked(&self) -> BTreeSet<Ipv4Addr> {
        self.entries.lock().await.clone()
    }
}

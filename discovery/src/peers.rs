// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The in-memory peer table.

use chrono::{DateTime, TimeDelta, Utc};
use net::{StackId, Vni, VXLAN_PORT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// A discovered remote stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub stack_id: StackId,
    pub host_ip: Ipv4Addr,
    pub vxlan_endpoint: String,
    pub vni: Vni,
    pub last_seen: DateTime<Utc>,
    pub status: PeerStatus,
}

impl Peer {
    /// Build the peer record for a freshly validated announcement.
    #[must_use]
    pub fn observed(stack_id: StackId, host_ip: Ipv4Addr, vni: Vni, now: DateTime<Utc>) -> Peer {
        Peer {
            stack_id,
            host_ip,
            vxlan_endpoint: format!("{host_ip}:{VXLAN_PORT}"),
            vni,
            last_seen: now,
            status: PeerStatus::Active,
        }
    }
}

/// Liveness as exported in the discovery file.
///
/// The table itself only ever holds `Active` peers: expiry deletes, it does
/// not demote.  `Stale` exists so that files written by implementations which
/// do demote still load; every loader filters on `Active`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Active,
    Stale,
}

/// The membership map, keyed by stack id.
///
/// Mutations are serialized behind the write half of an [`RwLock`];
/// snapshots share the read half.  The local stack is never present in its
/// own table; [`PeerTable::upsert`] enforces that invariant.
#[derive(Debug)]
pub struct PeerTable {
    local: StackId,
    inner: RwLock<HashMap<StackId, Peer>>,
}

impl PeerTable {
    #[must_use]
    pub fn new(local: StackId) -> PeerTable {
        PeerTable {
            local,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// The local stack id this table belongs to.
    #[must_use]
    pub fn local(&self) -> &StackId {
        &self.local
    }

    /// Insert or refresh a peer.  Returns `false` when the peer carries the
    /// local stack id and was refused.
    pub fn upsert(&self, peer: Peer) -> bool {
        if peer.stack_id == self.local {
            return false;
        }
        self.write().insert(peer.stack_id.clone(), peer);
        true
    }

    /// Drop every peer whose `last_seen` age exceeds `timeout` as of `now`.
    ///
    /// The comparison is strict: a peer aged exactly `timeout` survives.
    /// Returns the number of peers removed.
    pub fn cleanup_stale(&self, timeout: Duration, now: DateTime<Utc>) -> usize {
        let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        let mut table = self.write();
        let before = table.len();
        table.retain(|_, peer| now.signed_duration_since(peer.last_seen) <= timeout);
        before - table.len()
    }

    /// A copy of the table, ordered by stack id for stable output.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.read().values().cloned().collect();
        peers.sort_by(|a, b| a.stack_id.cmp(&b.stack_id));
        peers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<StackId, Peer>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<StackId, Peer>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

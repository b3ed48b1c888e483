// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The discovery daemon: announce, listen, and cleanup loops.
//!
//! Three tasks cooperate over the shared peer table and socket.  The announce
//! loop multicasts the local identity, the listen loop learns remote peers
//! and answers queries, and the cleanup loop expires peers that have gone
//! quiet.  Every table-affecting event republishes the discovery file.  A
//! single cancellation token stops all three loops at their next suspension
//! point.

use crate::config::DiscoveryConfig;
use crate::message::{Message, MessageKind, MAX_DATAGRAM, WIRE_VERSION};
use crate::peers::{Peer, PeerTable};
use crate::socket::DiscoverySocket;
use crate::store::FileStore;
use chrono::Utc;
use net::{StackId, Vni};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the local stack says about itself in every announcement.
#[derive(Clone, Debug)]
pub struct Identity {
    pub stack_id: StackId,
    pub host_ip: Ipv4Addr,
    pub vni: Vni,
}

impl Identity {
    fn message(&self, kind: MessageKind) -> Message {
        Message {
            kind,
            version: WIRE_VERSION,
            stack_id: self.stack_id.clone(),
            host_ip: self.host_ip,
            vni: self.vni,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// A running discovery daemon.
pub struct Discovery {
    table: Arc<PeerTable>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Discovery {
    /// Publish the (empty) initial view and start the three loops.
    pub fn start(
        cfg: &DiscoveryConfig,
        identity: Identity,
        socket: DiscoverySocket,
        store: FileStore,
    ) -> Discovery {
        let table = Arc::new(PeerTable::new(identity.stack_id.clone()));
        let socket = Arc::new(socket);
        let store = Arc::new(store);
        let token = CancellationToken::new();

        // Consumers may already be waiting on the file; give them a complete
        // (empty) snapshot before the first announcement goes out.
        publish(&table, &store);

        info!(
            stack = %identity.stack_id,
            host = %identity.host_ip,
            group = %socket.group(),
            "discovery started"
        );

        let tasks = vec![
            tokio::spawn(announce_loop(
                socket.clone(),
                identity.clone(),
                cfg.announce_interval,
                token.clone(),
            )),
            tokio::spawn(listen_loop(
                socket.clone(),
                identity,
                table.clone(),
                store.clone(),
                token.clone(),
            )),
            tokio::spawn(cleanup_loop(
                table.clone(),
                store,
                cfg.peer_timeout,
                token.clone(),
            )),
        ];

        Discovery {
            table,
            token,
            tasks,
        }
    }

    /// The shared peer table (read-only callers).
    #[must_use]
    pub fn table(&self) -> &PeerTable {
        &self.table
    }

    /// Signal all loops and wait for them to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(%err, "discovery task did not shut down cleanly");
            }
        }
        info!("discovery stopped");
    }
}

async fn announce_loop(
    socket: Arc<DiscoverySocket>,
    identity: Identity,
    interval: Duration,
    token: CancellationToken,
) {
    // the first tick fires immediately: one announcement on entry
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let message = identity.message(MessageKind::Announce);
                match message.encode() {
                    Ok(data) => {
                        if let Err(err) = socket.send_to_group(&data).await {
                            warn!(%err, "failed to send announcement");
                        }
                    }
                    Err(err) => warn!(%err, "failed to encode announcement"),
                }
            }
        }
    }
}

async fn listen_loop(
    socket: Arc<DiscoverySocket>,
    identity: Identity,
    table: Arc<PeerTable>,
    store: Arc<FileStore>,
    token: CancellationToken,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            received = socket.recv_from(&mut buf) => {
                let (len, sender) = match received {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(%err, "error reading discovery datagram");
                        continue;
                    }
                };
                let message = match Message::decode(&buf[..len]) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(%sender, %err, "dropping malformed discovery datagram");
                        continue;
                    }
                };
                match handle(&table, &identity.stack_id, &message) {
                    Reaction::Ignored => {}
                    Reaction::Learned => {
                        debug!(
                            stack = %message.stack_id,
                            host = %message.host_ip,
                            "peer refreshed"
                        );
                        publish(&table, &store);
                    }
                    Reaction::Answer => {
                        let response = identity.message(MessageKind::Response);
                        match response.encode() {
                            Ok(data) => {
                                if let Err(err) = socket.send_to(&data, sender).await {
                                    warn!(%sender, %err, "failed to answer query");
                                }
                            }
                            Err(err) => warn!(%err, "failed to encode query response"),
                        }
                    }
                }
            }
        }
    }
}

async fn cleanup_loop(
    table: Arc<PeerTable>,
    store: Arc<FileStore>,
    peer_timeout: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(peer_timeout / 3);
    // skip the immediate first tick; nothing can be stale yet
    ticker.tick().await;
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let removed = table.cleanup_stale(peer_timeout, Utc::now());
                if removed > 0 {
                    info!(removed, "expired quiet peers");
                }
                publish(&table, &store);
            }
        }
    }
}

/// How the listen loop reacts to a validated message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Reaction {
    /// Drop silently: self-echo, foreign wire version, or unknown kind.
    Ignored,
    /// The peer table changed (or was refreshed); republish.
    Learned,
    /// A `QUERY`; answer the sender unicast.
    Answer,
}

fn handle(table: &PeerTable, local: &StackId, message: &Message) -> Reaction {
    if message.stack_id == *local {
        return Reaction::Ignored;
    }
    if message.version != WIRE_VERSION {
        debug!(
            version = message.version,
            stack = %message.stack_id,
            "ignoring message with foreign wire version"
        );
        return Reaction::Ignored;
    }
    match message.kind {
        MessageKind::Announce | MessageKind::Response => {
            let peer = Peer::observed(
                message.stack_id.clone(),
                message.host_ip,
                message.vni,
                Utc::now(),
            );
            if table.upsert(peer) {
                Reaction::Learned
            } else {
                Reaction::Ignored
            }
        }
        MessageKind::Query => Reaction::Answer,
        MessageKind::Unknown => Reaction::Ignored,
    }
}

fn publish(table: &PeerTable, store: &FileStore) {
    if let Err(err) = store.publish(table.snapshot(), Utc::now()) {
        warn!(%err, "failed to publish discovery file");
    }
}

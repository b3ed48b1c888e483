// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Watcher behavior under the publisher's rename-into-place discipline.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use discovery::peers::{Peer, PeerStatus};
use discovery::store::FileStore;
use net::{StackId, Vni};
use router::watch::{self, PeerWatcher};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn peer(raw: &str, host: Ipv4Addr) -> Peer {
    Peer::observed(
        StackId::try_from(raw).unwrap(),
        host,
        Vni::new_checked(100).unwrap(),
        Utc::now(),
    )
}

async fn expect_change(watcher: &mut PeerWatcher) {
    let fired = tokio::time::timeout(Duration::from_secs(10), watcher.changed()).await;
    assert_eq!(fired.ok(), Some(true), "expected a change notification");
}

#[tokio::test]
async fn each_publication_is_observed_despite_inode_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.init().unwrap();
    store.publish(vec![], Utc::now()).unwrap();

    let mut watcher = PeerWatcher::new(store.path()).unwrap();
    assert!(watcher.load().unwrap().is_empty());

    // first publication: rename replaces the original inode
    store
        .publish(vec![peer("b", Ipv4Addr::new(192, 168, 1, 20))], Utc::now())
        .unwrap();
    expect_change(&mut watcher).await;
    let peers = watcher.load().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].host_ip, Ipv4Addr::new(192, 168, 1, 20));

    // a second rename must still be observed; a watch pinned to the first
    // inode would be deaf by now
    store.publish(vec![], Utc::now()).unwrap();
    expect_change(&mut watcher).await;
    assert!(watcher.load().unwrap().is_empty());
}

#[tokio::test]
async fn loading_filters_out_non_active_peers() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.init().unwrap();

    let mut stale = peer("old", Ipv4Addr::new(192, 168, 1, 30));
    stale.status = PeerStatus::Stale;
    store
        .publish(
            vec![stale, peer("new", Ipv4Addr::new(192, 168, 1, 40))],
            Utc::now(),
        )
        .unwrap();

    let watcher = PeerWatcher::new(store.path()).unwrap();
    let peers = watcher.load().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].stack_id.as_ref(), "new");
}

#[tokio::test]
async fn loading_a_missing_file_is_an_error_not_a_panic() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = PeerWatcher::new(dir.path().join("discovery.json")).unwrap();
    assert!(watcher.load().is_err());
}

#[tokio::test(start_paused = true)]
async fn wait_for_file_returns_once_the_file_appears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("discovery.json");
    let token = CancellationToken::new();

    let creator = {
        let path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            std::fs::write(&path, "{}").unwrap();
        })
    };

    assert!(watch::wait_for_file(&path, &token).await);
    creator.await.unwrap();
}

#[tokio::test]
async fn wait_for_file_stops_on_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.json");
    let token = CancellationToken::new();
    token.cancel();
    assert!(!watch::wait_for_file(&path, &token).await);
}
